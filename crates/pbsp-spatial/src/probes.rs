// probes.rs — ambient light probes and reflection cubemaps
//
// Probes are stored per leaf with one k-d tree each, so a lookup only
// searches the samples baked for the leaf the query point is in.
// Cubemaps share a single tree over the whole level.

use std::collections::HashSet;

use rayon::prelude::*;

use pbsp_common::bspfile::{
    decode_lump, DCubemap, DLeaf, DLeafAmbientIndex, DLeafAmbientLighting, LevelLumps,
};
use pbsp_common::config::LevelConfig;
use pbsp_common::error::LumpError;
use pbsp_common::lightscale::color_shift_pixel;
use pbsp_common::shared::Vec3;

use crate::kdtree::KdTree;

/// Linear remap of `val` from `a..b` to `c..d`, clamped to the output range.
pub fn remap_val_clamped(val: f32, a: f32, b: f32, c: f32, d: f32) -> f32 {
    if a == b {
        return if val >= b { d } else { c };
    }
    let t = ((val - a) / (b - a)).clamp(0.0, 1.0);
    c + (d - c) * t
}

fn position_key(p: &Vec3) -> [u32; 3] {
    [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()]
}

// ============================================================
// Ambient probes
// ============================================================

#[derive(Clone, Debug, PartialEq)]
pub struct AmbientProbe {
    pub position: Vec3,
    /// Gamma-encoded colour arriving from +x, -x, +y, -y, +z, -z.
    pub cube: [Vec3; 6],
}

#[derive(Clone, Debug)]
struct LeafProbes {
    probes: Vec<AmbientProbe>,
    tree: KdTree<3>,
}

#[derive(Clone, Debug, Default)]
pub struct AmbientProbeIndex {
    leafs: Vec<LeafProbes>,
}

impl AmbientProbeIndex {
    /// `leaf_bounds[i]` is the `(mins, maxs)` of leaf `i`; `index[i]` names
    /// the run of `samples` baked for it.
    pub fn build(
        leaf_bounds: &[(Vec3, Vec3)],
        index: &[DLeafAmbientIndex],
        samples: &[DLeafAmbientLighting],
        gamma: f32,
    ) -> Self {
        let count = index.len().min(leaf_bounds.len());
        if count < index.len() {
            log::warn!(
                "{} ambient index entries but only {} leafs",
                index.len(),
                leaf_bounds.len()
            );
        }

        let leafs: Vec<LeafProbes> = (0..count)
            .into_par_iter()
            .map(|i| leaf_probes(i, &leaf_bounds[i], &index[i], samples, gamma))
            .collect();

        let total: usize = leafs.iter().map(|l| l.probes.len()).sum();
        log::info!("ambient probes: {} across {} leafs", total, leafs.len());
        AmbientProbeIndex { leafs }
    }

    pub fn from_lumps(lumps: &LevelLumps, config: &LevelConfig) -> Result<Self, LumpError> {
        let threshold = config.parallel_lump_threshold;
        let leafs = decode_lump::<DLeaf>(lumps.leafs, threshold)?;
        let index = decode_lump::<DLeafAmbientIndex>(lumps.leaf_ambient_index, threshold)?;
        let samples = decode_lump::<DLeafAmbientLighting>(lumps.leaf_ambient_lighting, threshold)?;

        let bounds: Vec<(Vec3, Vec3)> = leafs
            .iter()
            .map(|l| (l.mins.map(f32::from), l.maxs.map(f32::from)))
            .collect();
        Ok(Self::build(&bounds, &index, &samples, config.gamma))
    }

    pub fn num_leafs(&self) -> usize {
        self.leafs.len()
    }

    pub fn probes(&self, leaf: usize) -> &[AmbientProbe] {
        self.leafs.get(leaf).map(|l| l.probes.as_slice()).unwrap_or(&[])
    }

    /// Closest probe to `position` among those baked for `leaf`.
    pub fn closest_probe(&self, leaf: usize, position: &Vec3) -> Option<&AmbientProbe> {
        let leaf = self.leafs.get(leaf)?;
        let hit = leaf.tree.nearest(position)?;
        leaf.probes.get(hit.index)
    }
}

fn leaf_probes(
    leaf: usize,
    (mins, maxs): &(Vec3, Vec3),
    index: &DLeafAmbientIndex,
    samples: &[DLeafAmbientLighting],
    gamma: f32,
) -> LeafProbes {
    let first = index.first_sample as usize;
    let end = first + index.num_samples as usize;
    let run: &[DLeafAmbientLighting] = match samples.get(first..end) {
        Some(run) => run,
        None => {
            log::warn!(
                "leaf {} ambient samples {}..{} outside {} samples",
                leaf,
                first,
                end,
                samples.len()
            );
            &[]
        }
    };

    let mut seen = HashSet::new();
    let mut probes = Vec::with_capacity(run.len());
    for sample in run {
        let position = [
            remap_val_clamped(sample.x as f32, 0.0, 255.0, mins[0], maxs[0]),
            remap_val_clamped(sample.y as f32, 0.0, 255.0, mins[1], maxs[1]),
            remap_val_clamped(sample.z as f32, 0.0, 255.0, mins[2], maxs[2]),
        ];
        if !seen.insert(position_key(&position)) {
            continue;
        }
        probes.push(AmbientProbe {
            position,
            cube: sample.cube.map(|c| color_shift_pixel(&c, gamma)),
        });
    }

    let tree = KdTree::build(probes.iter().map(|p| p.position).collect());
    LeafProbes { probes, tree }
}

// ============================================================
// Cubemaps
// ============================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Cubemap {
    pub origin: Vec3,
    pub size: i32,
    pub face_offsets: [i32; 6],
    pub leaf: usize,
    /// All six faces have image data.
    pub complete: bool,
}

#[derive(Clone, Debug)]
pub struct CubemapIndex {
    cubemaps: Vec<Cubemap>,
    tree: KdTree<3>,
}

impl CubemapIndex {
    /// `locate` maps an origin to the leaf that contains it.
    pub fn build<F>(records: &[DCubemap], locate: F) -> Self
    where
        F: Fn(&Vec3) -> usize,
    {
        let mut seen = HashSet::new();
        let mut cubemaps = Vec::with_capacity(records.len());
        for rec in records {
            if !seen.insert(position_key(&rec.origin)) {
                continue;
            }
            let complete = rec.face_offsets.iter().all(|&ofs| ofs != -1);
            if !complete {
                log::debug!("cubemap at {:?} is missing faces", rec.origin);
            }
            cubemaps.push(Cubemap {
                origin: rec.origin,
                size: rec.size,
                face_offsets: rec.face_offsets,
                leaf: locate(&rec.origin),
                complete,
            });
        }

        let tree = KdTree::build(cubemaps.iter().map(|c| c.origin).collect());
        log::info!("cubemaps: {} ({} records)", cubemaps.len(), records.len());
        CubemapIndex { cubemaps, tree }
    }

    pub fn from_lumps<F>(lumps: &LevelLumps, config: &LevelConfig, locate: F) -> Result<Self, LumpError>
    where
        F: Fn(&Vec3) -> usize,
    {
        let records = decode_lump::<DCubemap>(lumps.cubemaps, config.parallel_lump_threshold)?;
        Ok(Self::build(&records, locate))
    }

    pub fn len(&self) -> usize {
        self.cubemaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubemaps.is_empty()
    }

    pub fn cubemaps(&self) -> &[Cubemap] {
        &self.cubemaps
    }

    pub fn closest_cubemap(&self, position: &Vec3) -> Option<&Cubemap> {
        let hit = self.tree.nearest(position)?;
        self.cubemaps.get(hit.index)
    }
}
