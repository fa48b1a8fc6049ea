// level.rs — a loaded level: collision model plus visibility tables
//
// Assembly validates everything up front. After that every query is
// infallible and takes `&self`, so one level can serve any number of
// threads. The process-wide current level lives in a `LevelSlot`.

use std::sync::Arc;

use parking_lot::RwLock;

use pbsp_common::bspfile::{
    decode_lump, DBrush, DBrushSide, DLeaf, DLeafBrush, DNode, DPlane, LevelLumps, DVIS_PHS,
    DVIS_PVS,
};
use pbsp_common::config::LevelConfig;
use pbsp_common::error::LevelError;
use pbsp_common::shared::{Contents, Plane, Vec3};

use crate::leaf::BoxLeafs;
use crate::model::{Brush, BrushSide, CollisionModel, Leaf, ModelParts, Node};
use crate::pvs::PvsTable;
use crate::trace::{Ray, Trace};

#[derive(Debug)]
pub struct CollisionLevel {
    model: CollisionModel,
    pvs: PvsTable,
    phs: PvsTable,
}

impl CollisionLevel {
    /// Decode raw lumps and assemble a level.
    pub fn from_lumps(lumps: &LevelLumps, config: &LevelConfig) -> Result<Self, LevelError> {
        let threshold = config.parallel_lump_threshold;

        let planes: Vec<Plane> = decode_lump::<DPlane>(lumps.planes, threshold)?
            .iter()
            .map(DPlane::to_plane)
            .collect();
        let num_planes = planes.len();

        let brush_sides = decode_lump::<DBrushSide>(lumps.brush_sides, threshold)?
            .iter()
            .map(|s| BrushSide {
                plane: s.plane as usize,
                surface: (s.surface >= 0).then_some(s.surface as u16),
                bevel: s.bevel != 0,
            })
            .collect::<Vec<_>>();

        let brushes = decode_lump::<DBrush>(lumps.brushes, threshold)?
            .iter()
            .enumerate()
            .map(|(i, b)| {
                if b.first_side < 0 || b.num_sides < 0 {
                    return Err(LevelError::BadSideRange {
                        brush: i,
                        first: b.first_side as i64,
                        end: b.first_side as i64 + b.num_sides as i64,
                        count: brush_sides.len(),
                    });
                }
                Ok(Brush {
                    contents: Contents::from_raw(b.contents),
                    first_side: b.first_side as usize,
                    num_sides: b.num_sides as usize,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let nodes = decode_lump::<DNode>(lumps.nodes, threshold)?
            .iter()
            .enumerate()
            .map(|(i, n)| {
                if n.plane < 0 {
                    return Err(LevelError::BadPlane {
                        what: "node",
                        index: i,
                        plane: n.plane as i64,
                        count: num_planes,
                    });
                }
                Ok(Node {
                    plane: n.plane as usize,
                    children: n.children,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let leafs = decode_lump::<DLeaf>(lumps.leafs, threshold)?
            .iter()
            .map(|l| Leaf {
                contents: Contents::from_raw(l.contents),
                cluster: l.cluster as i32,
                area: l.area as i32,
                flags: l.flags as i32,
                mins: l.mins.map(f32::from),
                maxs: l.maxs.map(f32::from),
                first_leaf_brush: l.first_leaf_brush as usize,
                num_leaf_brushes: l.num_leaf_brushes as usize,
            })
            .collect();

        let leaf_brushes = decode_lump::<DLeafBrush>(lumps.leaf_brushes, threshold)?
            .iter()
            .map(|lb| lb.brush as u32)
            .collect();

        let parts = ModelParts {
            planes,
            brushes,
            brush_sides,
            nodes,
            leafs,
            leaf_brushes,
        };
        Self::from_parts(parts, lumps.visibility, config)
    }

    /// Assemble a level from decoded records and a raw visibility lump.
    pub fn from_parts(parts: ModelParts, visibility: &[u8], config: &LevelConfig) -> Result<Self, LevelError> {
        let model = CollisionModel::with_threshold(parts, config.parallel_lump_threshold)?;

        let (pvs, phs) = if !config.want_visibility || visibility.is_empty() {
            let n = model.cluster_count();
            (PvsTable::all_visible(n), PvsTable::all_visible(n))
        } else {
            (
                PvsTable::from_vis_lump(visibility, DVIS_PVS)?,
                PvsTable::from_vis_lump(visibility, DVIS_PHS)?,
            )
        };

        log::info!(
            "level loaded: {} planes, {} nodes, {} leafs, {} brushes ({} boxes), {} clusters",
            model.num_planes(),
            model.num_nodes(),
            model.num_leafs(),
            model.num_brushes(),
            model.brush_index().box_count(),
            pvs.num_clusters()
        );

        Ok(CollisionLevel { model, pvs, phs })
    }

    pub fn model(&self) -> &CollisionModel {
        &self.model
    }

    pub fn pvs(&self) -> &PvsTable {
        &self.pvs
    }

    pub fn phs(&self) -> &PvsTable {
        &self.phs
    }

    /// Sweep a box centred on the segment through the world.
    pub fn trace_box(&self, start: Vec3, end: Vec3, half_extents: Vec3, mask: Contents) -> Trace {
        self.trace(&Ray::with_extents(start, end, half_extents), mask)
    }

    pub fn trace(&self, ray: &Ray, mask: Contents) -> Trace {
        self.model.box_trace(ray, self.model.world_head(), mask, true)
    }

    /// Trace from an arbitrary head node, checked against the tree first.
    pub fn trace_from(&self, ray: &Ray, head: i32, mask: Contents) -> Result<Trace, LevelError> {
        self.model.check_head(head)?;
        Ok(self.model.box_trace(ray, head, mask, true))
    }

    pub fn find_leaf(&self, p: &Vec3) -> usize {
        self.model.find_leaf(p, self.model.world_head())
    }

    pub fn point_contents(&self, p: &Vec3) -> Contents {
        self.model.point_contents(p, self.model.world_head())
    }

    pub fn box_leafs(&self, mins: &Vec3, maxs: &Vec3, max_count: usize) -> BoxLeafs {
        self.model.box_leafs(mins, maxs, self.model.world_head(), max_count)
    }

    pub fn leaf_cluster(&self, leaf: usize) -> i32 {
        self.model.leaf_cluster(leaf)
    }

    /// Cluster of the leaf containing `p`.
    pub fn point_cluster(&self, p: &Vec3) -> i32 {
        self.leaf_cluster(self.find_leaf(p))
    }

    pub fn is_cluster_visible(&self, from: i32, to: i32) -> bool {
        self.pvs.is_visible(from, to)
    }

    pub fn is_cluster_hearable(&self, from: i32, to: i32) -> bool {
        self.phs.is_visible(from, to)
    }

    /// Leafs with a cluster that `cluster` may see.
    pub fn visible_leafs(&self, cluster: i32) -> Vec<usize> {
        self.model
            .leafs()
            .iter()
            .enumerate()
            .filter(|(_, leaf)| leaf.cluster >= 0 && self.pvs.is_visible(cluster, leaf.cluster))
            .map(|(i, _)| i)
            .collect()
    }
}

// ============================================================
// Current level
// ============================================================

/// Holder for the level queries run against. Loads and unloads take the
/// write lock; queries share the read lock only long enough to clone the
/// `Arc`, so a swap never waits on a long trace.
pub struct LevelSlot {
    level: RwLock<Option<Arc<CollisionLevel>>>,
}

impl LevelSlot {
    pub const fn new() -> Self {
        LevelSlot {
            level: parking_lot::const_rwlock(None),
        }
    }

    /// Make `level` current, returning the level it replaces.
    pub fn install(&self, level: CollisionLevel) -> Option<Arc<CollisionLevel>> {
        self.level.write().replace(Arc::new(level))
    }

    pub fn unload(&self) -> Option<Arc<CollisionLevel>> {
        self.level.write().take()
    }

    pub fn current(&self) -> Option<Arc<CollisionLevel>> {
        self.level.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.level.read().is_some()
    }

    /// Run `f` against the current level, `None` when nothing is loaded.
    pub fn with_level<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&CollisionLevel) -> R,
    {
        let level = self.current()?;
        Some(f(&level))
    }
}

impl Default for LevelSlot {
    fn default() -> Self {
        Self::new()
    }
}

static CURRENT_LEVEL: LevelSlot = LevelSlot::new();

pub fn current_level() -> &'static LevelSlot {
    &CURRENT_LEVEL
}

pub fn cm_load_level(lumps: &LevelLumps, config: &LevelConfig) -> Result<(), LevelError> {
    let level = CollisionLevel::from_lumps(lumps, config)?;
    CURRENT_LEVEL.install(level);
    Ok(())
}

pub fn cm_unload_level() {
    if CURRENT_LEVEL.unload().is_some() {
        log::info!("level unloaded");
    }
}

pub fn cm_trace_box(start: Vec3, end: Vec3, half_extents: Vec3, mask: Contents) -> Option<Trace> {
    CURRENT_LEVEL.with_level(|level| level.trace_box(start, end, half_extents, mask))
}

pub fn cm_point_contents(p: &Vec3) -> Contents {
    CURRENT_LEVEL
        .with_level(|level| level.point_contents(p))
        .unwrap_or(Contents::EMPTY)
}

pub fn cm_find_leaf(p: &Vec3) -> Option<usize> {
    CURRENT_LEVEL.with_level(|level| level.find_leaf(p))
}

/// Fails open when no level is loaded.
pub fn cm_cluster_visible(from: i32, to: i32) -> bool {
    CURRENT_LEVEL
        .with_level(|level| level.is_cluster_visible(from, to))
        .unwrap_or(true)
}

// ============================================================
// Tests
// ============================================================
