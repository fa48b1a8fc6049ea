// bspfile.rs — on-disk level records and fixed-stride lump decoding
//
// Every record is little-endian and packed. Container parsing (header,
// lump directory) happens elsewhere; these decoders take one lump's bytes.

use rayon::prelude::*;

use crate::error::{LumpError, VisError};
use crate::lightscale::ColorRgbExp32;
use crate::shared::{Plane, PlaneAxis};

// Upper bounds
pub const MAX_MAP_PLANES: usize = 32768;
pub const MAX_MAP_BRUSHES: usize = 32768;
pub const MAX_MAP_BRUSHSIDES: usize = 65536;
pub const MAX_MAP_NODES: usize = 32767;
pub const MAX_MAP_LEAFS: usize = 32760;
pub const MAX_MAP_LEAFBRUSHES: usize = 65536;
pub const MAX_MAP_AMBIENT_SAMPLES: usize = 65536;
pub const MAX_MAP_CUBEMAPS: usize = 1024;
pub const MAX_MAP_VISIBILITY: usize = 0x800000;

// Visibility offset table columns
pub const DVIS_PVS: usize = 0;
pub const DVIS_PHS: usize = 1;

// ============================================================
// Byte helpers
// ============================================================

#[inline]
pub fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub fn read_f32_le(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_i16x3(data: &[u8], offset: usize) -> [i16; 3] {
    [
        read_i16_le(data, offset),
        read_i16_le(data, offset + 2),
        read_i16_le(data, offset + 4),
    ]
}

// ============================================================
// Generic lump decoding
// ============================================================

/// A packed record type stored as a flat array in one lump.
pub trait LumpRecord: Sized + Send {
    const NAME: &'static str;
    const SIZE: usize;
    const MAX: usize;

    /// `bytes` is exactly `SIZE` long.
    fn decode(bytes: &[u8]) -> Self;
}

/// Decode a whole lump. Large lumps are split across the rayon pool.
pub fn decode_lump<T: LumpRecord>(data: &[u8], parallel_threshold: usize) -> Result<Vec<T>, LumpError> {
    if data.len() % T::SIZE != 0 {
        return Err(LumpError::FunnySize {
            lump: T::NAME,
            len: data.len(),
            stride: T::SIZE,
        });
    }
    let count = data.len() / T::SIZE;
    if count > T::MAX {
        return Err(LumpError::TooMany {
            lump: T::NAME,
            count,
            max: T::MAX,
        });
    }

    let records: Vec<T> = if count >= parallel_threshold {
        data.par_chunks_exact(T::SIZE).map(T::decode).collect()
    } else {
        data.chunks_exact(T::SIZE).map(T::decode).collect()
    };
    log::debug!("decoded {} {} ({} bytes)", count, T::NAME, data.len());
    Ok(records)
}

// ============================================================
// Records
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DPlane {
    pub normal: [f32; 3],
    pub dist: f32,
    pub axis_type: i32,
}

impl DPlane {
    pub fn to_plane(&self) -> Plane {
        Plane::new(self.normal, self.dist, PlaneAxis::from_raw(self.axis_type))
    }
}

impl LumpRecord for DPlane {
    const NAME: &'static str = "planes";
    const SIZE: usize = 20;
    const MAX: usize = MAX_MAP_PLANES;

    fn decode(b: &[u8]) -> Self {
        DPlane {
            normal: [read_f32_le(b, 0), read_f32_le(b, 4), read_f32_le(b, 8)],
            dist: read_f32_le(b, 12),
            axis_type: read_i32_le(b, 16),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DBrush {
    pub first_side: i32,
    pub num_sides: i32,
    pub contents: i32,
}

impl LumpRecord for DBrush {
    const NAME: &'static str = "brushes";
    const SIZE: usize = 12;
    const MAX: usize = MAX_MAP_BRUSHES;

    fn decode(b: &[u8]) -> Self {
        DBrush {
            first_side: read_i32_le(b, 0),
            num_sides: read_i32_le(b, 4),
            contents: read_i32_le(b, 8),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DBrushSide {
    pub plane: u16,
    /// Surface (texinfo) index, negative for none.
    pub surface: i16,
    pub displacement: i16,
    /// Non-zero for corner-rounding bevel planes.
    pub bevel: i16,
}

impl LumpRecord for DBrushSide {
    const NAME: &'static str = "brushsides";
    const SIZE: usize = 8;
    const MAX: usize = MAX_MAP_BRUSHSIDES;

    fn decode(b: &[u8]) -> Self {
        DBrushSide {
            plane: read_u16_le(b, 0),
            surface: read_i16_le(b, 2),
            displacement: read_i16_le(b, 4),
            bevel: read_i16_le(b, 6),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DNode {
    pub plane: i32,
    /// Negative children are `!leaf_index`.
    pub children: [i32; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_face: u16,
    pub num_faces: u16,
}

impl LumpRecord for DNode {
    const NAME: &'static str = "nodes";
    const SIZE: usize = 28;
    const MAX: usize = MAX_MAP_NODES;

    fn decode(b: &[u8]) -> Self {
        DNode {
            plane: read_i32_le(b, 0),
            children: [read_i32_le(b, 4), read_i32_le(b, 8)],
            mins: read_i16x3(b, 12),
            maxs: read_i16x3(b, 18),
            first_face: read_u16_le(b, 24),
            num_faces: read_u16_le(b, 26),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DLeaf {
    pub contents: i32,
    pub cluster: i16,
    pub area: i16,
    pub flags: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_leaf_face: u16,
    pub num_leaf_faces: u16,
    pub first_leaf_brush: u16,
    pub num_leaf_brushes: u16,
}

impl LumpRecord for DLeaf {
    const NAME: &'static str = "leafs";
    const SIZE: usize = 32;
    const MAX: usize = MAX_MAP_LEAFS;

    fn decode(b: &[u8]) -> Self {
        // bytes 10..12 are padding
        DLeaf {
            contents: read_i32_le(b, 0),
            cluster: read_i16_le(b, 4),
            area: read_i16_le(b, 6),
            flags: read_i16_le(b, 8),
            mins: read_i16x3(b, 12),
            maxs: read_i16x3(b, 18),
            first_leaf_face: read_u16_le(b, 24),
            num_leaf_faces: read_u16_le(b, 26),
            first_leaf_brush: read_u16_le(b, 28),
            num_leaf_brushes: read_u16_le(b, 30),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DLeafBrush {
    pub brush: u16,
}

impl LumpRecord for DLeafBrush {
    const NAME: &'static str = "leafbrushes";
    const SIZE: usize = 2;
    const MAX: usize = MAX_MAP_LEAFBRUSHES;

    fn decode(b: &[u8]) -> Self {
        DLeafBrush {
            brush: read_u16_le(b, 0),
        }
    }
}

/// Per-leaf range into the ambient sample lump.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DLeafAmbientIndex {
    pub num_samples: u16,
    pub first_sample: u16,
}

impl LumpRecord for DLeafAmbientIndex {
    const NAME: &'static str = "leaf ambient indices";
    const SIZE: usize = 4;
    const MAX: usize = MAX_MAP_LEAFS;

    fn decode(b: &[u8]) -> Self {
        DLeafAmbientIndex {
            num_samples: read_u16_le(b, 0),
            first_sample: read_u16_le(b, 2),
        }
    }
}

/// A six-face light cube sampled somewhere inside a leaf. `x`, `y`, `z`
/// are fixed-point fractions of the leaf bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DLeafAmbientLighting {
    pub cube: [ColorRgbExp32; 6],
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl LumpRecord for DLeafAmbientLighting {
    const NAME: &'static str = "leaf ambient samples";
    const SIZE: usize = 28;
    const MAX: usize = MAX_MAP_AMBIENT_SAMPLES;

    fn decode(b: &[u8]) -> Self {
        let mut cube = [ColorRgbExp32::default(); 6];
        for (i, face) in cube.iter_mut().enumerate() {
            let ofs = i * ColorRgbExp32::SIZE;
            *face = ColorRgbExp32::from_bytes(&b[ofs..ofs + ColorRgbExp32::SIZE]);
        }
        DLeafAmbientLighting {
            cube,
            x: b[24],
            y: b[25],
            z: b[26],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DCubemap {
    pub size: i32,
    /// Offset of each face's texels in the cubemap data lump, -1 if absent.
    pub face_offsets: [i32; 6],
    pub origin: [f32; 3],
}

impl LumpRecord for DCubemap {
    const NAME: &'static str = "cubemaps";
    const SIZE: usize = 40;
    const MAX: usize = MAX_MAP_CUBEMAPS;

    fn decode(b: &[u8]) -> Self {
        let mut face_offsets = [0i32; 6];
        for (i, ofs) in face_offsets.iter_mut().enumerate() {
            *ofs = read_i32_le(b, 4 + i * 4);
        }
        DCubemap {
            size: read_i32_le(b, 0),
            face_offsets,
            origin: [read_f32_le(b, 28), read_f32_le(b, 32), read_f32_le(b, 36)],
        }
    }
}

// ============================================================
// Visibility header
// ============================================================

/// The cluster count and per-cluster `[pvs, phs]` row offsets that open
/// the visibility lump. Offsets are relative to the start of the lump.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisHeader {
    pub num_clusters: usize,
    pub offsets: Vec<[i32; 2]>,
}

impl VisHeader {
    pub fn parse(data: &[u8]) -> Result<Self, VisError> {
        if data.len() > MAX_MAP_VISIBILITY {
            return Err(VisError::TooLarge {
                len: data.len(),
                max: MAX_MAP_VISIBILITY,
            });
        }
        if data.len() < 4 {
            return Err(VisError::Truncated(data.len()));
        }
        let declared = read_i32_le(data, 0);
        if declared < 0 {
            return Err(VisError::BadClusterCount(declared));
        }
        let num_clusters = declared as usize;
        if 4 + num_clusters * 8 > data.len() {
            return Err(VisError::OffsetTableOverrun {
                clusters: num_clusters,
                len: data.len(),
            });
        }

        let offsets = (0..num_clusters)
            .map(|i| {
                let base = 4 + i * 8;
                [read_i32_le(data, base), read_i32_le(data, base + 4)]
            })
            .collect();
        Ok(VisHeader {
            num_clusters,
            offsets,
        })
    }
}

// ============================================================
// Raw lump bundle
// ============================================================

/// Borrowed bytes of every lump the collision and lighting code reads.
/// Absent optional lumps are empty slices.
#[derive(Clone, Copy, Debug, Default)]
pub struct LevelLumps<'a> {
    pub planes: &'a [u8],
    pub brushes: &'a [u8],
    pub brush_sides: &'a [u8],
    pub nodes: &'a [u8],
    pub leafs: &'a [u8],
    pub leaf_brushes: &'a [u8],
    pub visibility: &'a [u8],
    pub leaf_ambient_index: &'a [u8],
    pub leaf_ambient_lighting: &'a [u8],
    pub cubemaps: &'a [u8],
}

// ============================================================
// Tests
// ============================================================
