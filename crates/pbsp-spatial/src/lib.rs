#![allow(clippy::needless_range_loop, clippy::float_cmp)]

pub mod kdtree;
pub mod probes;

pub use kdtree::{KdTree, Neighbor};
pub use probes::{remap_val_clamped, AmbientProbe, AmbientProbeIndex, Cubemap, CubemapIndex};
