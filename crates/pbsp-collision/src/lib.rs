#![allow(clippy::too_many_arguments, clippy::float_cmp, clippy::needless_range_loop,
         clippy::comparison_chain)]

pub mod model;
pub mod brush_index;
pub mod trace;
pub mod leaf;
pub mod pvs;
pub mod level;

pub use brush_index::{BoxBrush, BrushIndex, BrushKind};
pub use leaf::BoxLeafs;
pub use level::{current_level, CollisionLevel, LevelSlot};
pub use model::{leaf_child, Brush, BrushSide, CollisionModel, Leaf, ModelParts, Node};
pub use pvs::PvsTable;
pub use trace::{compute_trace_endpoints, Ray, Trace, DIST_EPSILON};
