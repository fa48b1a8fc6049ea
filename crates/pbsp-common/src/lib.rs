#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::manual_range_contains, clippy::comparison_chain)]

pub mod shared;
pub mod error;
pub mod config;
pub mod simd;
pub mod lightscale;
pub mod bspfile;

pub use config::LevelConfig;
pub use error::{ConfigError, LevelError, LumpError, VisError};
pub use shared::{Contents, Plane, PlaneAxis, Vec3};
