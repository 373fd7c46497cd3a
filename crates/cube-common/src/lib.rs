//! Common types and utilities shared across the cube query crates.

pub mod bbox;
pub mod crs;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::{Crs, CrsCode, CrsError, Transformation};
pub use time::{DateTime, DateUnit, Duration, TimeError};
