//! Core data structures for stlview
//!
//! This crate provides the fundamental types shared by the stlview workspace:
//! triangle-soup geometry, bounding boxes, preview options and the common
//! error type.

pub mod point;
pub mod geometry;
pub mod options;
pub mod error;

pub use point::*;
pub use geometry::*;
pub use options::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix4};

/// Common result type for stlview operations
pub type Result<T> = std::result::Result<T, Error>;
