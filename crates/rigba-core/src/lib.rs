//! Core math and geometry primitives for `rigba`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...) and rotation primitives,
//! - the pinhole camera model with radial/tangential distortion,
//! - the kinematic rig model (linear X/Y/Z axes, rotary A/C axes),
//! - observation and pose records shared by the optimizer and the pipeline.
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ perspective(extrinsic ∘ pose(point))`

mod error;
/// Kinematic rig axes and pose resolution.
pub mod kinematics;
/// Linear algebra type aliases and rotation helpers.
pub mod math;
/// Camera intrinsics, distortion and projection.
pub mod models;
/// Synthetic scenes for tests and examples.
pub mod synthetic;
/// Observation and pose records.
pub mod types;

pub use error::GeometryError;
pub use kinematics::*;
pub use math::*;
pub use models::*;
pub use types::*;
