//! Pinhole camera model with radial/tangential distortion.
//!
//! The distortion variant is configuration carried by each camera, not a type
//! parameter: a rig may mix a two-coefficient and a four-coefficient camera.

mod camera;
mod distortion;
mod intrinsics;

pub use camera::CameraModel;
pub use distortion::{Distortion, DistortionKind};
pub use intrinsics::Intrinsics;
