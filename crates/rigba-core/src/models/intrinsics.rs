use crate::{Mat3, Real, Vec2};
use serde::{Deserialize, Serialize};

/// Focal lengths and principal point, in pixels. No skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
}

impl Intrinsics {
    pub const DIM: usize = 4;

    /// Read `fx = K[0,0]`, `fy = K[1,1]`, `cx = K[0,2]`, `cy = K[1,2]`.
    ///
    /// Skew and the last row are ignored.
    pub fn from_matrix(k: &Mat3) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn to_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Map distorted normalized coordinates to pixels.
    #[inline]
    pub fn to_pixel(&self, n: &Vec2) -> Vec2 {
        Vec2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    pub fn to_array(&self) -> [Real; 4] {
        [self.fx, self.fy, self.cx, self.cy]
    }
}
