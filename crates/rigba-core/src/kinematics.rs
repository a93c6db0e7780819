//! Kinematic rig model: three linear axes and two rotary axes.
//!
//! A pose is given as machine coordinates (linear offsets along X/Y/Z and
//! rotary angles about A/C, in degrees). The axis geometry itself is the
//! unknown being calibrated, so resolution must accept directions that are not
//! unit length and renormalize them on the fly.
//!
//! Resolution order for a point `p`:
//! 1. rotate about C (through its origin) by `-c` degrees,
//! 2. rotate about A (through its origin) by `+a` degrees,
//! 3. translate by `x·X̂ + y·Ŷ − z·Ẑ`.

use serde::{Deserialize, Serialize};

use crate::{pivoted_rotation, translation_matrix, GeometryError, Mat4, Real, Vec3};

/// Directions below this norm are treated as degenerate.
pub const MIN_AXIS_NORM: Real = 1e-12;

/// A rotary axis: a line through `origin` with direction `direction`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotaryAxis {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl RotaryAxis {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Slide the origin along the axis so that its coordinate matching the
    /// direction's dominant component becomes zero.
    ///
    /// Any point of the line is an equally valid origin; this picks a
    /// canonical one. The rotation it describes is unchanged.
    pub fn anchored(&self) -> Self {
        let d = &self.direction;
        let k = d.iamax();
        if d[k].abs() < MIN_AXIS_NORM {
            return *self;
        }
        let s = -self.origin[k] / d[k];
        let mut origin = self.origin + d * s;
        origin[k] = 0.0;
        Self {
            origin,
            direction: self.direction,
        }
    }
}

/// Machine coordinates of one pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisCoordinates {
    pub x: Real,
    pub y: Real,
    pub z: Real,
    /// A axis angle in degrees.
    pub a: Real,
    /// C axis angle in degrees.
    pub c: Real,
}

impl AxisCoordinates {
    pub fn new(x: Real, y: Real, z: Real, a: Real, c: Real) -> Self {
        Self { x, y, z, a, c }
    }

    // An angle of exactly zero means the axis did not take part in this pose.
    // A commanded 0° rotation is indistinguishable from an unused axis.
    pub fn a_active(&self) -> bool {
        self.a != 0.0
    }

    pub fn c_active(&self) -> bool {
        self.c != 0.0
    }

    pub fn to_array(&self) -> [Real; 5] {
        [self.x, self.y, self.z, self.a, self.c]
    }
}

/// Geometry of all rig axes, shared by every pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigAxes {
    pub x: Vec3,
    pub y: Vec3,
    pub z: Vec3,
    pub a: RotaryAxis,
    pub c: RotaryAxis,
}

impl RigAxes {
    /// Number of scalars in the axis block: X, Y, Z, A origin, A dir, C origin, C dir.
    pub const DIM: usize = 21;

    /// Axis-aligned rig with both rotary axes through the world origin
    /// (A along X, C along Z).
    pub fn aligned() -> Self {
        Self {
            x: Vec3::x(),
            y: Vec3::y(),
            z: Vec3::z(),
            a: RotaryAxis::new(Vec3::zeros(), Vec3::x()),
            c: RotaryAxis::new(Vec3::zeros(), Vec3::z()),
        }
    }

    /// Rows in block order: X, Y, Z, A origin, A dir, C origin, C dir.
    pub fn rows(&self) -> [Vec3; 7] {
        [
            self.x,
            self.y,
            self.z,
            self.a.origin,
            self.a.direction,
            self.c.origin,
            self.c.direction,
        ]
    }

    pub fn from_rows(rows: &[Vec3; 7]) -> Self {
        Self {
            x: rows[0],
            y: rows[1],
            z: rows[2],
            a: RotaryAxis::new(rows[3], rows[4]),
            c: RotaryAxis::new(rows[5], rows[6]),
        }
    }

    fn directions(&self) -> [(&'static str, &Vec3); 5] {
        [
            ("X", &self.x),
            ("Y", &self.y),
            ("Z", &self.z),
            ("A", &self.a.direction),
            ("C", &self.c.direction),
        ]
    }

    /// Reject zero-length directions.
    pub fn validate(&self) -> Result<(), GeometryError> {
        for (name, dir) in self.directions() {
            if !(dir.norm() >= MIN_AXIS_NORM) {
                return Err(GeometryError::DegenerateAxis(name));
            }
        }
        Ok(())
    }

    /// Copy with every direction scaled to unit length.
    pub fn normalized(&self) -> Result<Self, GeometryError> {
        self.validate()?;
        Ok(Self {
            x: self.x.normalize(),
            y: self.y.normalize(),
            z: self.z.normalize(),
            a: RotaryAxis::new(self.a.origin, self.a.direction.normalize()),
            c: RotaryAxis::new(self.c.origin, self.c.direction.normalize()),
        })
    }

    /// Re-anchor both rotary origins (see [`RotaryAxis::anchored`]).
    pub fn anchor_rotary_origins(&self) -> Self {
        Self {
            a: self.a.anchored(),
            c: self.c.anchored(),
            ..*self
        }
    }

    /// World transform of a pose, applied to points in the target frame.
    pub fn resolve(&self, coords: &AxisCoordinates) -> Mat4 {
        let x = unit_or_raw(&self.x);
        let y = unit_or_raw(&self.y);
        let z = unit_or_raw(&self.z);
        let translation = x * coords.x + y * coords.y - z * coords.z;

        let mut transform = Mat4::identity();
        if coords.c_active() {
            transform = pivoted_rotation(&self.c.origin, &unit_or_raw(&self.c.direction), -coords.c)
                * transform;
        }
        if coords.a_active() {
            transform = pivoted_rotation(&self.a.origin, &unit_or_raw(&self.a.direction), coords.a)
                * transform;
        }
        translation_matrix(&translation) * transform
    }
}

impl Default for RigAxes {
    fn default() -> Self {
        Self::aligned()
    }
}

// Trial directions from the optimizer may collapse; keep evaluation finite.
fn unit_or_raw(v: &Vec3) -> Vec3 {
    v.try_normalize(MIN_AXIS_NORM).unwrap_or(*v)
}
