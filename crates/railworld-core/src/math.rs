//! Double-precision vector math for world geometry.
//!
//! Scene coordinates are right-handed with Y up; X grows east and Z grows
//! north. Distances are meters. Most proximity tests work on squared
//! distances to avoid square roots in hot loops.

use serde::{Deserialize, Serialize};

/// A point or direction in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Squared distance to another point.
    pub fn distance_squared(self, other: Vec3) -> f64 {
        (self - other).length_squared()
    }

    /// Normalized copy, or zero if the vector is degenerate.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > 1e-12 { self / len } else { Vec3::ZERO }
    }

    /// Rotate about the vertical (Y) axis by `angle_deg` degrees.
    ///
    /// Node centers given relative to an entry are rotated by the active
    /// `rotate` statement before the origin offset is applied.
    pub fn rotated_y(self, angle_deg: f64) -> Vec3 {
        if angle_deg == 0.0 {
            return self;
        }
        let a = angle_deg.to_radians();
        let (sin, cos) = a.sin_cos();
        Vec3 {
            x: self.x * cos + self.z * sin,
            y: self.y,
            z: -self.x * sin + self.z * cos,
        }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, o: Vec3) {
        *self = *self + o;
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl std::ops::SubAssign for Vec3 {
    fn sub_assign(&mut self, o: Vec3) {
        *self = *self - o;
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl std::ops::Div<f64> for Vec3 {
    type Output = Vec3;
    fn div(self, s: f64) -> Vec3 {
        Vec3::new(self.x / s, self.y / s, self.z / s)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Endpoint coincidence tolerance for topology linking, in meters.
///
/// Consistent authoring produces exactly coincident endpoints; the epsilon
/// absorbs accumulated rounding from origin/rotate transforms.
pub const ENDPOINT_EPSILON: f64 = 0.025;

/// True when two endpoints are close enough to be considered the same point.
pub fn points_coincide(a: Vec3, b: Vec3) -> bool {
    a.distance_squared(b) <= ENDPOINT_EPSILON * ENDPOINT_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_about_y_moves_x_into_z() {
        let v = Vec3::new(1.0, 2.0, 0.0);
        let r = v.rotated_y(90.0);
        assert!((r.x - 0.0).abs() < 1e-12);
        assert!((r.y - 2.0).abs() < 1e-12);
        assert!((r.z - -1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let v = Vec3::new(3.0, 4.0, 5.0);
        assert_eq!(v.rotated_y(0.0), v);
    }

    #[test]
    fn coincidence_within_epsilon() {
        let a = Vec3::new(100.0, 0.0, 100.0);
        let b = Vec3::new(100.0 + ENDPOINT_EPSILON * 0.5, 0.0, 100.0);
        assert!(points_coincide(a, b));
        assert!(!points_coincide(a, Vec3::new(100.1, 0.0, 100.0)));
    }
}
