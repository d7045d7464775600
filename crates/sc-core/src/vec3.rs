//! 3D vector math in layout coordinates

/// 3D vector in layout space
///
/// Coordinate convention: +x right, +y front, +z up. Azimuth is measured
/// from the front axis, positive to the right (`atan2(x, y)`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// The front direction, used as the fallback for degenerate vectors
    pub const FRONT: Self = Self::new(0.0, 1.0, 0.0);

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Build a unit vector from azimuth/elevation in radians
    pub fn from_azimuth_elevation(azimuth: f32, elevation: f32) -> Self {
        let cos_el = elevation.cos();
        Self {
            x: azimuth.sin() * cos_el,
            y: azimuth.cos() * cos_el,
            z: elevation.sin(),
        }
    }

    /// Azimuth in radians (0 = front, positive = right)
    #[inline]
    pub fn azimuth(&self) -> f32 {
        self.x.atan2(self.y)
    }

    /// Elevation in radians, assuming a unit vector
    #[inline]
    pub fn elevation(&self) -> f32 {
        self.z.clamp(-1.0, 1.0).asin()
    }

    #[inline]
    pub fn magnitude_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline]
    pub fn magnitude(&self) -> f32 {
        self.magnitude_squared().sqrt()
    }

    /// Normalize to a unit vector; degenerate input falls back to front
    pub fn normalize_or_front(&self) -> Self {
        let mag = self.magnitude();
        if mag < 1e-10 {
            return Self::FRONT;
        }
        Self::new(self.x / mag, self.y / mag, self.z / mag)
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    pub fn scale(&self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    #[inline]
    pub fn add(&self, other: &Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    #[inline]
    pub fn sub(&self, other: &Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    #[inline]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    #[inline]
    pub fn distance_to(&self, other: &Self) -> f32 {
        self.sub(other).magnitude()
    }

    /// All components are finite (no NaN/Inf)
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// A perpendicular unit vector, for antipodal interpolation
    pub fn any_perpendicular(&self) -> Self {
        // Cross with whichever basis axis is least aligned
        let axis = if self.x.abs() < 0.9 {
            Self::new(1.0, 0.0, 0.0)
        } else {
            Self::new(0.0, 1.0, 0.0)
        };
        self.cross(&axis).normalize_or_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn azimuth_elevation_round_trip() {
        let v = Vec3::from_azimuth_elevation(0.5, 0.3);
        assert_abs_diff_eq!(v.magnitude(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v.azimuth(), 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(v.elevation(), 0.3, epsilon = 1e-5);
    }

    #[test]
    fn front_is_front() {
        let v = Vec3::from_azimuth_elevation(0.0, 0.0);
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v.y, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn normalize_degenerate_falls_back_to_front() {
        assert_eq!(Vec3::ZERO.normalize_or_front(), Vec3::FRONT);
    }

    #[test]
    fn perpendicular_is_perpendicular() {
        for v in [Vec3::FRONT, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.3, -0.4, 0.86)] {
            let p = v.any_perpendicular();
            assert_abs_diff_eq!(v.dot(&p), 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(p.magnitude(), 1.0, epsilon = 1e-6);
        }
    }
}
