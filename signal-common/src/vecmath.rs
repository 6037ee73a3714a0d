use serde::{Serialize, Deserialize};

// Basic 2D vector type shared by the configuration and the engine.
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    #[inline(always)]
    pub fn new(x: f32, y: f32) -> Self { Self { x, y } }
    #[inline(always)]
    pub fn zero() -> Self { Self::new(0.0, 0.0) }
    #[inline(always)]
    pub fn splat(v: f32) -> Self { Self::new(v, v) }
    #[inline(always)]
    pub fn add(self, other: Self) -> Self { Self::new(self.x + other.x, self.y + other.y) }
    #[inline(always)]
    pub fn sub(self, other: Self) -> Self { Self::new(self.x - other.x, self.y - other.y) }
    #[inline(always)]
    pub fn scale(self, scalar: f32) -> Self { Self::new(self.x * scalar, self.y * scalar) }

    /// Component-wise division, used to convert world lengths into grid steps.
    #[inline(always)]
    pub fn div(self, other: Self) -> Self { Self::new(self.x / other.x, self.y / other.y) }

    /// Rotates the vector counter-clockwise by `theta` radians.
    #[inline(always)]
    pub fn rotated(self, theta: f32) -> Self {
        let (sin, cos) = theta.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// True when `min <= self < max` on both axes.
    #[inline(always)]
    pub fn in_range(self, min: Self, max: Self) -> bool {
        self.x >= min.x && self.x < max.x && self.y >= min.y && self.y < max.y
    }
}

impl From<[f32; 2]> for Vec2 {
    fn from(v: [f32; 2]) -> Self { Vec2::new(v[0], v[1]) }
}

impl From<Vec2> for [f32; 2] {
    fn from(v: Vec2) -> Self { [v.x, v.y] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_by_quarter_turn() {
        let v = Vec2::new(1.0, 0.0).rotated(std::f32::consts::FRAC_PI_2);
        assert!(v.x.abs() < 1e-6);
        assert!((v.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn in_range_is_half_open() {
        let max = Vec2::new(10.0, 10.0);
        assert!(Vec2::zero().in_range(Vec2::zero(), max));
        assert!(!Vec2::new(10.0, 5.0).in_range(Vec2::zero(), max));
        assert!(!Vec2::new(-0.1, 5.0).in_range(Vec2::zero(), max));
    }
}
