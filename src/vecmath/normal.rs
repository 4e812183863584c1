use auto_ops::impl_op_ex;

use super::{HasNan, Vector3f};
use crate::Float;

/// A surface normal. Unlike a Vector3f it is tied to a surface, so it is kept
/// as its own type even though it carries the same three components.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Normal3f {
    pub x: Float,
    pub y: Float,
    pub z: Float,
}

impl Normal3f {
    pub const Z: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    #[inline(always)]
    pub const fn new(x: Float, y: Float, z: Float) -> Self {
        Self { x, y, z }
    }

    pub fn dot_vector(&self, v: &Vector3f) -> Float {
        self.x * v.x + self.y * v.y + self.z * v.z
    }

    pub fn normalize(self) -> Normal3f {
        Normal3f::from(Vector3f::from(self).normalize())
    }

    /// Flips the normal so that it lies in the same hemisphere as v.
    pub fn face_forward(self, v: &Vector3f) -> Normal3f {
        if self.dot_vector(v) < 0.0 {
            -self
        } else {
            self
        }
    }
}

impl HasNan for Normal3f {
    fn has_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }
}

impl From<Vector3f> for Normal3f {
    fn from(v: Vector3f) -> Self {
        Normal3f::new(v.x, v.y, v.z)
    }
}

impl_op_ex!(-|n: &Normal3f| -> Normal3f { Normal3f::new(-n.x, -n.y, -n.z) });

#[cfg(test)]
mod tests {
    use super::Normal3f;
    use crate::vecmath::Vector3f;

    #[test]
    fn face_forward_flips_into_hemisphere() {
        let n = Normal3f::Z;
        assert_eq!(n, n.face_forward(&Vector3f::new(0.3, 0.0, 0.1)));
        assert_eq!(-n, n.face_forward(&Vector3f::new(0.3, 0.0, -0.1)));
    }
}
