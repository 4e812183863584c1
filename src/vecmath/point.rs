use std::ops::{Index, IndexMut};

use auto_ops::{impl_op_ex, impl_op_ex_commutative};
use bytemuck::{Pod, Zeroable};

use super::{HasNan, Vector3f};
use crate::Float;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Point3f {
    pub x: Float,
    pub y: Float,
    pub z: Float,
}

impl Point3f {
    /// All zeroes.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline(always)]
    pub const fn new(x: Float, y: Float, z: Float) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, p: &Point3f) -> Float {
        (self - p).length()
    }

    pub fn min(&self, p: &Point3f) -> Point3f {
        Point3f::new(
            Float::min(self.x, p.x),
            Float::min(self.y, p.y),
            Float::min(self.z, p.z),
        )
    }

    pub fn max(&self, p: &Point3f) -> Point3f {
        Point3f::new(
            Float::max(self.x, p.x),
            Float::max(self.y, p.y),
            Float::max(self.z, p.z),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl HasNan for Point3f {
    fn has_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }
}

impl From<[Float; 3]> for Point3f {
    fn from(p: [Float; 3]) -> Self {
        Point3f::new(p[0], p[1], p[2])
    }
}

impl Index<usize> for Point3f {
    type Output = Float;

    fn index(&self, index: usize) -> &Self::Output {
        debug_assert!(index < 3);
        match index {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }
}

impl IndexMut<usize> for Point3f {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        debug_assert!(index < 3);
        match index {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }
}

impl_op_ex!(-|p1: &Point3f, p2: &Point3f| -> Vector3f {
    Vector3f::new(p1.x - p2.x, p1.y - p2.y, p1.z - p2.z)
});
impl_op_ex_commutative!(+|p: &Point3f, v: &Vector3f| -> Point3f {
    Point3f::new(p.x + v.x, p.y + v.y, p.z + v.z)
});
impl_op_ex!(-|p: &Point3f, v: &Vector3f| -> Point3f {
    Point3f::new(p.x - v.x, p.y - v.y, p.z - v.z)
});
impl_op_ex!(+=|p: &mut Point3f, v: &Vector3f| {
    p.x += v.x;
    p.y += v.y;
    p.z += v.z;
});

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Point2f {
    pub x: Float,
    pub y: Float,
}

impl Point2f {
    #[inline(always)]
    pub const fn new(x: Float, y: Float) -> Self {
        Self { x, y }
    }
}

impl Index<usize> for Point2f {
    type Output = Float;

    fn index(&self, index: usize) -> &Self::Output {
        debug_assert!(index < 2);
        if index == 0 {
            &self.x
        } else {
            &self.y
        }
    }
}
