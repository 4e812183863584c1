use crate::{
    vecmath::{Point3f, Vector3f},
    Float,
};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3f {
    pub min: Point3f,
    pub max: Point3f,
}

impl Bounds3f {
    pub fn new(p1: Point3f, p2: Point3f) -> Bounds3f {
        Bounds3f {
            min: p1.min(&p2),
            max: p1.max(&p2),
        }
    }

    /// An inverted box that any union with a point replaces.
    pub fn empty() -> Bounds3f {
        Bounds3f {
            min: Point3f::new(Float::MAX, Float::MAX, Float::MAX),
            max: Point3f::new(Float::MIN, Float::MIN, Float::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn union_point(&self, p: &Point3f) -> Bounds3f {
        Bounds3f {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn union(&self, b: &Bounds3f) -> Bounds3f {
        Bounds3f {
            min: self.min.min(&b.min),
            max: self.max.max(&b.max),
        }
    }

    pub fn diagonal(&self) -> Vector3f {
        self.max - self.min
    }

    pub fn contains(&self, p: &Point3f) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Position of p relative to the box corners: (0,0,0) at min, (1,1,1) at max.
    pub fn offset(&self, p: &Point3f) -> Vector3f {
        let mut o = *p - self.min;
        let d = self.diagonal();
        if d.x > 0.0 {
            o.x /= d.x;
        }
        if d.y > 0.0 {
            o.y /= d.y;
        }
        if d.z > 0.0 {
            o.z /= d.z;
        }
        o
    }
}

impl Default for Bounds3f {
    fn default() -> Self {
        Bounds3f::empty()
    }
}
