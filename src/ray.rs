use crate::{
    vecmath::{HasNan, Normal3f, Point3f, Vector3f},
    Float,
};

/// Distance a spawned ray's origin is pushed off the surface to avoid self-intersection.
pub const RAY_EPSILON: Float = 1e-4;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    /// Origin of the ray
    pub o: Point3f,
    /// Direction of the ray; unit length for every ray the path guide produces.
    pub d: Vector3f,
}

impl Ray {
    pub fn new(origin: Point3f, direction: Vector3f) -> Ray {
        Ray {
            o: origin,
            d: direction,
        }
    }

    pub fn at(&self, t: Float) -> Point3f {
        self.o + self.d * t
    }

    /// Spawns a ray leaving the surface point p (with geometric normal n) in direction d,
    /// offsetting the origin to the side of the surface d points into.
    pub fn spawn(p: Point3f, n: Normal3f, d: Vector3f) -> Ray {
        let mut offset = RAY_EPSILON * Vector3f::from(n);
        if d.dot_normal(&n) < 0.0 {
            offset = -offset;
        }
        Ray::new(p + offset, d)
    }

    /// Spawns a ray toward p_to; the direction is not normalized, so t = 1 reaches p_to.
    pub fn spawn_to(p_from: Point3f, n: Normal3f, p_to: Point3f) -> Ray {
        let d = p_to - p_from;
        Ray::spawn(p_from, n, d)
    }
}

impl HasNan for Ray {
    fn has_nan(&self) -> bool {
        self.o.has_nan() || self.d.has_nan()
    }
}
