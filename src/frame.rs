use crate::vecmath::{Normal3f, Vector3f};

/// An orthonormal basis, used to move directions between the rendering
/// coordinate system and a local frame where +z is a chosen axis
/// (the shading normal for BSDFs, the lobe mean for vMF sampling).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: Vector3f,
    pub y: Vector3f,
    pub z: Vector3f,
}

impl Frame {
    pub fn new(x: Vector3f, y: Vector3f, z: Vector3f) -> Frame {
        Frame { x, y, z }
    }

    pub fn from_z(z: Vector3f) -> Frame {
        let (x, y) = z.coordinate_system();
        Frame { x, y, z }
    }

    pub fn from_normal(n: Normal3f) -> Frame {
        Frame::from_z(Vector3f::from(n))
    }

    pub fn to_local_v(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(v.dot(&self.x), v.dot(&self.y), v.dot(&self.z))
    }

    pub fn from_local_v(&self, v: &Vector3f) -> Vector3f {
        v.x * self.x + v.y * self.y + v.z * self.z
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            x: Vector3f::X,
            y: Vector3f::Y,
            z: Vector3f::Z,
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::Frame;
    use crate::{vecmath::Vector3f, Float};

    #[test]
    fn local_round_trip() {
        let frame = Frame::from_z(Vector3f::new(0.2, -0.5, 0.8).normalize());
        let v = Vector3f::new(0.3, 0.4, -0.2);
        let back = frame.from_local_v(&frame.to_local_v(&v));
        assert_approx_eq!(Float, v.x, back.x, epsilon = 1e-6);
        assert_approx_eq!(Float, v.y, back.y, epsilon = 1e-6);
        assert_approx_eq!(Float, v.z, back.z, epsilon = 1e-6);

        let local_z = frame.to_local_v(&frame.z);
        assert_approx_eq!(Float, 1.0, local_z.z, epsilon = 1e-6);
    }
}
