use std::ops::{Index, IndexMut};

use auto_ops::{impl_op_ex, impl_op_ex_commutative};

use crate::{vecmath::HasNan, Float};

/// Linear RGB radiometric quantity: radiance, throughput, BSDF values.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RGB {
    pub r: Float,
    pub g: Float,
    pub b: Float,
}

impl RGB {
    pub const ZERO: RGB = RGB::new(0.0, 0.0, 0.0);
    pub const ONE: RGB = RGB::new(1.0, 1.0, 1.0);

    pub const fn new(r: Float, g: Float, b: Float) -> RGB {
        RGB { r, g, b }
    }

    pub const fn splat(v: Float) -> RGB {
        RGB { r: v, g: v, b: v }
    }

    /// Channel reduction used when a scalar estimate is needed for training.
    pub fn average(&self) -> Float {
        (self.r + self.g + self.b) / 3.0
    }

    pub fn max_component_value(&self) -> Float {
        Float::max(self.r, Float::max(self.g, self.b))
    }

    pub fn is_zero(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }
}

impl HasNan for RGB {
    fn has_nan(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }
}

impl Index<usize> for RGB {
    type Output = Float;

    fn index(&self, index: usize) -> &Self::Output {
        debug_assert!(index < 3);
        match index {
            0 => &self.r,
            1 => &self.g,
            _ => &self.b,
        }
    }
}

impl IndexMut<usize> for RGB {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        debug_assert!(index < 3);
        match index {
            0 => &mut self.r,
            1 => &mut self.g,
            _ => &mut self.b,
        }
    }
}

impl_op_ex!(+|a: &RGB, b: &RGB| -> RGB { RGB::new(a.r + b.r, a.g + b.g, a.b + b.b) });
impl_op_ex!(-|a: &RGB, b: &RGB| -> RGB { RGB::new(a.r - b.r, a.g - b.g, a.b - b.b) });
impl_op_ex!(*|a: &RGB, b: &RGB| -> RGB { RGB::new(a.r * b.r, a.g * b.g, a.b * b.b) });
impl_op_ex_commutative!(*|a: &RGB, s: Float| -> RGB { RGB::new(a.r * s, a.g * s, a.b * s) });
impl_op_ex!(/|a: &RGB, s: Float| -> RGB { RGB::new(a.r / s, a.g / s, a.b / s) });
impl_op_ex!(+=|a: &mut RGB, b: &RGB| {
    a.r += b.r;
    a.g += b.g;
    a.b += b.b;
});
impl_op_ex!(*=|a: &mut RGB, b: &RGB| {
    a.r *= b.r;
    a.g *= b.g;
    a.b *= b.b;
});
impl_op_ex!(*=|a: &mut RGB, s: Float| {
    a.r *= s;
    a.g *= s;
    a.b *= s;
});
impl_op_ex!(/=|a: &mut RGB, s: Float| {
    a.r /= s;
    a.g /= s;
    a.b /= s;
});

#[cfg(test)]
mod tests {
    use super::RGB;

    #[test]
    fn average_and_max() {
        let c = RGB::new(1.0, 2.0, 6.0);
        assert_eq!(3.0, c.average());
        assert_eq!(6.0, c.max_component_value());
    }

    #[test]
    fn rgb_ops() {
        let a = RGB::new(1.0, 2.0, 3.0);
        assert_eq!(RGB::new(2.0, 4.0, 6.0), a + a);
        assert_eq!(RGB::new(1.0, 4.0, 9.0), a * a);
        assert_eq!(RGB::new(0.5, 1.0, 1.5), 0.5 * a);
        let mut b = a;
        b *= 2.0;
        assert_eq!(RGB::new(2.0, 4.0, 6.0), b);
    }
}
