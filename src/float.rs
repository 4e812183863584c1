// Single precision throughout: observations are exchanged in a fixed 32-bit layout.
pub type Float = f32;

pub const PI_F: Float = std::f32::consts::PI;

/// Bump a floating-point value down to the next smaller representable
/// floating-point value.
pub fn next_float_down(v: Float) -> Float {
    if v.is_infinite() && v < 0.0 {
        v
    } else {
        let v = if v == 0.0 { -0.0 } else { v };
        let bits = v.to_bits();
        if v > 0.0 {
            Float::from_bits(bits - 1)
        } else {
            Float::from_bits(bits + 1)
        }
    }
}

/// Returns true if the value can be used as a sampling density:
/// strictly positive and finite.
#[inline]
pub fn is_valid_pdf(pdf: Float) -> bool {
    pdf > 0.0 && pdf.is_finite()
}
