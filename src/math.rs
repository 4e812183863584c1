use crate::float::{Float, PI_F};

pub const INV_PI: Float = 1.0 / PI_F;
pub const INV_4PI: Float = 1.0 / (4.0 * PI_F);

/// sqrt, clamping slightly negative inputs (from round-off) to zero.
#[inline]
pub fn safe_sqrt(x: Float) -> Float {
    debug_assert!(x >= -1e-3);
    Float::sqrt(Float::max(0.0, x))
}

#[cfg(test)]
mod tests {
    use super::safe_sqrt;

    #[test]
    fn safe_sqrt_clamps_round_off() {
        assert_eq!(0.0, safe_sqrt(-1e-7));
        assert_eq!(2.0, safe_sqrt(4.0));
    }
}
