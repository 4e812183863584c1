use crate::{
    float::{next_float_down, Float, PI_F},
    math::{safe_sqrt, INV_4PI, INV_PI},
    vecmath::{Point2f, Vector3f},
};

// See PBRT v4 2.14
pub fn balance_heuristic(nf: u8, f_pdf: Float, ng: u8, g_pdf: Float) -> Float {
    (nf as Float * f_pdf) / (nf as Float * f_pdf + ng as Float * g_pdf)
}

// Takes a not-necessarily normalized set of nonnegative weights, a uniform random sample u,
// and returns the index of one of the weights with probability propotional to its weight.
// If weights is empty, None is returned.
// If pmf is provided, it will be populated with the value of the pmf for the sample.
// If u_remapped is provided, it will be populated with a new uniform random sample derived from u.
pub fn sample_discrete(
    weights: &[Float],
    u: Float,
    pmf: Option<&mut Float>,
    u_remapped: Option<&mut Float>,
) -> Option<usize> {
    if weights.is_empty() {
        if let Some(pmf) = pmf {
            *pmf = 0.0;
        }
        return None;
    }

    let sum_weights: Float = weights.iter().sum();
    if !(sum_weights > 0.0) {
        if let Some(pmf) = pmf {
            *pmf = 0.0;
        }
        return None;
    }

    // Compute rescaled u' sample.
    let up = u * sum_weights;
    let up = if up >= sum_weights {
        next_float_down(sum_weights)
    } else {
        up
    };

    // Find offset in weights corresponding to u'
    let mut offset = 0;
    let mut sum: Float = 0.0;
    while offset + 1 < weights.len() && sum + weights[offset] <= up {
        sum += weights[offset];
        offset += 1;
    }

    // Compute PMF and remapped u value if requested.
    if let Some(pmf) = pmf {
        *pmf = weights[offset] / sum_weights;
    }
    if let Some(u_remapped) = u_remapped {
        // The difference between the sum (the start of the bracket for the offset)
        // and u is itself a new uniform random value that can be remapped to between 0 and 1 here.
        *u_remapped = Float::clamp((up - sum) / weights[offset], 0.0, 1.0 - Float::EPSILON);
    }

    Some(offset)
}

pub fn sample_uniform_sphere(u: Point2f) -> Vector3f {
    let z = 1.0 - 2.0 * u[0];
    let r = safe_sqrt(1.0 - z * z);
    let phi = 2.0 * PI_F * u[1];
    Vector3f {
        x: r * Float::cos(phi),
        y: r * Float::sin(phi),
        z,
    }
}

pub fn uniform_sphere_pdf() -> Float {
    INV_4PI
}

/// Shirley-Chiu concentric mapping of the unit square onto the unit disk.
pub fn sample_uniform_disk_concentric(u: Point2f) -> Point2f {
    let ox = 2.0 * u.x - 1.0;
    let oy = 2.0 * u.y - 1.0;
    if ox == 0.0 && oy == 0.0 {
        return Point2f::new(0.0, 0.0);
    }
    let (r, theta) = if Float::abs(ox) > Float::abs(oy) {
        (ox, (PI_F / 4.0) * (oy / ox))
    } else {
        (oy, PI_F / 2.0 - (PI_F / 4.0) * (ox / oy))
    };
    Point2f::new(r * Float::cos(theta), r * Float::sin(theta))
}

/// Cosine-weighted direction in the local frame's +z hemisphere (Malley's method).
pub fn sample_cosine_hemisphere(u: Point2f) -> Vector3f {
    let d = sample_uniform_disk_concentric(u);
    let z = safe_sqrt(1.0 - d.x * d.x - d.y * d.y);
    Vector3f::new(d.x, d.y, z)
}

pub fn cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    cos_theta * INV_PI
}

/// Uniform point inside the unit ball, from a direction and a cube-root radius.
pub fn sample_uniform_ball(u: Point2f, u_radius: Float) -> Vector3f {
    sample_uniform_sphere(u) * Float::cbrt(u_radius)
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::{
        balance_heuristic, cosine_hemisphere_pdf, sample_cosine_hemisphere, sample_discrete,
        sample_uniform_ball, sample_uniform_sphere, Float,
    };
    use crate::vecmath::Point2f;

    #[test]
    fn sample_discrete_basics() {
        let mut pdf: Float = 0.0;

        assert_eq!(
            Some(0),
            sample_discrete(&[5.0], 0.251, Some(&mut pdf), None)
        );
        assert_eq!(1.0, pdf);

        assert_eq!(
            Some(0),
            sample_discrete(&[0.5, 0.5], 0.0, Some(&mut pdf), None)
        );
        assert_eq!(0.5, pdf);

        assert_eq!(
            Some(0),
            sample_discrete(&[0.5, 0.5], 0.499, Some(&mut pdf), None)
        );
        assert_eq!(0.5, pdf);

        let mut u_remapped: Float = 0.0;
        assert_eq!(
            Some(1),
            sample_discrete(&[0.5, 0.5], 0.5, Some(&mut pdf), Some(&mut u_remapped))
        );
        assert_eq!(0.5, pdf);
        assert_eq!(0.0, u_remapped);
    }

    #[test]
    fn sample_discrete_degenerate_weights() {
        assert_eq!(None, sample_discrete(&[], 0.3, None, None));
        assert_eq!(None, sample_discrete(&[0.0, 0.0], 0.3, None, None));
        // u = 1 is clamped into the last bracket rather than running off the end.
        assert_eq!(Some(1), sample_discrete(&[1.0, 1.0], 1.0, None, None));
        // Zero-weight entries are never chosen.
        assert_eq!(Some(2), sample_discrete(&[1.0, 0.0, 1.0], 0.75, None, None));
    }

    #[test]
    fn balance_heuristic_sums_to_one() {
        let a = balance_heuristic(1, 0.3, 1, 1.7);
        let b = balance_heuristic(1, 1.7, 1, 0.3);
        assert_approx_eq!(Float, 1.0, a + b);
    }

    #[test]
    fn warps_land_in_their_domains() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let u = Point2f::new(rng.gen(), rng.gen());
            let w = sample_uniform_sphere(u);
            assert_approx_eq!(Float, 1.0, w.length(), epsilon = 1e-5);

            let c = sample_cosine_hemisphere(u);
            assert!(c.z >= 0.0);
            assert!(cosine_hemisphere_pdf(c.z) >= 0.0);

            let b = sample_uniform_ball(u, rng.gen());
            assert!(b.length() <= 1.0 + 1e-5);
        }
    }
}
