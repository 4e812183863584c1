//! Mixtures of von Mises-Fisher lobes, the directional model used by the grid field.
//!
//! A vMF lobe with mean direction mu and concentration kappa has density
//!   f(w) = kappa / (2 pi (1 - e^(-2 kappa))) * e^(kappa (dot(mu, w) - 1))
//! which is the usual form multiplied through by e^(-kappa) so that it stays finite
//! for large kappa.

use arrayvec::ArrayVec;

use crate::{
    field::{DistributionI, RegionId},
    float::PI_F,
    frame::Frame,
    math::{safe_sqrt, INV_4PI},
    sampling::{sample_discrete, sample_uniform_sphere},
    vecmath::{Normal3f, Point2f, Vector3f},
    Float,
};

pub const MAX_LOBES: usize = 8;

/// Below this a lobe is treated as the uniform distribution on the sphere.
const MIN_KAPPA: Float = 1e-3;

/// Concentration of the vMF lobe that best approximates the clamped cosine lobe.
const COSINE_KAPPA: Float = 2.18853;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VmfLobe {
    pub mean: Vector3f,
    pub kappa: Float,
    pub weight: Float,
}

/// ln of the normalization kappa / (2 pi (1 - e^(-2 kappa))).
fn log_normalization(kappa: Float) -> Float {
    if kappa < MIN_KAPPA {
        INV_4PI.ln()
    } else {
        kappa.ln() - (2.0 * PI_F).ln() - (-(-2.0 * kappa).exp_m1()).ln()
    }
}

impl VmfLobe {
    pub fn new(mean: Vector3f, kappa: Float, weight: Float) -> VmfLobe {
        VmfLobe {
            mean,
            kappa,
            weight,
        }
    }

    /// Normalized density of the lobe, ignoring its mixture weight.
    pub fn pdf(&self, w: Vector3f) -> Float {
        if self.kappa < MIN_KAPPA {
            return INV_4PI;
        }
        let cos_theta = Float::clamp(self.mean.dot(&w), -1.0, 1.0);
        (log_normalization(self.kappa) + self.kappa * (cos_theta - 1.0)).exp()
    }

    pub fn sample(&self, u: Point2f) -> Vector3f {
        if self.kappa < MIN_KAPPA {
            return sample_uniform_sphere(u);
        }
        let e = (-2.0 * self.kappa).exp();
        let cos_theta = Float::clamp(
            1.0 + Float::ln(u[0] + (1.0 - u[0]) * e) / self.kappa,
            -1.0,
            1.0,
        );
        let sin_theta = safe_sqrt(1.0 - cos_theta * cos_theta);
        let phi = 2.0 * PI_F * u[1];
        let local = Vector3f::new(
            sin_theta * Float::cos(phi),
            sin_theta * Float::sin(phi),
            cos_theta,
        );
        Frame::from_z(self.mean).from_local_v(&local)
    }

    /// Mean resultant length of the lobe, E[dot(mu, w)] = coth(kappa) - 1/kappa.
    pub fn mean_cosine(&self) -> Float {
        if self.kappa < MIN_KAPPA {
            return 0.0;
        }
        1.0 / Float::tanh(self.kappa) - 1.0 / self.kappa
    }

    /// Product of this lobe with another normalized lobe, as an unnormalized lobe:
    /// the returned weight is the integral of the product.
    fn product(&self, mean: Vector3f, kappa: Float) -> VmfLobe {
        let combined = self.mean * self.kappa + mean * kappa;
        let new_kappa = combined.length();
        let new_mean = if new_kappa < MIN_KAPPA {
            self.mean
        } else {
            combined / new_kappa
        };
        let log_scale = log_normalization(self.kappa) + log_normalization(kappa)
            - log_normalization(new_kappa)
            + new_kappa
            - self.kappa
            - kappa;
        VmfLobe::new(new_mean, new_kappa, self.weight * log_scale.exp())
    }
}

/// Approximates kappa from the mean resultant length of a set of directions
/// (Banerjee et al. 2005).
pub fn kappa_from_mean_cosine(r: Float, max_kappa: Float) -> Float {
    let r = Float::clamp(r, 0.0, 0.9999);
    Float::min(r * (3.0 - r * r) / (1.0 - r * r), max_kappa)
}

/// Evenly spread directions on the sphere (spherical Fibonacci lattice).
pub fn fibonacci_direction(i: usize, n: usize) -> Vector3f {
    let golden = (1.0 + Float::sqrt(5.0)) / 2.0;
    let z = 1.0 - (2.0 * i as Float + 1.0) / n as Float;
    let phi = 2.0 * PI_F * (i as Float / golden).fract();
    let r = safe_sqrt(1.0 - z * z);
    Vector3f::new(r * Float::cos(phi), r * Float::sin(phi), z)
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmmDistribution {
    lobes: ArrayVec<VmfLobe, MAX_LOBES>,
    region: RegionId,
}

impl VmmDistribution {
    /// Builds a mixture, normalizing the lobe weights. Lobes past MAX_LOBES are dropped.
    pub fn new(lobes: impl IntoIterator<Item = VmfLobe>, region: RegionId) -> VmmDistribution {
        let mut distribution = VmmDistribution {
            lobes: lobes.into_iter().take(MAX_LOBES).collect(),
            region,
        };
        distribution.normalize_weights();
        distribution
    }

    /// A broad mixture with lobes spread evenly over the sphere; the starting point for fitting.
    pub fn spread(num_lobes: usize, kappa: Float, region: RegionId) -> VmmDistribution {
        let n = num_lobes.clamp(1, MAX_LOBES);
        VmmDistribution::new(
            (0..n).map(|i| VmfLobe::new(fibonacci_direction(i, n), kappa, 1.0)),
            region,
        )
    }

    pub fn lobes(&self) -> &[VmfLobe] {
        &self.lobes
    }

    pub fn is_valid(&self) -> bool {
        !self.lobes.is_empty()
            && self.lobes.iter().all(|l| {
                l.mean.is_finite() && l.kappa.is_finite() && l.kappa >= 0.0 && l.weight >= 0.0
            })
            && self.lobes.iter().map(|l| l.weight).sum::<Float>() > 0.0
    }

    fn normalize_weights(&mut self) {
        let sum: Float = self.lobes.iter().map(|l| l.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for lobe in &mut self.lobes {
                lobe.weight /= sum;
            }
        }
    }

    /// Weighted expectation-maximization over (direction, weight) pairs, starting from
    /// the current lobes. Returns None if the samples carry no weight, leaving self as is.
    pub fn fit(
        &mut self,
        samples: &[(Vector3f, Float)],
        iterations: usize,
        max_kappa: Float,
    ) -> Option<()> {
        let total: Float = samples.iter().map(|(_, w)| w).sum();
        if !(total > 0.0) || !total.is_finite() || self.lobes.is_empty() {
            return None;
        }

        let n = self.lobes.len();
        for _ in 0..iterations {
            let mut mass = [0.0 as Float; MAX_LOBES];
            let mut resultant = [Vector3f::ZERO; MAX_LOBES];
            let mut responsibility = [0.0 as Float; MAX_LOBES];

            for (direction, weight) in samples {
                if *weight <= 0.0 {
                    continue;
                }
                let mut sum = 0.0;
                for (j, lobe) in self.lobes.iter().enumerate() {
                    responsibility[j] = lobe.weight * lobe.pdf(*direction);
                    sum += responsibility[j];
                }
                if !(sum > 0.0) {
                    continue;
                }
                for j in 0..n {
                    let gamma = weight * responsibility[j] / sum;
                    mass[j] += gamma;
                    resultant[j] += *direction * gamma;
                }
            }

            for (j, lobe) in self.lobes.iter_mut().enumerate() {
                lobe.weight = mass[j] / total;
                if mass[j] <= 0.0 {
                    continue;
                }
                let length = resultant[j].length();
                if length > 0.0 {
                    lobe.mean = resultant[j] / length;
                }
                lobe.kappa = kappa_from_mean_cosine(length / mass[j], max_kappa);
            }
            self.normalize_weights();
        }
        Some(())
    }
}

impl DistributionI for VmmDistribution {
    fn sample(&self, u: Point2f) -> Vector3f {
        let weights: ArrayVec<Float, MAX_LOBES> = self.lobes.iter().map(|l| l.weight).collect();
        let mut u_remapped = 0.0;
        match sample_discrete(&weights, u[0], None, Some(&mut u_remapped)) {
            Some(i) => self.lobes[i].sample(Point2f::new(u_remapped, u[1])),
            None => sample_uniform_sphere(u),
        }
    }

    fn pdf(&self, w: Vector3f) -> Float {
        self.lobes.iter().map(|l| l.weight * l.pdf(w)).sum()
    }

    fn apply_cosine_product(&mut self, n: Normal3f) {
        let normal = Vector3f::from(n);
        let products: ArrayVec<VmfLobe, MAX_LOBES> = self
            .lobes
            .iter()
            .map(|l| l.product(normal, COSINE_KAPPA))
            .collect();
        let sum: Float = products.iter().map(|l| l.weight).sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return;
        }
        self.lobes = products;
        self.normalize_weights();
    }

    fn region(&self) -> RegionId {
        self.region
    }

    fn num_lobes(&self) -> usize {
        self.lobes.len()
    }

    fn lobe_weight(&self, i: usize) -> Float {
        self.lobes.get(i).map_or(0.0, |l| l.weight)
    }

    fn lobe_pdf(&self, i: usize, w: Vector3f) -> Float {
        self.lobes.get(i).map_or(0.0, |l| l.pdf(w))
    }
}
