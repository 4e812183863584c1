use bitflags::bitflags;

use crate::{
    color::RGB,
    float::PI_F,
    frame::Frame,
    math::INV_PI,
    sampling::{cosine_hemisphere_pdf, sample_cosine_hemisphere},
    vecmath::{
        spherical::{abs_cos_theta, same_hemisphere},
        Point2f, Vector3f,
    },
    Float,
};

/// The BxDF Interface. All directions are given in the local shading coordinate system,
/// where the shading normal is +z; both wo and wi point away from the surface.
pub trait BxDFI {
    /// Returns the value of the distribution function for a given pair of directions wi and wo.
    fn f(&self, wo: Vector3f, wi: Vector3f) -> RGB;

    /// Uses importance sampling to draw a direction (wi) from a distribution function that approximates
    /// the scattering function's shape.
    /// uc will generally be used to choose between different lobes and u for the direction.
    fn sample_f(&self, wo: Vector3f, uc: Float, u: Point2f) -> Option<BSDFSample>;

    /// Returns the value of the PDF for a given pair of directions. This is what multiple
    /// importance sampling compares against other strategies for the same direction.
    fn pdf(&self, wo: Vector3f, wi: Vector3f) -> Float;

    fn flags(&self) -> BxDFFlags;

    /// A [0, 1] measure of how spread out the lobe is; 0 is a perfect mirror.
    fn roughness(&self) -> Float;

    /// Relative index of refraction; 1 for anything that does not transmit.
    fn eta(&self) -> Float {
        1.0
    }
}

#[derive(Debug, Clone)]
pub enum BxDF {
    Diffuse(DiffuseBxDF),
    Phong(PhongBxDF),
    Mirror(MirrorBxDF),
}

impl BxDFI for BxDF {
    fn f(&self, wo: Vector3f, wi: Vector3f) -> RGB {
        match self {
            BxDF::Diffuse(b) => b.f(wo, wi),
            BxDF::Phong(b) => b.f(wo, wi),
            BxDF::Mirror(b) => b.f(wo, wi),
        }
    }

    fn sample_f(&self, wo: Vector3f, uc: Float, u: Point2f) -> Option<BSDFSample> {
        match self {
            BxDF::Diffuse(b) => b.sample_f(wo, uc, u),
            BxDF::Phong(b) => b.sample_f(wo, uc, u),
            BxDF::Mirror(b) => b.sample_f(wo, uc, u),
        }
    }

    fn pdf(&self, wo: Vector3f, wi: Vector3f) -> Float {
        match self {
            BxDF::Diffuse(b) => b.pdf(wo, wi),
            BxDF::Phong(b) => b.pdf(wo, wi),
            BxDF::Mirror(b) => b.pdf(wo, wi),
        }
    }

    fn flags(&self) -> BxDFFlags {
        match self {
            BxDF::Diffuse(b) => b.flags(),
            BxDF::Phong(b) => b.flags(),
            BxDF::Mirror(b) => b.flags(),
        }
    }

    fn roughness(&self) -> Float {
        match self {
            BxDF::Diffuse(b) => b.roughness(),
            BxDF::Phong(b) => b.roughness(),
            BxDF::Mirror(b) => b.roughness(),
        }
    }

    fn eta(&self) -> Float {
        match self {
            BxDF::Diffuse(b) => b.eta(),
            BxDF::Phong(b) => b.eta(),
            BxDF::Mirror(b) => b.eta(),
        }
    }
}

/// Lambertian reflection.
#[derive(Debug, Clone)]
pub struct DiffuseBxDF {
    r: RGB,
}

impl DiffuseBxDF {
    pub fn new(r: RGB) -> DiffuseBxDF {
        DiffuseBxDF { r }
    }
}

impl BxDFI for DiffuseBxDF {
    fn f(&self, wo: Vector3f, wi: Vector3f) -> RGB {
        if !same_hemisphere(wo, wi) {
            return RGB::ZERO;
        }
        self.r * INV_PI
    }

    fn sample_f(&self, wo: Vector3f, _uc: Float, u: Point2f) -> Option<BSDFSample> {
        let mut wi = sample_cosine_hemisphere(u);
        if wo.z < 0.0 {
            wi.z *= -1.0;
        }
        let pdf = cosine_hemisphere_pdf(abs_cos_theta(wi));
        if pdf == 0.0 {
            return None;
        }
        Some(BSDFSample::new(
            self.r * INV_PI,
            wi,
            pdf,
            BxDFFlags::DIFFUSE_REFLECTION,
        ))
    }

    fn pdf(&self, wo: Vector3f, wi: Vector3f) -> Float {
        if !same_hemisphere(wo, wi) {
            return 0.0;
        }
        cosine_hemisphere_pdf(abs_cos_theta(wi))
    }

    fn flags(&self) -> BxDFFlags {
        if self.r.is_zero() {
            BxDFFlags::UNSET
        } else {
            BxDFFlags::DIFFUSE_REFLECTION
        }
    }

    fn roughness(&self) -> Float {
        1.0
    }
}

/// Energy-normalized Phong lobe around the mirror direction. The exponent is derived
/// from a roughness in (0, 1] so that roughness-based policies can treat it like a
/// microfacet alpha.
#[derive(Debug, Clone)]
pub struct PhongBxDF {
    r: RGB,
    roughness: Float,
    exponent: Float,
}

impl PhongBxDF {
    pub fn new(r: RGB, roughness: Float) -> PhongBxDF {
        let roughness = Float::clamp(roughness, 1e-3, 1.0);
        let exponent = Float::max(2.0 / (roughness * roughness) - 2.0, 0.0);
        PhongBxDF {
            r,
            roughness,
            exponent,
        }
    }

    fn mirror(wo: Vector3f) -> Vector3f {
        Vector3f::new(-wo.x, -wo.y, wo.z)
    }

    fn lobe_pdf(&self, cos_alpha: Float) -> Float {
        if cos_alpha <= 0.0 {
            return 0.0;
        }
        (self.exponent + 1.0) / (2.0 * PI_F) * Float::powf(cos_alpha, self.exponent)
    }
}

impl BxDFI for PhongBxDF {
    fn f(&self, wo: Vector3f, wi: Vector3f) -> RGB {
        if !same_hemisphere(wo, wi) {
            return RGB::ZERO;
        }
        let cos_alpha = Self::mirror(wo).dot(&wi);
        if cos_alpha <= 0.0 {
            return RGB::ZERO;
        }
        self.r * ((self.exponent + 2.0) / (2.0 * PI_F) * Float::powf(cos_alpha, self.exponent))
    }

    fn sample_f(&self, wo: Vector3f, _uc: Float, u: Point2f) -> Option<BSDFSample> {
        let lobe = Frame::from_z(Self::mirror(wo));
        let cos_alpha = Float::powf(u.x, 1.0 / (self.exponent + 1.0));
        let sin_alpha = Float::sqrt(Float::max(0.0, 1.0 - cos_alpha * cos_alpha));
        let phi = 2.0 * PI_F * u.y;
        let wi = lobe.from_local_v(&Vector3f::new(
            sin_alpha * Float::cos(phi),
            sin_alpha * Float::sin(phi),
            cos_alpha,
        ));
        if !same_hemisphere(wo, wi) {
            return None;
        }
        let pdf = self.lobe_pdf(cos_alpha);
        if pdf == 0.0 {
            return None;
        }
        Some(BSDFSample::new(
            self.f(wo, wi),
            wi,
            pdf,
            BxDFFlags::GLOSSY_REFLECTION,
        ))
    }

    fn pdf(&self, wo: Vector3f, wi: Vector3f) -> Float {
        if !same_hemisphere(wo, wi) {
            return 0.0;
        }
        self.lobe_pdf(Self::mirror(wo).dot(&wi))
    }

    fn flags(&self) -> BxDFFlags {
        BxDFFlags::GLOSSY_REFLECTION
    }

    fn roughness(&self) -> Float {
        self.roughness
    }
}

/// Perfect specular reflection.
#[derive(Debug, Clone)]
pub struct MirrorBxDF {
    r: RGB,
}

impl MirrorBxDF {
    pub fn new(r: RGB) -> MirrorBxDF {
        MirrorBxDF { r }
    }
}

impl BxDFI for MirrorBxDF {
    fn f(&self, _wo: Vector3f, _wi: Vector3f) -> RGB {
        RGB::ZERO
    }

    fn sample_f(&self, wo: Vector3f, _uc: Float, _u: Point2f) -> Option<BSDFSample> {
        let wi = Vector3f::new(-wo.x, -wo.y, wo.z);
        let cos = abs_cos_theta(wi);
        if cos == 0.0 {
            return None;
        }
        Some(BSDFSample::new(
            self.r / cos,
            wi,
            1.0,
            BxDFFlags::SPECULAR_REFLECTION,
        ))
    }

    fn pdf(&self, _wo: Vector3f, _wi: Vector3f) -> Float {
        0.0
    }

    fn flags(&self) -> BxDFFlags {
        BxDFFlags::SPECULAR_REFLECTION
    }

    fn roughness(&self) -> Float {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct BSDFSample {
    /// Value of the BSDF f()
    pub f: RGB,
    /// Sampled direction wi (given wo). BxDF specify wi wrt to the local reflection coordinate system;
    /// BSDF::sample_f() transforms wi to rendering space before returning, however.
    pub wi: Vector3f,
    /// PDF of wi with respect to solid angle
    pub pdf: Float,
    /// Characteristics of the particular sample
    pub flags: BxDFFlags,
    pub eta: Float,
}

impl BSDFSample {
    pub fn new(f: RGB, wi: Vector3f, pdf: Float, flags: BxDFFlags) -> BSDFSample {
        BSDFSample {
            f,
            wi,
            pdf,
            flags,
            eta: 1.0,
        }
    }

    pub fn is_specular(&self) -> bool {
        self.flags.is_specular()
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BxDFFlags: u8
    {
        const UNSET = 0;
        const REFLECTION = 1 << 0;
        const TRANSMISSION = 1 << 1;
        const DIFFUSE = 1 << 2;
        const GLOSSY = 1 << 3;
        const SPECULAR = 1 << 4;
        const DIFFUSE_REFLECTION = Self::DIFFUSE.bits() | Self::REFLECTION.bits();
        const GLOSSY_REFLECTION = Self::GLOSSY.bits() | Self::REFLECTION.bits();
        const GLOSSY_TRANSMISSION = Self::GLOSSY.bits() | Self::TRANSMISSION.bits();
        const SPECULAR_REFLECTION = Self::SPECULAR.bits() | Self::REFLECTION.bits();
        const SPECULAR_TRANSMISSION = Self::SPECULAR.bits() | Self::TRANSMISSION.bits();
    }
}

impl BxDFFlags {
    pub fn is_reflective(&self) -> bool {
        self.contains(Self::REFLECTION)
    }

    pub fn is_transmissive(&self) -> bool {
        self.contains(Self::TRANSMISSION)
    }

    pub fn is_diffuse(&self) -> bool {
        self.contains(Self::DIFFUSE)
    }

    pub fn is_glossy(&self) -> bool {
        self.contains(Self::GLOSSY)
    }

    pub fn is_specular(&self) -> bool {
        self.contains(Self::SPECULAR)
    }

    pub fn is_non_specular(&self) -> bool {
        self.intersects(Self::DIFFUSE | Self::GLOSSY)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::{BxDFFlags, BxDFI, DiffuseBxDF, MirrorBxDF, PhongBxDF};
    use crate::{color::RGB, vecmath::Point2f, vecmath::Vector3f, Float};

    #[test]
    fn basic_bxdf_flags() {
        let unset = BxDFFlags::UNSET;
        assert!(!unset.is_diffuse());
        assert!(!unset.is_transmissive());
        assert!(!unset.is_glossy());
        assert!(!unset.is_reflective());

        let gt = BxDFFlags::GLOSSY_TRANSMISSION;
        assert!(gt.is_glossy());
        assert!(gt.is_transmissive());
        assert!(!gt.is_diffuse());
        assert!(gt.is_non_specular());
        assert!(!BxDFFlags::SPECULAR_REFLECTION.is_non_specular());
    }

    #[test]
    fn sampled_pdf_matches_pdf() {
        let wo = Vector3f::new(0.3, -0.2, 0.9).normalize();
        let mut rng = SmallRng::seed_from_u64(11);
        for bxdf in [
            super::BxDF::Diffuse(DiffuseBxDF::new(RGB::splat(0.5))),
            super::BxDF::Phong(PhongBxDF::new(RGB::splat(0.5), 0.4)),
        ] {
            for _ in 0..200 {
                let u = Point2f::new(rng.gen(), rng.gen());
                if let Some(bs) = bxdf.sample_f(wo, rng.gen(), u) {
                    assert_approx_eq!(
                        Float,
                        bs.pdf,
                        bxdf.pdf(wo, bs.wi),
                        epsilon = 1e-3 * bs.pdf.max(1.0)
                    );
                    let f = bxdf.f(wo, bs.wi);
                    assert_approx_eq!(Float, bs.f.r, f.r, epsilon = 1e-3 * f.r.max(1.0));
                }
            }
        }
    }

    #[test]
    fn mirror_is_delta() {
        let m = MirrorBxDF::new(RGB::ONE);
        let wo = Vector3f::new(0.6, 0.0, 0.8);
        let bs = m.sample_f(wo, 0.5, Point2f::new(0.5, 0.5)).unwrap();
        assert!(bs.is_specular());
        assert_approx_eq!(Float, -0.6, bs.wi.x);
        assert_eq!(0.0, m.pdf(wo, bs.wi));
        assert_eq!(0.0, m.roughness());
    }

    #[test]
    fn phong_roughness_clamped() {
        assert_eq!(1.0, PhongBxDF::new(RGB::ONE, 4.0).roughness());
        assert!(PhongBxDF::new(RGB::ONE, 0.0).roughness() > 0.0);
    }
}
