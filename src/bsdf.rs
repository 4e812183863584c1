use crate::{
    bxdf::{BSDFSample, BxDF, BxDFFlags, BxDFI},
    color::RGB,
    frame::Frame,
    vecmath::{Normal3f, Point2f, Vector3f},
    Float,
};

/// What the guiding core needs from a BSDF. Directions are in rendering space and both
/// point away from the surface: wo toward the previous path vertex, wi toward the next.
pub trait BsdfI {
    /// Draws wi proportionally to (an approximation of) the BSDF.
    fn sample_f(&self, wo: Vector3f, uc: Float, u: Point2f) -> Option<BSDFSample>;

    /// Solid-angle density with which sample_f() would produce wi.
    fn pdf(&self, wo: Vector3f, wi: Vector3f) -> Float;

    /// f(wo, wi) * |cos(theta_i)|, relative to the shading normal.
    fn evaluate_with_cosine(&self, wo: Vector3f, wi: Vector3f) -> RGB;

    fn flags(&self) -> BxDFFlags;

    fn shading_normal(&self) -> Normal3f;

    fn roughness(&self) -> Float;

    fn eta(&self) -> Float;
}

/// BxDF implementations handle computations in a local shading coordinate system;
/// BSDF is a small wrapper around BxDF which handles the conversions between that
/// shading coordinate system and the rendering coordinate system.
#[derive(Debug, Clone)]
pub struct BSDF {
    bxdf: BxDF,
    shading_frame: Frame,
}

impl BSDF {
    pub fn new(ns: Normal3f, bxdf: BxDF) -> BSDF {
        BSDF {
            bxdf,
            shading_frame: Frame::from_normal(ns),
        }
    }

    pub fn render_to_local(&self, v: Vector3f) -> Vector3f {
        self.shading_frame.to_local_v(&v)
    }

    pub fn local_to_render(&self, v: Vector3f) -> Vector3f {
        self.shading_frame.from_local_v(&v)
    }

    /// Returns the value of the distribution function for the given pair of directions
    pub fn f(&self, wo_render: Vector3f, wi_render: Vector3f) -> RGB {
        let wi = self.render_to_local(wi_render);
        let wo = self.render_to_local(wo_render);
        if wo.z == 0.0 {
            // In the case that wo lies directly on the surface's tangent plane,
            // to avoid NaN propagation, return zero.
            return RGB::ZERO;
        }
        self.bxdf.f(wo, wi)
    }
}

impl BsdfI for BSDF {
    fn sample_f(&self, wo_render: Vector3f, uc: Float, u: Point2f) -> Option<BSDFSample> {
        let wo = self.render_to_local(wo_render);
        if wo.z == 0.0 || self.bxdf.flags().is_empty() {
            return None;
        }
        let mut bs = self.bxdf.sample_f(wo, uc, u)?;
        if bs.f.is_zero() || bs.pdf == 0.0 || bs.wi.z == 0.0 {
            return None;
        }
        debug_assert!(bs.pdf >= 0.0);

        bs.wi = self.local_to_render(bs.wi);
        Some(bs)
    }

    fn pdf(&self, wo_render: Vector3f, wi_render: Vector3f) -> Float {
        let wo = self.render_to_local(wo_render);
        let wi = self.render_to_local(wi_render);
        if wo.z == 0.0 {
            return 0.0;
        }
        self.bxdf.pdf(wo, wi)
    }

    fn evaluate_with_cosine(&self, wo_render: Vector3f, wi_render: Vector3f) -> RGB {
        let cos = Float::abs(self.render_to_local(wi_render).z);
        self.f(wo_render, wi_render) * cos
    }

    fn flags(&self) -> BxDFFlags {
        self.bxdf.flags()
    }

    fn shading_normal(&self) -> Normal3f {
        Normal3f::from(self.shading_frame.z)
    }

    fn roughness(&self) -> Float {
        self.bxdf.roughness()
    }

    fn eta(&self) -> Float {
        self.bxdf.eta()
    }
}
