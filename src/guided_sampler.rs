use crate::{
    bsdf::BsdfI,
    bxdf::BxDFFlags,
    color::RGB,
    error::{GuidingError, Result},
    field::DistributionI,
    float::is_valid_pdf,
    vecmath::{Point2f, Vector3f},
    Float,
};

const ONE_MINUS_EPSILON: Float = 1.0 - Float::EPSILON;

/// How often directions are drawn from the guiding distribution instead of the BSDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionPolicy {
    Fixed(Float),
    /// Ramps from 0 at the roughness threshold up to `max` for fully rough surfaces.
    RoughnessScaled { max: Float },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidedSamplerSettings {
    pub selection: SelectionPolicy,
    /// Surfaces smoother than this are sampled from the BSDF alone.
    pub min_roughness: Float,
    /// Multiply queried distributions by the cosine around the shading normal.
    pub use_cosine_product: bool,
}

impl Default for GuidedSamplerSettings {
    fn default() -> Self {
        Self {
            selection: SelectionPolicy::Fixed(0.5),
            min_roughness: 0.1,
            use_cosine_product: true,
        }
    }
}

impl GuidedSamplerSettings {
    pub fn validate(&self) -> Result<()> {
        let p = match self.selection {
            SelectionPolicy::Fixed(p) => p,
            SelectionPolicy::RoughnessScaled { max } => max,
        };
        if !(0.0..=1.0).contains(&p) {
            return Err(GuidingError::InvalidOptions(format!(
                "selection probability must be in [0, 1], got {}",
                p
            )));
        }
        if !(0.0..1.0).contains(&self.min_roughness) {
            return Err(GuidingError::InvalidOptions(format!(
                "min_roughness must be in [0, 1), got {}",
                self.min_roughness
            )));
        }
        Ok(())
    }
}

/// A direction chosen at one bounce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionSample {
    pub wi: Vector3f,
    /// Combined density of both strategies; for delta samples, the discrete probability.
    pub pdf: Float,
    /// f * |cos| / pdf.
    pub contribution: RGB,
    /// Whether the direction came from the guiding distribution.
    pub guided: bool,
    pub is_delta: bool,
    pub flags: BxDFFlags,
}

/// One-sample MIS between the BSDF and a guiding distribution, combined with the balance heuristic.
#[derive(Debug, Clone)]
pub struct GuidedSampler {
    settings: GuidedSamplerSettings,
}

impl GuidedSampler {
    pub fn new(settings: GuidedSamplerSettings) -> GuidedSampler {
        GuidedSampler { settings }
    }

    pub fn settings(&self) -> &GuidedSamplerSettings {
        &self.settings
    }

    /// Probability of drawing from the guiding distribution at a surface with this BSDF.
    /// Near-specular and transmissive surfaces are never guided.
    pub fn selection_probability<B: BsdfI>(&self, bsdf: &B) -> Float {
        let flags = bsdf.flags();
        let roughness = bsdf.roughness();
        if flags.is_empty()
            || flags.is_specular()
            || flags.is_transmissive()
            || roughness < self.settings.min_roughness
        {
            return 0.0;
        }
        let p = match self.settings.selection {
            SelectionPolicy::Fixed(p) => p,
            SelectionPolicy::RoughnessScaled { max } => {
                let min = self.settings.min_roughness;
                let t = Float::clamp((roughness - min) / (1.0 - min), 0.0, 1.0);
                max * t
            }
        };
        Float::clamp(p, 0.0, 1.0)
    }

    /// Draws the next direction. u picks the strategy, u2 drives it; the part of u
    /// not used for the choice is handed on to the BSDF's lobe selection.
    ///
    /// Returns None when no direction could be sampled or the combined density is
    /// zero or non-finite, which terminates the path.
    pub fn sample<B: BsdfI, D: DistributionI>(
        &self,
        wo: Vector3f,
        bsdf: &B,
        distribution: Option<&D>,
        p: Float,
        u: Float,
        u2: Point2f,
    ) -> Option<DirectionSample> {
        let p = match distribution {
            Some(_) => Float::clamp(p, 0.0, 1.0),
            None => 0.0,
        };

        if let Some(d) = distribution.filter(|_| u < p) {
            let wi = d.sample(u2);
            let guide_pdf = d.pdf(wi) * p;
            let bsdf_pdf = bsdf.pdf(wo, wi) * (1.0 - p);
            let pdf = guide_pdf + bsdf_pdf;
            if !is_valid_pdf(pdf) {
                return None;
            }
            return Some(DirectionSample {
                wi,
                pdf,
                contribution: bsdf.evaluate_with_cosine(wo, wi) / pdf,
                guided: true,
                is_delta: false,
                flags: bsdf.flags(),
            });
        }

        let uc = if p > 0.0 {
            Float::clamp((u - p) / (1.0 - p), 0.0, ONE_MINUS_EPSILON)
        } else {
            u
        };
        let bs = bsdf.sample_f(wo, uc, u2)?;
        let cos = bs.wi.abs_dot_normal(&bsdf.shading_normal());
        let bsdf_pdf = bs.pdf * (1.0 - p);
        if bs.is_specular() {
            if !is_valid_pdf(bsdf_pdf) {
                return None;
            }
            return Some(DirectionSample {
                wi: bs.wi,
                pdf: bsdf_pdf,
                contribution: bs.f * cos / bsdf_pdf,
                guided: false,
                is_delta: true,
                flags: bs.flags,
            });
        }

        let guide_pdf = match distribution {
            Some(d) if p > 0.0 => d.pdf(bs.wi) * p,
            _ => 0.0,
        };
        let pdf = guide_pdf + bsdf_pdf;
        if !is_valid_pdf(pdf) {
            return None;
        }
        Some(DirectionSample {
            wi: bs.wi,
            pdf,
            contribution: bs.f * cos / pdf,
            guided: false,
            is_delta: false,
            flags: bs.flags,
        })
    }

    /// Combined density with which sample() would produce wi, for MIS-weighting
    /// directions chosen elsewhere (light sampling).
    pub fn pdf<B: BsdfI, D: DistributionI>(
        &self,
        wo: Vector3f,
        wi: Vector3f,
        bsdf: &B,
        distribution: Option<&D>,
        p: Float,
    ) -> Float {
        let bsdf_pdf = bsdf.pdf(wo, wi);
        match distribution {
            Some(d) => {
                let p = Float::clamp(p, 0.0, 1.0);
                let guide_pdf = if p > 0.0 { d.pdf(wi) * p } else { 0.0 };
                guide_pdf + bsdf_pdf * (1.0 - p)
            }
            None => bsdf_pdf,
        }
    }
}
