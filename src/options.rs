use std::time::Duration;

use crate::{
    error::{GuidingError, Result},
    extraction::ExtractionSettings,
    grid_field::GridFieldSettings,
    guided_sampler::GuidedSamplerSettings,
};

/// Everything that configures path guiding itself, independent of the image being rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidingOptions {
    pub extraction: ExtractionSettings,
    pub sampler: GuidedSamplerSettings,
    pub field: GridFieldSettings,
    /// Number of bounces before Russian roulette may terminate a path.
    pub rr_start_depth: u32,
}

impl Default for GuidingOptions {
    fn default() -> Self {
        Self {
            extraction: ExtractionSettings::default(),
            sampler: GuidedSamplerSettings::default(),
            field: GridFieldSettings::default(),
            rr_start_depth: 3,
        }
    }
}

impl GuidingOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(radius) = self.extraction.splat_radius {
            if !(radius > 0.0) || !radius.is_finite() {
                return Err(GuidingError::InvalidOptions(format!(
                    "splat radius must be positive, got {}",
                    radius
                )));
            }
        }
        self.sampler.validate()?;
        self.field.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub max_depth: u32,
    pub spp_per_iteration: u32,
    pub iterations: u32,
    /// Wall-clock budget for the whole render; the iteration running when it expires is discarded.
    pub time_budget: Option<Duration>,
    pub seed: u64,
    /// Render the plain path tracer baseline when false.
    pub guiding: bool,
    pub guiding_options: GuidingOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            max_depth: 8,
            spp_per_iteration: 4,
            iterations: 8,
            time_budget: None,
            seed: 0,
            guiding: true,
            guiding_options: GuidingOptions::default(),
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GuidingError::InvalidOptions(format!(
                "image resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.max_depth == 0 {
            return Err(GuidingError::InvalidOptions(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.spp_per_iteration == 0 || self.iterations == 0 {
            return Err(GuidingError::InvalidOptions(
                "at least one sample per pixel and one iteration are required".to_string(),
            ));
        }
        self.guiding_options.validate()
    }

    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Expected upper bound on observations produced by one iteration.
    pub fn observations_per_iteration(&self) -> usize {
        self.num_pixels() * self.spp_per_iteration as usize * self.max_depth as usize
    }
}
