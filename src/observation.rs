use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::{
    error::{GuidingError, Result},
    vecmath::{Point3f, Vector3f},
    Float,
};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ObservationFlags: u32
    {
        /// The position was jittered and does not lie on a real scene intersection.
        const SPLATTED = 1 << 0;
        /// The observation was recorded at a scattering event inside a participating medium.
        const INSIDE_VOLUME = 1 << 1;
    }
}

/// One incident-radiance observation for training the guiding field.
///
/// The layout is fixed (C order: position, direction, weight, pdf, distance, flags)
/// so that batches can be handed around as raw bytes.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TrainingObservation {
    pub position: Point3f,
    /// Unit direction toward the next path vertex, i.e. where the radiance came from.
    pub direction: Vector3f,
    /// Channel-averaged incident radiance estimate.
    pub weight: Float,
    /// Density with which the direction was sampled.
    pub pdf: Float,
    /// Distance to the next vertex; a large finite sentinel for environment hits.
    pub distance: Float,
    flags: u32,
}

impl TrainingObservation {
    pub fn new(
        position: Point3f,
        direction: Vector3f,
        weight: Float,
        pdf: Float,
        distance: Float,
        flags: ObservationFlags,
    ) -> TrainingObservation {
        TrainingObservation {
            position,
            direction,
            weight,
            pdf,
            distance,
            flags: flags.bits(),
        }
    }

    pub fn flags(&self) -> ObservationFlags {
        ObservationFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: ObservationFlags) {
        self.flags = flags.bits();
    }

    pub fn is_splatted(&self) -> bool {
        self.flags().contains(ObservationFlags::SPLATTED)
    }

    pub fn is_inside_volume(&self) -> bool {
        self.flags().contains(ObservationFlags::INSIDE_VOLUME)
    }

    /// Everything a field needs to consume the observation safely:
    /// finite values, positive pdf and distance, non-negative weight, unit direction.
    pub fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.direction.is_finite()
            && self.direction.is_normalized()
            && self.weight.is_finite()
            && self.weight >= 0.0
            && self.pdf.is_finite()
            && self.pdf > 0.0
            && self.distance.is_finite()
            && self.distance > 0.0
    }

    /// Incident radiance divided by the density it was sampled with: the importance
    /// a density estimator should give this direction.
    pub fn importance(&self) -> Float {
        self.weight / self.pdf
    }
}

pub fn as_bytes(observations: &[TrainingObservation]) -> &[u8] {
    bytemuck::cast_slice(observations)
}

pub fn from_bytes(bytes: &[u8]) -> Result<&[TrainingObservation]> {
    bytemuck::try_cast_slice(bytes).map_err(|e| GuidingError::ObservationLayout(e.to_string()))
}
