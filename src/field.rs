use crate::{
    bounds::Bounds3f,
    observation::TrainingObservation,
    vecmath::{Normal3f, Point2f, Point3f, Vector3f},
    Float,
};

/// Identifies the spatial cell of a guiding field a distribution was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

/// A directional distribution over the sphere, valid at one shading point.
pub trait DistributionI {
    fn sample(&self, u: Point2f) -> Vector3f;

    /// Solid-angle density of w. Returns 0 rather than NaN for directions with no support.
    fn pdf(&self, w: Vector3f) -> Float;

    /// Multiplies the distribution by the clamped cosine around n and renormalizes.
    fn apply_cosine_product(&mut self, n: Normal3f);

    fn region(&self) -> RegionId;

    fn num_lobes(&self) -> usize;
    fn lobe_weight(&self, i: usize) -> Float;
    /// Normalized density of lobe i alone.
    fn lobe_pdf(&self, i: usize, w: Vector3f) -> Float;
}

/// A spatio-directional model of incident radiance, trained from batches of observations.
///
/// Queries only read; training replaces the model and happens while no render pass is
/// running, so rendering workers can share an immutable reference.
pub trait GuidingFieldI: Sync {
    type Distribution: DistributionI + Send;

    fn set_scene_bounds(&mut self, bounds: Bounds3f);
    fn scene_bounds(&self) -> Bounds3f;

    /// Updates the model with one iteration's observations, gathered from spp samples per pixel.
    fn train(&mut self, observations: &[TrainingObservation], spp: u32);

    /// The distribution for position p, or None while the field has nothing to offer there.
    /// u may be used to stochastically pick among neighboring regions.
    fn query_distribution(&self, p: Point3f, u: Float) -> Option<Self::Distribution>;

    fn is_trained(&self) -> bool;
    /// Number of completed train() calls.
    fn iteration(&self) -> u32;
    fn total_spp(&self) -> u64;
}
