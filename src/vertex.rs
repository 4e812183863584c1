use crate::{
    color::RGB,
    field::RegionId,
    observation::TrainingObservation,
    vecmath::{Normal3f, Point3f, Vector3f},
    Float,
};

/// One scattering or terminal event along a traced path.
///
/// Directions follow the path-tracing convention: both point away from the vertex.
/// `direction_out` points back toward the previous vertex (toward the camera),
/// `direction_in` toward the next vertex, i.e. the direction light arrives from.
#[derive(Debug, Clone, PartialEq)]
pub struct PathVertex {
    pub position: Point3f,
    pub direction_out: Vector3f,
    /// None until a direction has been sampled at this vertex.
    pub direction_in: Option<Vector3f>,
    pub normal: Normal3f,
    pub roughness: Float,
    pub eta: Float,
    /// Density with which direction_in was sampled.
    pub pdf_direction_in: Float,
    pub is_delta: bool,
    pub volume_scatter: bool,
    /// Terminal pseudo-vertex standing in for an environment hit at a finite distance.
    pub is_environment: bool,
    /// BSDF * cos / pdf for direction_in, including any Russian roulette boost.
    pub scattering_weight: RGB,
    /// Next-event estimation result gathered at this vertex.
    pub scattered_contribution: RGB,
    /// Emitted radiance if this vertex lies on a light (or is the environment).
    pub direct_contribution: RGB,
    /// MIS weight of direct_contribution against next-event estimation.
    pub mis_weight: Float,
    /// Probability that the path survived Russian roulette when leaving this vertex.
    pub rr_probability: Float,
    pub region: Option<RegionId>,
}

impl Default for PathVertex {
    fn default() -> Self {
        Self {
            position: Point3f::ZERO,
            direction_out: Vector3f::Z,
            direction_in: None,
            normal: Normal3f::Z,
            roughness: 1.0,
            eta: 1.0,
            pdf_direction_in: 1.0,
            is_delta: false,
            volume_scatter: false,
            is_environment: false,
            scattering_weight: RGB::ZERO,
            scattered_contribution: RGB::ZERO,
            direct_contribution: RGB::ZERO,
            mis_weight: 1.0,
            rr_probability: 1.0,
            region: None,
        }
    }
}

/// Per-worker record of the path currently being traced.
///
/// Storage is reused across paths: clear() resets the length but keeps the allocation.
/// The in-direction of a vertex is only known once the next bounce is sampled, so the
/// most recent vertex is patched in place through last_mut().
#[derive(Debug, Default)]
pub struct VertexBuffer {
    pub(crate) vertices: Vec<PathVertex>,
    pub(crate) observations: Vec<TrainingObservation>,
    pub(crate) prepared: bool,
}

impl VertexBuffer {
    pub fn new() -> VertexBuffer {
        VertexBuffer::default()
    }

    pub fn with_capacity(max_depth: usize) -> VertexBuffer {
        let mut buffer = VertexBuffer::new();
        buffer.reserve(max_depth);
        buffer
    }

    /// Preallocates room for a path of the given number of vertices.
    pub fn reserve(&mut self, capacity: usize) {
        self.vertices
            .reserve(capacity.saturating_sub(self.vertices.len()));
        self.observations
            .reserve(capacity.saturating_sub(self.observations.len()));
    }

    /// Appends a vertex initialized to defaults and returns it for filling in.
    pub fn next_vertex(&mut self) -> &mut PathVertex {
        debug_assert!(!self.prepared, "vertex appended after samples were prepared");
        self.vertices.push(PathVertex::default());
        let last = self.vertices.len() - 1;
        &mut self.vertices[last]
    }

    pub fn last(&self) -> Option<&PathVertex> {
        self.vertices.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut PathVertex> {
        self.vertices.last_mut()
    }

    pub fn get(&self, index: usize) -> Option<&PathVertex> {
        self.vertices.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PathVertex> {
        self.vertices.get_mut(index)
    }

    pub fn vertices(&self) -> &[PathVertex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.vertices.capacity()
    }

    /// Observations produced by prepare_samples() (plus any added by hand).
    pub fn observations(&self) -> &[TrainingObservation] {
        &self.observations
    }

    /// Injects an observation directly, bypassing extraction.
    pub fn add_observation(&mut self, observation: TrainingObservation) {
        self.observations.push(observation);
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Forgets the current path and its observations, keeping the storage.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.observations.clear();
        self.prepared = false;
    }
}
