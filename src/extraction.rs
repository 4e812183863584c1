use log::trace;

use crate::{
    color::RGB,
    error::{GuidingError, Result},
    float::is_valid_pdf,
    observation::{ObservationFlags, TrainingObservation},
    sampler::SamplerI,
    sampling::sample_uniform_ball,
    vertex::{PathVertex, VertexBuffer},
    Float,
};

/// Distance at which environment hits are recorded. Treating the environment as a
/// far-away surface keeps directions and distances finite for the field.
pub const ENVIRONMENT_DISTANCE: Float = 1e5;

/// How Russian roulette survival probabilities recorded on the path are treated
/// when radiance is propagated into training observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RussianRouletteMode {
    /// Scattering weights carry the renderer's 1/q boost; extraction multiplies it back
    /// out so observations hold path-local radiance.
    Corrected,
    /// Scattering weights are propagated exactly as recorded.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionSettings {
    /// Scale emission found by direction sampling with its recorded MIS weight.
    /// When false the renderer is expected to have folded the weight in already.
    pub use_nee_mis_weights: bool,
    /// Train on radiance that comes straight from an emitter hit by the sampled direction.
    pub guide_direct_light: bool,
    pub russian_roulette: RussianRouletteMode,
    /// Jitter observation positions inside a ball of this radius and flag them as splatted.
    pub splat_radius: Option<Float>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            use_nee_mis_weights: true,
            guide_direct_light: true,
            russian_roulette: RussianRouletteMode::Corrected,
            splat_radius: None,
        }
    }
}

/// Bookkeeping of one extraction, for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    pub emitted: usize,
    /// Vertices without a usable direction, density or segment length.
    pub skipped_degenerate: usize,
    /// Vertices whose outgoing direction was chosen by a delta lobe.
    pub skipped_delta: usize,
    /// Observations dropped because all their radiance came from a direct emitter hit.
    pub suppressed_direct: usize,
}

impl ExtractionStats {
    pub fn merge(&mut self, other: &ExtractionStats) {
        self.emitted += other.emitted;
        self.skipped_degenerate += other.skipped_degenerate;
        self.skipped_delta += other.skipped_delta;
        self.suppressed_direct += other.suppressed_direct;
    }
}

/// Radiance leaving a vertex toward its predecessor, split by origin.
#[derive(Debug, Clone, Copy)]
struct Tail {
    /// Emission of the vertex itself.
    direct: Float,
    /// Next-event estimation at the vertex plus everything scattered from further down the path.
    indirect: Float,
}

impl Tail {
    fn total(&self) -> Float {
        self.direct + self.indirect
    }
}

fn emitted(vertex: &PathVertex, settings: &ExtractionSettings) -> Float {
    let le = vertex.direct_contribution.average();
    if settings.use_nee_mis_weights {
        le * vertex.mis_weight
    } else {
        le
    }
}

fn propagation_weight(vertex: &PathVertex, settings: &ExtractionSettings) -> Float {
    let weight = vertex.scattering_weight.average();
    match settings.russian_roulette {
        RussianRouletteMode::Corrected => weight * vertex.rr_probability,
        RussianRouletteMode::Raw => weight,
    }
}

fn leaving_radiance(vertex: &PathVertex, settings: &ExtractionSettings, incident: Float) -> Tail {
    let scattered = if incident != 0.0 {
        propagation_weight(vertex, settings) * incident
    } else {
        0.0
    };
    Tail {
        direct: emitted(vertex, settings),
        indirect: vertex.scattered_contribution.average() + scattered,
    }
}

enum Outcome {
    Emit(TrainingObservation),
    Degenerate,
    Delta,
    SuppressedDirect,
}

fn observe(
    vertex: &PathVertex,
    next: &PathVertex,
    incident: Tail,
    settings: &ExtractionSettings,
) -> Outcome {
    let Some(recorded_wi) = vertex.direction_in else {
        return Outcome::Degenerate;
    };
    if vertex.is_delta {
        return Outcome::Delta;
    }
    if !is_valid_pdf(vertex.pdf_direction_in) {
        return Outcome::Degenerate;
    }

    let segment = next.position - vertex.position;
    let Some(direction) = segment.try_normalize() else {
        return Outcome::Degenerate;
    };
    debug_assert!(
        direction.dot(&recorded_wi) > 0.5,
        "recorded in-direction {:?} disagrees with the next vertex ({:?})",
        recorded_wi,
        direction
    );
    let distance = if next.is_environment {
        ENVIRONMENT_DISTANCE
    } else {
        segment.length()
    };

    let weight = if settings.guide_direct_light {
        incident.total()
    } else {
        if incident.indirect == 0.0 && incident.direct != 0.0 {
            return Outcome::SuppressedDirect;
        }
        incident.indirect
    };
    if !weight.is_finite() {
        return Outcome::Degenerate;
    }

    let mut flags = ObservationFlags::empty();
    if vertex.volume_scatter {
        flags |= ObservationFlags::INSIDE_VOLUME;
    }
    Outcome::Emit(TrainingObservation::new(
        vertex.position,
        direction,
        weight,
        vertex.pdf_direction_in,
        distance,
        flags,
    ))
}

impl VertexBuffer {
    /// Converts the recorded path into training observations, one per scattering vertex
    /// whose sampled direction carries information, and returns how many were produced.
    /// The observations are available through observations() until the next clear().
    ///
    /// The buffer is walked from the terminal vertex back to the first bounce, carrying
    /// the scalar radiance that leaves each vertex toward its predecessor:
    ///   L(i) = Le(i) * mis(i) + NEE(i) + avg(scattering_weight(i)) * L(i + 1)
    /// The observation at vertex i records L(i + 1) for the direction toward vertex i + 1.
    pub fn prepare_samples<S: SamplerI>(
        &mut self,
        settings: &ExtractionSettings,
        sampler: &mut S,
    ) -> Result<usize> {
        Ok(self.prepare_samples_with_stats(settings, sampler)?.emitted)
    }

    pub fn prepare_samples_with_stats<S: SamplerI>(
        &mut self,
        settings: &ExtractionSettings,
        sampler: &mut S,
    ) -> Result<ExtractionStats> {
        if self.prepared {
            return Err(GuidingError::AlreadyPrepared);
        }
        let vertices = &self.vertices;
        let Some(terminal) = vertices.last() else {
            return Err(GuidingError::EmptyPath);
        };

        let mut stats = ExtractionStats::default();
        let observations = &mut self.observations;
        let first_new = observations.len();

        let mut tail = leaving_radiance(terminal, settings, 0.0);
        for i in (0..vertices.len() - 1).rev() {
            let vertex = &vertices[i];
            match observe(vertex, &vertices[i + 1], tail, settings) {
                Outcome::Emit(observation) => {
                    observations.push(observation);
                    stats.emitted += 1;
                }
                Outcome::Degenerate => {
                    trace!("Skipping degenerate path vertex {}", i);
                    stats.skipped_degenerate += 1;
                }
                Outcome::Delta => stats.skipped_delta += 1,
                Outcome::SuppressedDirect => stats.suppressed_direct += 1,
            }
            tail = leaving_radiance(vertex, settings, tail.total());
        }

        if let Some(radius) = settings.splat_radius {
            for observation in &mut observations[first_new..] {
                let u = sampler.get_2d();
                let offset = sample_uniform_ball(u, sampler.get_1d()) * radius;
                observation.position += offset;
                observation.set_flags(observation.flags() | ObservationFlags::SPLATTED);
            }
        }

        self.prepared = true;
        Ok(stats)
    }
}

/// Total radiance the recorded path delivers to its first vertex's predecessor (the camera).
/// Useful to cross-check the renderer's own estimate against what training sees.
pub fn path_radiance(buffer: &VertexBuffer, settings: &ExtractionSettings) -> RGB {
    let mut radiance = RGB::ZERO;
    for vertex in buffer.vertices().iter().rev() {
        let le = if settings.use_nee_mis_weights {
            vertex.direct_contribution * vertex.mis_weight
        } else {
            vertex.direct_contribution
        };
        radiance = le + vertex.scattered_contribution + vertex.scattering_weight * radiance;
    }
    radiance
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::{
        path_radiance, ExtractionSettings, RussianRouletteMode, ENVIRONMENT_DISTANCE,
    };
    use crate::{
        color::RGB,
        error::GuidingError,
        observation::{as_bytes, ObservationFlags},
        sampler::{IndependentSampler, Sampler},
        vecmath::{Point3f, Vector3f},
        vertex::VertexBuffer,
        Float,
    };

    fn sampler() -> Sampler {
        Sampler::Independent(IndependentSampler::new(1337, 1))
    }

    /// Records scattering vertices at the given positions, each sampling the direction
    /// toward the next one, followed by an emissive terminal vertex.
    fn record_path(
        buffer: &mut VertexBuffer,
        positions: &[Point3f],
        scattering_weight: RGB,
        nee: RGB,
        emission: RGB,
    ) {
        for (i, p) in positions.iter().enumerate() {
            let v = buffer.next_vertex();
            v.position = *p;
            if i + 1 < positions.len() {
                v.direction_in = Some((positions[i + 1] - *p).normalize());
                v.pdf_direction_in = 1.0;
                v.scattering_weight = scattering_weight;
                v.scattered_contribution = nee;
            } else {
                v.direct_contribution = emission;
            }
        }
    }

    #[test]
    fn single_bounce_to_light() {
        let mut buffer = VertexBuffer::with_capacity(10);
        record_path(
            &mut buffer,
            &[Point3f::new(0.0, 0.0, 3.0), Point3f::new(0.0, 0.0, 5.0)],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(10.0),
        );

        let n = buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(1, n);
        let obs = buffer.observations()[0];
        assert_eq!(Point3f::new(0.0, 0.0, 3.0), obs.position);
        assert_eq!(Vector3f::new(0.0, 0.0, 1.0), obs.direction);
        assert_eq!(2.0, obs.distance);
        assert_eq!(1.0, obs.pdf);
        assert_eq!(10.0, obs.weight);
        assert_eq!(ObservationFlags::empty(), obs.flags());
    }

    #[test]
    fn k_bounces_follow_the_recursion() {
        let mut buffer = VertexBuffer::new();
        let positions = [
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(1.0, 1.0, 2.0),
        ];
        record_path(
            &mut buffer,
            &positions,
            RGB::splat(0.5),
            RGB::splat(1.0),
            RGB::splat(8.0),
        );

        let n = buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(3, n);
        // Observations are produced back to front.
        let obs = buffer.observations();
        // Vertex 2 sees the light directly.
        assert_eq!(8.0, obs[0].weight);
        assert_eq!(positions[2], obs[0].position);
        // Vertex 1 sees NEE(2) + 0.5 * 8.
        assert_eq!(1.0 + 0.5 * 8.0, obs[1].weight);
        // Vertex 0 sees NEE(1) + 0.5 * (NEE(2) + 0.5 * 8).
        assert_eq!(1.0 + 0.5 * 5.0, obs[2].weight);
        assert_eq!(Vector3f::X, obs[2].direction);
        assert_eq!(1.0, obs[2].distance);

        let l = path_radiance(&buffer, &ExtractionSettings::default());
        assert_approx_eq!(Float, 1.0 + 0.5 * obs[2].weight, l.r);
    }

    #[test]
    fn re_recording_is_byte_identical() {
        let positions = [
            Point3f::new(0.1, 0.2, 0.3),
            Point3f::new(-1.0, 0.5, 2.0),
            Point3f::new(3.0, 1.0, -2.0),
        ];
        let settings = ExtractionSettings::default();
        let mut buffer = VertexBuffer::new();

        record_path(&mut buffer, &positions, RGB::new(0.2, 0.4, 0.6), RGB::splat(0.3), RGB::ONE);
        buffer.prepare_samples(&settings, &mut sampler()).unwrap();
        let first = as_bytes(buffer.observations()).to_vec();

        buffer.clear();
        record_path(&mut buffer, &positions, RGB::new(0.2, 0.4, 0.6), RGB::splat(0.3), RGB::ONE);
        buffer.prepare_samples(&settings, &mut sampler()).unwrap();
        assert_eq!(first, as_bytes(buffer.observations()));
    }

    #[test]
    fn zero_density_yields_nothing() {
        let mut buffer = VertexBuffer::new();
        record_path(
            &mut buffer,
            &[Point3f::new(0.0, 0.0, 3.0), Point3f::new(0.0, 0.0, 5.0)],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(10.0),
        );
        buffer.get_mut(0).unwrap().pdf_direction_in = 0.0;
        let stats = buffer
            .prepare_samples_with_stats(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(0, stats.emitted);
        assert_eq!(1, stats.skipped_degenerate);
        assert!(buffer.observations().is_empty());
    }

    #[test]
    fn non_finite_density_and_missing_direction_are_skipped() {
        let mut buffer = VertexBuffer::new();
        record_path(
            &mut buffer,
            &[
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(0.0, 0.0, 2.0),
            ],
            RGB::ONE,
            RGB::ZERO,
            RGB::ONE,
        );
        buffer.get_mut(0).unwrap().pdf_direction_in = Float::INFINITY;
        buffer.get_mut(1).unwrap().direction_in = None;
        let n = buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(0, n);
    }

    #[test]
    fn usage_errors_fail_fast() {
        let mut buffer = VertexBuffer::new();
        assert_eq!(
            Err(GuidingError::EmptyPath),
            buffer.prepare_samples(&ExtractionSettings::default(), &mut sampler())
        );

        record_path(
            &mut buffer,
            &[Point3f::new(0.0, 0.0, 3.0), Point3f::new(0.0, 0.0, 5.0)],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(10.0),
        );
        assert!(buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .is_ok());
        assert_eq!(
            Err(GuidingError::AlreadyPrepared),
            buffer.prepare_samples(&ExtractionSettings::default(), &mut sampler())
        );
        // The first extraction's observations are untouched.
        assert_eq!(1, buffer.observations().len());
    }

    #[test]
    fn terminal_only_path_yields_nothing() {
        let mut buffer = VertexBuffer::new();
        buffer.next_vertex().direct_contribution = RGB::splat(3.0);
        let n = buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(0, n);
    }

    #[test]
    fn direct_light_guiding_disabled() {
        let settings = ExtractionSettings {
            guide_direct_light: false,
            ..Default::default()
        };
        let mut buffer = VertexBuffer::new();
        record_path(
            &mut buffer,
            &[Point3f::new(0.0, 0.0, 3.0), Point3f::new(0.0, 0.0, 5.0)],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(10.0),
        );
        let stats = buffer
            .prepare_samples_with_stats(&settings, &mut sampler())
            .unwrap();
        assert_eq!(0, stats.emitted);
        assert_eq!(1, stats.suppressed_direct);

        // With one more bounce, the first vertex still trains on the light's indirect part.
        buffer.clear();
        record_path(
            &mut buffer,
            &[
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(0.0, 0.0, 3.0),
                Point3f::new(0.0, 0.0, 5.0),
            ],
            RGB::splat(0.5),
            RGB::ZERO,
            RGB::splat(10.0),
        );
        let stats = buffer
            .prepare_samples_with_stats(&settings, &mut sampler())
            .unwrap();
        assert_eq!(1, stats.emitted);
        assert_eq!(5.0, buffer.observations()[0].weight);
        assert_eq!(Point3f::ZERO, buffer.observations()[0].position);
    }

    #[test]
    fn mis_weight_on_emission() {
        let mut buffer = VertexBuffer::new();
        record_path(
            &mut buffer,
            &[Point3f::new(0.0, 0.0, 3.0), Point3f::new(0.0, 0.0, 5.0)],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(10.0),
        );
        buffer.last_mut().unwrap().mis_weight = 0.25;
        buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(2.5, buffer.observations()[0].weight);

        buffer.clear();
        record_path(
            &mut buffer,
            &[Point3f::new(0.0, 0.0, 3.0), Point3f::new(0.0, 0.0, 5.0)],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(10.0),
        );
        buffer.last_mut().unwrap().mis_weight = 0.25;
        let settings = ExtractionSettings {
            use_nee_mis_weights: false,
            ..Default::default()
        };
        buffer.prepare_samples(&settings, &mut sampler()).unwrap();
        assert_eq!(10.0, buffer.observations()[0].weight);
    }

    #[test]
    fn russian_roulette_modes() {
        let record = |buffer: &mut VertexBuffer| {
            record_path(
                buffer,
                &[
                    Point3f::new(0.0, 0.0, 0.0),
                    Point3f::new(0.0, 0.0, 1.0),
                    Point3f::new(0.0, 0.0, 2.0),
                ],
                RGB::ONE,
                RGB::ZERO,
                RGB::splat(10.0),
            );
            // Vertex 1 survived roulette with q = 0.5; the renderer boosted its weight by 2.
            let v = buffer.get_mut(1).unwrap();
            v.rr_probability = 0.5;
            v.scattering_weight = RGB::splat(2.0);
        };

        let mut buffer = VertexBuffer::new();
        record(&mut buffer);
        buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(10.0, buffer.observations()[1].weight);

        buffer.clear();
        record(&mut buffer);
        let raw = ExtractionSettings {
            russian_roulette: RussianRouletteMode::Raw,
            ..Default::default()
        };
        buffer.prepare_samples(&raw, &mut sampler()).unwrap();
        assert_eq!(20.0, buffer.observations()[1].weight);
    }

    #[test]
    fn environment_hit_uses_sentinel_distance() {
        let mut buffer = VertexBuffer::new();
        let p = Point3f::new(1.0, 1.0, 1.0);
        let wi = Vector3f::new(0.0, 1.0, 1.0).normalize();
        {
            let v = buffer.next_vertex();
            v.position = p;
            v.direction_in = Some(wi);
            v.pdf_direction_in = 0.5;
            v.scattering_weight = RGB::ONE;
        }
        {
            let env = buffer.next_vertex();
            env.position = p + wi * ENVIRONMENT_DISTANCE;
            env.is_environment = true;
            env.direct_contribution = RGB::splat(2.0);
        }
        buffer
            .prepare_samples(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        let obs = buffer.observations()[0];
        assert_eq!(ENVIRONMENT_DISTANCE, obs.distance);
        assert_approx_eq!(Float, 1.0, obs.direction.dot(&wi), epsilon = 1e-5);
        assert_eq!(2.0, obs.weight);
        assert_eq!(0.5, obs.pdf);
        assert!(obs.is_valid());
    }

    #[test]
    fn delta_vertices_are_not_observed() {
        let mut buffer = VertexBuffer::new();
        record_path(
            &mut buffer,
            &[
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(0.0, 0.0, 2.0),
            ],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(4.0),
        );
        buffer.get_mut(1).unwrap().is_delta = true;
        let stats = buffer
            .prepare_samples_with_stats(&ExtractionSettings::default(), &mut sampler())
            .unwrap();
        assert_eq!(1, stats.emitted);
        assert_eq!(1, stats.skipped_delta);
        // Radiance still flows through the specular bounce.
        assert_eq!(4.0, buffer.observations()[0].weight);
    }

    #[test]
    fn splatting_jitters_and_flags() {
        let settings = ExtractionSettings {
            splat_radius: Some(0.1),
            ..Default::default()
        };
        let mut buffer = VertexBuffer::new();
        record_path(
            &mut buffer,
            &[Point3f::new(0.0, 0.0, 3.0), Point3f::new(0.0, 0.0, 5.0)],
            RGB::ONE,
            RGB::ZERO,
            RGB::splat(10.0),
        );
        buffer.get_mut(0).unwrap().volume_scatter = true;
        assert_eq!(1, buffer.prepare_samples(&settings, &mut sampler()).unwrap());
        let obs = buffer.observations()[0];
        assert!(obs.is_splatted());
        assert!(obs.is_inside_volume());
        assert!(obs.position.distance(&Point3f::new(0.0, 0.0, 3.0)) <= 0.1 + 1e-6);
        assert_eq!(Vector3f::Z, obs.direction);
    }
}
