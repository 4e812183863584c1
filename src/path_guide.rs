use log::warn;

use crate::{
    bsdf::BsdfI,
    color::RGB,
    error::{GuidingError, Result},
    extraction::{ExtractionSettings, ExtractionStats, ENVIRONMENT_DISTANCE},
    field::{DistributionI, GuidingFieldI},
    guided_sampler::GuidedSampler,
    options::GuidingOptions,
    ray::Ray,
    sampler::SamplerI,
    training_buffer::TrainingBuffer,
    vecmath::{Normal3f, Point3f, Vector3f},
    vertex::VertexBuffer,
    Float,
};

/// Local geometry at a surface interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub p: Point3f,
    /// Geometric normal, used to offset spawned rays.
    pub n: Normal3f,
    /// Shading normal.
    pub ns: Normal3f,
}

/// Per-worker state for guiding the paths traced by one rendering thread.
///
/// The renderer drives it with six calls per path, in order:
/// on_path_start, then for every bounce on_hit, on_next_event_result (optional) and
/// on_direction_sampled, on_light_hit whenever an emitter or the environment is hit,
/// and finally on_path_finished. The field is a read-only snapshot for the iteration;
/// None means the field is not trained yet and every bounce samples the BSDF alone.
pub struct PathGuide<'a, F: GuidingFieldI> {
    field: Option<&'a F>,
    sampler: GuidedSampler,
    extraction: ExtractionSettings,
    rr_start_depth: u32,
    vertices: VertexBuffer,
    distribution: Option<F::Distribution>,
    throughput: RGB,
    depth: u32,
    stats: ExtractionStats,
}

impl<'a, F: GuidingFieldI> PathGuide<'a, F> {
    pub fn new(
        field: Option<&'a F>,
        options: &GuidingOptions,
        max_depth: u32,
    ) -> PathGuide<'a, F> {
        PathGuide {
            field: field.filter(|f| f.is_trained()),
            sampler: GuidedSampler::new(options.sampler),
            extraction: options.extraction,
            rr_start_depth: options.rr_start_depth,
            // One vertex per bounce, the camera hit, and an environment pseudo-vertex.
            vertices: VertexBuffer::with_capacity(max_depth as usize + 2),
            distribution: None,
            throughput: RGB::ONE,
            depth: 0,
            stats: ExtractionStats::default(),
        }
    }

    pub fn is_guiding(&self) -> bool {
        self.field.is_some()
    }

    /// Product of all bounce contributions so far, including Russian roulette boosts.
    pub fn throughput(&self) -> RGB {
        self.throughput
    }

    /// Number of directions sampled on the current path.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn vertices(&self) -> &VertexBuffer {
        &self.vertices
    }

    /// Extraction statistics accumulated over every path this guide finished.
    pub fn stats(&self) -> &ExtractionStats {
        &self.stats
    }

    /// Distribution queried at the most recent hit, if any.
    pub fn distribution(&self) -> Option<&F::Distribution> {
        self.distribution.as_ref()
    }

    pub fn on_path_start(&mut self) {
        self.vertices.clear();
        self.distribution = None;
        self.throughput = RGB::ONE;
        self.depth = 0;
    }

    /// Records a new vertex for the surface the ray hit and looks up the guiding
    /// distribution there. u picks among neighboring field regions.
    pub fn on_hit(&mut self, ray: &Ray, hit: &SurfaceHit, u: Float) {
        let wo = -ray.d;
        let v = self.vertices.next_vertex();
        v.position = hit.p;
        v.direction_out = wo;
        v.normal = hit.ns;

        self.distribution = self.field.and_then(|f| f.query_distribution(hit.p, u));
        if let Some(d) = self.distribution.as_mut() {
            if self.sampler.settings().use_cosine_product {
                d.apply_cosine_product(hit.ns.face_forward(&wo));
            }
            v.region = Some(d.region());
        }
    }

    /// Samples the next direction at the current vertex, applies Russian roulette and
    /// returns the continuation ray with its density and contribution (f * cos / pdf,
    /// including the roulette boost). None ends the path.
    pub fn on_direction_sampled<B: BsdfI, S: SamplerI>(
        &mut self,
        ray: &Ray,
        hit: &SurfaceHit,
        bsdf: &B,
        sampler: &mut S,
    ) -> Option<(Ray, Float, RGB)> {
        let wo = -ray.d;
        let p = match self.distribution {
            Some(_) => self.sampler.selection_probability(bsdf),
            None => 0.0,
        };
        let u = sampler.get_1d();
        let u2 = sampler.get_2d();
        let sample = self
            .sampler
            .sample(wo, bsdf, self.distribution.as_ref(), p, u, u2);

        let Some(v) = self.vertices.last_mut() else {
            debug_assert!(false, "direction sampled before any hit was recorded");
            return None;
        };
        v.roughness = bsdf.roughness();
        v.eta = bsdf.eta();
        let sample = sample?;
        v.direction_in = Some(sample.wi);
        v.pdf_direction_in = sample.pdf;
        v.is_delta = sample.is_delta;
        v.scattering_weight = sample.contribution;
        self.depth += 1;

        let mut contribution = sample.contribution;
        self.throughput *= contribution;
        if self.depth > self.rr_start_depth {
            let q = Float::min(1.0, self.throughput.max_component_value());
            if !(q > 0.0) || sampler.get_1d() >= q {
                return None;
            }
            contribution /= q;
            self.throughput /= q;
            v.rr_probability = q;
            v.scattering_weight = contribution;
        }
        if contribution.is_zero() || !contribution.is_finite() {
            return None;
        }

        Some((Ray::spawn(hit.p, hit.n, sample.wi), sample.pdf, contribution))
    }

    /// Density with which on_direction_sampled would have produced wi at the current
    /// vertex, for weighting a light sample against it.
    pub fn direction_pdf<B: BsdfI>(&self, wo: Vector3f, bsdf: &B, wi: Vector3f) -> Float {
        let p = match self.distribution {
            Some(_) => self.sampler.selection_probability(bsdf),
            None => 0.0,
        };
        self.sampler
            .pdf(wo, wi, bsdf, self.distribution.as_ref(), p)
    }

    /// Adds the (already MIS-weighted) next-event estimate gathered at the current vertex,
    /// as radiance leaving the vertex, not scaled by the path throughput.
    pub fn on_next_event_result(&mut self, contribution: RGB) {
        match self.vertices.last_mut() {
            Some(v) => v.scattered_contribution += contribution,
            None => debug_assert!(false, "next-event result without a vertex"),
        }
    }

    /// Records emission found by the last sampled direction: either at the surface just
    /// passed to on_hit, or, for background hits, at a far pseudo-vertex along the escape
    /// direction. emission is unweighted; mis_weight is its weight against next-event estimation.
    pub fn on_light_hit(&mut self, emission: RGB, mis_weight: Float, is_background: bool) {
        if is_background {
            let Some((position, wi)) = self
                .vertices
                .last()
                .and_then(|v| v.direction_in.map(|wi| (v.position, wi)))
            else {
                // Camera rays that escape leave nothing to train on.
                return;
            };
            let v = self.vertices.next_vertex();
            v.position = position + wi * ENVIRONMENT_DISTANCE;
            v.direction_out = -wi;
            v.is_environment = true;
            v.direct_contribution = emission;
            v.mis_weight = mis_weight;
        } else if let Some(v) = self.vertices.last_mut() {
            v.direct_contribution += emission;
            v.mis_weight = mis_weight;
        }
    }

    /// Extracts the path's training observations into the shared buffer and returns how
    /// many were produced. Paths that never hit anything produce none.
    pub fn on_path_finished<S: SamplerI>(
        &mut self,
        training: &TrainingBuffer,
        sampler: &mut S,
    ) -> Result<usize> {
        let stats = match self
            .vertices
            .prepare_samples_with_stats(&self.extraction, sampler)
        {
            Ok(stats) => stats,
            Err(GuidingError::EmptyPath) => ExtractionStats::default(),
            Err(e) => {
                warn!("Path finished twice without being restarted: {}", e);
                return Err(e);
            }
        };
        training.append(self.vertices.observations());
        training.report_degenerate(stats.skipped_degenerate);
        self.stats.merge(&stats);
        Ok(stats.emitted)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::{PathGuide, SurfaceHit};
    use crate::{
        bounds::Bounds3f,
        bsdf::BSDF,
        bxdf::{BxDF, DiffuseBxDF, MirrorBxDF},
        color::RGB,
        error::GuidingError,
        extraction::ENVIRONMENT_DISTANCE,
        field::GuidingFieldI,
        grid_field::{GridField, GridFieldSettings},
        math::INV_PI,
        observation::{ObservationFlags, TrainingObservation},
        options::GuidingOptions,
        ray::Ray,
        sampler::{IndependentSampler, Sampler},
        training_buffer::TrainingBuffer,
        vecmath::{Normal3f, Point3f, Vector3f},
        Float,
    };

    fn sampler() -> Sampler {
        Sampler::Independent(IndependentSampler::new(7, 1))
    }

    fn floor_hit(p: Point3f) -> SurfaceHit {
        SurfaceHit {
            p,
            n: Normal3f::Z,
            ns: Normal3f::Z,
        }
    }

    fn trained_field() -> GridField {
        let mut field = GridField::new(GridFieldSettings::default());
        field.set_scene_bounds(Bounds3f::new(
            Point3f::new(-1.0, -1.0, -1.0),
            Point3f::new(1.0, 1.0, 1.0),
        ));
        let observations: Vec<TrainingObservation> = (0..20_000)
            .map(|i| {
                let x = (i % 200) as Float / 100.0 - 1.0;
                let y = (i / 200) as Float / 50.0 - 1.0;
                TrainingObservation::new(
                    Point3f::new(x, y, 0.0),
                    Vector3f::Z,
                    1.0,
                    0.5 * INV_PI,
                    1.0,
                    ObservationFlags::empty(),
                )
            })
            .collect();
        field.train(&observations, 1);
        field
    }

    #[test]
    fn single_bounce_to_a_light() {
        let options = GuidingOptions::default();
        let mut guide: PathGuide<GridField> = PathGuide::new(None, &options, 8);
        let training = TrainingBuffer::with_shards(1);
        let mut sampler = sampler();
        let bsdf = BSDF::new(Normal3f::Z, BxDF::Diffuse(DiffuseBxDF::new(RGB::splat(0.5))));

        guide.on_path_start();
        let camera_ray = Ray::new(Point3f::new(0.0, 0.0, 1.0), -Vector3f::Z);
        let hit = floor_hit(Point3f::ZERO);
        guide.on_hit(&camera_ray, &hit, 0.5);
        guide.on_next_event_result(RGB::splat(0.25));
        let (ray, pdf, contribution) = guide
            .on_direction_sampled(&camera_ray, &hit, &bsdf, &mut sampler)
            .unwrap();
        assert!(ray.d.z > 0.0);
        assert!(pdf > 0.0);
        // Diffuse with BSDF sampling: contribution is the albedo.
        assert_approx_eq!(Float, 0.5, contribution.r, epsilon = 1e-4);
        assert_eq!(1, guide.depth());

        let light_hit = SurfaceHit {
            p: ray.at(2.0),
            n: Normal3f::new(0.0, 0.0, -1.0),
            ns: Normal3f::new(0.0, 0.0, -1.0),
        };
        guide.on_hit(&ray, &light_hit, 0.5);
        guide.on_light_hit(RGB::splat(4.0), 0.5, false);

        assert_eq!(1, guide.on_path_finished(&training, &mut sampler).unwrap());
        assert_eq!(1, training.len());
        let obs = guide.vertices().observations()[0];
        assert_eq!(Point3f::ZERO, obs.position);
        assert_eq!(2.0, obs.weight);
        assert_approx_eq!(Float, 2.0, obs.distance, epsilon = 1e-3);
        assert_eq!(pdf, obs.pdf);

        // Finishing twice is a usage error.
        assert_eq!(
            Err(GuidingError::AlreadyPrepared),
            guide.on_path_finished(&training, &mut sampler)
        );
    }

    #[test]
    fn environment_escape_is_recorded_far_away() {
        let options = GuidingOptions::default();
        let mut guide: PathGuide<GridField> = PathGuide::new(None, &options, 8);
        let training = TrainingBuffer::with_shards(1);
        let mut sampler = sampler();
        let bsdf = BSDF::new(Normal3f::Z, BxDF::Diffuse(DiffuseBxDF::new(RGB::ONE)));

        guide.on_path_start();
        let camera_ray = Ray::new(Point3f::new(0.0, 0.0, 1.0), -Vector3f::Z);
        let hit = floor_hit(Point3f::ZERO);
        guide.on_hit(&camera_ray, &hit, 0.5);
        let (ray, _, _) = guide
            .on_direction_sampled(&camera_ray, &hit, &bsdf, &mut sampler)
            .unwrap();
        guide.on_light_hit(RGB::splat(3.0), 1.0, true);

        assert_eq!(2, guide.vertices().len());
        assert!(guide.vertices().last().unwrap().is_environment);
        assert_eq!(1, guide.on_path_finished(&training, &mut sampler).unwrap());
        let obs = guide.vertices().observations()[0];
        assert_eq!(ENVIRONMENT_DISTANCE, obs.distance);
        assert_eq!(3.0, obs.weight);
        assert_approx_eq!(Float, 1.0, obs.direction.dot(&ray.d), epsilon = 1e-4);
    }

    #[test]
    fn escaped_camera_ray_yields_nothing() {
        let options = GuidingOptions::default();
        let mut guide: PathGuide<GridField> = PathGuide::new(None, &options, 8);
        let training = TrainingBuffer::with_shards(1);
        guide.on_path_start();
        guide.on_light_hit(RGB::ONE, 1.0, true);
        assert_eq!(0, guide.on_path_finished(&training, &mut sampler()).unwrap());
        assert_eq!(1, training.num_paths());
    }

    #[test]
    fn trained_field_guides_and_untrained_does_not() {
        let options = GuidingOptions::default();
        let untrained = GridField::new(GridFieldSettings::default());
        let guide = PathGuide::new(Some(&untrained), &options, 8);
        assert!(!guide.is_guiding());

        let field = trained_field();
        let mut guide = PathGuide::new(Some(&field), &options, 8);
        assert!(guide.is_guiding());
        let bsdf = BSDF::new(Normal3f::Z, BxDF::Diffuse(DiffuseBxDF::new(RGB::ONE)));
        let camera_ray = Ray::new(Point3f::new(0.2, 0.2, 1.0), -Vector3f::Z);
        let hit = floor_hit(Point3f::new(0.2, 0.2, 0.0));

        guide.on_path_start();
        guide.on_hit(&camera_ray, &hit, 0.5);
        assert!(guide.distribution().is_some());
        assert!(guide.vertices().last().unwrap().region.is_some());

        // The combined density mixes the BSDF with the trained, strongly peaked distribution.
        let wo = -camera_ray.d;
        let up = guide.direction_pdf(wo, &bsdf, Vector3f::Z);
        assert!(up > INV_PI);

        let mut sampler = sampler();
        let mut guided_up = 0;
        for _ in 0..100 {
            guide.on_path_start();
            guide.on_hit(&camera_ray, &hit, 0.5);
            if let Some((ray, _, _)) =
                guide.on_direction_sampled(&camera_ray, &hit, &bsdf, &mut sampler)
            {
                if ray.d.z > 0.99 {
                    guided_up += 1;
                }
            }
        }
        // Half the samples come from the distribution concentrated around +z.
        assert!(guided_up > 30);
    }

    #[test]
    fn specular_bounce_is_marked_delta() {
        let options = GuidingOptions::default();
        let mut guide: PathGuide<GridField> = PathGuide::new(None, &options, 8);
        let mirror = BSDF::new(Normal3f::Z, BxDF::Mirror(MirrorBxDF::new(RGB::ONE)));
        let camera_ray = Ray::new(
            Point3f::new(-1.0, 0.0, 1.0),
            Vector3f::new(1.0, 0.0, -1.0).normalize(),
        );
        let hit = floor_hit(Point3f::ZERO);

        guide.on_path_start();
        guide.on_hit(&camera_ray, &hit, 0.5);
        let (ray, pdf, _) = guide
            .on_direction_sampled(&camera_ray, &hit, &mirror, &mut sampler())
            .unwrap();
        assert_eq!(1.0, pdf);
        assert!(ray.o.z > 0.0);
        assert!(guide.vertices().last().unwrap().is_delta);
    }

    #[test]
    fn russian_roulette_is_recorded() {
        let options = GuidingOptions {
            rr_start_depth: 0,
            ..Default::default()
        };
        let mut guide: PathGuide<GridField> = PathGuide::new(None, &options, 8);
        let bsdf = BSDF::new(Normal3f::Z, BxDF::Diffuse(DiffuseBxDF::new(RGB::splat(0.5))));
        let camera_ray = Ray::new(Point3f::new(0.0, 0.0, 1.0), -Vector3f::Z);
        let hit = floor_hit(Point3f::ZERO);
        let mut sampler = sampler();

        let mut survived = 0;
        for _ in 0..1000 {
            guide.on_path_start();
            guide.on_hit(&camera_ray, &hit, 0.5);
            if let Some((_, _, contribution)) =
                guide.on_direction_sampled(&camera_ray, &hit, &bsdf, &mut sampler)
            {
                survived += 1;
                let v = guide.vertices().last().unwrap();
                assert_approx_eq!(Float, 0.5, v.rr_probability, epsilon = 1e-4);
                // Survivors are boosted back to an unbiased estimate.
                assert_approx_eq!(Float, 1.0, contribution.r, epsilon = 1e-3);
                assert_eq!(contribution, v.scattering_weight);
            }
        }
        assert!((400..600).contains(&survived));
    }
}
