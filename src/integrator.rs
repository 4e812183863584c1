use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use log::{debug, info};
use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;

use crate::{
    bsdf::BsdfI,
    color::RGB,
    controller::{IterationContext, IterationController, IterationOutcome, IterationReport},
    error::Result,
    field::GuidingFieldI,
    grid_field::GridField,
    options::RenderOptions,
    path_guide::PathGuide,
    ray::Ray,
    sampler::{IndependentSampler, Sampler, SamplerI},
    sampling::balance_heuristic,
    scene::Scene,
    training_buffer::TrainingBuffer,
    vecmath::Point3f,
    Float,
};

#[derive(Debug, Clone)]
pub struct RenderResult {
    pub width: u32,
    pub height: u32,
    /// Per-pixel mean radiance, row major.
    pub pixels: Vec<RGB>,
    pub spp: u32,
    pub reports: Vec<IterationReport>,
    /// Mean number of sampled directions per path.
    pub mean_path_length: Float,
}

impl RenderResult {
    pub fn mean(&self) -> RGB {
        if self.pixels.is_empty() {
            return RGB::ZERO;
        }
        let mut sum = RGB::ZERO;
        for p in &self.pixels {
            sum += p;
        }
        sum / self.pixels.len() as Float
    }
}

#[derive(Default)]
struct PathLengths {
    bounces: AtomicU64,
    paths: AtomicU64,
}

impl PathLengths {
    fn record(&self, bounces: u32) {
        self.bounces.fetch_add(bounces as u64, Ordering::Relaxed);
        self.paths.fetch_add(1, Ordering::Relaxed);
    }

    fn mean(&self) -> Float {
        let paths = self.paths.load(Ordering::Relaxed);
        if paths == 0 {
            return 0.0;
        }
        self.bounces.load(Ordering::Relaxed) as Float / paths as Float
    }
}

/// One value per rayon worker thread, plus one for callers outside the pool.
/// A thread only ever locks its own slot, so the locks are uncontended.
struct PerThread<T> {
    slots: Vec<Mutex<T>>,
}

impl<T> PerThread<T> {
    fn new(make: impl Fn() -> T) -> PerThread<T> {
        PerThread {
            slots: (0..rayon::current_num_threads() + 1)
                .map(|_| Mutex::new(make()))
                .collect(),
        }
    }

    fn local(&self) -> MutexGuard<'_, T> {
        let slot = rayon::current_thread_index().map_or(0, |i| i + 1);
        self.slots[slot % self.slots.len()].lock()
    }
}

/// Unidirectional path tracer with next-event estimation, sampling directions through
/// PathGuide. With guiding off it is a plain path tracer.
pub struct GuidedPathIntegrator<'s> {
    scene: &'s Scene,
    options: RenderOptions,
}

impl<'s> GuidedPathIntegrator<'s> {
    pub fn new(scene: &'s Scene, options: RenderOptions) -> Result<GuidedPathIntegrator<'s>> {
        options.validate()?;
        Ok(GuidedPathIntegrator { scene, options })
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(&self) -> RenderResult {
        let mut field = GridField::new(self.options.guiding_options.field);
        field.set_scene_bounds(self.scene.bounds());
        let mut controller = IterationController::new(field, &self.options);

        let mut sums = vec![RGB::ZERO; self.options.num_pixels()];
        let mut spp = 0;
        let path_lengths = PathLengths::default();
        controller.run(|context| {
            let outcome = self.render_iteration(context, &mut sums, &path_lengths);
            if outcome == IterationOutcome::Completed {
                spp += context.spp;
            }
            outcome
        });

        let pixels = if spp > 0 {
            sums.iter().map(|s| *s / spp as Float).collect_vec()
        } else {
            sums
        };
        let result = RenderResult {
            width: self.options.width,
            height: self.options.height,
            pixels,
            spp,
            reports: controller.reports().to_vec(),
            mean_path_length: path_lengths.mean(),
        };
        info!(
            "Rendered {} spp ({}), mean path length {:.3}",
            spp,
            if self.options.guiding { "guided" } else { "unguided" },
            result.mean_path_length
        );
        result
    }

    /// Renders one pass over all pixels, adding each pixel's sample sum into sums.
    /// Nothing is added if the pass is cancelled.
    fn render_iteration<F: GuidingFieldI>(
        &self,
        context: &IterationContext<F>,
        sums: &mut [RGB],
        path_lengths: &PathLengths,
    ) -> IterationOutcome {
        let width = self.options.width;
        let height = self.options.height;
        let workers = PerThread::new(|| {
            (
                PathGuide::new(
                    context.field,
                    &self.options.guiding_options,
                    self.options.max_depth,
                ),
                Sampler::Independent(IndependentSampler::new(self.options.seed, context.spp)),
            )
        });
        let rows: Vec<Option<Vec<RGB>>> = (0..height)
            .into_par_iter()
            .map(|y| {
                if context.is_cancelled() {
                    return None;
                }
                let mut worker = workers.local();
                let (guide, sampler) = &mut *worker;
                let row = (0..width)
                    .map(|x| {
                        let mut sum = RGB::ZERO;
                        for s in 0..context.spp {
                            sampler.start_pixel_sample((x, y), context.sample_offset + s);
                            let ray = self.scene.camera().generate_ray(
                                x,
                                y,
                                width,
                                height,
                                sampler.get_2d(),
                            );
                            let (l, bounces) = self.li(ray, guide, sampler, context.buffer);
                            path_lengths.record(bounces);
                            sum += l;
                        }
                        sum
                    })
                    .collect();
                Some(row)
            })
            .collect();

        if rows.iter().any(|r| r.is_none()) {
            return IterationOutcome::Cancelled;
        }
        for (y, row) in rows.into_iter().flatten().enumerate() {
            let start = y * width as usize;
            for (sum, l) in sums[start..start + width as usize].iter_mut().zip(row) {
                *sum += l;
            }
        }
        IterationOutcome::Completed
    }

    /// Radiance along one camera ray and the number of directions sampled on its path.
    fn li<F: GuidingFieldI, S: SamplerI>(
        &self,
        camera_ray: Ray,
        guide: &mut PathGuide<F>,
        sampler: &mut S,
        training: &TrainingBuffer,
    ) -> (RGB, u32) {
        let scene = self.scene;
        let mut l = RGB::ZERO;
        let mut ray = camera_ray;
        // Origin and density of the last non-specular bounce, for weighting emitter hits.
        let mut previous: Option<(Point3f, Float)> = None;

        guide.on_path_start();
        loop {
            let Some(isect) = scene.intersect(&ray, Float::INFINITY) else {
                let le = scene.environment();
                if !le.is_zero() {
                    l += guide.throughput() * le;
                }
                // A black escape still terminates the recorded path.
                guide.on_light_hit(le, 1.0, true);
                break;
            };
            let hit = isect.hit;
            guide.on_hit(&ray, &hit, sampler.get_1d());

            let sphere = scene.sphere(isect.index);
            if sphere.is_light() {
                let le = sphere.emission;
                let mis = match previous {
                    Some((p, pdf)) => {
                        balance_heuristic(1, pdf, 1, scene.light_pdf(p, isect.index))
                    }
                    None => 1.0,
                };
                l += guide.throughput() * le * mis;
                guide.on_light_hit(le, mis, false);
                break;
            }
            if guide.depth() >= self.options.max_depth {
                break;
            }

            let bsdf = sphere.material.bsdf(hit.ns);
            let wo = -ray.d;
            if bsdf.flags().is_non_specular() {
                let u = sampler.get_1d();
                let u2 = sampler.get_2d();
                if let Some(ls) = scene.sample_light(hit.p, u, u2) {
                    let f = bsdf.evaluate_with_cosine(wo, ls.wi);
                    if !f.is_zero() && scene.unoccluded(&hit, ls.p_light) {
                        let direction_pdf = guide.direction_pdf(wo, &bsdf, ls.wi);
                        let w = balance_heuristic(1, ls.pdf, 1, direction_pdf);
                        let contribution = f * ls.li * (w / ls.pdf);
                        l += guide.throughput() * contribution;
                        guide.on_next_event_result(contribution);
                    }
                }
            }

            match guide.on_direction_sampled(&ray, &hit, &bsdf, sampler) {
                Some((next, pdf, _)) => {
                    previous = if bsdf.flags().is_specular() {
                        None
                    } else {
                        Some((hit.p, pdf))
                    };
                    ray = next;
                }
                None => break,
            }
        }

        let bounces = guide.depth();
        if let Err(e) = guide.on_path_finished(training, sampler) {
            debug!("Dropping path samples: {}", e);
        }
        if !l.is_finite() {
            debug!("Discarding non-finite radiance sample {:?}", l);
            l = RGB::ZERO;
        }
        (l, bounces)
    }
}
