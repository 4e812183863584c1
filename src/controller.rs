use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use log::{info, warn};

use crate::{field::GuidingFieldI, options::RenderOptions, training_buffer::TrainingBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidingPhase {
    /// No field trained yet: paths sample the BSDF alone while observations accumulate.
    Bootstrap,
    /// The field has been trained `iteration` times and guides the next render pass.
    Trained { iteration: u32 },
    /// Iteration count or time budget exhausted.
    Done,
}

/// What a render pass gets to work with for one iteration.
pub struct IterationContext<'a, F> {
    pub iteration: u32,
    /// Read-only field snapshot, None during bootstrap or when guiding is off.
    pub field: Option<&'a F>,
    pub buffer: &'a TrainingBuffer,
    pub spp: u32,
    /// Index of this iteration's first sample within each pixel.
    pub sample_offset: u32,
    pub deadline: Option<Instant>,
    cancelled: &'a AtomicBool,
}

impl<'a, F> IterationContext<'a, F> {
    /// Whether workers should stop early. Becomes true once the deadline passes and stays so.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.cancel();
            return true;
        }
        false
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: u32,
    pub guided: bool,
    pub spp: u32,
    pub observations: usize,
    pub paths: u64,
    pub render_time: Duration,
    pub training_time: Duration,
    /// The pass was cancelled and its observations thrown away.
    pub discarded: bool,
}

/// Alternates render passes and training: every completed pass's observations train
/// the field exactly once, and the next pass samples from the result.
pub struct IterationController<F: GuidingFieldI> {
    field: F,
    buffer: TrainingBuffer,
    phase: GuidingPhase,
    iterations: u32,
    spp_per_iteration: u32,
    time_budget: Option<Duration>,
    training: bool,
    reports: Vec<IterationReport>,
}

impl<F: GuidingFieldI> IterationController<F> {
    pub fn new(field: F, options: &RenderOptions) -> IterationController<F> {
        let mut buffer = TrainingBuffer::new();
        if options.guiding {
            buffer.reserve(options.observations_per_iteration());
        }
        IterationController {
            field,
            buffer,
            phase: GuidingPhase::Bootstrap,
            iterations: options.iterations,
            spp_per_iteration: options.spp_per_iteration,
            time_budget: options.time_budget,
            training: options.guiding,
            reports: Vec::new(),
        }
    }

    pub fn phase(&self) -> GuidingPhase {
        self.phase
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn into_field(self) -> F {
        self.field
    }

    pub fn reports(&self) -> &[IterationReport] {
        &self.reports
    }

    /// Runs render passes until the iteration count or the time budget is exhausted.
    pub fn run<R>(&mut self, mut render: R) -> &[IterationReport]
    where
        R: FnMut(&IterationContext<F>) -> IterationOutcome,
    {
        let deadline = self.time_budget.map(|budget| Instant::now() + budget);
        let cancelled = AtomicBool::new(false);

        loop {
            let iteration = self.reports.len() as u32;
            if self.phase == GuidingPhase::Done {
                break;
            }
            if iteration >= self.iterations || deadline.is_some_and(|d| Instant::now() >= d) {
                self.phase = GuidingPhase::Done;
                break;
            }

            let guided = matches!(self.phase, GuidingPhase::Trained { .. });
            info!(
                "Iteration {}: rendering {} spp ({})",
                iteration,
                self.spp_per_iteration,
                if guided { "guided" } else { "unguided" }
            );
            let render_start = Instant::now();
            let outcome = {
                let context = IterationContext {
                    iteration,
                    field: if guided { Some(&self.field) } else { None },
                    buffer: &self.buffer,
                    spp: self.spp_per_iteration,
                    sample_offset: iteration * self.spp_per_iteration,
                    deadline,
                    cancelled: &cancelled,
                };
                render(&context)
            };
            let render_time = render_start.elapsed();

            match outcome {
                IterationOutcome::Cancelled => {
                    let discarded = self.buffer.len();
                    self.buffer.clear();
                    warn!(
                        "Iteration {} was cancelled; discarding {} observations",
                        iteration, discarded
                    );
                    self.reports.push(IterationReport {
                        iteration,
                        guided,
                        spp: self.spp_per_iteration,
                        observations: discarded,
                        paths: 0,
                        render_time,
                        training_time: Duration::ZERO,
                        discarded: true,
                    });
                    self.phase = GuidingPhase::Done;
                }
                IterationOutcome::Completed => {
                    let batch = self.buffer.drain();
                    debug_assert_eq!(iteration, batch.iteration);
                    let training_start = Instant::now();
                    if self.training {
                        self.field.train(&batch.observations, self.spp_per_iteration);
                        self.phase = GuidingPhase::Trained {
                            iteration: self.field.iteration(),
                        };
                    }
                    let training_time = training_start.elapsed();
                    info!(
                        "Iteration {} done in {:.2?}: {} observations from {} paths ({} degenerate), trained in {:.2?}",
                        iteration,
                        render_time,
                        batch.observations.len(),
                        batch.paths,
                        batch.degenerate,
                        training_time
                    );
                    self.reports.push(IterationReport {
                        iteration,
                        guided,
                        spp: self.spp_per_iteration,
                        observations: batch.observations.len(),
                        paths: batch.paths,
                        render_time,
                        training_time,
                        discarded: false,
                    });
                }
            }
        }
        &self.reports
    }
}
