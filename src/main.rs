use std::{process::ExitCode, time::Duration};

use clap::{Parser, ValueEnum};
use log::{error, info};
use path_guiding::{
    extraction::RussianRouletteMode,
    guided_sampler::SelectionPolicy,
    integrator::{GuidedPathIntegrator, RenderResult},
    options::RenderOptions,
    scene::Scene,
    Float,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Plain path tracing with BSDF sampling only.
    Baseline,
    /// Path guiding with the online-trained grid field.
    Guided,
    /// Render both and compare.
    Both,
}

/// Renders the demo scene with and without path guiding and reports per-iteration statistics.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,
    #[arg(long, default_value_t = 64)]
    width: u32,
    #[arg(long, default_value_t = 48)]
    height: u32,
    #[arg(long, default_value_t = 8)]
    max_depth: u32,
    /// Samples per pixel rendered in each training iteration.
    #[arg(long, default_value_t = 4)]
    spp: u32,
    #[arg(long, default_value_t = 8)]
    iterations: u32,
    /// Wall-clock budget in seconds for each render.
    #[arg(long)]
    time_budget: Option<f64>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Probability of sampling from the guiding distribution on rough surfaces.
    #[arg(long, default_value_t = 0.5)]
    selection_probability: Float,
    #[arg(long, default_value_t = 8)]
    grid_resolution: u32,
    /// Train on raw Russian roulette weights instead of path-local radiance.
    #[arg(long)]
    raw_roulette: bool,
    /// Do not train on radiance coming straight from an emitter hit.
    #[arg(long)]
    no_direct_light: bool,
    #[arg(long)]
    splat_radius: Option<Float>,
}

impl Args {
    fn render_options(&self, guiding: bool) -> RenderOptions {
        let mut options = RenderOptions {
            width: self.width,
            height: self.height,
            max_depth: self.max_depth,
            spp_per_iteration: self.spp,
            iterations: self.iterations,
            time_budget: self.time_budget.map(Duration::from_secs_f64),
            seed: self.seed,
            guiding,
            ..Default::default()
        };
        let guiding_options = &mut options.guiding_options;
        guiding_options.sampler.selection = SelectionPolicy::Fixed(self.selection_probability);
        guiding_options.field.resolution = self.grid_resolution;
        guiding_options.extraction.guide_direct_light = !self.no_direct_light;
        guiding_options.extraction.splat_radius = self.splat_radius;
        if self.raw_roulette {
            guiding_options.extraction.russian_roulette = RussianRouletteMode::Raw;
        }
        options
    }
}

fn summarize(label: &str, result: &RenderResult) {
    let mean = result.mean();
    println!(
        "{:>8}: {} spp, mean radiance ({:.4}, {:.4}, {:.4}), mean path length {:.3}",
        label, result.spp, mean.r, mean.g, mean.b, result.mean_path_length
    );
    for report in &result.reports {
        println!(
            "          iteration {:>2}{}: {:>8} observations, render {:.2?}, train {:.2?}{}",
            report.iteration,
            if report.guided { " (guided)" } else { "" },
            report.observations,
            report.render_time,
            report.training_time,
            if report.discarded { ", discarded" } else { "" }
        );
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let scene = Scene::demo();

    let modes: &[(bool, &str)] = match args.mode {
        Mode::Baseline => &[(false, "baseline")],
        Mode::Guided => &[(true, "guided")],
        Mode::Both => &[(false, "baseline"), (true, "guided")],
    };

    for (guiding, label) in modes {
        let integrator = match GuidedPathIntegrator::new(&scene, args.render_options(*guiding)) {
            Ok(integrator) => integrator,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        };
        info!("Rendering {} ({}x{})", label, args.width, args.height);
        let result = integrator.render();
        summarize(label, &result);
    }
    ExitCode::SUCCESS
}
