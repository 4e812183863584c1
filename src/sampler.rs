use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{vecmath::Point2f, Float};

pub trait SamplerI {
    fn samples_per_pixel(&self) -> u32;

    /// Sets up the RNG so that the samples of a given pixel sample are deterministic,
    /// independent of which worker thread renders it or in which order.
    /// p: The pixel coordinate.
    /// sample_index: the index of the sample within the pixel, across all iterations.
    fn start_pixel_sample(&mut self, p: (u32, u32), sample_index: u32);

    fn get_1d(&mut self) -> Float;
    fn get_2d(&mut self) -> Point2f;
}

#[derive(Debug, Clone)]
pub enum Sampler {
    Independent(IndependentSampler),
}

impl SamplerI for Sampler {
    fn samples_per_pixel(&self) -> u32 {
        match self {
            Sampler::Independent(s) => s.samples_per_pixel(),
        }
    }

    fn start_pixel_sample(&mut self, p: (u32, u32), sample_index: u32) {
        match self {
            Sampler::Independent(s) => s.start_pixel_sample(p, sample_index),
        }
    }

    fn get_1d(&mut self) -> Float {
        match self {
            Sampler::Independent(s) => s.get_1d(),
        }
    }

    fn get_2d(&mut self) -> Point2f {
        match self {
            Sampler::Independent(s) => s.get_2d(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndependentSampler {
    /// Store seed for determinism in start_pixel_sample().
    seed: u64,
    samples_per_pixel: u32,
    rng: SmallRng,
}

impl IndependentSampler {
    pub fn new(seed: u64, samples_per_pixel: u32) -> IndependentSampler {
        IndependentSampler {
            seed,
            samples_per_pixel,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl SamplerI for IndependentSampler {
    fn samples_per_pixel(&self) -> u32 {
        self.samples_per_pixel
    }

    fn start_pixel_sample(&mut self, p: (u32, u32), sample_index: u32) {
        let key = ((p.0 as u64) << 40) ^ ((p.1 as u64) << 20) ^ sample_index as u64;
        self.rng = SmallRng::seed_from_u64(mix_bits(self.seed ^ mix_bits(key)));
    }

    fn get_1d(&mut self) -> Float {
        self.rng.gen()
    }

    fn get_2d(&mut self) -> Point2f {
        Point2f {
            x: self.rng.gen(),
            y: self.rng.gen(),
        }
    }
}

/// 64-bit finalizer from MurmurHash3.
fn mix_bits(mut v: u64) -> u64 {
    v ^= v >> 31;
    v = v.wrapping_mul(0x7fb5d329728ea185);
    v ^= v >> 27;
    v = v.wrapping_mul(0x81dadef4bc2dd44d);
    v ^= v >> 33;
    v
}
