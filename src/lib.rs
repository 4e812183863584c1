pub mod bounds;
pub mod bsdf;
pub mod bxdf;
pub mod color;
pub mod controller;
pub mod error;
pub mod extraction;
pub mod field;
pub mod float;
pub mod frame;
pub mod grid_field;
pub mod guided_sampler;
pub mod integrator;
pub mod math;
pub mod observation;
pub mod options;
pub mod path_guide;
pub mod ray;
pub mod sampler;
pub mod sampling;
pub mod scene;
pub mod training_buffer;
pub mod vecmath;
pub mod vertex;
pub mod vmm;

// For convenience, re-export.
pub use float::Float;
