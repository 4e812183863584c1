//! Why are there distinct types for **Vector** and **Point** and
//! **Normal**? Why not just use a unified vector class? Because they
//! are not the same, so let's capture that with our type system.
//!
//! Path recording mixes all three constantly: a vertex has a position
//! (a point), directions toward its neighbours (unit vectors) and a
//! shading normal. Subtracting two positions yields a vector, adding a
//! vector to a position yields a position, and neither a point nor a
//! normal has a meaningful "direction sample". Keeping them as separate
//! types lets the compiler catch the orientation mix-ups that are easy
//! to make when propagating radiance back along a path.

pub mod normal;
pub mod point;
pub mod spherical;
pub mod vector;

pub use normal::Normal3f;
pub use point::{Point2f, Point3f};
pub use vector::Vector3f;

pub trait HasNan {
    fn has_nan(&self) -> bool;
}

/// Tolerance on |v|^2 - 1 when checking that a direction is normalized.
pub const NORMALIZED_TOLERANCE: crate::Float = 1e-3;
