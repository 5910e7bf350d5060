//! Numeric aliases shared by the sampler, the cube processor and the mesh.

use nalgebra::{Point3, Vector3};

/// Field samples, coordinates and time. Matches the `f32` vertex layout.
pub type Value = f32;

pub type Point = Point3<Value>;

/// Offsets, gradients and normals.
pub type Vector = Vector3<Value>;

/// Closure form of a static field, as wrapped by [`FnField`](crate::field::FnField).
///
/// Values above the iso level are outside the surface.
pub type CompiledFunction = dyn Fn(Point) -> Value + Send + Sync;
