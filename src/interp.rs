use crate::types::{Point, Value};

// Return the interpolation factor t at which the segment v0 -> v1 reaches iso_val.
// None when the two values are equal or the result is not a finite number.
pub fn find_t(v0: Value, v1: Value, iso_val: Value) -> Option<Value> {
    let denom = v1 - v0;
    if denom == 0.0 {
        return None;
    }
    let t = (iso_val - v0) / denom;
    t.is_finite().then_some(t)
}

// Linear interpolation
pub fn lerp(a: Value, b: Value, t: Value) -> Value {
    a + (b - a) * t
}

// Linearly interpolate between two points by factor t
pub fn interpolate_points(p0: Point, p1: Point, t: Value) -> Point {
    Point::new(lerp(p0.x, p1.x, t), lerp(p0.y, p1.y, t), lerp(p0.z, p1.z, t))
}
