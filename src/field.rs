//! Scalar fields sampled by the extractor.
//!
//! Every field here is negative inside the surface and positive outside, so
//! gradient normals point outwards.

use std::f32::consts::TAU;

use crate::{
    error::{MarchingCubesError, Result},
    types::{CompiledFunction, Point, Value, Vector},
};

/// Squared distances below this are clamped so a sample landing exactly on a
/// ball centre stays finite.
const MIN_DISTANCE_SQUARED: Value = 1e-8;

/// A signed scalar field `F(p)`.
///
/// The extractor calls [`update`](ScalarField::update) once per frame, then
/// samples [`value`](ScalarField::value) many times (possibly from several
/// threads) and never mutates the field while sampling.
pub trait ScalarField: Sync {
    /// Evaluates the field at `p`.
    fn value(&self, p: Point) -> Value;

    /// Advances time-dependent parameters to absolute time `time` (seconds).
    fn update(&mut self, _time: Value) {}

    /// Point the sampling volume is centred on.
    fn centre(&self) -> Point {
        Point::origin()
    }
}

/// Signed distance to a sphere: `F(p) = |p - c| - r`.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereField {
    pub centre: Point,
    pub radius: Value,
}

impl SphereField {
    pub fn new(centre: Point, radius: Value) -> Self {
        Self { centre, radius }
    }
}

impl ScalarField for SphereField {
    fn value(&self, p: Point) -> Value {
        (p - self.centre).norm() - self.radius
    }

    fn centre(&self) -> Point {
        self.centre
    }
}

/// Wraps a closure as a static (time-independent) field.
pub struct FnField {
    function: Box<CompiledFunction>,
    centre: Point,
}

impl FnField {
    pub fn new<F>(centre: Point, function: F) -> Self
    where
        F: Fn(Point) -> Value + Send + Sync + 'static,
    {
        Self {
            function: Box::new(function),
            centre,
        }
    }
}

impl ScalarField for FnField {
    fn value(&self, p: Point) -> Value {
        (self.function)(p)
    }

    fn centre(&self) -> Point {
        self.centre
    }
}

/// A single animated ball.
///
/// Its centre at time `t` is `anchor + amplitude ⊙ sin(t + phase)`, evaluated per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaBall {
    pub anchor: Point,
    pub amplitude: Vector,
    pub phase: Vector,
    pub radius: Value,
    position: Point,
}

impl MetaBall {
    /// A ball resting at `anchor`.
    pub fn new(anchor: Point, radius: Value) -> Self {
        Self {
            anchor,
            amplitude: Vector::zeros(),
            phase: Vector::zeros(),
            radius,
            position: anchor,
        }
    }

    /// Makes the ball oscillate around its anchor.
    pub fn with_motion(mut self, amplitude: Vector, phase: Vector) -> Self {
        self.amplitude = amplitude;
        self.phase = phase;
        self.position = self.position_at(0.0);
        self
    }

    /// Current centre of the ball.
    pub fn position(&self) -> Point {
        self.position
    }

    pub fn position_at(&self, time: Value) -> Point {
        let wave = self.phase.map(|phase| (time + phase).sin());
        self.anchor + self.amplitude.component_mul(&wave)
    }
}

/// How overlapping balls are merged into one field.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Blend {
    /// Classic metaballs: `F(p) = 1 - Σ r² / |p - c|²`.
    #[default]
    Additive,
    /// Polynomial smooth minimum of the balls' sphere distances, blending
    /// within a band of width `k`.
    SmoothMin { k: Value },
}

/// A blobby surface made of several [`MetaBall`]s.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaBallField {
    balls: Vec<MetaBall>,
    blend: Blend,
}

impl MetaBallField {
    /// Builds an additive field.
    ///
    /// Fails at setup time when `balls` is empty or any radius is not a
    /// positive finite number.
    pub fn new(balls: Vec<MetaBall>) -> Result<Self> {
        if balls.is_empty() {
            return Err(MarchingCubesError::EmptyField);
        }
        if let Some((index, ball)) = balls
            .iter()
            .enumerate()
            .find(|(_, b)| !(b.radius.is_finite() && b.radius > 0.0))
        {
            return Err(MarchingCubesError::InvalidBallRadius {
                index,
                radius: ball.radius,
            });
        }
        Ok(Self {
            balls,
            blend: Blend::Additive,
        })
    }

    pub fn with_blend(mut self, blend: Blend) -> Result<Self> {
        if let Blend::SmoothMin { k } = blend {
            if !(k.is_finite() && k > 0.0) {
                return Err(MarchingCubesError::InvalidSmoothing(k));
            }
        }
        self.blend = blend;
        Ok(self)
    }

    /// `count` balls of equal `radius` orbiting the origin, each on its own
    /// phase so they drift into and out of each other.
    pub fn orbiting(count: usize, radius: Value, spread: Value) -> Result<Self> {
        let balls = (0..count)
            .map(|i| {
                let offset = TAU * i as Value / count as Value;
                MetaBall::new(Point::origin(), radius).with_motion(
                    Vector::new(spread, spread * 0.5, spread),
                    Vector::new(offset, 2.0 * offset, offset + TAU / 4.0),
                )
            })
            .collect();
        Self::new(balls)
    }

    pub fn balls(&self) -> &[MetaBall] {
        &self.balls
    }

    pub fn blend(&self) -> Blend {
        self.blend
    }

    fn additive(&self, p: Point) -> Value {
        let influence: Value = self
            .balls
            .iter()
            .map(|b| {
                let d2 = (p - b.position).norm_squared().max(MIN_DISTANCE_SQUARED);
                b.radius * b.radius / d2
            })
            .sum();
        1.0 - influence
    }

    fn smooth_min(&self, p: Point, k: Value) -> Value {
        self.balls
            .iter()
            .map(|b| (p - b.position).norm() - b.radius)
            .reduce(|a, b| smooth_min(a, b, k))
            .unwrap_or(Value::INFINITY)
    }
}

impl ScalarField for MetaBallField {
    fn value(&self, p: Point) -> Value {
        match self.blend {
            Blend::Additive => self.additive(p),
            Blend::SmoothMin { k } => self.smooth_min(p, k),
        }
    }

    fn update(&mut self, time: Value) {
        for ball in &mut self.balls {
            ball.position = ball.position_at(time);
        }
    }

    fn centre(&self) -> Point {
        let sum = self
            .balls
            .iter()
            .fold(Vector::zeros(), |acc, b| acc + b.position.coords);
        Point::from(sum / self.balls.len() as Value)
    }
}

/// `min(a, b) - h²k/4` with `h = max(k - |a - b|, 0) / k`.
#[inline]
pub fn smooth_min(a: Value, b: Value, k: Value) -> Value {
    let h = ((k - (a - b).abs()) / k).max(0.0);
    a.min(b) - h * h * k * 0.25
}
