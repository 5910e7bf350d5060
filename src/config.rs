use crate::{
    error::{MarchingCubesError, Result},
    tables::MAX_TRIANGLES_PER_CUBE,
    types::{Point, Value, Vector},
};

/// How the cells of a frame are marched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Single-threaded; triangles come out in cell order.
    #[default]
    Serial,
    /// Rayon workers append triangles through an atomic counter.
    /// Triangle order varies between runs, content does not.
    Parallel,
}

/// Options recognised by the extraction pipeline.
///
/// ```rust,ignore
/// let config = ExtractionConfig::default()
///     .with_resolution([32, 32, 32])
///     .with_cell_size(0.25)
///     .with_mode(ExtractionMode::Parallel);
/// config.validate()?;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionConfig {
    /// Number of grid samples along X, Y and Z. Each must be at least 2.
    pub resolution: [usize; 3],
    /// World-space distance between neighbouring samples.
    pub cell_size: Value,
    /// Offset used for the central differences that produce vertex normals.
    pub normal_step: Value,
    /// Samples strictly above this value are "outside".
    pub iso_level: Value,
    pub mode: ExtractionMode,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            resolution: [50, 50, 50],
            cell_size: 0.2,
            normal_step: 0.01,
            iso_level: 0.0,
            mode: ExtractionMode::Serial,
        }
    }
}

impl ExtractionConfig {
    pub fn with_resolution(mut self, resolution: [usize; 3]) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_cell_size(mut self, cell_size: Value) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_normal_step(mut self, normal_step: Value) -> Self {
        self.normal_step = normal_step;
        self
    }

    pub fn with_iso_level(mut self, iso_level: Value) -> Self {
        self.iso_level = iso_level;
        self
    }

    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Checks every precondition and reports the first one violated.
    pub fn validate(&self) -> Result<()> {
        if self.resolution.iter().any(|&n| n < 2) {
            return Err(MarchingCubesError::InvalidResolution(self.resolution));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(MarchingCubesError::InvalidCellSize(self.cell_size));
        }
        if !(self.normal_step.is_finite() && self.normal_step > 0.0) {
            return Err(MarchingCubesError::InvalidNormalStep(self.normal_step));
        }
        if !self.iso_level.is_finite() {
            return Err(MarchingCubesError::InvalidIsoLevel(self.iso_level));
        }
        Ok(())
    }

    /// Number of cubes marched per frame: `(W-1)(H-1)(D-1)`.
    pub fn cell_count(&self) -> usize {
        self.resolution.iter().map(|n| n.saturating_sub(1)).product()
    }

    /// Worst-case triangle count of one frame.
    pub fn max_triangles(&self) -> usize {
        self.cell_count() * MAX_TRIANGLES_PER_CUBE
    }

    /// World-space size of the sampled volume.
    pub fn extent(&self) -> Vector {
        Vector::new(
            self.resolution[0] as Value,
            self.resolution[1] as Value,
            self.resolution[2] as Value,
        ) * self.cell_size
    }

    /// First grid sample position for a volume centred on `centre`.
    ///
    /// ```text
    ///  origin = centre - extent/2
    /// ```
    pub fn origin_for(&self, centre: Point) -> Point {
        centre - self.extent() / 2.0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn default_is_valid() {
        let config = ExtractionConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.cell_count(), 49 * 49 * 49);
        assert_eq!(config.max_triangles(), 5 * 49 * 49 * 49);
    }

    #[test]
    fn rejects_bad_options() {
        let base = ExtractionConfig::default();
        assert_eq!(
            base.clone().with_resolution([2, 1, 2]).validate(),
            Err(MarchingCubesError::InvalidResolution([2, 1, 2]))
        );
        assert_eq!(
            base.clone().with_cell_size(0.0).validate(),
            Err(MarchingCubesError::InvalidCellSize(0.0))
        );
        assert!(matches!(
            base.clone().with_cell_size(Value::NAN).validate(),
            Err(MarchingCubesError::InvalidCellSize(_))
        ));
        assert_eq!(
            base.clone().with_normal_step(-0.1).validate(),
            Err(MarchingCubesError::InvalidNormalStep(-0.1))
        );
        assert!(matches!(
            base.with_iso_level(Value::INFINITY).validate(),
            Err(MarchingCubesError::InvalidIsoLevel(_))
        ));
    }

    #[test]
    fn origin_centres_the_volume() {
        let config = ExtractionConfig::default()
            .with_resolution([10, 20, 40])
            .with_cell_size(0.5);
        let origin = config.origin_for(Point::new(1.0, 2.0, 3.0));
        assert_relative_eq!(origin.x, 1.0 - 2.5);
        assert_relative_eq!(origin.y, 2.0 - 5.0);
        assert_relative_eq!(origin.z, 3.0 - 10.0);
    }
}
