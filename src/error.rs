use derive_more::Display;

use crate::types::Value;

pub type Result<T> = core::result::Result<T, MarchingCubesError>;

#[derive(Debug, Display, Clone, PartialEq)]
#[display("{self:?}")]
pub enum MarchingCubesError {
    /// Every grid axis needs at least two samples to hold one cell.
    InvalidResolution([usize; 3]),
    InvalidCellSize(Value),
    InvalidNormalStep(Value),
    InvalidIsoLevel(Value),
    /// A metaball field was built without any balls.
    EmptyField,
    InvalidBallRadius { index: usize, radius: Value },
    InvalidSmoothing(Value),
    /// The field produced NaN or infinity at this grid sample; the frame was skipped.
    NonFiniteSample([usize; 3]),
}

impl std::error::Error for MarchingCubesError {}
