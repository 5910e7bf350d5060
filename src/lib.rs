pub mod append;
pub mod config;
pub mod cube;
pub mod error;
pub mod extract;
pub mod field;
pub mod grid;
pub mod interp;
pub mod mesh;
pub mod plugin;
pub mod tables;
pub mod types;

pub use config::{ExtractionConfig, ExtractionMode};
pub use extract::{Extractor, extract_mesh};
pub use field::{Blend, MetaBall, MetaBallField, ScalarField};
pub use plugin::{IsoSurface, MarchingCubesPlugin};
