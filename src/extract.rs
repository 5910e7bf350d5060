use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use log::{debug, warn};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::debug_span;

use crate::{
    append::AppendBuffer,
    config::{ExtractionConfig, ExtractionMode},
    cube::{MarchParams, polygonise},
    error::{MarchingCubesError, Result},
    field::ScalarField,
    grid::Grid,
    mesh::{MarchMesh, Triangle},
};

/// Bookkeeping for the most recent successful extraction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Number of successful extractions so far, this one included.
    pub frame: u64,
    pub cells: usize,
    pub triangles: usize,
    /// Triangles dropped for a degenerate edge or a missing normal.
    pub skipped_triangles: usize,
    /// Triangles rejected by a full append buffer (parallel mode only).
    pub overflowed_triangles: usize,
    pub duration: Duration,
}

/// Re-extracts an isosurface from a field once per frame.
///
/// Owns every per-frame buffer, all allocated up front: the sample grid, two
/// meshes, and in parallel mode the append buffer. A frame is built in the back
/// mesh and only swapped to the front once it is complete, so a rejected frame
/// leaves the previous mesh untouched.
///
/// ```text
/// step(field, t)
///   → field.update(t)                 (once)
///   → grid.recentre(field.centre())
///   → grid.sample / par_sample        (W·H·D evaluations)
///   → march every cell                (serial, or rayon + AppendBuffer)
///   → swap back/front
/// ```
pub struct Extractor {
    config: ExtractionConfig,
    grid: Grid,
    front: MarchMesh,
    back: MarchMesh,
    append: Option<AppendBuffer<Triangle>>,
    stats: FrameStats,
}

impl Extractor {
    /// Validates `config` and allocates the buffers it asks for.
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        let append = match config.mode {
            ExtractionMode::Serial => None,
            ExtractionMode::Parallel => Some(AppendBuffer::new(config.max_triangles())),
        };
        Ok(Self {
            grid: Grid::new(config.resolution, config.cell_size),
            front: MarchMesh::new_empty(),
            back: MarchMesh::new_empty(),
            append,
            stats: FrameStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// The most recently completed mesh.
    pub fn mesh(&self) -> &MarchMesh {
        &self.front
    }

    /// Samples from the most recent extraction attempt.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Advances `field` to `time`, then extracts.
    pub fn step<F: ScalarField + ?Sized>(&mut self, field: &mut F, time: f32) -> Result<&MarchMesh> {
        field.update(time);
        self.extract(field)
    }

    /// Samples `field` and rebuilds the mesh without advancing time.
    ///
    /// Returns [`MarchingCubesError::NonFiniteSample`] if the field yields NaN or
    /// infinity anywhere on the grid; [`mesh`](Extractor::mesh) then still
    /// returns the previous frame.
    pub fn extract<F: ScalarField + ?Sized>(&mut self, field: &F) -> Result<&MarchMesh> {
        let started = Instant::now();
        self.grid.recentre(field.centre());

        {
            let _span = debug_span!("sample", cells = self.grid.cell_count()).entered();
            match self.config.mode {
                ExtractionMode::Serial => self.grid.sample(field),
                ExtractionMode::Parallel => self.grid.par_sample(field),
            }
        }

        if let Some(index) = self.grid.first_non_finite() {
            warn!("skipping frame: non-finite field sample at {index:?}");
            return Err(MarchingCubesError::NonFiniteSample(index));
        }

        let params = MarchParams {
            cell_size: self.config.cell_size,
            iso_level: self.config.iso_level,
            normal_step: self.config.normal_step,
        };

        self.back.clear();
        let (skipped, overflowed) = {
            let _span = debug_span!("march").entered();
            match self.append.as_mut() {
                None => march_serial(&self.grid, field, &params, &mut self.back),
                Some(append) => march_parallel(&self.grid, field, &params, append, &mut self.back),
            }
        };
        std::mem::swap(&mut self.front, &mut self.back);

        if overflowed > 0 {
            warn!("append buffer full: dropped {overflowed} triangles");
        }
        if skipped > 0 {
            warn!("skipped {skipped} degenerate triangles");
        }

        self.stats = FrameStats {
            frame: self.stats.frame + 1,
            cells: self.grid.cell_count(),
            triangles: self.front.triangle_count(),
            skipped_triangles: skipped,
            overflowed_triangles: overflowed,
            duration: started.elapsed(),
        };
        debug!(
            "frame {}: {} triangles from {} cells in {:?}",
            self.stats.frame, self.stats.triangles, self.stats.cells, self.stats.duration
        );

        Ok(&self.front)
    }
}

/// Marches cells in `(i, j, k)` order on the calling thread.
///
/// Returns the number of skipped triangles; serial output never overflows.
fn march_serial<F: ScalarField + ?Sized>(
    grid: &Grid,
    field: &F,
    params: &MarchParams,
    mesh: &mut MarchMesh,
) -> (usize, usize) {
    let mut skipped = 0;
    for n in 0..grid.cell_count() {
        let [i, j, k] = grid.cell_index(n);
        let report = polygonise(&grid.cube(i, j, k), field, params, |tri| mesh.push_triangle(&tri));
        skipped += report.skipped;
    }
    (skipped, 0)
}

/// Marches cells on the rayon pool.
///
/// Workers reserve output slots through the buffer's atomic counter. The
/// parallel iterator returning is the barrier; only then is the live prefix
/// drained into `mesh`.
fn march_parallel<F: ScalarField + ?Sized>(
    grid: &Grid,
    field: &F,
    params: &MarchParams,
    append: &mut AppendBuffer<Triangle>,
    mesh: &mut MarchMesh,
) -> (usize, usize) {
    let skipped = AtomicUsize::new(0);
    {
        let sink = &*append;
        (0..grid.cell_count()).into_par_iter().for_each(|n| {
            let [i, j, k] = grid.cell_index(n);
            let report = polygonise(&grid.cube(i, j, k), field, params, |tri| {
                // Rejections are recounted by drain().
                let _ = sink.append(tri);
            });
            if report.skipped > 0 {
                skipped.fetch_add(report.skipped, Ordering::Relaxed);
            }
        });
    }

    let drained = append.drain();
    mesh.extend_triangles(&drained.items);
    (skipped.into_inner(), drained.overflowed)
}

/// One-shot extraction of `field` as it is now.
pub fn extract_mesh<F: ScalarField + ?Sized>(field: &F, config: ExtractionConfig) -> Result<MarchMesh> {
    let mut extractor = Extractor::new(config)?;
    extractor.extract(field)?;
    Ok(extractor.front)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{FnField, SphereField},
        types::{Point, Value},
    };

    fn small(mode: ExtractionMode) -> ExtractionConfig {
        ExtractionConfig::default()
            .with_resolution([12, 12, 12])
            .with_cell_size(0.25)
            .with_mode(mode)
    }

    #[test]
    fn invalid_config_is_rejected_at_setup() {
        let err = Extractor::new(small(ExtractionMode::Serial).with_resolution([1, 8, 8]));
        assert!(matches!(err, Err(MarchingCubesError::InvalidResolution(_))));
    }

    #[test]
    fn extraction_fills_stats() {
        let sphere = SphereField::new(Point::origin(), 1.0);
        let mut extractor = Extractor::new(small(ExtractionMode::Serial)).unwrap();
        let triangles = extractor.extract(&sphere).unwrap().triangle_count();

        let stats = extractor.stats();
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.cells, 11 * 11 * 11);
        assert_eq!(stats.triangles, triangles);
        assert!(triangles > 0);
        assert_eq!(stats.skipped_triangles, 0);
        assert_eq!(stats.overflowed_triangles, 0);
    }

    #[test]
    fn non_finite_frame_keeps_previous_mesh() {
        let mut extractor = Extractor::new(small(ExtractionMode::Serial)).unwrap();
        let good = extractor
            .extract(&SphereField::new(Point::origin(), 1.0))
            .unwrap()
            .clone();

        let broken = FnField::new(Point::origin(), |p: Point| {
            if p.x > 0.9 { Value::NAN } else { p.coords.norm() - 1.0 }
        });
        let err = extractor.extract(&broken);
        assert!(matches!(err, Err(MarchingCubesError::NonFiniteSample(_))));
        assert_eq!(extractor.mesh(), &good);
        assert_eq!(extractor.stats().frame, 1);
    }

    #[test]
    fn parallel_matches_serial_content() {
        let sphere = SphereField::new(Point::new(0.05, -0.1, 0.2), 1.1);
        let serial = extract_mesh(&sphere, small(ExtractionMode::Serial)).unwrap();
        let parallel = extract_mesh(&sphere, small(ExtractionMode::Parallel)).unwrap();

        assert_eq!(serial.triangle_count(), parallel.triangle_count());
        assert_eq!(parallel.indices, (0..parallel.vertex_count() as u32).collect::<Vec<_>>());

        let key = |m: &MarchMesh| {
            let mut tris: Vec<Vec<u32>> = (0..m.triangle_count())
                .map(|t| {
                    m.tri_coords(t)
                        .iter()
                        .flat_map(|p| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
                        .collect()
                })
                .collect();
            tris.sort();
            tris
        };
        assert_eq!(key(&serial), key(&parallel));
    }

    #[test]
    fn parallel_buffer_is_reused_across_frames() {
        let sphere = SphereField::new(Point::origin(), 1.0);
        let mut extractor = Extractor::new(small(ExtractionMode::Parallel)).unwrap();
        let first = extractor.extract(&sphere).unwrap().triangle_count();
        let second = extractor.extract(&sphere).unwrap().triangle_count();
        assert_eq!(first, second);
        assert_eq!(extractor.stats().frame, 2);
    }
}
