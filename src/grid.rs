use ndarray::{Array3, Zip};

use crate::{
    cube::Cube,
    field::ScalarField,
    tables::CUBE_CORNERS,
    types::{Point, Value, Vector},
};

/// A dense lattice of field samples, re-filled every frame.
///
/// The grid has `W × H × D` sample points and `(W-1) × (H-1) × (D-1)` cells.
/// Values are stored as `values[[i, j, k]]` and satisfy
///
/// ```text
/// values[[i, j, k]] == F(origin + (i, j, k) * cell_size)
/// ```
///
/// after the most recent [`sample`](Grid::sample). The backing array is allocated
/// once in [`new`](Grid::new) and only overwritten afterwards.
#[derive(Clone, Debug)]
pub struct Grid {
    cell_size: Value,
    origin: Point,
    values: Array3<Value>,
}

impl Grid {
    /// Creates a grid of `resolution` samples, all initialised to `0.0`.
    pub fn new(resolution: [usize; 3], cell_size: Value) -> Self {
        Self {
            cell_size,
            origin: Point::origin(),
            values: Array3::zeros(resolution),
        }
    }

    /// Sample counts along X, Y and Z.
    pub fn resolution(&self) -> [usize; 3] {
        let (w, h, d) = self.values.dim();
        [w, h, d]
    }

    pub fn cell_size(&self) -> Value {
        self.cell_size
    }

    /// World-space position of sample `(0, 0, 0)`.
    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn values(&self) -> &Array3<Value> {
        &self.values
    }

    /// Number of cubes between the samples.
    pub fn cell_count(&self) -> usize {
        self.resolution()
            .iter()
            .map(|n| n.saturating_sub(1))
            .product()
    }

    /// World-space size of the sampled volume (`resolution × cell_size`).
    pub fn extent(&self) -> Vector {
        let [w, h, d] = self.resolution();
        Vector::new(w as Value, h as Value, d as Value) * self.cell_size
    }

    /// Moves the grid so that the sampled volume is centred on `centre`.
    pub fn recentre(&mut self, centre: Point) {
        self.origin = centre - self.extent() / 2.0;
    }

    /// World-space position of sample `(i, j, k)`.
    #[inline]
    pub fn position(&self, i: usize, j: usize, k: usize) -> Point {
        self.origin + Vector::new(i as Value, j as Value, k as Value) * self.cell_size
    }

    /// Returns the field value at sample `(i, j, k)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Value {
        self.values[[i, j, k]]
    }

    /// Evaluates `field` at every sample on the calling thread.
    pub fn sample<F: ScalarField + ?Sized>(&mut self, field: &F) {
        let (origin, cell_size) = (self.origin, self.cell_size);
        self.values.indexed_iter_mut().for_each(|((i, j, k), v)| {
            *v = field.value(sample_position(origin, cell_size, i, j, k));
        });
    }

    /// Like [`sample`](Grid::sample), but spreads the evaluations over the rayon pool.
    pub fn par_sample<F: ScalarField + ?Sized>(&mut self, field: &F) {
        let (origin, cell_size) = (self.origin, self.cell_size);
        Zip::indexed(&mut self.values).par_for_each(|(i, j, k), v| {
            *v = field.value(sample_position(origin, cell_size, i, j, k));
        });
    }

    /// Index of the first sample that is NaN or infinite, if any.
    pub fn first_non_finite(&self) -> Option<[usize; 3]> {
        self.values
            .indexed_iter()
            .find(|(_, v)| !v.is_finite())
            .map(|((i, j, k), _)| [i, j, k])
    }

    /// Gathers the cube whose minimum corner is sample `(i, j, k)`.
    ///
    /// Corners follow [`CUBE_CORNERS`]:
    ///
    /// ```text
    ///  0 = (i,   j,   k  )    4 = (i,   j,   k+1)
    ///  1 = (i+1, j,   k  )    5 = (i+1, j,   k+1)
    ///  2 = (i+1, j+1, k  )    6 = (i+1, j+1, k+1)
    ///  3 = (i,   j+1, k  )    7 = (i,   j+1, k+1)
    /// ```
    #[inline]
    pub fn cube(&self, i: usize, j: usize, k: usize) -> Cube {
        let values = CUBE_CORNERS.map(|[di, dj, dk]| self.values[[i + di, j + dj, k + dk]]);
        Cube {
            values,
            index: [i, j, k],
            shift: self.position(i, j, k),
        }
    }

    /// Maps a flat cell number in `0..cell_count()` to its `(i, j, k)` index,
    /// with `k` varying fastest.
    #[inline]
    pub fn cell_index(&self, n: usize) -> [usize; 3] {
        let [_, h, d] = self.resolution();
        let (ch, cd) = (h - 1, d - 1);
        [n / (ch * cd), (n / cd) % ch, n % cd]
    }
}

#[inline]
fn sample_position(origin: Point, cell_size: Value, i: usize, j: usize, k: usize) -> Point {
    origin + Vector::new(i as Value, j as Value, k as Value) * cell_size
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::field::{FnField, SphereField};

    #[test]
    fn recentre_puts_centre_in_the_middle() {
        let mut grid = Grid::new([4, 6, 8], 0.5);
        grid.recentre(Point::new(10.0, 0.0, -1.0));
        assert_relative_eq!(grid.origin(), Point::new(9.0, -1.5, -3.0));
        assert_relative_eq!(grid.position(2, 3, 4), Point::new(10.0, 0.0, -1.0));
        assert_eq!(grid.cell_count(), 3 * 5 * 7);
    }

    #[test]
    fn samples_match_field_at_positions() {
        let field = FnField::new(Point::origin(), |p: Point| p.x + 10.0 * p.y + 100.0 * p.z);
        let mut grid = Grid::new([3, 4, 5], 0.25);
        grid.recentre(Point::new(1.0, 2.0, 3.0));
        grid.sample(&field);

        for ((i, j, k), &v) in grid.values().indexed_iter() {
            assert_relative_eq!(v, field.value(grid.position(i, j, k)), epsilon = 1e-4);
        }
    }

    #[test]
    fn parallel_sampling_matches_serial() {
        let field = SphereField::new(Point::new(0.1, -0.2, 0.3), 1.0);
        let mut serial = Grid::new([9, 7, 11], 0.3);
        let mut parallel = serial.clone();
        serial.sample(&field);
        parallel.par_sample(&field);
        assert_eq!(serial.values(), parallel.values());
    }

    #[test]
    fn resampling_overwrites_in_place() {
        let mut grid = Grid::new([5, 5, 5], 1.0);
        let ptr = grid.values().as_ptr();
        grid.sample(&SphereField::new(Point::origin(), 1.0));
        grid.sample(&SphereField::new(Point::origin(), 2.0));
        assert_eq!(grid.values().as_ptr(), ptr);
        assert_relative_eq!(grid.get(2, 2, 2), 12.0f32.sqrt() - 2.0, epsilon = 1e-5);
    }

    #[test]
    fn cube_gathers_corners_in_table_order() {
        let field = FnField::new(Point::origin(), |p: Point| p.x + 2.0 * p.y + 4.0 * p.z);
        let mut grid = Grid::new([3, 3, 3], 1.0);
        grid.sample(&field);

        let cube = grid.cube(1, 0, 1);
        assert_eq!(cube.index, [1, 0, 1]);
        assert_eq!(cube.shift, grid.position(1, 0, 1));
        for (corner, &[di, dj, dk]) in CUBE_CORNERS.iter().enumerate() {
            assert_eq!(cube.values[corner], grid.get(1 + di, dj, 1 + dk));
        }
    }

    #[test]
    fn cell_index_walks_every_cell_once() {
        let grid = Grid::new([3, 4, 5], 1.0);
        let mut cells: Vec<[usize; 3]> = (0..grid.cell_count()).map(|n| grid.cell_index(n)).collect();
        assert_eq!(cells[0], [0, 0, 0]);
        assert_eq!(cells[1], [0, 0, 1]);
        assert_eq!(*cells.last().unwrap(), [1, 2, 3]);
        cells.sort();
        cells.dedup();
        assert_eq!(cells.len(), 2 * 3 * 4);
    }

    #[test]
    fn non_finite_samples_are_found() {
        let field = FnField::new(Point::origin(), |p: Point| if p.x > 0.5 { Value::NAN } else { p.x });
        let mut grid = Grid::new([3, 2, 2], 1.0);
        grid.sample(&field);
        assert_eq!(grid.first_non_finite(), Some([1, 0, 0]));
    }
}
