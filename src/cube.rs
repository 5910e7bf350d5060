use crate::{
    field::ScalarField,
    interp::{find_t, interpolate_points},
    mesh::{MeshVertex, Triangle, face_normal},
    tables::{CUBE_CORNERS, CUBE_EDGES, case_triangles},
    types::{Point, Value, Vector},
};

/// One grid cell while it is being marched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cube {
    /// Field values at the 8 corners, ordered as [`CUBE_CORNERS`].
    pub values: [Value; 8],
    /// Grid index of corner 0.
    pub index: [usize; 3],
    /// World-space position of corner 0.
    pub shift: Point,
}

/// Per-pass constants needed to turn a cube into triangles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarchParams {
    pub cell_size: Value,
    pub iso_level: Value,
    pub normal_step: Value,
}

/// What [`polygonise`] did with one cube.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CubeReport {
    pub emitted: usize,
    /// Triangles dropped because an edge crossing or every normal was unusable.
    pub skipped: usize,
}

impl Cube {
    /// Computes the marching cubes case bitmask.
    ///
    /// A bit is set when the corner's value is **above** the iso level:
    ///
    /// ```text
    /// corner index:  7  6  5  4  3  2  1  0
    /// case bits:    [_][_][_][_][_][_][_][_]
    ///                                     ^-- corner 0 outside?
    /// ```
    #[inline]
    pub fn case_index(&self, iso_level: Value) -> usize {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > iso_level)
            .fold(0, |case, (i, _)| case | (1 << i))
    }

    /// Where along `edge` (from its first corner to its second) the field
    /// reaches `iso_level`.
    ///
    /// On an edge picked by the case table the corners lie on opposite sides of
    /// the iso level, so the values differ and `t` lands in `[0, 1]`. `None`
    /// covers the remaining cases: equal or non-finite values.
    #[inline]
    pub fn edge_crossing(&self, edge: usize, iso_level: Value) -> Option<Value> {
        let [a, b] = CUBE_EDGES[edge];
        find_t(self.values[a], self.values[b], iso_level).filter(|t| (0.0..=1.0).contains(t))
    }

    /// World-space point where the surface crosses `edge`.
    ///
    /// ```text
    /// p = shift + cell_size * lerp(corner[a], corner[b], t)
    /// ```
    #[inline]
    pub fn edge_point(&self, edge: usize, cell_size: Value, iso_level: Value) -> Option<Point> {
        let t = self.edge_crossing(edge, iso_level)?;
        let [a, b] = CUBE_EDGES[edge];
        let local = interpolate_points(corner_point(a), corner_point(b), t);
        Some(self.shift + local.coords * cell_size)
    }
}

#[inline]
fn corner_point(corner: usize) -> Point {
    let [x, y, z] = CUBE_CORNERS[corner];
    Point::new(x as Value, y as Value, z as Value)
}

/// Unit field gradient at `p` by central differences:
///
/// ```text
/// n = normalize(F(p+dx) - F(p-dx), F(p+dy) - F(p-dy), F(p+dz) - F(p-dz))
/// ```
///
/// Points towards increasing `F`. Returns `None` where the gradient vanishes.
pub fn gradient_normal<F: ScalarField + ?Sized>(field: &F, p: Point, step: Value) -> Option<Vector> {
    let diff = |axis: Vector| field.value(p + axis * step) - field.value(p - axis * step);
    let g = Vector::new(diff(Vector::x()), diff(Vector::y()), diff(Vector::z()));
    let len = g.norm();
    (len > 0.0 && len.is_finite()).then(|| g / len)
}

/// Turns one cube into triangles, handing each to `emit` in case-table order.
///
/// Vertex normals come from [`gradient_normal`]. A vertex sitting where the
/// gradient vanishes borrows its triangle's face normal instead; a triangle with
/// an unusable edge crossing, or with no normal at all, is skipped.
///
/// ```text
/// 1. case_index                 →  256-entry lookup key
/// 2. case_triangles             →  up to 5 edge triples
/// 3. edge_point (×3)            →  interpolated positions
/// 4. gradient_normal (×3)       →  6 extra field evaluations per vertex
/// ```
pub fn polygonise<F, E>(cube: &Cube, field: &F, params: &MarchParams, mut emit: E) -> CubeReport
where
    F: ScalarField + ?Sized,
    E: FnMut(Triangle),
{
    let mut report = CubeReport::default();
    let case = cube.case_index(params.iso_level);

    'tri: for tri in case_triangles(case) {
        let mut positions = [Point::origin(); 3];
        for (slot, &edge) in positions.iter_mut().zip(tri) {
            match cube.edge_point(edge as usize, params.cell_size, params.iso_level) {
                Some(p) => *slot = p,
                None => {
                    report.skipped += 1;
                    continue 'tri;
                }
            }
        }

        let [a, b, c] = positions;
        let face = face_normal(a, b, c);
        let mut out = [MeshVertex::default(); 3];
        for (vertex, p) in out.iter_mut().zip(positions) {
            let Some(n) = gradient_normal(field, p, params.normal_step).or(face) else {
                report.skipped += 1;
                continue 'tri;
            };
            *vertex = MeshVertex {
                position: [p.x, p.y, p.z],
                normal: [n.x, n.y, n.z],
            };
        }

        emit(out);
        report.emitted += 1;
    }

    report
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        field::{FnField, SphereField},
        tables::CASE_TO_TRIANGLE_COUNT,
    };

    const PARAMS: MarchParams = MarchParams {
        cell_size: 1.0,
        iso_level: 0.0,
        normal_step: 0.01,
    };

    fn cube(values: [Value; 8]) -> Cube {
        Cube {
            values,
            index: [0, 0, 0],
            shift: Point::origin(),
        }
    }

    #[test]
    fn case_index_sets_bits_for_positive_corners() {
        assert_eq!(cube([-1.0; 8]).case_index(0.0), 0);
        assert_eq!(cube([1.0; 8]).case_index(0.0), 255);

        let mut values = [-1.0; 8];
        values[0] = 1.0;
        values[6] = 0.5;
        assert_eq!(cube(values).case_index(0.0), 0b0100_0001);
        // Zero is not above the iso level.
        values[3] = 0.0;
        assert_eq!(cube(values).case_index(0.0), 0b0100_0001);
        assert_eq!(cube(values).case_index(0.75), 0b0000_0001);
    }

    #[test]
    fn uniform_sign_cubes_emit_nothing() {
        let field = SphereField::new(Point::origin(), 1.0);
        for values in [[2.0; 8], [-2.0; 8], [0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]] {
            let mut count = 0;
            let report = polygonise(&cube(values), &field, &PARAMS, |_| count += 1);
            assert_eq!(count, 0);
            assert_eq!(report, CubeReport::default());
        }
    }

    #[test]
    fn negated_values_give_complement_case() {
        let values = [0.3, -0.2, 0.9, -1.1, 0.4, -0.5, 0.6, 0.7];
        let negated = values.map(|v| -v);
        assert_eq!(cube(values).case_index(0.0), !cube(negated).case_index(0.0) & 0xff);
    }

    #[test]
    fn edge_point_matches_reference_formula() {
        let values = [-1.0, 3.0, 3.0, -1.0, -1.0, 3.0, 3.0, -1.0];
        let c = Cube {
            values,
            index: [2, 0, 0],
            shift: Point::new(2.0, 0.0, 0.0),
        };
        // Edge 0 joins corners 0 and 1 along +X; crossing at t = 0.25.
        assert_relative_eq!(c.edge_crossing(0, 0.0).unwrap(), 0.25);
        let p = c.edge_point(0, 0.5, 0.0).unwrap();
        assert_relative_eq!(p, Point::new(2.125, 0.0, 0.0));

        // (v[a] * F[b] - v[b] * F[a]) / (F[b] - F[a])
        let (fa, fb) = (values[0], values[1]);
        let va = Vector::zeros();
        let vb = Vector::x();
        let reference = (va * fb - vb * fa) / (fb - fa);
        assert_relative_eq!(p, c.shift + reference * 0.5);
    }

    #[test]
    fn equal_corner_values_have_no_crossing() {
        let c = cube([1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0]);
        assert_eq!(c.edge_crossing(0, 0.0), None);
        assert_eq!(c.edge_point(0, 1.0, 0.0), None);
    }

    #[test]
    fn gradient_normal_is_unit_and_radial() {
        let field = SphereField::new(Point::origin(), 1.0);
        let n = gradient_normal(&field, Point::new(0.0, 2.0, 0.0), 0.01).unwrap();
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(n, Vector::y(), epsilon = 1e-4);

        let flat = FnField::new(Point::origin(), |_| 1.0);
        assert_eq!(gradient_normal(&flat, Point::origin(), 0.01), None);
    }

    #[test]
    fn every_case_emits_table_count_with_interior_vertices() {
        let field = SphereField::new(Point::new(0.5, 0.5, 0.5), 0.4);
        for case in 0..256usize {
            let values: [Value; 8] =
                std::array::from_fn(|i| if case & (1 << i) != 0 { 1.0 } else { -1.0 });
            let c = cube(values);
            assert_eq!(c.case_index(0.0), case);

            let mut tris = Vec::new();
            let report = polygonise(&c, &field, &PARAMS, |t| tris.push(t));
            assert_eq!(report.emitted, CASE_TO_TRIANGLE_COUNT[case] as usize);
            assert_eq!(report.skipped, 0);

            for v in tris.iter().flatten() {
                // ±1 corners put every crossing at an edge midpoint.
                assert!(v.position.iter().all(|&x| (0.0..=1.0).contains(&x)));
                let n = Vector::from(v.normal);
                assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn vanishing_gradient_falls_back_to_face_normal() {
        let flat = FnField::new(Point::origin(), |_| 0.0);
        let mut values = [-1.0; 8];
        values[0] = 1.0;

        let mut tris = Vec::new();
        let report = polygonise(&cube(values), &flat, &PARAMS, |t| tris.push(t));
        assert_eq!(report.emitted, 1);

        let expected = -Vector::new(1.0, 1.0, 1.0).normalize();
        for v in &tris[0] {
            assert_relative_eq!(Vector::from(v.normal), expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn non_finite_corner_skips_triangle() {
        let field = SphereField::new(Point::origin(), 1.0);
        let mut values = [-1.0; 8];
        values[0] = Value::INFINITY;

        let mut count = 0;
        let report = polygonise(&cube(values), &field, &PARAMS, |_| count += 1);
        assert_eq!(count, 0);
        assert_eq!(report.skipped, 1);
    }
}
