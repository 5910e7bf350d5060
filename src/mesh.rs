use crate::types::{Point, Vector};

/// One vertex as handed to the renderer: position then normal, 3×f32 each.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Three vertices in emission order.
pub type Triangle = [MeshVertex; 3];

/// Mesh produced by one extraction pass.
///
/// Vertices are not shared: every group of three consecutive vertices forms one
/// triangle, and `indices` simply counts `0, 1, 2, ...`. Normals come from the
/// field gradient, so shading is smooth even though geometry is duplicated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarchMesh {
    /// Vertex positions: `[[x, y, z], ...]`
    pub vertices: Vec<[f32; 3]>,

    /// Unit normals, parallel to `vertices`.
    pub normals: Vec<[f32; 3]>,

    /// Triangle list indices into `vertices`.
    pub indices: Vec<u32>,
}

impl MarchMesh {
    /// Creates an empty mesh with no vertices, normals, or indices.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Creates an empty mesh with room for `triangles` triangles.
    pub fn with_capacity(triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(3 * triangles),
            normals: Vec::with_capacity(3 * triangles),
            indices: Vec::with_capacity(3 * triangles),
        }
    }

    /// Drops all geometry but keeps the allocations for the next frame.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.normals.clear();
        self.indices.clear();
    }

    /// Appends a triangle and its three sequential indices.
    pub fn push_triangle(&mut self, tri: &Triangle) {
        for v in tri {
            self.indices.push(self.vertices.len() as u32);
            self.vertices.push(v.position);
            self.normals.push(v.normal);
        }
    }

    pub fn extend_triangles<'a, I>(&mut self, tris: I)
    where
        I: IntoIterator<Item = &'a Triangle>,
    {
        for tri in tris {
            self.push_triangle(tri);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns the three vertex positions of triangle `tri`.
    pub fn tri_coords(&self, tri: usize) -> [Point; 3] {
        [0, 1, 2].map(|k| Point::from(self.vertices[self.indices[3 * tri + k] as usize]))
    }

    /// Computes the counter-clockwise face normal for triangle `tri`.
    ///
    /// Returns the zero vector if the triangle is degenerate.
    pub fn tri_normal(&self, tri: usize) -> Vector {
        let [a, b, c] = self.tri_coords(tri);
        face_normal(a, b, c).unwrap_or_else(Vector::zeros)
    }

    /// Interleaved vertex stream matching [`MeshVertex`]'s layout.
    pub fn interleaved(&self) -> Vec<MeshVertex> {
        self.vertices
            .iter()
            .zip(&self.normals)
            .map(|(&position, &normal)| MeshVertex { position, normal })
            .collect()
    }
}

/// Unit normal of the counter-clockwise triangle `a, b, c`, or `None` if it has no area.
pub fn face_normal(a: Point, b: Point, c: Point) -> Option<Vector> {
    let cross = (b - a).cross(&(c - b));
    let nrm = cross.norm();
    if nrm == 0.0 || !nrm.is_finite() {
        None
    } else {
        Some(cross / nrm)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn vertex(position: [f32; 3]) -> MeshVertex {
        MeshVertex {
            position,
            normal: [0.0, 0.0, 1.0],
        }
    }

    fn unit_triangle() -> Triangle {
        [
            vertex([0.0, 0.0, 0.0]),
            vertex([1.0, 0.0, 0.0]),
            vertex([0.0, 1.0, 0.0]),
        ]
    }

    #[test]
    fn triangles_get_sequential_indices() {
        let mut mesh = MarchMesh::new_empty();
        mesh.extend_triangles(&[unit_triangle(), unit_triangle()]);

        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.index_count(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut mesh = MarchMesh::with_capacity(8);
        mesh.push_triangle(&unit_triangle());
        mesh.clear();
        assert!(mesh.is_empty());
        assert!(mesh.vertices.capacity() >= 24);
    }

    #[test]
    fn face_normal_follows_winding() {
        let mut mesh = MarchMesh::new_empty();
        mesh.push_triangle(&unit_triangle());
        assert_relative_eq!(mesh.tri_normal(0), Vector::new(0.0, 0.0, 1.0));

        let flat = [
            vertex([0.0, 0.0, 0.0]),
            vertex([1.0, 0.0, 0.0]),
            vertex([2.0, 0.0, 0.0]),
        ];
        mesh.push_triangle(&flat);
        assert_eq!(mesh.tri_normal(1), Vector::zeros());
    }

    #[test]
    fn interleaved_matches_streams() {
        let mut mesh = MarchMesh::new_empty();
        mesh.push_triangle(&unit_triangle());
        let interleaved = mesh.interleaved();
        assert_eq!(interleaved.len(), 3);
        assert_eq!(interleaved[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(interleaved[1].normal, [0.0, 0.0, 1.0]);
        assert_eq!(std::mem::size_of::<MeshVertex>(), 6 * std::mem::size_of::<f32>());
    }
}
