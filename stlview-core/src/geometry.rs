//! Triangle-soup geometry and bounding boxes

use crate::point::{Point3f, Vector3f};
use serde::{Deserialize, Serialize};

/// A triangle-soup geometry with per-vertex normals.
///
/// Positions come in groups of three (one group per facet) and every
/// position has a matching normal. Invariant:
/// `positions.len() == 3 * triangle_count() == normals.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    pub positions: Vec<Point3f>,
    pub normals: Vec<Vector3f>,
    framed: bool,
}

impl Geometry {
    /// Create a new empty geometry
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            framed: false,
        }
    }

    /// Create a geometry with pre-allocated capacity for `triangles` facets
    pub fn with_capacity(triangles: usize) -> Self {
        Self {
            positions: Vec::with_capacity(triangles * 3),
            normals: Vec::with_capacity(triangles * 3),
            framed: false,
        }
    }

    /// Get the number of triangles
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Check if the geometry is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Append one facet: three positions sharing a single normal
    pub fn push_facet(&mut self, vertices: [Point3f; 3], normal: Vector3f) {
        self.positions.extend_from_slice(&vertices);
        self.normals.extend_from_slice(&[normal; 3]);
    }

    /// Compute the axis-aligned bounding box of all positions
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Re-center the geometry on its bounding-box centroid, then apply a
    /// uniform scale. Centering and scaling happen once, in that order; a
    /// geometry that has already been framed is left untouched.
    pub fn center_and_scale(&mut self, scale: f32) {
        if self.framed || self.is_empty() {
            return;
        }
        let center = self.bounding_box().center();
        for p in &mut self.positions {
            *p = (*p - center) * scale;
        }
        self.framed = true;
    }

    /// Whether `center_and_scale` has already been applied
    pub fn is_framed(&self) -> bool {
        self.framed
    }

    /// Recompute per-facet normals from vertex winding and broadcast them to
    /// the facet's three vertices. Needed for correct lighting when the
    /// source file carries zero or garbage facet normals.
    pub fn recompute_normals(&mut self) {
        for (i, chunk) in self.positions.chunks_exact(3).enumerate() {
            let edge1 = chunk[1] - chunk[0];
            let edge2 = chunk[2] - chunk[0];
            let cross = edge1.cross(&edge2);
            let normal = if cross.norm() > f32::EPSILON {
                cross.normalize()
            } else {
                Vector3f::new(0.0, 0.0, 1.0)
            };
            self.normals[i * 3] = normal;
            self.normals[i * 3 + 1] = normal;
            self.normals[i * 3 + 2] = normal;
        }
    }

    /// Release the geometry's buffers. Vertex data can be large; callers
    /// that keep a `Geometry` alive past the render step should drop its
    /// contents explicitly.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.positions.shrink_to_fit();
        self.normals.clear();
        self.normals.shrink_to_fit();
        self.framed = false;
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3f,
    pub max: Point3f,
}

impl BoundingBox {
    /// Compute the bounding box of a set of points.
    ///
    /// An empty slice yields a degenerate box at the origin.
    pub fn from_points(points: &[Point3f]) -> Self {
        if points.is_empty() {
            return Self {
                min: Point3f::origin(),
                max: Point3f::origin(),
            };
        }
        let mut min = points[0];
        let mut max = points[0];
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Self { min, max }
    }

    /// The box centroid
    pub fn center(&self) -> Vector3f {
        (self.min.coords + self.max.coords) * 0.5
    }

    /// Per-axis extent
    pub fn size(&self) -> Vector3f {
        self.max - self.min
    }

    /// Largest per-axis extent
    pub fn max_dimension(&self) -> f32 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_triangle() -> Geometry {
        let mut g = Geometry::new();
        g.push_facet(
            [
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            Vector3f::new(0.0, 0.0, 1.0),
        );
        g
    }

    #[test]
    fn facet_counts_stay_in_lockstep() {
        let g = unit_triangle();
        assert_eq!(g.triangle_count(), 1);
        assert_eq!(g.positions.len(), 3);
        assert_eq!(g.normals.len(), 3);
    }

    #[test]
    fn bounding_box_of_cube_corners() {
        let points = vec![
            Point3f::new(-1.0, -2.0, -3.0),
            Point3f::new(1.0, 2.0, 3.0),
            Point3f::new(0.0, 0.0, 0.0),
        ];
        let bb = BoundingBox::from_points(&points);
        assert_eq!(bb.min, Point3f::new(-1.0, -2.0, -3.0));
        assert_eq!(bb.max, Point3f::new(1.0, 2.0, 3.0));
        assert_relative_eq!(bb.max_dimension(), 6.0);
        assert_relative_eq!(bb.center().x, 0.0);
    }

    #[test]
    fn center_and_scale_applies_once() {
        let mut g = unit_triangle();
        g.center_and_scale(2.0);
        assert!(g.is_framed());
        let bb = g.bounding_box();
        assert_relative_eq!(bb.center().norm(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(bb.max_dimension(), 2.0, epsilon = 1e-6);

        // A second call must not re-transform the data.
        let before = g.positions.clone();
        g.center_and_scale(10.0);
        assert_eq!(g.positions, before);
    }

    #[test]
    fn recompute_normals_from_winding() {
        let mut g = unit_triangle();
        g.normals = vec![Vector3f::zeros(); 3];
        g.recompute_normals();
        for n in &g.normals {
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn empty_geometry_has_degenerate_bounds() {
        let g = Geometry::new();
        assert!(g.is_empty());
        assert_eq!(g.bounding_box().max_dimension(), 0.0);
    }
}
