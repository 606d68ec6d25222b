// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transformation chains and shape representations

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AngleUnit, Point};

/// Kind of a single transformation step
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TransformKind {
    Translation,
    Rotation,
}

impl TransformKind {
    /// Value of the `transformation_type` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Translation => "translation",
            TransformKind::Rotation => "rotation",
        }
    }
}

/// Target of a `depends_on` reference
///
/// `"."` terminates a chain; anything else is the absolute path of the
/// next transformation.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum DependsOn {
    Terminal,
    Path(String),
}

impl DependsOn {
    pub fn path(path: impl Into<String>) -> Self {
        DependsOn::Path(path.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DependsOn::Terminal)
    }

    pub fn as_path(&self) -> Option<&str> {
        match self {
            DependsOn::Terminal => None,
            DependsOn::Path(p) => Some(p),
        }
    }
}

impl fmt::Display for DependsOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependsOn::Terminal => write!(f, "."),
            DependsOn::Path(p) => write!(f, "{}", p),
        }
    }
}

impl From<&str> for DependsOn {
    fn from(s: &str) -> Self {
        if s == "." || s.is_empty() {
            DependsOn::Terminal
        } else {
            DependsOn::Path(s.to_string())
        }
    }
}

/// One step in a transformation chain
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct TransformNode {
    /// Local dataset name, e.g. `location` or `orientation`
    pub name: String,
    /// Absolute path in the hierarchy
    pub path: String,
    pub kind: TransformKind,
    /// Distance for translations, angle for rotations
    pub magnitude: f64,
    pub units: String,
    /// Unit direction (translation) or rotation axis
    pub vector: Point,
    pub offset: Option<Point>,
    pub depends_on: DependsOn,
}

impl TransformNode {
    /// Translation by `vector`, stored as unit direction and magnitude
    pub fn translation(path: impl Into<String>, vector: &Point, depends_on: DependsOn) -> Self {
        let path = path.into();
        let magnitude = vector.norm();
        let direction = if magnitude > 0.0 {
            vector / magnitude
        } else {
            Point::z()
        };
        Self {
            name: local_name(&path).to_string(),
            path,
            kind: TransformKind::Translation,
            magnitude,
            units: "m".to_string(),
            vector: direction,
            offset: None,
            depends_on,
        }
    }

    /// Rotation of `angle` about `axis`
    pub fn rotation(
        path: impl Into<String>,
        axis: &Point,
        angle: f64,
        units: AngleUnit,
        depends_on: DependsOn,
    ) -> Self {
        let path = path.into();
        Self {
            name: local_name(&path).to_string(),
            path,
            kind: TransformKind::Rotation,
            magnitude: angle,
            units: units.as_str().to_string(),
            vector: *axis,
            offset: None,
            depends_on,
        }
    }
}

/// Last element of a slash separated path
pub fn local_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Polygon mesh in the NeXus `NXoff_geometry` layout
///
/// `faces[i]` is the start of face `i` in `winding_order`; the face runs to
/// the start of the next face or the end of the winding order.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct OffMesh {
    pub vertices: Vec<Point>,
    pub faces: Vec<u32>,
    pub winding_order: Vec<u32>,
}

impl OffMesh {
    pub fn new(vertices: Vec<Point>, faces: Vec<u32>, winding_order: Vec<u32>) -> Self {
        Self {
            vertices,
            faces,
            winding_order,
        }
    }

    /// Build from a list of polygons given as vertex index lists
    pub fn from_polygons(vertices: Vec<Point>, polygons: &[Vec<u32>]) -> Self {
        let mut faces = Vec::with_capacity(polygons.len());
        let mut winding_order = Vec::with_capacity(polygons.iter().map(|p| p.len()).sum());
        for polygon in polygons {
            faces.push(winding_order.len() as u32);
            winding_order.extend_from_slice(polygon);
        }
        Self {
            vertices,
            faces,
            winding_order,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Vertex indices of face `i`
    pub fn face(&self, i: usize) -> &[u32] {
        let start = self.faces[i] as usize;
        let end = self
            .faces
            .get(i + 1)
            .map(|&f| f as usize)
            .unwrap_or(self.winding_order.len());
        &self.winding_order[start..end]
    }

    pub fn polygons(&self) -> impl Iterator<Item = &[u32]> + '_ {
        (0..self.face_count()).map(move |i| self.face(i))
    }

    /// Face starts increase monotonically and every index is in range
    pub fn is_well_formed(&self) -> bool {
        let vertex_count = self.vertices.len() as u32;
        let winding_len = self.winding_order.len() as u32;
        self.faces.windows(2).all(|w| w[0] < w[1])
            && self.faces.iter().all(|&f| f < winding_len.max(1))
            && self.faces.first().map_or(true, |&f| f == 0)
            && self.winding_order.iter().all(|&i| i < vertex_count)
    }

    /// Append another mesh, re-basing its indices
    pub fn append(&mut self, other: &OffMesh) {
        let vertex_offset = self.vertices.len() as u32;
        let winding_offset = self.winding_order.len() as u32;

        self.vertices.extend_from_slice(&other.vertices);
        self.faces
            .extend(other.faces.iter().map(|f| f + winding_offset));
        self.winding_order
            .extend(other.winding_order.iter().map(|i| i + vertex_offset));
    }

    /// Fan-triangulate every face for rendering
    pub fn triangulate(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::with_capacity(self.vertices.len(), self.winding_order.len() * 3);
        for v in &self.vertices {
            mesh.positions.extend_from_slice(&[v.x as f32, v.y as f32, v.z as f32]);
        }

        let mut normals = vec![Point::zeros(); self.vertices.len()];
        for polygon in self.polygons() {
            if polygon.len() < 3 {
                continue;
            }
            let a = polygon[0];
            for pair in polygon[1..].windows(2) {
                let (b, c) = (pair[0], pair[1]);
                mesh.indices.extend_from_slice(&[a, b, c]);
                let pa = self.vertices[a as usize];
                let normal = (self.vertices[b as usize] - pa).cross(&(self.vertices[c as usize] - pa));
                for i in [a, b, c] {
                    normals[i as usize] += normal;
                }
            }
        }

        for n in normals {
            let n = n.try_normalize(f64::EPSILON).unwrap_or_else(Point::zeros);
            mesh.normals.extend_from_slice(&[n.x as f32, n.y as f32, n.z as f32]);
        }
        mesh
    }
}

/// Cylinders in the NeXus `NXcylindrical_geometry` layout
///
/// Each cylinder is three vertex indices: centre of one end, a point on
/// that end's rim, centre of the other end.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct CylindricalMesh {
    pub vertices: Vec<Point>,
    pub cylinders: Vec<[u32; 3]>,
}

impl CylindricalMesh {
    pub fn cylinder_count(&self) -> usize {
        self.cylinders.len()
    }
}

/// A shape in either representation
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum ShapeKind {
    Off(OffMesh),
    Cylinders(CylindricalMesh),
}

impl ShapeKind {
    /// NeXus class of the group holding this shape
    pub fn nx_class(&self) -> &'static str {
        match self {
            ShapeKind::Off(_) => "NXoff_geometry",
            ShapeKind::Cylinders(_) => "NXcylindrical_geometry",
        }
    }
}

/// Shape group attached to a component
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GeometryGroup {
    /// `pixel_shape` when repeated at every pixel offset, else `shape`
    pub name: String,
    pub kind: ShapeKind,
    /// (face index, detector id) pairs for whole-detector meshes
    pub detector_faces: Vec<[i64; 2]>,
}

impl GeometryGroup {
    pub fn pixel_shape(kind: ShapeKind) -> Self {
        Self {
            name: "pixel_shape".to_string(),
            kind,
            detector_faces: Vec::new(),
        }
    }

    pub fn shape(kind: ShapeKind) -> Self {
        Self {
            name: "shape".to_string(),
            kind,
            detector_faces: Vec::new(),
        }
    }

    pub fn is_pixel_shape(&self) -> bool {
        self.name == "pixel_shape"
    }
}

/// Triangulated mesh for rendering
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    /// Vertex positions as flattened [x, y, z, x, y, z, ...]
    pub positions: Vec<f32>,
    /// Vertex normals as flattened [nx, ny, nz, ...]
    pub normals: Vec<f32>,
    /// Triangle indices
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create mesh with pre-allocated capacity
    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count * 3),
            normals: Vec::with_capacity(vertex_count * 3),
            indices: Vec::with_capacity(index_count),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Merge another mesh into this one
    pub fn merge(&mut self, other: &TriangleMesh) {
        let vertex_offset = self.vertex_count() as u32;

        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|i| i + vertex_offset));
    }
}
