// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transform Chain Flattener - geometry graph to one absolute mesh
//!
//! A component's `depends_on` chain is collected nearest transformation
//! first and applied in reverse, so the transformation at the end of the
//! chain acts first. Pixel shapes are replicated at every pixel offset
//! before the chain is applied.

use idf_nexus_model::{
    rotation_matrix_from_axis_angle, AngleUnit, Component, DependsOn, GeometryGraph, OffMesh,
    Point, ShapeKind, TransformKind, TransformNode,
};
use log::debug;
use nalgebra::Matrix4;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::off::cylinders_to_off;

/// Flattening settings
#[derive(Clone, Copy, Debug)]
pub struct FlattenOptions {
    /// Quads around each tube when meshing cylinders
    pub cylinder_segments: usize,
    /// Replicate pixels and flatten components on the rayon pool
    pub parallel: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl FlattenOptions {
    pub fn new() -> Self {
        Self {
            cylinder_segments: 10,
            parallel: true,
        }
    }

    /// Single-threaded flattening
    pub fn sequential() -> Self {
        Self::new().with_parallel(false)
    }

    pub fn with_cylinder_segments(mut self, segments: usize) -> Self {
        self.cylinder_segments = segments;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Transformations reached from `start`, nearest first
pub fn collect_chain<'g, G: GeometryGraph + ?Sized>(
    start: &DependsOn,
    graph: &'g G,
) -> Result<Vec<&'g TransformNode>> {
    let mut chain = Vec::new();
    let mut visited = FxHashSet::default();
    let mut next = start;
    while let Some(path) = next.as_path() {
        if !visited.insert(path) {
            return Err(Error::CyclicDependsOn(path.to_string()));
        }
        let node = graph
            .transform(path)
            .ok_or_else(|| Error::TransformNotFound(path.to_string()))?;
        chain.push(node);
        next = &node.depends_on;
    }
    Ok(chain)
}

/// Homogeneous matrix of one transformation
pub fn transform_matrix(node: &TransformNode) -> Result<Matrix4<f64>> {
    let offset = node.offset.unwrap_or_else(Point::zeros);
    let mut matrix = match node.kind {
        TransformKind::Translation => {
            let mut m = Matrix4::identity();
            let shift = node.vector * node.magnitude;
            m.fixed_view_mut::<3, 1>(0, 3).copy_from(&shift);
            m
        }
        TransformKind::Rotation => {
            let units = AngleUnit::parse(&node.units).ok_or_else(|| {
                Error::geometry(format!("unknown angle units '{}' on {}", node.units, node.path))
            })?;
            rotation_matrix_from_axis_angle(&node.vector, units.to_radians(node.magnitude))
                .to_homogeneous()
        }
    };
    let translation = matrix.fixed_view::<3, 1>(0, 3) + offset;
    matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
    Ok(matrix)
}

/// Apply a chain collected by [`collect_chain`] to vertices in place
///
/// The last node of `chain` is applied first.
pub fn apply_chain(vertices: &mut [Point], chain: &[&TransformNode]) -> Result<()> {
    if chain.is_empty() {
        return Ok(());
    }
    let mut combined = Matrix4::identity();
    for node in chain.iter().rev() {
        combined = transform_matrix(node)? * combined;
    }
    for v in vertices.iter_mut() {
        *v = combined.transform_point(&(*v).into()).coords;
    }
    Ok(())
}

/// One copy of `pixel` per offset, in a single preallocated mesh
///
/// Copy `k` has its vertex indices shifted by `k` times the pixel vertex
/// count and its face starts by `k` times the pixel winding order length.
pub fn replicate_pixel_shape(pixel: &OffMesh, offsets: &[Point], parallel: bool) -> Result<OffMesh> {
    let (v, f, w) = (
        pixel.vertices.len(),
        pixel.faces.len(),
        pixel.winding_order.len(),
    );
    if v == 0 || offsets.is_empty() {
        return Ok(OffMesh::default());
    }
    let n = offsets.len();
    if (n * v).max(n * w) > u32::MAX as usize {
        return Err(Error::invalid_mesh(format!(
            "{} copies of a {} vertex pixel exceed the index range",
            n, v
        )));
    }

    let mut vertices = vec![Point::zeros(); n * v];
    let mut faces = vec![0u32; n * f];
    let mut winding_order = vec![0u32; n * w];

    let fill_vertices = |(k, chunk): (usize, &mut [Point])| {
        for (dst, src) in chunk.iter_mut().zip(&pixel.vertices) {
            *dst = src + offsets[k];
        }
    };
    let fill_faces = |(k, chunk): (usize, &mut [u32])| {
        let base = (k * w) as u32;
        for (dst, src) in chunk.iter_mut().zip(&pixel.faces) {
            *dst = src + base;
        }
    };
    let fill_winding = |(k, chunk): (usize, &mut [u32])| {
        let base = (k * v) as u32;
        for (dst, src) in chunk.iter_mut().zip(&pixel.winding_order) {
            *dst = src + base;
        }
    };

    if parallel {
        vertices.par_chunks_mut(v).enumerate().for_each(fill_vertices);
        if f > 0 {
            faces.par_chunks_mut(f).enumerate().for_each(fill_faces);
        }
        if w > 0 {
            winding_order.par_chunks_mut(w).enumerate().for_each(fill_winding);
        }
    } else {
        vertices.chunks_mut(v).enumerate().for_each(fill_vertices);
        if f > 0 {
            faces.chunks_mut(f).enumerate().for_each(fill_faces);
        }
        if w > 0 {
            winding_order.chunks_mut(w).enumerate().for_each(fill_winding);
        }
    }

    Ok(OffMesh::new(vertices, faces, winding_order))
}

/// Absolute mesh of one geometry-bearing component
pub fn flatten_component<G: GeometryGraph + ?Sized>(
    component: &Component,
    graph: &G,
    options: &FlattenOptions,
) -> Result<OffMesh> {
    let Some(shape) = &component.shape else {
        return Ok(OffMesh::default());
    };
    let mesh = match &shape.kind {
        ShapeKind::Off(mesh) => mesh.clone(),
        ShapeKind::Cylinders(cylinders) => cylinders_to_off(cylinders, options.cylinder_segments)?,
    };

    let mut mesh = if shape.is_pixel_shape() {
        let offsets = component.pixel_offsets.as_ref().ok_or_else(|| {
            Error::geometry(format!("{} has a pixel shape but no pixel offsets", component.path))
        })?;
        replicate_pixel_shape(&mesh, offsets, options.parallel)?
    } else {
        mesh
    };

    let chain = collect_chain(&component.depends_on, graph)?;
    apply_chain(&mut mesh.vertices, &chain)?;
    debug!(
        "Flattened {}: {} vertices through {} transformations",
        component.path,
        mesh.vertex_count(),
        chain.len()
    );
    Ok(mesh)
}

/// All geometry in the graph as one mesh, in component order
pub fn flatten_instrument<G: GeometryGraph + ?Sized>(graph: &G, options: &FlattenOptions) -> Result<OffMesh> {
    let components = graph.geometry_components();
    let meshes: Vec<OffMesh> = if options.parallel {
        components
            .par_iter()
            .map(|c| flatten_component(c, graph, options))
            .collect::<Result<_>>()?
    } else {
        components
            .iter()
            .map(|c| flatten_component(c, graph, options))
            .collect::<Result<_>>()?
    };

    let mut flat = OffMesh::default();
    flat.vertices
        .reserve(meshes.iter().map(|m| m.vertices.len()).sum());
    flat.faces.reserve(meshes.iter().map(|m| m.faces.len()).sum());
    flat.winding_order
        .reserve(meshes.iter().map(|m| m.winding_order.len()).sum());
    for mesh in &meshes {
        flat.append(mesh);
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use idf_nexus_model::{rotate, GeometryGroup, NexusGraph, NxClass};
    use std::f64::consts::FRAC_PI_2;
    use std::sync::Arc;

    fn triangle() -> OffMesh {
        OffMesh::new(
            vec![
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(0.0, 1.0, 0.0),
            ],
            vec![0],
            vec![0, 1, 2],
        )
    }

    fn rotate_then_translate() -> Vec<TransformNode> {
        let rotation = TransformNode::rotation(
            "/c/transformations/orientation",
            &Point::z(),
            90.0,
            AngleUnit::Degrees,
            DependsOn::Terminal,
        );
        let translation = TransformNode::translation(
            "/c/transformations/location",
            &Point::new(2.0, 0.0, 0.0),
            DependsOn::path("/c/transformations/orientation"),
        );
        vec![translation, rotation]
    }

    fn graph_with(shape: Option<GeometryGroup>, nodes: Vec<TransformNode>, offsets: Option<Vec<Point>>) -> NexusGraph {
        let mut graph = NexusGraph::new("TEST", "/entry", "/entry/instrument");
        let mut component = Component::new("/c", NxClass::Detector);
        component.depends_on = nodes
            .first()
            .map(|n| DependsOn::path(n.path.clone()))
            .unwrap_or(DependsOn::Terminal);
        component.transformations = nodes;
        component.shape = shape.map(Arc::new);
        component.pixel_offsets = offsets.map(Arc::new);
        graph.push(component);
        graph
    }

    #[test]
    fn test_collect_chain_nearest_first() {
        let graph = graph_with(None, rotate_then_translate(), None);
        let start = DependsOn::path("/c/transformations/location");
        let chain = collect_chain(&start, &graph).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name, "location");
        assert_eq!(chain[1].name, "orientation");
        assert!(collect_chain(&DependsOn::Terminal, &graph).unwrap().is_empty());
    }

    #[test]
    fn test_missing_transformation() {
        let graph = graph_with(None, Vec::new(), None);
        let result = collect_chain(&DependsOn::path("/c/transformations/nothing"), &graph);
        assert!(matches!(result, Err(Error::TransformNotFound(_))));
    }

    #[test]
    fn test_cyclic_chain() {
        let a = TransformNode::translation("/c/t/a", &Point::x(), DependsOn::path("/c/t/b"));
        let b = TransformNode::translation("/c/t/b", &Point::x(), DependsOn::path("/c/t/a"));
        let graph = graph_with(None, vec![a, b], None);
        let result = collect_chain(&DependsOn::path("/c/t/a"), &graph);
        assert!(matches!(result, Err(Error::CyclicDependsOn(_))));
    }

    #[test]
    fn test_chain_order_rotate_then_translate() {
        let nodes = rotate_then_translate();
        let chain: Vec<&TransformNode> = nodes.iter().collect();
        let start = Point::new(1.0, 0.0, 0.0);
        let mut vertices = vec![start];
        apply_chain(&mut vertices, &chain).unwrap();

        let shift = Point::new(2.0, 0.0, 0.0);
        let expected = rotate(&start, &Point::z(), FRAC_PI_2) + shift;
        let wrong = rotate(&(start + shift), &Point::z(), FRAC_PI_2);
        assert_relative_eq!(vertices[0], expected, epsilon = 1e-12);
        assert_relative_eq!(vertices[0], Point::new(2.0, 1.0, 0.0), epsilon = 1e-12);
        assert!((vertices[0] - wrong).norm() > 1.0);
    }

    #[test]
    fn test_origin_vertex_only_translated() {
        let nodes = rotate_then_translate();
        let chain: Vec<&TransformNode> = nodes.iter().collect();
        let mut vertices = vec![Point::zeros()];
        apply_chain(&mut vertices, &chain).unwrap();
        assert_relative_eq!(vertices[0], Point::new(2.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_offset() {
        let mut node = TransformNode::rotation("/r", &Point::z(), 0.0, AngleUnit::Radians, DependsOn::Terminal);
        node.offset = Some(Point::new(0.0, 0.0, 1.0));
        let mut vertices = vec![Point::x()];
        apply_chain(&mut vertices, &[&node]).unwrap();
        assert_relative_eq!(vertices[0], Point::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_flat_graph_unchanged() {
        let graph = graph_with(
            Some(GeometryGroup::shape(ShapeKind::Off(triangle()))),
            Vec::new(),
            None,
        );
        let flat = flatten_instrument(&graph, &FlattenOptions::default()).unwrap();
        assert_eq!(flat, triangle());
    }

    #[test]
    fn test_replication_sizes() {
        let pixel = OffMesh::from_polygons(
            vec![Point::zeros(), Point::x(), Point::y(), Point::z()],
            &[vec![0, 1, 2], vec![0, 2, 3], vec![1, 2, 3, 0]],
        );
        let offsets: Vec<Point> = (0..5).map(|k| Point::new(k as f64, 0.0, 0.0)).collect();
        for parallel in [true, false] {
            let mesh = replicate_pixel_shape(&pixel, &offsets, parallel).unwrap();
            assert_eq!(mesh.vertex_count(), 5 * 4);
            assert_eq!(mesh.face_count(), 5 * 3);
            let w = pixel.winding_order.len() as u32;
            for k in 0..5u32 {
                assert_eq!(mesh.faces[(k * 3) as usize], k * w);
                assert_eq!(mesh.face((k * 3) as usize), &[4 * k, 4 * k + 1, 4 * k + 2]);
            }
            assert_relative_eq!(mesh.vertices[4 * 4 + 1], Point::new(5.0, 0.0, 0.0));
            assert!(mesh.is_well_formed());
        }
    }

    #[test]
    fn test_replication_of_nothing() {
        let mesh = replicate_pixel_shape(&triangle(), &[], true).unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_pixel_shape_replicated_then_placed() {
        let shape = GeometryGroup::pixel_shape(ShapeKind::Off(triangle()));
        let location = TransformNode::translation("/c/transformations/location", &Point::new(0.0, 0.0, 5.0), DependsOn::Terminal);
        let offsets = vec![Point::zeros(), Point::new(0.0, 0.0, 1.0)];
        let graph = graph_with(Some(shape), vec![location], Some(offsets));

        let flat = flatten_instrument(&graph, &FlattenOptions::sequential()).unwrap();
        assert_eq!(flat.vertex_count(), 6);
        assert_eq!(flat.face_count(), 2);
        assert_relative_eq!(flat.vertices[0], Point::new(0.0, 0.0, 5.0));
        assert_relative_eq!(flat.vertices[5], Point::new(0.0, 1.0, 6.0));
    }

    #[test]
    fn test_pixel_shape_needs_offsets() {
        let shape = GeometryGroup::pixel_shape(ShapeKind::Off(triangle()));
        let graph = graph_with(Some(shape), Vec::new(), None);
        assert!(matches!(
            flatten_instrument(&graph, &FlattenOptions::default()),
            Err(Error::Geometry(_))
        ));
    }
}
