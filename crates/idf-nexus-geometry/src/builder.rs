// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry Builder - resolved records to a NeXus geometry graph
//!
//! Every placed component gets a `transformations` group holding its
//! location translation and, when it has one, its orientation rotation.
//! The rotation is emitted first and ends the chain; the translation depends
//! on it, and the component's own `depends_on` points at the translation.
//!
//! Detector modules built from the same type chain share one set of pixel
//! offsets and one pixel shape through `Arc`.

use std::sync::Arc;

use idf_nexus_model::{
    get_an_orthogonal_unit_vector, normalise, Component, CylindricalMesh, DependsOn, GeometryGraph,
    GeometryGroup, GridDetector, Monitor, NexusGraph, NxClass, OffMesh, Orientation,
    ParsedInstrument, PixelShape, PixelSize, Point, ResolvedDetector, ShapeKind, Source,
    TransformNode,
};
use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

/// Names of the top-level groups
#[derive(Clone, Debug)]
pub struct BuilderOptions {
    pub entry_name: String,
    pub instrument_group: String,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BuilderOptions {
    pub fn new() -> Self {
        Self {
            entry_name: "entry".to_string(),
            instrument_group: "instrument".to_string(),
        }
    }

    pub fn with_entry_name(mut self, name: impl Into<String>) -> Self {
        self.entry_name = name.into();
        self
    }

    pub fn with_instrument_group(mut self, name: impl Into<String>) -> Self {
        self.instrument_group = name.into();
        self
    }
}

/// Shape description of a single pixel
///
/// Cuboid pixels stay parametric and give `None`; their sizes are recorded
/// on the detector instead. A tube becomes one cylinder centred on the pixel
/// origin: bottom centre, a rim point and top centre.
pub fn build_shape(shape: &PixelShape) -> Option<ShapeKind> {
    match shape {
        PixelShape::Cuboid { .. } => None,
        PixelShape::Cylinder {
            axis,
            radius,
            height,
        } => {
            let (unit, magnitude) = normalise(axis);
            if (magnitude - 1.0).abs() > 1e-9 {
                warn!("Cylinder axis {:?} is not a unit vector, normalising", axis);
            }
            let a = -unit * (height * 0.5);
            let c = unit * (height * 0.5);
            let b = get_an_orthogonal_unit_vector(&(a - c)) * *radius + a;
            Some(ShapeKind::Cylinders(CylindricalMesh {
                vertices: vec![a, b, c],
                cylinders: vec![[0, 1, 2]],
            }))
        }
    }
}

/// Transformation nodes placing a component, plus its `depends_on`
///
/// With an orientation the chain is `location -> orientation -> .`,
/// otherwise `location -> .`.
pub fn emit_transform_chain(
    transformations_path: &str,
    location: &Point,
    orientation: Option<&Orientation>,
) -> (Vec<TransformNode>, DependsOn) {
    let mut nodes = Vec::with_capacity(2);
    let mut depends_on = DependsOn::Terminal;

    if let Some(orientation) = orientation {
        let (axis, _) = normalise(&orientation.axis);
        let path = format!("{}/orientation", transformations_path);
        nodes.push(TransformNode::rotation(
            path.clone(),
            &axis,
            orientation.angle,
            orientation.units,
            DependsOn::Terminal,
        ));
        depends_on = DependsOn::path(path);
    }

    let path = format!("{}/location", transformations_path);
    nodes.push(TransformNode::translation(path.clone(), location, depends_on));
    (nodes, DependsOn::path(path))
}

fn place(component: &mut Component, location: &Point, orientation: Option<&Orientation>) {
    let (nodes, depends_on) =
        emit_transform_chain(&component.transformations_path(), location, orientation);
    component.transformations = nodes;
    component.depends_on = depends_on;
}

/// Pixel data shared by detector modules with the same type chain
#[derive(Clone)]
struct SharedPixels {
    offsets: Arc<Vec<Point>>,
    shape: Option<Arc<GeometryGroup>>,
}

/// Builds a [`NexusGraph`] from parsed records
pub struct GeometryBuilder<'o> {
    options: &'o BuilderOptions,
    graph: NexusGraph,
    instrument_path: String,
    shared: FxHashMap<Vec<String>, SharedPixels>,
    detector_number: usize,
}

impl<'o> GeometryBuilder<'o> {
    pub fn new(name: &str, options: &'o BuilderOptions) -> Self {
        let entry_path = format!("/{}", options.entry_name);
        let instrument_path = format!("{}/{}", entry_path, options.instrument_group);
        Self {
            options,
            graph: NexusGraph::new(name, entry_path, instrument_path.clone()),
            instrument_path,
            shared: FxHashMap::default(),
            detector_number: 0,
        }
    }

    pub fn add_source(&mut self, source: &Source) {
        let mut component = Component::new(format!("{}/source", self.instrument_path), NxClass::Source);
        component.local_name = Some(source.name.clone());
        place(&mut component, &source.location, None);
        self.graph.push(component);
    }

    /// The sample group, translated only when it is not the origin
    pub fn add_sample(&mut self, position: Option<&Point>, origin: &Point) {
        let path = format!("/{}/sample", self.options.entry_name);
        let mut component = Component::new(path, NxClass::Sample);
        if let Some(position) = position {
            let relative = position - origin;
            if relative.norm() > 0.0 {
                place(&mut component, &relative, None);
            }
        }
        self.graph.push(component);
    }

    /// Monitors sharing a name get their detector id appended
    pub fn add_monitors(&mut self, monitors: &[Monitor]) {
        let mut seen = FxHashSet::default();
        let repeated: FxHashSet<&str> = monitors
            .iter()
            .filter(|m| !seen.insert(m.name.as_str()))
            .map(|m| m.name.as_str())
            .collect();

        for monitor in monitors {
            let name = if repeated.contains(monitor.name.as_str()) {
                format!("{}_{}", monitor.name, monitor.detector_id)
            } else {
                monitor.name.clone()
            };
            let mut component =
                Component::new(format!("{}/{}", self.instrument_path, name), NxClass::Monitor);
            component.detector_number = vec![monitor.detector_id];
            component.shape = monitor
                .shape
                .as_ref()
                .and_then(build_shape)
                .map(|kind| Arc::new(GeometryGroup::shape(kind)));
            place(&mut component, &monitor.location, monitor.orientation.as_ref());
            self.graph.push(component);
        }
    }

    fn next_detector(&mut self, name: &str) -> Component {
        self.detector_number += 1;
        let path = format!("{}/detector_{}", self.instrument_path, self.detector_number);
        let mut component = Component::new(path, NxClass::Detector);
        component.local_name = Some(name.to_string());
        component
    }

    pub fn add_detector(&mut self, detector: &ResolvedDetector) {
        let mut component = self.next_detector(&detector.name);

        let shared = match self.shared.get(&detector.sub_component_type_chain) {
            Some(shared) => {
                debug!(
                    "Reusing pixel data of type chain {:?} for '{}'",
                    detector.sub_component_type_chain, detector.name
                );
                shared.clone()
            }
            None => {
                let shared = SharedPixels {
                    offsets: Arc::new(detector.offsets.clone()),
                    shape: build_shape(&detector.pixel.shape)
                        .map(|kind| Arc::new(GeometryGroup::pixel_shape(kind))),
                };
                self.shared
                    .insert(detector.sub_component_type_chain.clone(), shared.clone());
                shared
            }
        };

        if let PixelShape::Cuboid {
            x_size,
            y_size,
            thickness,
        } = detector.pixel.shape
        {
            component.pixel_size = Some(PixelSize {
                x: x_size,
                y: y_size,
                thickness,
            });
        }
        component.detector_number = detector.ids.clone();
        component.pixel_offsets = Some(shared.offsets);
        component.shape = shared.shape;
        place(&mut component, &detector.location, detector.orientation.as_ref());
        self.graph.push(component);
    }

    /// A structured panel: one quad per pixel in a single OFF mesh
    pub fn add_grid_detector(&mut self, detector: &GridDetector) {
        let mut component = self.next_detector(&detector.name);

        let mut polygons = Vec::with_capacity(detector.x_pixels * detector.y_pixels);
        let mut detector_faces = Vec::with_capacity(detector.ids.len());
        for j in 0..detector.y_pixels {
            for i in 0..detector.x_pixels {
                let face = polygons.len();
                polygons.push(detector.quad(i, j).iter().map(|&v| v as u32).collect::<Vec<_>>());
                if let Some(&id) = detector.ids.get(face) {
                    detector_faces.push([face as i64, id]);
                }
            }
        }
        let mesh = OffMesh::from_polygons(detector.vertices.clone(), &polygons);
        let mut group = GeometryGroup::shape(ShapeKind::Off(mesh));
        group.name = "detector_shape".to_string();
        group.detector_faces = detector_faces;

        component.detector_number = detector.ids.clone();
        component.pixel_offsets = Some(Arc::new(detector.offsets.clone()));
        component.shape = Some(Arc::new(group));
        place(&mut component, &detector.location, detector.orientation.as_ref());
        self.graph.push(component);
    }

    pub fn finish(self) -> NexusGraph {
        self.graph
    }
}

/// Build the geometry graph of a parsed instrument
///
/// Components are ordered source, sample, monitors, detectors, then
/// structured detectors.
pub fn build_graph(instrument: &ParsedInstrument, options: &BuilderOptions) -> NexusGraph {
    let mut builder = GeometryBuilder::new(&instrument.name, options);
    if let Some(source) = &instrument.source {
        builder.add_source(source);
    }
    builder.add_sample(instrument.sample_position.as_ref(), &instrument.origin);
    builder.add_monitors(&instrument.monitors);
    for detector in &instrument.detectors {
        builder.add_detector(detector);
    }
    for detector in &instrument.grid_detectors {
        builder.add_grid_detector(detector);
    }

    let graph = builder.finish();
    info!(
        "Built geometry graph for '{}': {} components, {} transformations",
        instrument.name,
        graph.components().len(),
        graph.transform_count()
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use idf_nexus_model::{GeometryGraphExt, PixelType, SourcePos, TransformKind};

    fn detector(name: &str, chain: &[&str], shape: PixelShape, location: Point) -> ResolvedDetector {
        ResolvedDetector {
            name: name.to_string(),
            type_name: chain.last().map(|s| s.to_string()).unwrap_or_default(),
            sub_component_type_chain: chain.iter().map(|s| s.to_string()).collect(),
            pixel: PixelType {
                name: chain[0].to_string(),
                shape,
            },
            offsets: vec![Point::new(0.0, -0.1, 0.0), Point::new(0.0, 0.1, 0.0)],
            ids: vec![1, 2],
            location,
            orientation: None,
            pos: SourcePos::UNKNOWN,
        }
    }

    fn tube() -> PixelShape {
        PixelShape::Cylinder {
            axis: Point::y(),
            radius: 0.01,
            height: 0.2,
        }
    }

    #[test]
    fn test_tube_pixel_shape() {
        let Some(ShapeKind::Cylinders(mesh)) = build_shape(&tube()) else {
            panic!("expected cylinders");
        };
        assert_eq!(mesh.cylinders, vec![[0, 1, 2]]);
        assert_relative_eq!(mesh.vertices[0], Point::new(0.0, -0.1, 0.0));
        assert_relative_eq!(mesh.vertices[2], Point::new(0.0, 0.1, 0.0));
        let rim = mesh.vertices[1] - mesh.vertices[0];
        assert_relative_eq!(rim.norm(), 0.01, epsilon = 1e-12);
        assert_relative_eq!(rim.dot(&Point::y()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cuboid_stays_parametric() {
        let cuboid = PixelShape::Cuboid {
            x_size: 0.01,
            y_size: 0.02,
            thickness: 0.001,
        };
        assert!(build_shape(&cuboid).is_none());
    }

    #[test]
    fn test_chain_with_orientation() {
        let orientation = Orientation::degrees(Point::new(0.0, 2.0, 0.0), 90.0);
        let (nodes, depends_on) =
            emit_transform_chain("/entry/instrument/d/transformations", &Point::new(0.0, 0.0, 2.0), Some(&orientation));

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, TransformKind::Rotation);
        assert!(nodes[0].depends_on.is_terminal());
        assert_relative_eq!(nodes[0].vector, Point::y());
        assert_eq!(nodes[0].units, "degrees");
        assert_eq!(nodes[1].kind, TransformKind::Translation);
        assert_eq!(nodes[1].depends_on.as_path(), Some(nodes[0].path.as_str()));
        assert_eq!(depends_on.as_path(), Some(nodes[1].path.as_str()));
        assert_relative_eq!(nodes[1].magnitude, 2.0);
    }

    #[test]
    fn test_chain_without_orientation() {
        let (nodes, depends_on) = emit_transform_chain("/t", &Point::new(3.0, 4.0, 0.0), None);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].depends_on.is_terminal());
        assert_eq!(depends_on, DependsOn::path("/t/location"));
        assert_relative_eq!(nodes[0].magnitude, 5.0);
    }

    #[test]
    fn test_shared_pixel_data() {
        let instrument = ParsedInstrument {
            name: "TEST".to_string(),
            detectors: vec![
                detector("left", &["pixel", "tube", "bank"], tube(), Point::new(-1.0, 0.0, 0.0)),
                detector("right", &["pixel", "tube", "bank"], tube(), Point::new(1.0, 0.0, 0.0)),
                detector("other", &["pixel", "tube"], tube(), Point::new(0.0, 0.0, 5.0)),
            ],
            ..Default::default()
        };
        let graph = build_graph(&instrument, &BuilderOptions::default());

        let left = graph.component("/entry/instrument/detector_1").unwrap();
        let right = graph.component("/entry/instrument/detector_2").unwrap();
        let other = graph.component("/entry/instrument/detector_3").unwrap();
        assert_eq!(left.local_name.as_deref(), Some("left"));
        assert!(Arc::ptr_eq(left.shape.as_ref().unwrap(), right.shape.as_ref().unwrap()));
        assert!(Arc::ptr_eq(
            left.pixel_offsets.as_ref().unwrap(),
            right.pixel_offsets.as_ref().unwrap()
        ));
        assert!(!Arc::ptr_eq(left.shape.as_ref().unwrap(), other.shape.as_ref().unwrap()));
        assert!(left.shape.as_ref().unwrap().is_pixel_shape());
    }

    #[test]
    fn test_repeated_monitor_names() {
        let monitor = |id: i64| Monitor {
            name: "monitor".to_string(),
            type_name: "monitor".to_string(),
            detector_id: id,
            location: Point::new(0.0, 0.0, -(id as f64)),
            orientation: None,
            shape: None,
        };
        let instrument = ParsedInstrument {
            monitors: vec![monitor(1), monitor(2)],
            ..Default::default()
        };
        let graph = build_graph(&instrument, &BuilderOptions::default());
        assert!(graph.has_component_named("monitor_1"));
        assert!(graph.has_component_named("monitor_2"));
        let monitor_2 = graph.component("/entry/instrument/monitor_2").unwrap();
        assert_eq!(monitor_2.detector_number, vec![2]);
        assert!(graph.resolve(&monitor_2.depends_on).is_some());
    }

    #[test]
    fn test_grid_detector_mesh() {
        let grid = GridDetector {
            name: "panel".to_string(),
            type_name: "panel".to_string(),
            x_pixels: 2,
            y_pixels: 1,
            vertices: vec![
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(2.0, 0.0, 0.0),
                Point::new(0.0, 1.0, 0.0),
                Point::new(1.0, 1.0, 0.0),
                Point::new(2.0, 1.0, 0.0),
            ],
            offsets: vec![Point::new(0.5, 0.5, 0.0), Point::new(1.5, 0.5, 0.0)],
            ids: vec![10, 11],
            location: Point::new(0.0, 0.0, 4.0),
            orientation: None,
        };
        let instrument = ParsedInstrument {
            grid_detectors: vec![grid],
            ..Default::default()
        };
        let graph = build_graph(&instrument, &BuilderOptions::default().with_entry_name("raw_data_1"));
        let component = graph.component("/raw_data_1/instrument/detector_1").unwrap();
        let shape = component.shape.as_ref().unwrap();
        assert!(!shape.is_pixel_shape());
        assert_eq!(shape.detector_faces, vec![[0, 10], [1, 11]]);
        let ShapeKind::Off(mesh) = &shape.kind else {
            panic!("expected an OFF mesh");
        };
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.face(1), &[1, 2, 5, 4]);
    }

    #[test]
    fn test_sample_at_origin_has_no_transformations() {
        let instrument = ParsedInstrument {
            sample_position: Some(Point::new(0.0, 0.0, 1.0)),
            origin: Point::new(0.0, 0.0, 1.0),
            ..Default::default()
        };
        let graph = build_graph(&instrument, &BuilderOptions::default());
        let sample = graph.component("/entry/sample").unwrap();
        assert!(sample.transformations.is_empty());
        assert!(sample.depends_on.is_terminal());
    }
}
