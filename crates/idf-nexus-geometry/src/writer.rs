// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Export of a [`NexusGraph`] into a [`NexusStore`]
//!
//! Groups carry their `NX_class`; transformation nodes become scalar
//! datasets whose attributes describe the step. Pixel offsets and shapes
//! shared between detectors are written once and linked from every other
//! detector that uses them.

use std::sync::Arc;

use idf_nexus_model::{
    AttrValue, Component, Dataset, GeometryGraph, GeometryGroup, NexusGraph, NexusStore, NxClass, Point,
    ShapeKind, TransformNode,
};
use log::debug;
use rustc_hash::FxHashMap;

use crate::error::Result;

const LENGTH_UNITS: &str = "m";
const OFFSET_NAMES: [&str; 3] = ["x_pixel_offset", "y_pixel_offset", "z_pixel_offset"];

fn vector_attr(v: &Point) -> AttrValue {
    AttrValue::F64Array(vec![v.x, v.y, v.z])
}

fn flat_f64(points: &[Point]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
}

fn flat_f32(points: &[Point]) -> Vec<f32> {
    points
        .iter()
        .flat_map(|p| [p.x as f32, p.y as f32, p.z as f32])
        .collect()
}

fn to_i32(indices: &[u32]) -> Vec<i32> {
    indices.iter().map(|&i| i as i32).collect()
}

fn transformation_dataset(node: &TransformNode) -> Dataset {
    let dataset = Dataset::scalar(node.magnitude)
        .with_attr("units", node.units.as_str())
        .with_attr("vector", vector_attr(&node.vector))
        .with_attr("transformation_type", node.kind.as_str())
        .with_attr("depends_on", node.depends_on.to_string());
    match &node.offset {
        Some(offset) => dataset.with_attr("offset", vector_attr(offset)),
        None => dataset,
    }
}

fn write_shape(store: &mut dyn NexusStore, path: &str, group: &GeometryGroup) -> Result<()> {
    store.create_group(path, group.kind.nx_class())?;
    match &group.kind {
        ShapeKind::Off(mesh) => {
            store.write_dataset(
                &format!("{}/vertices", path),
                Dataset::f32_matrix(flat_f32(&mesh.vertices), 3).with_attr("units", LENGTH_UNITS),
            )?;
            store.write_dataset(
                &format!("{}/winding_order", path),
                Dataset::i32_vec(to_i32(&mesh.winding_order)),
            )?;
            store.write_dataset(&format!("{}/faces", path), Dataset::i32_vec(to_i32(&mesh.faces)))?;
        }
        ShapeKind::Cylinders(cylinders) => {
            store.write_dataset(
                &format!("{}/vertices", path),
                Dataset::f64_matrix(flat_f64(&cylinders.vertices), 3).with_attr("units", LENGTH_UNITS),
            )?;
            let indices: Vec<i32> = cylinders
                .cylinders
                .iter()
                .flat_map(|c| c.iter().map(|&i| i as i32))
                .collect();
            store.write_dataset(&format!("{}/cylinders", path), Dataset::i32_matrix(indices, 3))?;
        }
    }
    if !group.detector_faces.is_empty() {
        let pairs: Vec<i64> = group.detector_faces.iter().flatten().copied().collect();
        store.write_dataset(&format!("{}/detector_faces", path), Dataset::i64_matrix(pairs, 2))?;
    }
    Ok(())
}

/// Paths already written for shared data, keyed by allocation
#[derive(Default)]
struct Written {
    offsets: FxHashMap<*const Vec<Point>, String>,
    shapes: FxHashMap<*const GeometryGroup, String>,
}

fn write_offsets(
    store: &mut dyn NexusStore,
    component: &Component,
    offsets: &Arc<Vec<Point>>,
    written: &mut Written,
) -> Result<()> {
    let include_z = offsets.iter().any(|p| p.z != 0.0);
    let names = if include_z { &OFFSET_NAMES[..] } else { &OFFSET_NAMES[..2] };

    if let Some(first) = written.offsets.get(&Arc::as_ptr(offsets)) {
        debug!("Linking pixel offsets of {} to {}", component.path, first);
        for name in names {
            store.link(
                &format!("{}/{}", component.path, name),
                &format!("{}/{}", first, name),
            )?;
        }
        return Ok(());
    }

    for (axis, name) in names.iter().enumerate() {
        let values: Vec<f64> = offsets.iter().map(|p| p[axis]).collect();
        store.write_dataset(
            &format!("{}/{}", component.path, name),
            Dataset::f64_vec(values).with_attr("units", LENGTH_UNITS),
        )?;
    }
    written.offsets.insert(Arc::as_ptr(offsets), component.path.clone());
    Ok(())
}

fn write_component(store: &mut dyn NexusStore, component: &Component, written: &mut Written) -> Result<()> {
    let path = component.path.as_str();
    store.create_group(path, component.class.as_str())?;

    if let Some(name) = &component.local_name {
        let dataset = if component.class == NxClass::Source { "name" } else { "local_name" };
        store.write_dataset(&format!("{}/{}", path, dataset), Dataset::string(name.as_str()))?;
    }

    if !component.transformations.is_empty() {
        let group = component.transformations_path();
        store.create_group(&group, NxClass::Transformations.as_str())?;
        for node in &component.transformations {
            store.write_dataset(&node.path, transformation_dataset(node))?;
        }
    }
    store.write_dataset(
        &format!("{}/depends_on", path),
        Dataset::string(component.depends_on.to_string()),
    )?;

    if !component.detector_number.is_empty() {
        let name = if component.class == NxClass::Monitor { "detector_id" } else { "detector_number" };
        store.write_dataset(
            &format!("{}/{}", path, name),
            Dataset::i64_vec(component.detector_number.clone()),
        )?;
    }

    if let Some(offsets) = &component.pixel_offsets {
        write_offsets(store, component, offsets, written)?;
    }

    if let Some(size) = &component.pixel_size {
        for (name, value) in [("x_pixel_size", size.x), ("y_pixel_size", size.y), ("thickness", size.thickness)] {
            store.write_dataset(
                &format!("{}/{}", path, name),
                Dataset::scalar(value).with_attr("units", LENGTH_UNITS),
            )?;
        }
    }

    if let Some(shape) = &component.shape {
        let shape_path = format!("{}/{}", path, shape.name);
        match written.shapes.get(&Arc::as_ptr(shape)) {
            Some(first) => {
                debug!("Linking {} to {}", shape_path, first);
                store.link(&shape_path, first)?;
            }
            None => {
                write_shape(store, &shape_path, shape)?;
                written.shapes.insert(Arc::as_ptr(shape), shape_path);
            }
        }
    }
    Ok(())
}

/// Write the whole hierarchy, starting with the entry and instrument groups
pub fn write_graph(graph: &NexusGraph, store: &mut dyn NexusStore) -> Result<()> {
    store.create_group(&graph.entry_path, NxClass::Entry.as_str())?;
    store.create_group(&graph.instrument_path, NxClass::Instrument.as_str())?;

    let short_name: String = graph.instrument_name.chars().take(3).collect();
    store.write_dataset(
        &format!("{}/name", graph.instrument_path),
        Dataset::string(graph.instrument_name.as_str()).with_attr("short_name", short_name),
    )?;

    let mut written = Written::default();
    for component in graph.components() {
        write_component(store, component, &mut written)?;
    }
    debug!(
        "Wrote {} components of {} ({} shared shapes)",
        graph.components().len(),
        graph.instrument_name,
        written.shapes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_graph, BuilderOptions};
    use idf_nexus_model::{
        MemoryStore, Orientation, ParsedInstrument, PixelShape, PixelType, ResolvedDetector, SourcePos,
    };

    fn tube(name: &str, location: Point) -> ResolvedDetector {
        ResolvedDetector {
            name: name.to_string(),
            type_name: "tube".to_string(),
            sub_component_type_chain: vec!["tube".to_string(), "pixel".to_string()],
            pixel: PixelType {
                name: "pixel".to_string(),
                shape: PixelShape::Cylinder {
                    axis: Point::y(),
                    radius: 0.01,
                    height: 0.1,
                },
            },
            offsets: vec![Point::new(0.0, -0.05, 0.0), Point::new(0.0, 0.05, 0.0)],
            ids: vec![1, 2],
            location,
            orientation: None,
            pos: SourcePos::UNKNOWN,
        }
    }

    fn instrument() -> ParsedInstrument {
        let mut instrument = ParsedInstrument {
            name: "LOKI".to_string(),
            ..Default::default()
        };
        instrument.detectors.push(tube("left", Point::new(-1.0, 0.0, 2.0)));
        let mut right = tube("right", Point::new(1.0, 0.0, 2.0));
        right.ids = vec![3, 4];
        right.orientation = Some(Orientation::degrees(Point::y(), 90.0));
        instrument.detectors.push(right);
        instrument
    }

    fn written() -> MemoryStore {
        let graph = build_graph(&instrument(), &BuilderOptions::default());
        let mut store = MemoryStore::new();
        write_graph(&graph, &mut store).unwrap();
        store
    }

    #[test]
    fn test_instrument_name() {
        let store = written();
        assert_eq!(store.group_class("/entry"), Some("NXentry"));
        assert_eq!(store.group_class("/entry/instrument"), Some("NXinstrument"));
        let name = store.dataset("/entry/instrument/name").unwrap();
        assert_eq!(name.as_str(), Some("LOKI"));
        assert_eq!(name.attr("short_name").and_then(AttrValue::as_str), Some("LOK"));
    }

    #[test]
    fn test_detector_datasets() {
        let store = written();
        let detector = "/entry/instrument/detector_1";
        assert_eq!(store.group_class(detector), Some("NXdetector"));
        assert_eq!(
            store.dataset(&format!("{}/local_name", detector)).and_then(|d| d.as_str()),
            Some("left")
        );
        assert_eq!(
            store.dataset(&format!("{}/detector_number", detector)).and_then(|d| d.as_i64()),
            Some(&[1, 2][..])
        );
        assert_eq!(
            store.dataset(&format!("{}/y_pixel_offset", detector)).and_then(|d| d.as_f64()),
            Some(&[-0.05, 0.05][..])
        );
        assert!(store.dataset(&format!("{}/z_pixel_offset", detector)).is_none());
        assert_eq!(
            store.dataset(&format!("{}/depends_on", detector)).and_then(|d| d.as_str()),
            Some("/entry/instrument/detector_1/transformations/location")
        );
    }

    #[test]
    fn test_transformation_attributes() {
        let store = written();
        let base = "/entry/instrument/detector_2/transformations";
        assert_eq!(store.group_class(base), Some("NXtransformations"));

        let location = format!("{}/location", base);
        let orientation = format!("{}/orientation", base);
        let attr = |path: &str, name: &str| store.attribute(path, name).and_then(AttrValue::as_str).map(str::to_string);

        assert_eq!(attr(&location, "transformation_type").as_deref(), Some("translation"));
        assert_eq!(attr(&location, "units").as_deref(), Some("m"));
        assert_eq!(attr(&location, "depends_on"), Some(orientation.clone()));
        assert_eq!(attr(&orientation, "transformation_type").as_deref(), Some("rotation"));
        assert_eq!(attr(&orientation, "depends_on").as_deref(), Some("."));
        assert_eq!(
            store.attribute(&orientation, "vector"),
            Some(&AttrValue::F64Array(vec![0.0, 1.0, 0.0]))
        );
    }

    #[test]
    fn test_shared_data_is_linked() {
        let store = written();
        let first = "/entry/instrument/detector_1";
        let second = "/entry/instrument/detector_2";

        assert_eq!(
            store.link_target(&format!("{}/pixel_shape", second)),
            Some(format!("{}/pixel_shape", first).as_str())
        );
        assert_eq!(
            store.link_target(&format!("{}/x_pixel_offset", second)),
            Some(format!("{}/x_pixel_offset", first).as_str())
        );
        assert_eq!(
            store.group_class(&format!("{}/pixel_shape", second)),
            Some("NXcylindrical_geometry")
        );
        let cylinders = store.dataset(&format!("{}/pixel_shape/cylinders", second)).unwrap();
        assert_eq!(cylinders.shape, vec![1, 3]);
        assert_eq!(cylinders.as_i32(), Some(&[0, 1, 2][..]));
    }

    #[test]
    fn test_writing_twice_fails() {
        let graph = build_graph(&instrument(), &BuilderOptions::default());
        let mut store = MemoryStore::new();
        write_graph(&graph, &mut store).unwrap();
        assert!(write_graph(&graph, &mut store).is_err());
    }
}
