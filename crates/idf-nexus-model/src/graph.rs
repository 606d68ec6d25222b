// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory NeXus instrument hierarchy

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::geometry::{DependsOn, GeometryGroup, TransformNode};
use crate::resolver::GeometryGraph;
use crate::types::Point;

/// NeXus base class of a group
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum NxClass {
    Entry,
    Instrument,
    Source,
    Sample,
    Monitor,
    Detector,
    Transformations,
    OffGeometry,
    CylindricalGeometry,
}

impl NxClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            NxClass::Entry => "NXentry",
            NxClass::Instrument => "NXinstrument",
            NxClass::Source => "NXsource",
            NxClass::Sample => "NXsample",
            NxClass::Monitor => "NXmonitor",
            NxClass::Detector => "NXdetector",
            NxClass::Transformations => "NXtransformations",
            NxClass::OffGeometry => "NXoff_geometry",
            NxClass::CylindricalGeometry => "NXcylindrical_geometry",
        }
    }
}

/// Parametric size of a box pixel
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
    pub thickness: f64,
}

/// A positioned group: source, sample, monitor or detector
#[derive(Clone, Debug)]
pub struct Component {
    /// Absolute group path, e.g. `/entry/instrument/detector_1`
    pub path: String,
    pub class: NxClass,
    /// Name from the instrument definition when it differs from the group name
    pub local_name: Option<String>,
    pub depends_on: DependsOn,
    /// Nodes stored in this component's `transformations` group
    pub transformations: Vec<TransformNode>,
    pub detector_number: Vec<i64>,
    /// Pixel positions relative to the component, shared between
    /// detectors built from the same type chain
    pub pixel_offsets: Option<Arc<Vec<Point>>>,
    pub pixel_size: Option<PixelSize>,
    pub shape: Option<Arc<GeometryGroup>>,
}

impl Component {
    pub fn new(path: impl Into<String>, class: NxClass) -> Self {
        Self {
            path: path.into(),
            class,
            local_name: None,
            depends_on: DependsOn::Terminal,
            transformations: Vec::new(),
            detector_number: Vec::new(),
            pixel_offsets: None,
            pixel_size: None,
            shape: None,
        }
    }

    pub fn name(&self) -> &str {
        crate::geometry::local_name(&self.path)
    }

    /// Path of the component's `transformations` group
    pub fn transformations_path(&self) -> String {
        format!("{}/transformations", self.path)
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_offsets.as_ref().map_or(0, |o| o.len())
    }
}

/// Instrument hierarchy with fast transformation lookup by path
#[derive(Clone, Debug, Default)]
pub struct NexusGraph {
    pub instrument_name: String,
    pub entry_path: String,
    pub instrument_path: String,
    components: Vec<Component>,
    /// path -> (component index, transformation index)
    transform_index: HashMap<String, (usize, usize)>,
}

impl NexusGraph {
    pub fn new(instrument_name: impl Into<String>, entry_path: impl Into<String>, instrument_path: impl Into<String>) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            entry_path: entry_path.into(),
            instrument_path: instrument_path.into(),
            components: Vec::new(),
            transform_index: HashMap::new(),
        }
    }

    /// Add a component and index its transformations
    pub fn push(&mut self, component: Component) {
        let index = self.components.len();
        for (i, node) in component.transformations.iter().enumerate() {
            self.transform_index.insert(node.path.clone(), (index, i));
        }
        self.components.push(component);
    }

    pub fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components
    }

    /// Whether any component uses `name` as its local name
    pub fn has_component_named(&self, name: &str) -> bool {
        self.components.iter().any(|c| c.name() == name)
    }
}

impl GeometryGraph for NexusGraph {
    fn transform(&self, path: &str) -> Option<&TransformNode> {
        self.transform_index
            .get(path)
            .map(|&(c, t)| &self.components[c].transformations[t])
    }

    fn components(&self) -> &[Component] {
        &self.components
    }

    fn transform_count(&self) -> usize {
        self.transform_index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::GeometryGraphExt;

    #[test]
    fn test_push_indexes_transformations() {
        let mut graph = NexusGraph::new("TEST", "/entry", "/entry/instrument");
        let mut component = Component::new("/entry/instrument/detector_1", NxClass::Detector);
        let path = format!("{}/location", component.transformations_path());
        component.transformations.push(TransformNode::translation(
            path.clone(),
            &Point::new(1.0, 0.0, 0.0),
            DependsOn::Terminal,
        ));
        component.depends_on = DependsOn::path(path.clone());
        graph.push(component);

        assert_eq!(graph.transform_count(), 1);
        assert_eq!(graph.transform(&path).map(|n| n.magnitude), Some(1.0));
        assert!(graph.component("/entry/instrument/detector_1").is_some());
        assert!(graph.has_component_named("detector_1"));
        assert!(graph.transform("/entry/instrument/missing").is_none());
    }
}
