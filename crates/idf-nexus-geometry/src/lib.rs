// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IDF-NeXus Geometry
//!
//! Turns resolved instrument records into a NeXus geometry graph, and
//! flattens such a graph back into one absolute OFF mesh.
//!
//! ## Overview
//!
//! - **Geometry Builder**: pixel shapes, shared pixel offsets and
//!   `depends_on` transformation chains for every component
//! - **Transform Chain Flattener**: pixel replication and chain evaluation
//!   into a single mesh
//! - **OFF**: reading and writing the OFF text format, cylinder meshing
//! - **Store export**: writing a graph into any [`NexusStore`]
//!
//! The graph is consumed through the [`GeometryGraph`] trait from
//! `idf-nexus-model`, so the flattener works with any implementation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use idf_nexus_geometry::{idf_to_off, write_off_file, BuilderOptions, FlattenOptions};
//! use idf_nexus_parser::IdfParser;
//!
//! let xml = std::fs::read_to_string("LOKI_Definition.xml")?;
//! let mesh = idf_to_off(&xml, &IdfParser::new(), &BuilderOptions::new(), &FlattenOptions::new())?;
//! write_off_file("loki.off", &mesh)?;
//!
//! println!("Generated {} faces", mesh.face_count());
//! ```

pub mod builder;
pub mod error;
pub mod flatten;
pub mod off;
pub mod writer;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix3, Matrix4, Vector3};

// Rotation primitives shared with the parser
pub use idf_nexus_model::{
    axis_angle_between, get_an_orthogonal_unit_vector, normalise, rotation_matrix_from_axis_angle,
};

// Re-export main types
pub use builder::{build_graph, build_shape, emit_transform_chain, BuilderOptions, GeometryBuilder};
pub use error::{Error, Result};
pub use flatten::{
    apply_chain, collect_chain, flatten_component, flatten_instrument, replicate_pixel_shape,
    transform_matrix, FlattenOptions,
};
pub use off::{
    construct_cylinder_mesh, create_off_face_vertex_map, cylinders_to_off, read_off, read_off_file,
    write_off, write_off_file,
};
pub use writer::write_graph;

use idf_nexus_model::{GeometryGraph, InstrumentParser, NexusGraph, NexusStore, NxClass, OffMesh};
use idf_nexus_parser::IdfParser;
use log::{info, warn};

/// Parse an instrument definition and build its geometry graph
pub fn idf_to_nexus(xml: &str, parser: &IdfParser, options: &BuilderOptions) -> Result<NexusGraph> {
    let instrument = parser.parse(xml)?;
    Ok(build_graph(&instrument, options))
}

/// Parse an instrument definition and flatten all of its geometry
pub fn idf_to_off(
    xml: &str,
    parser: &IdfParser,
    options: &BuilderOptions,
    flatten: &FlattenOptions,
) -> Result<OffMesh> {
    let graph = idf_to_nexus(xml, parser, options)?;
    flatten_instrument(&graph, flatten)
}

/// Parse an instrument definition straight into a store
pub fn idf_to_store(
    xml: &str,
    parser: &IdfParser,
    options: &BuilderOptions,
    store: &mut dyn NexusStore,
) -> Result<NexusGraph> {
    let graph = idf_to_nexus(xml, parser, options)?;
    write_graph(&graph, store)?;
    Ok(graph)
}

/// Outcome counts of converting many instrument definitions
///
/// A document passes when it converts and yields at least one detector.
#[derive(Clone, Debug, Default)]
pub struct BatchSummary {
    pub passed: Vec<String>,
    /// Documents that converted without any detector
    pub empty: Vec<String>,
    /// (document, error message)
    pub failed: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert every `(name, xml)` document and count the outcomes
    pub fn run<'a>(
        documents: impl IntoIterator<Item = (&'a str, &'a str)>,
        parser: &IdfParser,
        options: &BuilderOptions,
    ) -> Self {
        let mut summary = Self::new();
        for (name, xml) in documents {
            summary.record(name, &idf_to_nexus(xml, parser, options));
        }
        info!(
            "{}% of {} instrument definitions produced at least one detector",
            summary.pass_percentage(),
            summary.attempted()
        );
        summary
    }

    /// Count one conversion result
    pub fn record(&mut self, name: &str, outcome: &Result<NexusGraph>) {
        match outcome {
            Ok(graph) => {
                let has_detector = graph.components().iter().any(|c| c.class == NxClass::Detector);
                if has_detector {
                    self.passed.push(name.to_string());
                } else {
                    self.empty.push(name.to_string());
                }
            }
            Err(e) => {
                warn!("{} failed: {}", name, e);
                self.failed.push((name.to_string(), e.to_string()));
            }
        }
    }

    pub fn attempted(&self) -> usize {
        self.passed.len() + self.empty.len() + self.failed.len()
    }

    /// Share of attempted documents that passed, to three significant figures
    pub fn pass_percentage(&self) -> f64 {
        if self.passed.is_empty() {
            return 0.0;
        }
        let percent = 100.0 * self.passed.len() as f64 / self.attempted() as f64;
        let magnitude = 10f64.powi(2 - percent.log10().floor() as i32);
        (percent * magnitude).round() / magnitude
    }
}
