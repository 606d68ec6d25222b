// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IDF-NeXus Model - Shared types and traits for instrument geometry conversion
//!
//! This crate provides the records produced by parsing a Mantid Instrument
//! Definition File (IDF), the NeXus transformation and shape types they are
//! turned into, and the vector math both sides share.
//!
//! # Architecture
//!
//! - [`InstrumentParser`] - Entry point for parsing IDF content
//! - [`GeometryGraph`] - Transformation lookup over a built hierarchy
//! - [`NexusStore`] - Hierarchical group/dataset output
//! - [`AxisConvention`] - IDF to NeXus axis mapping
//!
//! # Example
//!
//! ```ignore
//! use idf_nexus_model::{InstrumentParser, GeometryGraph};
//!
//! let parser: Box<dyn InstrumentParser> = get_parser();
//! let instrument = parser.parse(idf_content)?;
//! for detector in &instrument.detectors {
//!     println!("{}: {} pixels", detector.name, detector.pixel_count());
//! }
//! ```

pub mod error;
pub mod geometry;
pub mod graph;
pub mod math;
pub mod resolver;
pub mod store;
pub mod traits;
pub mod types;

// Re-export all public types
pub use error::*;
pub use geometry::*;
pub use graph::*;
pub use math::*;
pub use resolver::*;
pub use store::*;
pub use traits::*;
pub use types::*;
