// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IDF-NeXus Parser - Mantid instrument definition reader
//!
//! This crate reads IDF XML into the flat records defined in
//! `idf-nexus-model`: the source, sample position, monitors and detector
//! banks with per-pixel offsets and detector ids, all expressed in the
//! NeXus frame relative to the sample.
//!
//! # Features
//!
//! - **Arbitrary reference frames** mapped onto NeXus axes
//! - **Nested component types** flattened to pixel offsets
//! - **Rectangular and structured panels**
//! - **Per-component failure handling**
//! - **Progress reporting** for large instruments
//!
//! # Example
//!
//! ```ignore
//! use idf_nexus_parser::IdfParser;
//! use idf_nexus_model::InstrumentParser;
//!
//! let parser = IdfParser::lenient();
//! let instrument = parser.parse(idf_content)?;
//! println!("{} pixels", instrument.pixel_count());
//! ```

mod components;
mod coords;
mod document;
mod grid;
mod hierarchy;
mod idlist;
mod location;
mod model;
mod shape;
mod units;

pub use coords::{cartesian_to_spherical, derive_axis_convention, spherical_to_cartesian, CoordinateNormalizer};
pub use document::IDF_NAMESPACE;
pub use hierarchy::{ComponentOutcome, HierarchyResolver, ResolvedType, TypeArena};
pub use idlist::IdLists;
pub use model::parse_instrument;
pub use units::{length_unit_scale, read_defaults, scales, Defaults};

use idf_nexus_model::{IdfError, InstrumentParser, ParsedInstrument, Point, ProgressCallback, Result};
use serde::{Deserialize, Serialize};

/// What to do when one component cannot be resolved
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum FailureMode {
    /// Fail the whole parse
    #[default]
    Abort,
    /// Log, record in [`ParsedInstrument::failures`] and continue
    SkipComponent,
}

/// Point subtracted from every top-level position
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
pub enum ReferenceOrigin {
    /// The sample position, or zero when the sample is skipped
    #[default]
    Sample,
    /// A fixed point in the NeXus frame
    Absolute(Point),
}

/// IDF parser implementing [`InstrumentParser`]
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct IdfParser {
    pub failure_mode: FailureMode,
    pub origin: ReferenceOrigin,
}

impl IdfParser {
    /// Create a parser that aborts on the first failing component
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser that skips failing components
    pub fn lenient() -> Self {
        Self::new().with_failure_mode(FailureMode::SkipComponent)
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn with_origin(mut self, origin: ReferenceOrigin) -> Self {
        self.origin = origin;
        self
    }
}

impl InstrumentParser for IdfParser {
    fn parse(&self, content: &str) -> Result<ParsedInstrument> {
        parse_instrument(content, self.failure_mode, self.origin, &|_, _| {})
    }

    fn parse_with_progress(
        &self,
        content: &str,
        on_progress: ProgressCallback,
    ) -> Result<ParsedInstrument> {
        parse_instrument(content, self.failure_mode, self.origin, &*on_progress)
    }
}

/// Quick parse function for simple use cases
pub fn parse(content: &str) -> Result<ParsedInstrument> {
    IdfParser::new().parse(content)
}

/// Parse with progress reporting
pub fn parse_with_progress(
    content: &str,
    on_progress: impl Fn(&str, f32) + Send + 'static,
) -> Result<ParsedInstrument> {
    IdfParser::new().parse_with_progress(content, Box::new(on_progress))
}

/// Pretty JSON dump of the parsed records, for inspection
pub fn to_json(instrument: &ParsedInstrument) -> Result<String> {
    serde_json::to_string_pretty(instrument).map_err(|e| IdfError::format(e.to_string()))
}
