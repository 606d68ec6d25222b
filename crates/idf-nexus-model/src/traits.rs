// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core traits for instrument parsing and hierarchical output
//!
//! These traits define the seams between the parser, the geometry builder
//! and whatever store the NeXus hierarchy is finally written into.

use crate::store::{AttrValue, Dataset};
use crate::{ParsedInstrument, Result};

/// Progress callback type for parsing operations
pub type ProgressCallback = Box<dyn Fn(&str, f32) + Send>;

/// Main parsing interface - entry point for parsing IDF content
///
/// # Example
///
/// ```ignore
/// use idf_nexus_model::InstrumentParser;
///
/// let parser: Box<dyn InstrumentParser> = get_parser();
/// let instrument = parser.parse(idf_content)?;
/// println!("{}: {} pixels", instrument.name, instrument.pixel_count());
/// ```
pub trait InstrumentParser: Send + Sync {
    /// Parse IDF content into resolved instrument records
    ///
    /// # Arguments
    /// * `content` - The IDF file content as a string
    fn parse(&self, content: &str) -> Result<ParsedInstrument>;

    /// Parse IDF content with progress reporting
    ///
    /// # Arguments
    /// * `content` - The IDF file content as a string
    /// * `on_progress` - Callback function receiving (phase_name, percent_complete)
    fn parse_with_progress(
        &self,
        content: &str,
        on_progress: ProgressCallback,
    ) -> Result<ParsedInstrument>;
}

/// Hierarchical group/dataset store, e.g. an HDF5 file
///
/// Paths are absolute and slash separated. Parents must exist before
/// children are created.
pub trait NexusStore {
    /// Create a group tagged with `NX_class`
    fn create_group(&mut self, path: &str, nx_class: &str) -> Result<()>;

    /// Write a dataset
    fn write_dataset(&mut self, path: &str, dataset: Dataset) -> Result<()>;

    /// Set an attribute on an existing group or dataset
    fn set_attribute(&mut self, path: &str, name: &str, value: AttrValue) -> Result<()>;

    /// Make `path` refer to the existing object at `target`
    fn link(&mut self, path: &str, target: &str) -> Result<()>;
}
