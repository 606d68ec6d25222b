// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembly of a complete [`ParsedInstrument`] from IDF text

use idf_nexus_model::{ComponentFailure, ParsedInstrument, Point, Result};
use log::{info, warn};

use crate::components::{instrument_name, monitors, sample_position, source};
use crate::coords::CoordinateNormalizer;
use crate::document::parse_document;
use crate::grid::{rectangular_detectors, structured_detectors};
use crate::hierarchy::{ComponentOutcome, HierarchyResolver, TypeArena};
use crate::idlist::IdLists;
use crate::units::read_defaults;
use crate::{FailureMode, ReferenceOrigin};

/// Applies the failure mode to per-component results
struct Failures {
    mode: FailureMode,
    list: Vec<ComponentFailure>,
}

impl Failures {
    fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            list: Vec::new(),
        }
    }

    /// Pass a success through; abort or record a failure
    fn settle<T>(&mut self, component: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) => match self.mode {
                FailureMode::Abort => Err(e),
                FailureMode::SkipComponent => {
                    warn!("Skipping component '{}': {}", component, e);
                    self.list.push(ComponentFailure {
                        component: component.to_string(),
                        message: e.to_string(),
                    });
                    Ok(None)
                }
            },
        }
    }

    fn settle_all<T>(&mut self, outcomes: Vec<ComponentOutcome<Vec<T>>>, into: &mut Vec<T>) -> Result<()> {
        for outcome in outcomes {
            if let Some(items) = self.settle(&outcome.name, outcome.result)? {
                into.extend(items);
            }
        }
        Ok(())
    }
}

/// Parse IDF text into resolved records
pub fn parse_instrument(
    content: &str,
    failure_mode: FailureMode,
    origin: ReferenceOrigin,
    on_progress: &dyn Fn(&str, f32),
) -> Result<ParsedInstrument> {
    on_progress("Parsing XML", 0.0);
    let document = parse_document(content)?;
    let root = document.root_element();

    let defaults = read_defaults(root)?;
    let normalizer = CoordinateNormalizer::new(&defaults)?;
    let arena = TypeArena::build(root);
    let idlists = IdLists::index(root);
    on_progress("Indexing types", 10.0);

    let mut failures = Failures::new(failure_mode);
    let mut instrument = ParsedInstrument {
        name: instrument_name(root),
        convention: normalizer.convention,
        ..Default::default()
    };

    let sample = sample_position(root, &arena, &normalizer);
    let origin_point = match origin {
        ReferenceOrigin::Sample => {
            instrument.sample_position = failures.settle("sample", sample)?;
            instrument.sample_position.unwrap_or_else(Point::zeros)
        }
        ReferenceOrigin::Absolute(point) => {
            instrument.sample_position = sample.ok();
            point
        }
    };
    instrument.origin = origin_point;
    let normalizer = normalizer.with_origin(origin_point);

    instrument.source = failures.settle("source", source(root, &arena, &normalizer))?;
    on_progress("Resolving monitors", 20.0);

    failures.settle_all(
        monitors(root, &arena, &normalizer, &idlists),
        &mut instrument.monitors,
    )?;
    on_progress("Resolving detectors", 30.0);

    let resolver = HierarchyResolver::new(root, &arena, &normalizer, &idlists);
    let structured = structured_detectors(root, &arena, &normalizer);
    if resolver.has_pixel_types() || structured.is_empty() {
        if let Some(outcomes) = failures.settle("detectors", resolver.resolve_detectors())? {
            failures.settle_all(outcomes, &mut instrument.detectors)?;
        }
    }
    on_progress("Resolving panels", 80.0);

    failures.settle_all(
        rectangular_detectors(root, &arena, &normalizer),
        &mut instrument.detectors,
    )?;
    failures.settle_all(structured, &mut instrument.grid_detectors)?;

    instrument.failures = failures.list;
    info!(
        "Parsed instrument '{}': {} detectors, {} grid detectors, {} monitors, {} pixels, {} skipped",
        instrument.name,
        instrument.detectors.len(),
        instrument.grid_detectors.len(),
        instrument.monitors.len(),
        instrument.pixel_count(),
        instrument.failures.len()
    );
    on_progress("Complete", 100.0);
    Ok(instrument)
}
