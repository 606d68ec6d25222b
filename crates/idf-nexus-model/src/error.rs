// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for instrument definition parsing and geometry resolution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for parser operations
pub type Result<T> = std::result::Result<T, IdfError>;

/// Position of an element in the XML text (1-based)
///
/// A line of zero means the position is unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub const UNKNOWN: SourcePos = SourcePos { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "line {}, column {}", self.line, self.column)
        } else {
            write!(f, "unknown position")
        }
    }
}

/// Errors that can occur while resolving an instrument definition
///
/// Errors are cheap to clone so a failed type can be reported for every
/// top-level component that uses it.
#[derive(Error, Debug, Clone)]
pub enum IdfError {
    /// Document is not a parseable instrument definition
    #[error("Invalid instrument definition: {0}")]
    InvalidFormat(String),

    /// A required element is absent
    #[error("{what} not found in IDF")]
    NotFoundInIdf { what: String },

    /// A detector type has no recognised primitive shape
    #[error("Type '{type_name}' has no recognised pixel shape ({reason}) at {pos}")]
    UnknownPixelShape {
        type_name: String,
        reason: String,
        pos: SourcePos,
    },

    /// Reference frame cannot be mapped onto the NeXus frame
    #[error("Unsupported reference frame: {0}")]
    UnsupportedReferenceFrame(String),

    /// Idlist reference missing or inconsistent with the pixel count
    #[error("Malformed idlist for component '{component}' at {pos}: {message}")]
    MalformedIdList {
        component: String,
        message: String,
        pos: SourcePos,
    },

    /// Anti-parallel vectors have no well-defined rotation axis
    #[error("No well-defined rotation for '{component}' between anti-parallel vectors {a:?} and {b:?}")]
    DegenerateRotation {
        component: String,
        a: [f64; 3],
        b: [f64; 3],
    },

    /// A detector module resolves to more than one pixel type
    #[error("Component type '{type_name}' mixes pixel types {pixel_types:?} at {pos}")]
    InconsistentPixelType {
        type_name: String,
        pixel_types: Vec<String>,
        pos: SourcePos,
    },

    /// Attribute missing or not parseable
    #[error("Invalid attribute '{attribute}' on <{element}> at {pos}: {message}")]
    InvalidAttribute {
        element: String,
        attribute: String,
        message: String,
        pos: SourcePos,
    },

    /// Type graph is not acyclic
    #[error("Component type '{0}' is part of a cyclic type reference")]
    CyclicTypeReference(String),

    /// Hierarchical store rejected an operation
    #[error("Store error at '{path}': {message}")]
    Store { path: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for IdfError {
    fn from(err: std::io::Error) -> Self {
        IdfError::Io(Arc::new(err))
    }
}

impl IdfError {
    /// Create a new format error
    pub fn format(msg: impl Into<String>) -> Self {
        IdfError::InvalidFormat(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        IdfError::NotFoundInIdf { what: what.into() }
    }

    /// Create an unsupported reference frame error
    pub fn reference_frame(msg: impl Into<String>) -> Self {
        IdfError::UnsupportedReferenceFrame(msg.into())
    }

    /// Create a malformed idlist error
    pub fn idlist(component: impl Into<String>, msg: impl Into<String>, pos: SourcePos) -> Self {
        IdfError::MalformedIdList {
            component: component.into(),
            message: msg.into(),
            pos,
        }
    }

    /// Create a store error
    pub fn store(path: impl Into<String>, msg: impl Into<String>) -> Self {
        IdfError::Store {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Attach a component name to errors raised below the component level
    pub fn in_component(self, name: &str) -> Self {
        match self {
            IdfError::DegenerateRotation { component, a, b } if component.is_empty() => {
                IdfError::DegenerateRotation {
                    component: name.to_string(),
                    a,
                    b,
                }
            }
            other => other,
        }
    }
}
