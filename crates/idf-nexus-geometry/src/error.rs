// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for geometry processing

use idf_nexus_model::IdfError;
use thiserror::Error;

/// Geometry processing result type
pub type Result<T> = std::result::Result<T, Error>;

/// Geometry processing errors
#[derive(Error, Debug)]
pub enum Error {
    /// Error raised while reading the instrument definition or writing the store
    #[error(transparent)]
    Idf(#[from] IdfError),

    /// Geometry processing error
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// A `depends_on` reference names no transformation
    #[error("Transformation not found: {0}")]
    TransformNotFound(String),

    /// A `depends_on` chain loops back on itself
    #[error("Cyclic depends_on chain through {0}")]
    CyclicDependsOn(String),

    /// Mesh indices or sizes are inconsistent
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// OFF text could not be parsed
    #[error("OFF format error at line {line}: {message}")]
    OffFormat { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a geometry error
    pub fn geometry(msg: impl Into<String>) -> Self {
        Error::Geometry(msg.into())
    }

    /// Create an invalid mesh error
    pub fn invalid_mesh(msg: impl Into<String>) -> Self {
        Error::InvalidMesh(msg.into())
    }

    /// Create an OFF format error
    pub fn off_format(line: usize, msg: impl Into<String>) -> Self {
        Error::OffFormat {
            line,
            message: msg.into(),
        }
    }
}
