// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for instrument definition data
//!
//! This module defines the records produced by parsing an instrument
//! definition: the axis convention, pixel shapes and the resolved detectors,
//! monitors and source. All lengths are in metres once parsed.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{IdfError, SourcePos};

/// A 3-vector in metres (or a direction)
pub type Point = Vector3<f64>;

/// Cartesian axis
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index in a 3-vector
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
        }
    }

    /// Unit basis vector
    pub fn unit(self) -> Point {
        let mut v = Point::zeros();
        v[self.index()] = 1.0;
        v
    }

    /// Cross product of two basis vectors as (axis, sign)
    ///
    /// Returns `None` when both axes are the same.
    pub fn cross(self, other: Axis) -> Option<(Axis, f64)> {
        match (self, other) {
            (Axis::X, Axis::Y) => Some((Axis::Z, 1.0)),
            (Axis::Y, Axis::X) => Some((Axis::Z, -1.0)),
            (Axis::Y, Axis::Z) => Some((Axis::X, 1.0)),
            (Axis::Z, Axis::Y) => Some((Axis::X, -1.0)),
            (Axis::Z, Axis::X) => Some((Axis::Y, 1.0)),
            (Axis::X, Axis::Z) => Some((Axis::Y, -1.0)),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Axis with a direction, as written in `<along-beam axis="-z"/>`
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct SignedAxis {
    pub axis: Axis,
    pub sign: f64,
}

impl SignedAxis {
    pub fn positive(axis: Axis) -> Self {
        Self { axis, sign: 1.0 }
    }
}

impl FromStr for SignedAxis {
    type Err = IdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (sign, letter) = match trimmed.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let axis = match letter.to_ascii_lowercase().as_str() {
            "x" => Axis::X,
            "y" => Axis::Y,
            "z" => Axis::Z,
            _ => {
                return Err(IdfError::reference_frame(format!(
                    "'{}' is not an axis",
                    s
                )))
            }
        };
        Ok(Self { axis, sign })
    }
}

/// Handedness of the IDF coordinate system
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Handedness {
    #[default]
    Right,
    Left,
}

impl FromStr for Handedness {
    type Err = IdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "right" => Ok(Handedness::Right),
            "left" => Ok(Handedness::Left),
            other => Err(IdfError::reference_frame(format!(
                "unknown handedness '{}'",
                other
            ))),
        }
    }
}

/// Mapping from IDF axes to NeXus axes
///
/// `nexus_axes[i]` is the NeXus axis receiving IDF component `i`, scaled by
/// `signs[i]`. The mapping is a signed permutation, so it is always
/// invertible.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct AxisConvention {
    pub nexus_axes: [Axis; 3],
    pub signs: [f64; 3],
    pub along_beam: SignedAxis,
    pub pointing_up: SignedAxis,
    pub handedness: Handedness,
}

impl AxisConvention {
    /// The NeXus convention itself: beam along +z, +y up, right handed
    pub fn canonical() -> Self {
        Self {
            nexus_axes: [Axis::X, Axis::Y, Axis::Z],
            signs: [1.0, 1.0, 1.0],
            along_beam: SignedAxis::positive(Axis::Z),
            pointing_up: SignedAxis::positive(Axis::Y),
            handedness: Handedness::Right,
        }
    }

    pub fn is_canonical(&self) -> bool {
        *self == Self::canonical()
    }

    /// Map an IDF vector into the NeXus frame
    pub fn apply(&self, v: &Point) -> Point {
        let mut out = Point::zeros();
        for i in 0..3 {
            out[self.nexus_axes[i].index()] = self.signs[i] * v[i];
        }
        out
    }

    /// Map a NeXus vector back into the IDF frame
    pub fn invert(&self, v: &Point) -> Point {
        let mut out = Point::zeros();
        for i in 0..3 {
            out[i] = self.signs[i] * v[self.nexus_axes[i].index()];
        }
        out
    }
}

impl Default for AxisConvention {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Units of a rotation angle
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

impl AngleUnit {
    /// Unit string as stored on transformation datasets
    pub fn as_str(&self) -> &'static str {
        match self {
            AngleUnit::Degrees => "degrees",
            AngleUnit::Radians => "radians",
        }
    }

    /// Parse a stored unit string; `None` if it is not an angle unit
    pub fn parse(units: &str) -> Option<Self> {
        match units.trim() {
            "deg" | "degree" | "degrees" => Some(AngleUnit::Degrees),
            "rad" | "radian" | "radians" => Some(AngleUnit::Radians),
            _ => None,
        }
    }

    pub fn to_radians(&self, angle: f64) -> f64 {
        match self {
            AngleUnit::Degrees => angle.to_radians(),
            AngleUnit::Radians => angle,
        }
    }
}

/// Axis-angle rotation
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct Orientation {
    pub axis: Point,
    pub angle: f64,
    pub units: AngleUnit,
}

impl Orientation {
    pub fn degrees(axis: Point, angle: f64) -> Self {
        Self {
            axis,
            angle,
            units: AngleUnit::Degrees,
        }
    }

    pub fn radians(&self) -> f64 {
        self.units.to_radians(self.angle)
    }
}

/// Primitive shape of a single pixel
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum PixelShape {
    /// Box pixel, kept parametric
    Cuboid {
        x_size: f64,
        y_size: f64,
        thickness: f64,
    },
    /// Tube pixel; `axis` is a unit vector
    Cylinder {
        axis: Point,
        radius: f64,
        height: f64,
    },
}

impl PixelShape {
    pub fn kind(&self) -> &'static str {
        match self {
            PixelShape::Cuboid { .. } => "cuboid",
            PixelShape::Cylinder { .. } => "cylinder",
        }
    }
}

/// A leaf detector type and its shape
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PixelType {
    pub name: String,
    pub shape: PixelShape,
}

/// Top-level detector with its pixels flattened into offsets
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ResolvedDetector {
    pub name: String,
    pub type_name: String,
    /// Type names from the pixel up to the top-level type
    pub sub_component_type_chain: Vec<String>,
    pub pixel: PixelType,
    /// Pixel positions relative to the detector origin, in idlist order
    pub offsets: Vec<Point>,
    pub ids: Vec<i64>,
    pub location: Point,
    pub orientation: Option<Orientation>,
    pub pos: SourcePos,
}

impl ResolvedDetector {
    pub fn pixel_count(&self) -> usize {
        self.offsets.len()
    }
}

/// Beam monitor
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Monitor {
    pub name: String,
    pub type_name: String,
    pub detector_id: i64,
    pub location: Point,
    pub orientation: Option<Orientation>,
    pub shape: Option<PixelShape>,
}

/// Neutron source
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub type_name: String,
    pub location: Point,
}

/// `StructuredDetector`: every pixel is a quad between grid vertices
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GridDetector {
    pub name: String,
    pub type_name: String,
    pub x_pixels: usize,
    pub y_pixels: usize,
    /// Corner vertices, x varying fastest, `(x_pixels + 1) * (y_pixels + 1)`
    pub vertices: Vec<Point>,
    /// Pixel centres relative to the detector origin, x varying fastest
    pub offsets: Vec<Point>,
    pub ids: Vec<i64>,
    pub location: Point,
    pub orientation: Option<Orientation>,
}

impl GridDetector {
    /// Corner vertex indices of pixel (i, j), counter-clockwise
    pub fn quad(&self, i: usize, j: usize) -> [usize; 4] {
        let row = self.x_pixels + 1;
        [
            j * row + i,
            j * row + i + 1,
            (j + 1) * row + i + 1,
            (j + 1) * row + i,
        ]
    }
}

/// A component that was skipped during parsing
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ComponentFailure {
    pub component: String,
    pub message: String,
}

/// Everything extracted from one instrument definition
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct ParsedInstrument {
    pub name: String,
    pub convention: AxisConvention,
    pub source: Option<Source>,
    /// Sample position in the NeXus frame, before origin subtraction
    pub sample_position: Option<Point>,
    /// Point subtracted from every top-level position
    pub origin: Point,
    pub monitors: Vec<Monitor>,
    pub detectors: Vec<ResolvedDetector>,
    pub grid_detectors: Vec<GridDetector>,
    pub failures: Vec<ComponentFailure>,
}

impl ParsedInstrument {
    /// Total number of detector pixels across all detectors
    pub fn pixel_count(&self) -> usize {
        self.detectors.iter().map(|d| d.pixel_count()).sum::<usize>()
            + self.grid_detectors.iter().map(|d| d.ids.len()).sum::<usize>()
    }
}
