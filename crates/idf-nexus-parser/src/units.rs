// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unit and reference frame defaults from the `<defaults>` element

use idf_nexus_model::{AngleUnit, Axis, Handedness, IdfError, Result, SignedAxis};
use roxmltree::Node;

use crate::document::{child_element, pos};

/// Instrument-wide defaults
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Defaults {
    /// File length unit to metres
    pub length_scale: f64,
    pub angle_unit: AngleUnit,
    pub along_beam: SignedAxis,
    pub pointing_up: SignedAxis,
    pub handedness: Handedness,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            length_scale: scales::METRE,
            angle_unit: AngleUnit::Degrees,
            along_beam: SignedAxis::positive(Axis::Z),
            pointing_up: SignedAxis::positive(Axis::Y),
            handedness: Handedness::Right,
        }
    }
}

/// Read `<defaults>`; anything missing keeps its default
pub fn read_defaults(root: Node<'_, '_>) -> Result<Defaults> {
    let mut defaults = Defaults::default();
    let Some(node) = child_element(root, "defaults") else {
        return Ok(defaults);
    };

    if let Some(length) = child_element(node, "length") {
        if let Some(unit) = length.attribute("unit") {
            defaults.length_scale = length_unit_scale(unit).ok_or_else(|| {
                IdfError::InvalidAttribute {
                    element: "length".to_string(),
                    attribute: "unit".to_string(),
                    message: format!("unknown length unit '{}'", unit),
                    pos: pos(length),
                }
            })?;
        }
    }

    if let Some(angle) = child_element(node, "angle") {
        if let Some(unit) = angle.attribute("unit") {
            defaults.angle_unit = AngleUnit::parse(unit).ok_or_else(|| IdfError::InvalidAttribute {
                element: "angle".to_string(),
                attribute: "unit".to_string(),
                message: format!("unknown angle unit '{}'", unit),
                pos: pos(angle),
            })?;
        }
    }

    if let Some(frame) = child_element(node, "reference-frame") {
        if let Some(axis) = child_element(frame, "along-beam").and_then(|n| n.attribute("axis")) {
            defaults.along_beam = axis.parse()?;
        }
        if let Some(axis) = child_element(frame, "pointing-up").and_then(|n| n.attribute("axis")) {
            defaults.pointing_up = axis.parse()?;
        }
        if let Some(val) = child_element(frame, "handedness").and_then(|n| n.attribute("val")) {
            defaults.handedness = val.parse()?;
        }
    }

    Ok(defaults)
}

/// Scale from a length unit name to metres
///
/// Accepts plain and SI-prefixed metres plus the common imperial units.
/// Returns `None` for anything else.
pub fn length_unit_scale(unit: &str) -> Option<f64> {
    let unit = unit.trim().to_ascii_lowercase();
    let scale = match unit.as_str() {
        "m" | "metre" | "meter" | "metres" | "meters" => scales::METRE,
        "mm" | "millimetre" | "millimeter" | "millimetres" | "millimeters" => scales::MILLIMETRE,
        "cm" | "centimetre" | "centimeter" | "centimetres" | "centimeters" => scales::CENTIMETRE,
        "km" | "kilometre" | "kilometer" | "kilometres" | "kilometers" => scales::KILOMETRE,
        "um" | "micrometre" | "micrometer" | "micron" | "microns" => scales::MICROMETRE,
        "in" | "inch" | "inches" => scales::INCH,
        "ft" | "foot" | "feet" => scales::FOOT,
        "yd" | "yard" | "yards" => scales::YARD,
        _ => return None,
    };
    Some(scale)
}

/// Common unit scales for reference
pub mod scales {
    /// Meters to meters (identity)
    pub const METRE: f64 = 1.0;
    /// Millimeters to meters
    pub const MILLIMETRE: f64 = 0.001;
    /// Centimeters to meters
    pub const CENTIMETRE: f64 = 0.01;
    /// Micrometres to meters
    pub const MICROMETRE: f64 = 1e-6;
    /// Kilometers to meters
    pub const KILOMETRE: f64 = 1000.0;
    /// Inches to meters
    pub const INCH: f64 = 0.0254;
    /// Feet to meters
    pub const FOOT: f64 = 0.3048;
    /// Yards to meters
    pub const YARD: f64 = 0.9144;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;

    #[test]
    fn test_prefix_scales() {
        assert!((scales::MILLIMETRE - 0.001).abs() < 1e-10);
        assert!((scales::INCH - 0.0254).abs() < 1e-10);
        assert!((scales::FOOT - 0.3048).abs() < 1e-10);
    }

    #[test]
    fn test_length_unit_names() {
        assert_eq!(length_unit_scale("metre"), Some(1.0));
        assert_eq!(length_unit_scale("Meter"), Some(1.0));
        assert_eq!(length_unit_scale("mm"), Some(0.001));
        assert_eq!(length_unit_scale("parsec"), None);
    }

    #[test]
    fn test_missing_defaults() {
        let doc = parse_document(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T"/>"#,
        )
        .unwrap();
        assert_eq!(read_defaults(doc.root_element()).unwrap(), Defaults::default());
    }

    #[test]
    fn test_read_defaults() {
        let doc = parse_document(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <defaults>
    <length unit="mm" />
    <angle unit="radian" />
    <reference-frame>
      <along-beam axis="x" />
      <pointing-up axis="-z" />
      <handedness val="left" />
    </reference-frame>
  </defaults>
</instrument>"#,
        )
        .unwrap();
        let defaults = read_defaults(doc.root_element()).unwrap();
        assert_eq!(defaults.length_scale, 0.001);
        assert_eq!(defaults.angle_unit, AngleUnit::Radians);
        assert_eq!(defaults.along_beam.axis, Axis::X);
        assert_eq!(defaults.pointing_up.axis, Axis::Z);
        assert_eq!(defaults.pointing_up.sign, -1.0);
        assert_eq!(defaults.handedness, Handedness::Left);
    }

    #[test]
    fn test_unknown_length_unit() {
        let doc = parse_document(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <defaults><length unit="furlong" /></defaults>
</instrument>"#,
        )
        .unwrap();
        assert!(read_defaults(doc.root_element()).is_err());
    }
}
