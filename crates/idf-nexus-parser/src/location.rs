// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `<location>` and `<locations>` elements

use idf_nexus_model::{axis_angle_between, Orientation, Point, Result, SourcePos};
use roxmltree::Node;

use crate::coords::{spherical_to_cartesian, CoordinateNormalizer};
use crate::document::{attr_f64, attr_i64, child_element, invalid, is_element, pos, required_count};

/// Direction a detector faces before any rotation
pub const FORWARD: Point = Point::new(0.0, 0.0, -1.0);

const PLACEMENT_ATTRIBUTES: [&str; 10] = [
    "x", "y", "z", "r", "t", "p", "rot", "axis-x", "axis-y", "axis-z",
];

/// One placement of a component, positions in the IDF frame and metres
#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    pub name: Option<String>,
    pub position: Point,
    /// Explicit `rot`, NeXus frame, degrees
    pub rotation: Option<Orientation>,
    /// `<facing>` target point, IDF frame
    pub facing: Option<Point>,
    /// No position, rotation or facing given
    pub is_empty: bool,
    pub pos: SourcePos,
}

impl Location {
    /// A location at the origin with no rotation
    pub fn origin() -> Self {
        Self {
            name: None,
            position: Point::zeros(),
            rotation: None,
            facing: None,
            is_empty: true,
            pos: SourcePos::UNKNOWN,
        }
    }

    /// Orientation of a top-level component, NeXus frame
    ///
    /// Facing takes precedence over an explicit rotation. The forward
    /// direction `(0, 0, -1)` is rotated onto the vector from the location to
    /// the facing point.
    pub fn orientation(&self, normalizer: &CoordinateNormalizer) -> Result<Option<Orientation>> {
        let Some(facing) = self.facing else {
            return Ok(self.rotation);
        };
        let toward = normalizer.to_nexus_frame(&(facing - self.position), false);
        let rotation = axis_angle_between(&FORWARD, &toward)
            .map_err(|e| e.in_component(self.name.as_deref().unwrap_or("")))?;
        Ok(rotation.map(|(axis, angle)| Orientation::degrees(axis, angle.to_degrees())))
    }
}

/// Parse a single `<location>`
pub fn parse_location(node: Node<'_, '_>, normalizer: &CoordinateNormalizer) -> Result<Location> {
    let position = normalizer.raw_point(node)?;

    let rotation = match attr_f64(node, "rot")? {
        Some(angle) => {
            let axis = Point::new(
                attr_f64(node, "axis-x")?.unwrap_or(0.0),
                attr_f64(node, "axis-y")?.unwrap_or(0.0),
                attr_f64(node, "axis-z")?.unwrap_or(1.0),
            );
            Some(Orientation::degrees(
                normalizer.direction(&axis),
                normalizer.angle_in_degrees(angle),
            ))
        }
        None => None,
    };

    let facing = match child_element(node, "facing") {
        Some(facing) => Some(normalizer.raw_point(facing)?),
        None => None,
    };

    let is_empty = facing.is_none()
        && PLACEMENT_ATTRIBUTES
            .iter()
            .all(|a| node.attribute(*a).is_none());

    Ok(Location {
        name: node.attribute("name").map(str::to_string),
        position,
        rotation,
        facing,
        is_empty,
        pos: pos(node),
    })
}

/// Expand `<locations n-elements=..>` into evenly spaced locations
///
/// Every coordinate with an `-end` attribute is interpolated from its start
/// value to its end value inclusive; the others are held constant rather
/// than zeroed, so a bank at `z="2"` stepping along `y` stays at `z="2"`.
pub fn parse_locations(node: Node<'_, '_>, normalizer: &CoordinateNormalizer) -> Result<Vec<Location>> {
    let count = required_count(node, "n-elements")?;
    if count == 0 {
        return Err(invalid(node, "n-elements", "must be at least 1".to_string()));
    }
    let base = parse_location(node, normalizer)?;

    let coordinates = ["x", "y", "z", "r", "t", "p", "rot"];
    let mut ranges = Vec::new();
    for name in coordinates {
        if let Some(end) = attr_f64(node, &format!("{}-end", name))? {
            let start = attr_f64(node, name)?.unwrap_or(0.0);
            ranges.push((name, start, end));
        }
    }

    let name_start = attr_i64(node, "name-count-start")?.unwrap_or(0);
    let step_of = |start: f64, end: f64| {
        if count > 1 {
            (end - start) / (count - 1) as f64
        } else {
            0.0
        }
    };

    let mut locations = Vec::with_capacity(count);
    for i in 0..count {
        let mut values = [None; 7];
        for (name, start, end) in &ranges {
            let index = coordinates.iter().position(|c| c == name).unwrap_or(0);
            values[index] = Some(start + step_of(*start, *end) * i as f64);
        }

        let mut location = base.clone();
        location.name = base.name.as_ref().map(|n| format!("{}{}", n, name_start + i as i64));
        if values[..6].iter().any(Option::is_some) {
            location.position = interpolated_point(node, normalizer, &values)?;
            location.is_empty = false;
        }
        if let (Some(angle), Some(rotation)) = (values[6], location.rotation.as_mut()) {
            rotation.angle = normalizer.angle_in_degrees(angle);
        }
        locations.push(location);
    }
    Ok(locations)
}

/// Point with some coordinates overridden by interpolated values
fn interpolated_point(
    node: Node<'_, '_>,
    normalizer: &CoordinateNormalizer,
    values: &[Option<f64>; 7],
) -> Result<Point> {
    let value = |i: usize, name: &str| -> Result<f64> {
        Ok(match values[i] {
            Some(v) => v,
            None => attr_f64(node, name)?.unwrap_or(0.0),
        })
    };

    if values[3..6].iter().any(Option::is_some) || node.attribute("r").is_some() {
        normalizer.check_spherical()?;
        let p = spherical_to_cartesian(
            value(3, "r")?,
            value(4, "t")?,
            value(5, "p")?,
            normalizer.angle_unit,
        );
        Ok(p * normalizer.length_scale)
    } else {
        Ok(Point::new(value(0, "x")?, value(1, "y")?, value(2, "z")?) * normalizer.length_scale)
    }
}

/// All placements declared by a `<component>`, in document order
pub fn component_locations(
    component: Node<'_, '_>,
    normalizer: &CoordinateNormalizer,
) -> Result<Vec<Location>> {
    let mut locations = Vec::new();
    for child in component.children().filter(|n| n.is_element()) {
        if is_element(&child, "location") {
            locations.push(parse_location(child, normalizer)?);
        } else if is_element(&child, "locations") {
            locations.extend(parse_locations(child, normalizer)?);
        }
    }
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{children, parse_document};
    use crate::units::{read_defaults, Defaults};
    use approx::assert_relative_eq;
    use idf_nexus_model::IdfError;

    const TEST_COMPONENT: &str = r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <component type="tube">
    <location x="1.0" name="first" />
    <locations x="0.0" x-end="0.3" y="2.0" n-elements="4" name="tube" name-count-start="1" />
    <location />
  </component>
  <component type="panel">
    <location z="5.0" rot="90" axis-x="0" axis-y="1" axis-z="0">
      <facing x="0" y="0" z="0" />
    </location>
  </component>
</instrument>"#;

    fn normalizer() -> CoordinateNormalizer {
        CoordinateNormalizer::new(&Defaults::default()).unwrap()
    }

    #[test]
    fn test_component_locations() {
        let doc = parse_document(TEST_COMPONENT).unwrap();
        let component = children(doc.root_element(), "component").next().unwrap();
        let locations = component_locations(component, &normalizer()).unwrap();

        assert_eq!(locations.len(), 6);
        assert_eq!(locations[0].name.as_deref(), Some("first"));
        assert_relative_eq!(locations[2].position, Point::new(0.1, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(locations[4].position, Point::new(0.3, 2.0, 0.0), epsilon = 1e-12);
        assert_eq!(locations[1].name.as_deref(), Some("tube1"));
        assert_eq!(locations[4].name.as_deref(), Some("tube4"));
        assert!(locations[5].is_empty);
        assert!(!locations[0].is_empty);
    }

    #[test]
    fn test_facing_wins_over_rot() {
        let doc = parse_document(TEST_COMPONENT).unwrap();
        let component = children(doc.root_element(), "component").nth(1).unwrap();
        let location = component_locations(component, &normalizer()).unwrap().remove(0);
        assert!(location.rotation.is_some());

        // facing the origin from +z means looking along -z: no rotation
        let orientation = location.orientation(&normalizer()).unwrap();
        assert!(orientation.is_none());
    }

    #[test]
    fn test_facing_backwards_is_degenerate() {
        let doc = parse_document(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <location z="-5.0" name="bank"><facing x="0" y="0" z="0" /></location>
</instrument>"#,
        )
        .unwrap();
        let node = children(doc.root_element(), "location").next().unwrap();
        let location = parse_location(node, &normalizer()).unwrap();
        let err = location.orientation(&normalizer()).unwrap_err();
        assert!(err.to_string().contains("bank"));
    }

    #[test]
    fn test_facing_sideways() {
        let doc = parse_document(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <location x="-2.0"><facing x="0" y="0" z="0" /></location>
</instrument>"#,
        )
        .unwrap();
        let node = children(doc.root_element(), "location").next().unwrap();
        let location = parse_location(node, &normalizer()).unwrap();
        let orientation = location.orientation(&normalizer()).unwrap().unwrap();
        assert_relative_eq!(orientation.angle, -90.0, epsilon = 1e-9);
        assert_relative_eq!(orientation.axis, Point::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }

    const SPHERICAL: &str = r#"<component type="bank">
    <location r="2.0" t="90" p="90" name="up" />
    <locations r="1.0" t="0" t-end="90" n-elements="2" />
  </component>"#;

    fn spherical_document(frame: &str) -> String {
        format!(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <defaults>
    <reference-frame>{frame}</reference-frame>
  </defaults>
  {SPHERICAL}
</instrument>"#
        )
    }

    #[test]
    fn test_spherical_locations() {
        let xml = spherical_document(r#"<along-beam axis="z" /><pointing-up axis="y" />"#);
        let doc = parse_document(&xml).unwrap();
        let root = doc.root_element();
        let normalizer = CoordinateNormalizer::new(&read_defaults(root).unwrap()).unwrap();
        let component = children(root, "component").next().unwrap();
        let locations = component_locations(component, &normalizer).unwrap();

        assert_eq!(locations.len(), 3);
        assert_relative_eq!(locations[0].position, Point::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(locations[1].position, Point::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(locations[2].position, Point::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_spherical_needs_beam_along_z() {
        let xml = spherical_document(r#"<along-beam axis="x" /><pointing-up axis="y" />"#);
        let doc = parse_document(&xml).unwrap();
        let root = doc.root_element();
        let normalizer = CoordinateNormalizer::new(&read_defaults(root).unwrap()).unwrap();
        let component = children(root, "component").next().unwrap();

        let location = children(component, "location").next().unwrap();
        let result = parse_location(location, &normalizer);
        assert!(matches!(result, Err(IdfError::UnsupportedReferenceFrame(_))));

        let run = children(component, "locations").next().unwrap();
        let result = parse_locations(run, &normalizer);
        assert!(matches!(result, Err(IdfError::UnsupportedReferenceFrame(_))));

        // cartesian input is fine in the same frame
        let cartesian = parse_document(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <location x="1.0" />
</instrument>"#,
        )
        .unwrap();
        let node = children(cartesian.root_element(), "location").next().unwrap();
        assert!(parse_location(node, &normalizer).is_ok());
    }

    #[test]
    fn test_zero_elements_rejected() {
        let doc = parse_document(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <locations y="0" y-end="1" n-elements="0" />
</instrument>"#,
        )
        .unwrap();
        let node = children(doc.root_element(), "locations").next().unwrap();
        match parse_locations(node, &normalizer()) {
            Err(IdfError::InvalidAttribute { attribute, .. }) => assert_eq!(attribute, "n-elements"),
            other => panic!("unexpected {:?}", other.map(|l| l.len())),
        }
    }
}
