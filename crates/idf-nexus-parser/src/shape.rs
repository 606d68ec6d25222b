// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pixel shape extraction from `<type>` geometry primitives

use idf_nexus_model::{normalise, IdfError, PixelShape, Point, Result};
use log::warn;
use roxmltree::Node;

use crate::coords::CoordinateNormalizer;
use crate::document::{attr_f64, child_element, pos};

/// Every primitive the IDF schema allows directly in a type
const SHAPE_TAGS: [&str; 11] = [
    "cuboid",
    "cylinder",
    "segmented-cylinder",
    "hollow-cylinder",
    "sphere",
    "hexahedron",
    "cone",
    "infinite-cylinder",
    "infinite-cone",
    "infinite-plane",
    "slice-of-cylinder-ring",
];

/// Decide the single primitive shape of a pixel type
pub fn parse_pixel_shape(type_node: Node<'_, '_>, normalizer: &CoordinateNormalizer) -> Result<PixelShape> {
    let type_name = type_node.attribute("name").unwrap_or_default();
    let unknown = |reason: String| IdfError::UnknownPixelShape {
        type_name: type_name.to_string(),
        reason,
        pos: pos(type_node),
    };

    let shapes: Vec<_> = type_node
        .children()
        .filter(|n| n.is_element() && SHAPE_TAGS.contains(&n.tag_name().name()))
        .collect();

    let shape = match shapes.as_slice() {
        [] => return Err(unknown("no geometry primitive".to_string())),
        [shape] => *shape,
        _ => return Err(unknown(format!("{} geometry primitives", shapes.len()))),
    };

    match shape.tag_name().name() {
        "cuboid" => {
            let corner = |tag: &str| {
                child_element(shape, tag)
                    .ok_or_else(|| unknown(format!("cuboid is missing <{}>", tag)))
            };
            parse_cuboid(
                corner("left-front-bottom-point")?,
                corner("right-front-bottom-point")?,
                corner("left-back-bottom-point")?,
                corner("left-front-top-point")?,
                normalizer,
            )
        }
        "cylinder" | "segmented-cylinder" => parse_cylinder(shape, type_name, normalizer)?
            .ok_or_else(|| unknown("cylinder needs a non-zero axis, radius and height".to_string())),
        other => Err(unknown(format!("<{}> is not supported", other))),
    }
}

/// Cuboid sizes from its corner points
///
/// Left to right is the x size, front to back the y size and bottom to top
/// the thickness.
fn parse_cuboid(
    left_front_bottom: Node<'_, '_>,
    right_front_bottom: Node<'_, '_>,
    left_back_bottom: Node<'_, '_>,
    left_front_top: Node<'_, '_>,
    normalizer: &CoordinateNormalizer,
) -> Result<PixelShape> {
    let origin = normalizer.raw_point(left_front_bottom)?;
    let size = |n: Node<'_, '_>| -> Result<f64> { Ok((normalizer.raw_point(n)? - origin).norm()) };
    Ok(PixelShape::Cuboid {
        x_size: size(right_front_bottom)?,
        y_size: size(left_back_bottom)?,
        thickness: size(left_front_top)?,
    })
}

fn parse_cylinder(
    node: Node<'_, '_>,
    type_name: &str,
    normalizer: &CoordinateNormalizer,
) -> Result<Option<PixelShape>> {
    let (Some(axis), Some(radius), Some(height)) = (
        child_element(node, "axis"),
        child_element(node, "radius"),
        child_element(node, "height"),
    ) else {
        return Ok(None);
    };

    let raw_axis = Point::new(
        attr_f64(axis, "x")?.unwrap_or(0.0),
        attr_f64(axis, "y")?.unwrap_or(0.0),
        attr_f64(axis, "z")?.unwrap_or(0.0),
    );
    let (unit_axis, magnitude) = normalise(&normalizer.direction(&raw_axis));
    if magnitude == 0.0 {
        return Ok(None);
    }
    if (magnitude - 1.0).abs() > 1e-9 {
        warn!(
            "Cylinder axis of '{}' has length {}, normalising",
            type_name, magnitude
        );
    }

    let (Some(radius), Some(height)) = (attr_f64(radius, "val")?, attr_f64(height, "val")?) else {
        return Ok(None);
    };

    Ok(Some(PixelShape::Cylinder {
        axis: unit_axis,
        radius: normalizer.length(radius),
        height: normalizer.length(height),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{children, parse_document};
    use crate::units::Defaults;
    use approx::assert_relative_eq;

    const TEST_SHAPES: &str = r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <type name="box" is="detector">
    <cuboid id="shape">
      <left-front-bottom-point x="-0.5" y="-1.0" z="0.0" />
      <left-front-top-point x="-0.5" y="-1.0" z="0.25" />
      <left-back-bottom-point x="-0.5" y="1.0" z="0.0" />
      <right-front-bottom-point x="0.5" y="-1.0" z="0.0" />
    </cuboid>
  </type>
  <type name="tube" is="detector">
    <cylinder id="shape">
      <centre-of-bottom-base x="0.0" y="0.0" z="0.0" />
      <axis x="0.0" y="2.0" z="0.0" />
      <radius val="0.004" />
      <height val="0.01" />
    </cylinder>
  </type>
  <type name="ball" is="detector">
    <sphere id="shape"><radius val="1" /></sphere>
  </type>
  <type name="bare" is="detector" />
  <type name="half_box" is="detector">
    <cuboid id="shape">
      <left-front-bottom-point x="0" />
    </cuboid>
  </type>
</instrument>"#;

    fn shape_of(name: &str) -> Result<PixelShape> {
        let doc = parse_document(TEST_SHAPES).unwrap();
        let normalizer = CoordinateNormalizer::new(&Defaults::default()).unwrap();
        let node = children(doc.root_element(), "type")
            .find(|t| t.attribute("name") == Some(name))
            .unwrap();
        parse_pixel_shape(node, &normalizer)
    }

    #[test]
    fn test_cuboid() {
        match shape_of("box").unwrap() {
            PixelShape::Cuboid {
                x_size,
                y_size,
                thickness,
            } => {
                assert_relative_eq!(x_size, 1.0);
                assert_relative_eq!(y_size, 2.0);
                assert_relative_eq!(thickness, 0.25);
            }
            other => panic!("expected cuboid, got {:?}", other),
        }
    }

    #[test]
    fn test_cylinder_axis_is_normalised() {
        match shape_of("tube").unwrap() {
            PixelShape::Cylinder {
                axis,
                radius,
                height,
            } => {
                assert_relative_eq!(axis, Point::y());
                assert_relative_eq!(radius, 0.004);
                assert_relative_eq!(height, 0.01);
            }
            other => panic!("expected cylinder, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_shapes() {
        for name in ["ball", "bare", "half_box"] {
            assert!(matches!(
                shape_of(name),
                Err(IdfError::UnknownPixelShape { .. })
            ));
        }
    }
}
