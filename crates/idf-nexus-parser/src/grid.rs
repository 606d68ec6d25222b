// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `RectangularDetector` and `StructuredDetector` panels

use idf_nexus_model::{GridDetector, IdfError, PixelType, Point, ResolvedDetector, Result};
use roxmltree::Node;

use crate::coords::CoordinateNormalizer;
use crate::document::{attr_i64, children, is_kind, pos, required_attr, required_count, required_f64};
use crate::hierarchy::{ComponentOutcome, TypeArena};
use crate::location::{component_locations, Location};
use crate::shape::parse_pixel_shape;

/// Root components placing a type of the given kind
fn placements<'a, 'input>(
    root: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    kind: &str,
) -> Vec<(usize, Node<'a, 'input>)> {
    let types: Vec<usize> = arena.of_kind(kind).collect();
    if types.is_empty() {
        return Vec::new();
    }
    children(root, "component")
        .filter_map(|component| {
            let t = component.attribute("type").and_then(|t| arena.id(t))?;
            types.contains(&t).then_some((t, component))
        })
        .collect()
}

/// Detector ids of an `x_pixels` by `y_pixels` grid, x varying fastest
///
/// Follows the `idstart`, `idfillbyfirst`, `idstep` and `idstepbyrow`
/// attributes of the placing component.
pub fn grid_ids(component: Node<'_, '_>, x_pixels: usize, y_pixels: usize) -> Result<Vec<i64>> {
    let start = attr_i64(component, "idstart")?.unwrap_or(0);
    let fill_y_first = component.attribute("idfillbyfirst").map_or(true, |f| f != "x");
    let step = attr_i64(component, "idstep")?.unwrap_or(1);
    let default_row = if fill_y_first { y_pixels as i64 } else { x_pixels as i64 };
    let by_row = attr_i64(component, "idstepbyrow")?.unwrap_or(default_row);

    let mut ids = Vec::with_capacity(x_pixels * y_pixels);
    for j in 0..y_pixels as i64 {
        for i in 0..x_pixels as i64 {
            ids.push(if fill_y_first {
                start + i * by_row + j * step
            } else {
                start + j * by_row + i * step
            });
        }
    }
    Ok(ids)
}

fn name_for(component: Node<'_, '_>, location: &Location, type_name: &str, k: usize, count: usize) -> String {
    if let Some(name) = &location.name {
        return name.clone();
    }
    let base = component.attribute("name").unwrap_or(type_name);
    if count > 1 {
        format!("{}_{}", base, k + 1)
    } else {
        base.to_string()
    }
}

fn locations_or_origin(component: Node<'_, '_>, normalizer: &CoordinateNormalizer) -> Result<Vec<Location>> {
    let mut locations = component_locations(component, normalizer)?;
    if locations.is_empty() {
        locations.push(Location::origin());
    }
    Ok(locations)
}

/// Regular panels of one repeated pixel type
///
/// A component with several locations yields one detector per location,
/// each continuing the id sequence of the previous one.
pub fn rectangular_detectors<'a, 'input>(
    root: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    normalizer: &CoordinateNormalizer,
) -> Vec<ComponentOutcome<Vec<ResolvedDetector>>> {
    placements(root, arena, "RectangularDetector")
        .into_iter()
        .map(|(t, component)| {
            let name = component.attribute("name").unwrap_or_else(|| arena.name(t)).to_string();
            let result = rectangular(t, component, arena, normalizer);
            ComponentOutcome { name, result }
        })
        .collect()
}

fn rectangular<'a, 'input>(
    t: usize,
    component: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    normalizer: &CoordinateNormalizer,
) -> Result<Vec<ResolvedDetector>> {
    let node = arena.node(t);
    let type_name = arena.name(t);
    let pixel_name = required_attr(node, "type")?;
    let pixel_node = arena
        .id(pixel_name)
        .map(|id| arena.node(id))
        .filter(|n| is_kind(*n, "detector"))
        .ok_or_else(|| IdfError::not_found(format!("pixel type '{}' of '{}'", pixel_name, type_name)))?;
    let pixel = PixelType {
        name: pixel_name.to_string(),
        shape: parse_pixel_shape(pixel_node, normalizer)?,
    };

    let x_pixels = required_count(node, "xpixels")?;
    let y_pixels = required_count(node, "ypixels")?;
    let (x_start, x_step) = (required_f64(node, "xstart")?, required_f64(node, "xstep")?);
    let (y_start, y_step) = (required_f64(node, "ystart")?, required_f64(node, "ystep")?);

    let mut offsets = Vec::with_capacity(x_pixels * y_pixels);
    for j in 0..y_pixels {
        for i in 0..x_pixels {
            let raw = Point::new(
                x_start + i as f64 * x_step,
                y_start + j as f64 * y_step,
                0.0,
            );
            offsets.push(normalizer.to_nexus_frame(&(raw * normalizer.length_scale), false));
        }
    }
    let ids = grid_ids(component, x_pixels, y_pixels)?;
    let pixel_count = offsets.len() as i64;

    let locations = locations_or_origin(component, normalizer)?;
    let mut detectors = Vec::with_capacity(locations.len());
    for (k, location) in locations.iter().enumerate() {
        let name = name_for(component, location, type_name, k, locations.len());
        let orientation = location.orientation(normalizer).map_err(|e| e.in_component(&name))?;
        detectors.push(ResolvedDetector {
            name,
            type_name: type_name.to_string(),
            sub_component_type_chain: vec![pixel.name.clone(), type_name.to_string()],
            pixel: pixel.clone(),
            offsets: offsets.clone(),
            ids: ids.iter().map(|id| id + k as i64 * pixel_count).collect(),
            location: normalizer.to_nexus_frame(&location.position, true),
            orientation,
            pos: pos(component),
        });
    }
    Ok(detectors)
}

/// Panels whose pixels are quads between explicit grid vertices
pub fn structured_detectors<'a, 'input>(
    root: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    normalizer: &CoordinateNormalizer,
) -> Vec<ComponentOutcome<Vec<GridDetector>>> {
    placements(root, arena, "StructuredDetector")
        .into_iter()
        .map(|(t, component)| {
            let name = component.attribute("name").unwrap_or_else(|| arena.name(t)).to_string();
            let result = structured(t, component, arena, normalizer);
            ComponentOutcome { name, result }
        })
        .collect()
}

fn structured<'a, 'input>(
    t: usize,
    component: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    normalizer: &CoordinateNormalizer,
) -> Result<Vec<GridDetector>> {
    let node = arena.node(t);
    let type_name = arena.name(t);
    let x_pixels = required_count(node, "xpixels")?;
    let y_pixels = required_count(node, "ypixels")?;

    let vertices = children(node, "vertex")
        .map(|v| normalizer.point(v, false))
        .collect::<Result<Vec<_>>>()?;
    let expected = (x_pixels + 1) * (y_pixels + 1);
    if vertices.len() != expected {
        return Err(IdfError::InvalidAttribute {
            element: "type".to_string(),
            attribute: "vertex".to_string(),
            message: format!(
                "'{}' has {} vertices, a {}x{} grid needs {}",
                type_name,
                vertices.len(),
                x_pixels,
                y_pixels,
                expected
            ),
            pos: pos(node),
        });
    }

    let mut grid = GridDetector {
        name: String::new(),
        type_name: type_name.to_string(),
        x_pixels,
        y_pixels,
        vertices,
        offsets: Vec::with_capacity(x_pixels * y_pixels),
        ids: grid_ids(component, x_pixels, y_pixels)?,
        location: Point::zeros(),
        orientation: None,
    };
    for j in 0..y_pixels {
        for i in 0..x_pixels {
            let centre = grid.quad(i, j).iter().map(|&v| grid.vertices[v]).sum::<Point>() / 4.0;
            grid.offsets.push(centre);
        }
    }

    let locations = locations_or_origin(component, normalizer)?;
    let mut detectors = Vec::with_capacity(locations.len());
    for (k, location) in locations.iter().enumerate() {
        let name = name_for(component, location, type_name, k, locations.len());
        let mut detector = grid.clone();
        detector.orientation = location.orientation(normalizer).map_err(|e| e.in_component(&name))?;
        detector.location = normalizer.to_nexus_frame(&location.position, true);
        detector.name = name;
        detectors.push(detector);
    }
    Ok(detectors)
}
