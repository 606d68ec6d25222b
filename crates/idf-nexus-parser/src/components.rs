// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Source, sample and monitor components

use idf_nexus_model::{IdfError, Monitor, Point, Result, Source};
use log::debug;
use roxmltree::Node;

use crate::coords::CoordinateNormalizer;
use crate::document::{children, pos};
use crate::hierarchy::{ComponentOutcome, TypeArena};
use crate::idlist::{check_id_count, IdLists};
use crate::location::{component_locations, Location};
use crate::shape::parse_pixel_shape;

/// Name attribute of the root `<instrument>`
pub fn instrument_name(root: Node<'_, '_>) -> String {
    root.attribute("name").unwrap_or_default().to_string()
}

/// First root `<component>` placing a type of the given kind
fn placed_component<'a, 'input>(
    root: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    kind: &str,
) -> Option<(usize, Node<'a, 'input>)> {
    let types: Vec<usize> = arena.of_kind(kind).collect();
    children(root, "component").find_map(|component| {
        let t = component.attribute("type").and_then(|t| arena.id(t))?;
        types.contains(&t).then_some((t, component))
    })
}

fn first_location(component: Node<'_, '_>, normalizer: &CoordinateNormalizer) -> Result<Location> {
    Ok(component_locations(component, normalizer)?
        .into_iter()
        .next()
        .unwrap_or_else(Location::origin))
}

/// The neutron source, a type with `is="Source"`
pub fn source<'a, 'input>(
    root: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    normalizer: &CoordinateNormalizer,
) -> Result<Source> {
    let (t, component) =
        placed_component(root, arena, "Source").ok_or_else(|| IdfError::not_found("source"))?;
    let location = first_location(component, normalizer)?;
    let type_name = arena.name(t).to_string();
    Ok(Source {
        name: component
            .attribute("name")
            .map(str::to_string)
            .or(location.name.clone())
            .unwrap_or_else(|| type_name.clone()),
        type_name,
        location: normalizer.to_nexus_frame(&location.position, true),
    })
}

/// Sample position in the NeXus frame, a type with `is="SamplePos"`
///
/// The origin is not subtracted; this is usually the origin itself.
pub fn sample_position<'a, 'input>(
    root: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    normalizer: &CoordinateNormalizer,
) -> Result<Point> {
    let (_, component) = placed_component(root, arena, "SamplePos")
        .ok_or_else(|| IdfError::not_found("sample position"))?;
    let location = first_location(component, normalizer)?;
    Ok(normalizer.to_nexus_frame(&location.position, false))
}

/// A monitor before ids are assigned
struct PlacedMonitor {
    name: String,
    type_id: usize,
    position: Point,
    location: Location,
}

/// Monitors placed at root or one level inside a wrapper type
///
/// A monitor nested in a wrapper sits at the wrapper location plus its own.
/// Ids come from the root component's idlist, or failing that from the
/// idlists of the nested components, in declaration order.
pub fn monitors<'a, 'input>(
    root: Node<'a, 'input>,
    arena: &TypeArena<'a, 'input>,
    normalizer: &CoordinateNormalizer,
    idlists: &IdLists<'a, 'input>,
) -> Vec<ComponentOutcome<Vec<Monitor>>> {
    let monitor_types: Vec<usize> = arena.of_kind("monitor").collect();
    if monitor_types.is_empty() {
        return Vec::new();
    }

    let mut outcomes = Vec::new();
    for component in children(root, "component") {
        let Some(t) = component.attribute("type").and_then(|t| arena.id(t)) else {
            continue;
        };
        let nested: Vec<_> = children(arena.node(t), "component")
            .filter(|c| {
                c.attribute("type")
                    .and_then(|name| arena.id(name))
                    .map_or(false, |id| monitor_types.contains(&id))
            })
            .collect();
        if !monitor_types.contains(&t) && nested.is_empty() {
            continue;
        }

        let name = component
            .attribute("name")
            .unwrap_or_else(|| arena.name(t))
            .to_string();
        let result = place_monitors(component, t, &nested, arena, normalizer, &monitor_types)
            .and_then(|placed| assign_ids(component, &name, &nested, placed, arena, normalizer, idlists));
        outcomes.push(ComponentOutcome { name, result });
    }
    outcomes
}

fn place_monitors(
    component: Node<'_, '_>,
    t: usize,
    nested: &[Node<'_, '_>],
    arena: &TypeArena<'_, '_>,
    normalizer: &CoordinateNormalizer,
    monitor_types: &[usize],
) -> Result<Vec<PlacedMonitor>> {
    let mut outer = component_locations(component, normalizer)?;
    if outer.is_empty() {
        outer.push(Location::origin());
    }

    let mut placed = Vec::new();
    if monitor_types.contains(&t) {
        for (k, location) in outer.into_iter().enumerate() {
            let name = location
                .name
                .clone()
                .or_else(|| component.attribute("name").map(str::to_string))
                .unwrap_or_else(|| format!("{}_{}", arena.name(t), k + 1));
            placed.push(PlacedMonitor {
                name,
                type_id: t,
                position: location.position,
                location,
            });
        }
        return Ok(placed);
    }

    for wrapper in &outer {
        for inner in nested {
            let Some(type_id) = inner.attribute("type").and_then(|n| arena.id(n)) else {
                continue;
            };
            for location in component_locations(*inner, normalizer)? {
                let name = location
                    .name
                    .clone()
                    .or_else(|| inner.attribute("name").map(str::to_string))
                    .unwrap_or_else(|| arena.name(type_id).to_string());
                placed.push(PlacedMonitor {
                    name,
                    type_id,
                    position: wrapper.position + location.position,
                    location,
                });
            }
        }
    }
    Ok(placed)
}

fn assign_ids(
    component: Node<'_, '_>,
    name: &str,
    nested: &[Node<'_, '_>],
    placed: Vec<PlacedMonitor>,
    arena: &TypeArena<'_, '_>,
    normalizer: &CoordinateNormalizer,
    idlists: &IdLists<'_, '_>,
) -> Result<Vec<Monitor>> {
    let at = pos(component);
    let ids = match component.attribute("idlist") {
        Some(list) => idlists.expand(list, name, at)?,
        None => {
            let mut ids = Vec::new();
            let mut found = false;
            for inner in nested {
                if let Some(list) = inner.attribute("idlist") {
                    ids.extend(idlists.expand(list, name, pos(*inner))?);
                    found = true;
                }
            }
            if !found {
                return Err(IdfError::idlist(name, "monitor component has no idlist", at));
            }
            ids
        }
    };
    check_id_count(&ids, placed.len(), name, at)?;

    let mut monitors = Vec::with_capacity(placed.len());
    for (monitor, id) in placed.into_iter().zip(ids) {
        let orientation = monitor
            .location
            .orientation(normalizer)
            .map_err(|e| e.in_component(&monitor.name))?;
        let shape = match parse_pixel_shape(arena.node(monitor.type_id), normalizer) {
            Ok(shape) => Some(shape),
            Err(e) => {
                debug!("Monitor '{}' has no usable shape: {}", monitor.name, e);
                None
            }
        };
        monitors.push(Monitor {
            name: monitor.name,
            type_name: arena.name(monitor.type_id).to_string(),
            detector_id: id,
            location: normalizer.to_nexus_frame(&monitor.position, true),
            orientation,
            shape,
        });
    }
    Ok(monitors)
}
