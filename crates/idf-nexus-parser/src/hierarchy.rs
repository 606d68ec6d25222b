// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolution of nested component types into flat per-pixel offsets
//!
//! Types are stored in an arena and addressed by index. Starting from every
//! pixel type (`is="detector"`), the types that instantiate it are collected
//! upward until types nobody instantiates are reached; those are the
//! top-level types placed by root `<component>` elements.
//!
//! Aggregation runs as a fixpoint: a type is resolved once every type it
//! instantiates is resolved. Its offsets are each child offset translated by
//! each of its own placements, so the count is the product of the placement
//! counts along the chain.

use std::sync::Arc;

use idf_nexus_model::{IdfError, PixelType, Point, ResolvedDetector, Result};
use log::debug;
use roxmltree::Node;
use rustc_hash::FxHashMap;

use crate::coords::CoordinateNormalizer;
use crate::document::{children, is_kind, pos};
use crate::idlist::{check_id_count, IdLists};
use crate::location::{component_locations, Location};
use crate::shape::parse_pixel_shape;

/// A named `<type>` element
struct TypeDef<'a, 'input> {
    name: &'a str,
    node: Node<'a, 'input>,
}

/// All root types, indexed by position, with reverse instantiation edges
pub struct TypeArena<'a, 'input> {
    types: Vec<TypeDef<'a, 'input>>,
    by_name: FxHashMap<&'a str, usize>,
    /// `parents[t]` lists the types with a `<component type=t>` child
    parents: Vec<Vec<usize>>,
}

impl<'a, 'input> TypeArena<'a, 'input> {
    pub fn build(root: Node<'a, 'input>) -> Self {
        let types: Vec<_> = children(root, "type")
            .filter_map(|node| node.attribute("name").map(|name| TypeDef { name, node }))
            .collect();
        let by_name: FxHashMap<&str, usize> =
            types.iter().enumerate().map(|(i, t)| (t.name, i)).collect();

        let mut parents = vec![Vec::new(); types.len()];
        for (parent, def) in types.iter().enumerate() {
            for component in children(def.node, "component") {
                let Some(&child) = component.attribute("type").and_then(|t| by_name.get(t)) else {
                    continue;
                };
                if !parents[child].contains(&parent) {
                    parents[child].push(parent);
                }
            }
        }

        Self {
            types,
            by_name,
            parents,
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: usize) -> &'a str {
        self.types[id].name
    }

    pub fn node(&self, id: usize) -> Node<'a, 'input> {
        self.types[id].node
    }

    /// Types whose `is` attribute matches `kind`
    pub fn of_kind<'s>(&'s self, kind: &'s str) -> impl Iterator<Item = usize> + 's {
        self.types
            .iter()
            .enumerate()
            .filter(move |(_, t)| is_kind(t.node, kind))
            .map(|(i, _)| i)
    }

    /// Every type reachable upward from `start`, including `start` itself
    fn ancestors(&self, start: &[usize]) -> Vec<bool> {
        let mut seen = vec![false; self.types.len()];
        let mut stack = start.to_vec();
        while let Some(t) = stack.pop() {
            if std::mem::replace(&mut seen[t], true) {
                continue;
            }
            stack.extend(self.parents[t].iter().copied().filter(|&p| !seen[p]));
        }
        seen
    }
}

/// A fully resolved type
#[derive(Debug)]
pub struct ResolvedType {
    pub pixel_id: usize,
    pub pixel: Arc<PixelType>,
    /// Pixel positions relative to the type origin, NeXus frame
    pub offsets: Arc<Vec<Point>>,
    /// Type names from the pixel up to this type
    pub chain: Vec<String>,
}

/// One `<component>` inside a type
struct Instance<'a> {
    child: usize,
    locations: Vec<Location>,
    idlist: Option<&'a str>,
}

/// Result of resolving one root `<component>`
pub struct ComponentOutcome<T> {
    pub name: String,
    pub result: Result<T>,
}

/// Resolves the detector hierarchy of one instrument
pub struct HierarchyResolver<'r, 'a, 'input> {
    root: Node<'a, 'input>,
    arena: &'r TypeArena<'a, 'input>,
    normalizer: &'r CoordinateNormalizer,
    idlists: &'r IdLists<'a, 'input>,
}

impl<'r, 'a, 'input> HierarchyResolver<'r, 'a, 'input> {
    pub fn new(
        root: Node<'a, 'input>,
        arena: &'r TypeArena<'a, 'input>,
        normalizer: &'r CoordinateNormalizer,
        idlists: &'r IdLists<'a, 'input>,
    ) -> Self {
        Self {
            root,
            arena,
            normalizer,
            idlists,
        }
    }

    /// Whether the instrument declares any pixel type
    pub fn has_pixel_types(&self) -> bool {
        self.arena.of_kind("detector").next().is_some()
    }

    /// Resolve every top-level detector component
    ///
    /// Fails with [`IdfError::NotFoundInIdf`] when no pixel type exists.
    /// Errors of individual components are returned per component.
    pub fn resolve_detectors(&self) -> Result<Vec<ComponentOutcome<Vec<ResolvedDetector>>>> {
        let pixels: Vec<usize> = self.arena.of_kind("detector").collect();
        if pixels.is_empty() {
            return Err(IdfError::not_found("pixel type (is=\"detector\")"));
        }

        let relevant = self.arena.ancestors(&pixels);
        let (outcomes, instances) = self.resolve_types(&pixels, &relevant);

        let mut results = Vec::new();
        for component in children(self.root, "component") {
            let Some(type_id) = component.attribute("type").and_then(|t| self.arena.id(t)) else {
                continue;
            };
            // top-level: relevant and never a sub-component
            if !relevant[type_id] || !self.arena.parents[type_id].is_empty() {
                continue;
            }
            let name = component
                .attribute("name")
                .unwrap_or_else(|| self.arena.name(type_id))
                .to_string();
            let Some(outcome) = outcomes.get(&type_id) else {
                continue;
            };
            let result = match outcome {
                Ok(resolved) => self.instantiate(
                    component,
                    &name,
                    resolved,
                    instances.get(&type_id),
                    &outcomes,
                ),
                Err(e) => Err(e.clone()),
            };
            results.push(ComponentOutcome { name, result });
        }
        Ok(results)
    }

    /// Fixpoint aggregation over all relevant types
    #[allow(clippy::type_complexity)]
    fn resolve_types(
        &self,
        pixels: &[usize],
        relevant: &[bool],
    ) -> (
        FxHashMap<usize, Result<Arc<ResolvedType>>>,
        FxHashMap<usize, Result<Vec<Instance<'a>>>>,
    ) {
        let mut outcomes: FxHashMap<usize, Result<Arc<ResolvedType>>> = FxHashMap::default();
        for &pixel_id in pixels {
            let node = self.arena.node(pixel_id);
            let outcome = parse_pixel_shape(node, self.normalizer).map(|shape| {
                let name = self.arena.name(pixel_id).to_string();
                Arc::new(ResolvedType {
                    pixel_id,
                    pixel: Arc::new(PixelType {
                        name: name.clone(),
                        shape,
                    }),
                    offsets: Arc::new(vec![Point::zeros()]),
                    chain: vec![name],
                })
            });
            outcomes.insert(pixel_id, outcome);
        }

        let mut instances = FxHashMap::default();
        let mut pending = Vec::new();
        for t in (0..self.arena.len()).filter(|&t| relevant[t] && !outcomes.contains_key(&t)) {
            instances.insert(t, self.instances_of(t, relevant));
            pending.push(t);
        }

        loop {
            let before = pending.len();
            pending.retain(|&t| {
                let ready = match &instances[&t] {
                    Ok(list) => list.iter().all(|i| outcomes.contains_key(&i.child)),
                    Err(_) => true,
                };
                if ready {
                    let outcome = match &instances[&t] {
                        Ok(list) => self.aggregate(t, list, &outcomes),
                        Err(e) => Err(e.clone()),
                    };
                    outcomes.insert(t, outcome);
                }
                !ready
            });
            if pending.len() == before {
                break;
            }
        }

        for t in pending {
            outcomes.insert(t, Err(IdfError::CyclicTypeReference(self.arena.name(t).to_string())));
        }
        (outcomes, instances)
    }

    /// Sub-components of `t` that lead to pixels
    fn instances_of(&self, t: usize, relevant: &[bool]) -> Result<Vec<Instance<'a>>> {
        let mut list = Vec::new();
        for component in children(self.arena.node(t), "component") {
            let Some(child) = component.attribute("type").and_then(|c| self.arena.id(c)) else {
                continue;
            };
            if !relevant[child] {
                continue;
            }
            let mut locations = component_locations(component, self.normalizer)?;
            if locations.is_empty() {
                locations.push(Location::origin());
            }
            list.push(Instance {
                child,
                locations,
                idlist: component.attribute("idlist"),
            });
        }
        Ok(list)
    }

    fn aggregate(
        &self,
        t: usize,
        instances: &[Instance<'a>],
        outcomes: &FxHashMap<usize, Result<Arc<ResolvedType>>>,
    ) -> Result<Arc<ResolvedType>> {
        let mut children = Vec::with_capacity(instances.len());
        for instance in instances {
            match &outcomes[&instance.child] {
                Ok(resolved) => children.push(resolved.clone()),
                Err(e) => return Err(e.clone()),
            }
        }

        let Some(first) = children.first() else {
            return Err(IdfError::not_found(format!(
                "sub-component of type '{}'",
                self.arena.name(t)
            )));
        };

        let mut pixel_types: Vec<String> = Vec::new();
        for child in &children {
            if !pixel_types.contains(&child.pixel.name) {
                pixel_types.push(child.pixel.name.clone());
            }
        }
        if pixel_types.len() > 1 {
            return Err(IdfError::InconsistentPixelType {
                type_name: self.arena.name(t).to_string(),
                pixel_types,
                pos: pos(self.arena.node(t)),
            });
        }

        let count: usize = instances
            .iter()
            .zip(&children)
            .map(|(i, c)| i.locations.len() * c.offsets.len())
            .sum();
        let mut offsets = Vec::with_capacity(count);
        for (instance, child) in instances.iter().zip(&children) {
            for location in &instance.locations {
                let l = self.normalizer.to_nexus_frame(&location.position, false);
                offsets.extend(child.offsets.iter().map(|c| l + c));
            }
        }

        let mut chain = first.chain.clone();
        chain.push(self.arena.name(t).to_string());
        debug!(
            "Resolved type '{}': {} pixels of '{}'",
            self.arena.name(t),
            offsets.len(),
            first.pixel.name
        );

        Ok(Arc::new(ResolvedType {
            pixel_id: first.pixel_id,
            pixel: first.pixel.clone(),
            offsets: Arc::new(offsets),
            chain,
        }))
    }

    /// Place a resolved top-level type at each of its root locations
    fn instantiate(
        &self,
        component: Node<'a, 'input>,
        name: &str,
        resolved: &ResolvedType,
        instances: Option<&Result<Vec<Instance<'a>>>>,
        outcomes: &FxHashMap<usize, Result<Arc<ResolvedType>>>,
    ) -> Result<Vec<ResolvedDetector>> {
        let at = pos(component);
        let mut locations = component_locations(component, self.normalizer)?;
        if locations.is_empty() {
            locations.push(Location::origin());
        }
        let mut offsets = resolved.offsets.clone();
        let mut idlist = component.attribute("idlist");

        // A wrapper type placed without a location of its own takes the
        // placement and idlist of its single sub-component.
        if let Some(Ok(inner)) = instances {
            if let ([location], [single]) = (locations.as_slice(), inner.as_slice()) {
                if location.is_empty && single.locations.len() == 1 {
                    if let Some(Ok(child)) = outcomes.get(&single.child) {
                        debug!("Merging wrapper component '{}' with its sub-component", name);
                        offsets = child.offsets.clone();
                        idlist = idlist.or(single.idlist);
                        locations = single.locations.clone();
                    }
                }
            }
        }

        let idlist = idlist.ok_or_else(|| IdfError::idlist(name, "component has no idlist", at))?;
        let ids = self.idlists.expand(idlist, name, at)?;
        let pixels = offsets.len();
        check_id_count(&ids, pixels * locations.len(), name, at)?;

        let mut detectors = Vec::with_capacity(locations.len());
        for (k, (location, ids)) in locations.iter().zip(ids.chunks(pixels.max(1))).enumerate() {
            let detector_name = match (&location.name, locations.len()) {
                (Some(n), _) => n.clone(),
                (None, 1) => name.to_string(),
                (None, _) => format!("{}_{}", name, k + 1),
            };
            let orientation = location
                .orientation(self.normalizer)
                .map_err(|e| e.in_component(&detector_name))?;
            detectors.push(ResolvedDetector {
                name: detector_name,
                type_name: resolved.chain.last().cloned().unwrap_or_default(),
                sub_component_type_chain: resolved.chain.clone(),
                pixel: (*resolved.pixel).clone(),
                offsets: offsets.to_vec(),
                ids: ids.to_vec(),
                location: self.normalizer.to_nexus_frame(&location.position, true),
                orientation,
                pos: if location.pos.is_known() { location.pos } else { at },
            });
        }
        Ok(detectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;
    use crate::units::read_defaults;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn resolve(xml: &str) -> Result<Vec<ComponentOutcome<Vec<ResolvedDetector>>>> {
        let document = parse_document(xml).unwrap();
        let root = document.root_element();
        let normalizer = CoordinateNormalizer::new(&read_defaults(root).unwrap()).unwrap();
        let arena = TypeArena::build(root);
        let idlists = IdLists::index(root);
        HierarchyResolver::new(root, &arena, &normalizer, &idlists).resolve_detectors()
    }

    fn single(xml: &str) -> Result<Vec<ResolvedDetector>> {
        let mut outcomes = resolve(xml).unwrap();
        assert_eq!(outcomes.len(), 1);
        outcomes.remove(0).result
    }

    const PIXEL: &str = r#"<type name="pixel" is="detector">
    <cylinder id="tube-pixel">
      <centre-of-bottom-base x="0" y="0" z="0" />
      <axis x="0" y="1" z="0" />
      <radius val="0.004" />
      <height val="0.002" />
    </cylinder>
  </type>"#;

    fn banked(tubes: usize, pixels: usize, levels: &str, ids: usize) -> String {
        format!(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <component type="bank" idlist="ids"><location z="2" /></component>
  <type name="bank">
    <component type="tube"><locations x="-0.5" x-end="0.5" n-elements="{tubes}" /></component>
  </type>
  <type name="tube">
    <component type="pixel"><locations y="-0.5" y-end="0.5" n-elements="{pixels}" /></component>
  </type>
  {PIXEL}
  {levels}
  <idlist idname="ids"><id start="1" end="{ids}" /></idlist>
</instrument>"#
        )
    }

    #[test]
    fn test_offsets_compose() {
        let detectors = single(&banked(2, 3, "", 6)).unwrap();
        let bank = &detectors[0];
        assert_eq!(bank.name, "bank");
        assert_eq!(bank.sub_component_type_chain, vec!["pixel", "tube", "bank"]);
        assert_eq!(bank.ids, vec![1, 2, 3, 4, 5, 6]);
        assert_relative_eq!(bank.offsets[0], Point::new(-0.5, -0.5, 0.0));
        assert_relative_eq!(bank.offsets[4], Point::new(0.5, 0.0, 0.0));
        assert_relative_eq!(bank.location, Point::new(0.0, 0.0, 2.0));
        assert!(matches!(bank.pixel.shape, idf_nexus_model::PixelShape::Cylinder { .. }));
    }

    #[test]
    fn test_large_bank_pixel_count() {
        let detectors = single(&banked(60, 512, "", 30720)).unwrap();
        assert_eq!(detectors[0].offsets.len(), 30720);
        assert_eq!(detectors[0].ids.len(), 30720);
        assert_eq!(detectors[0].ids.last(), Some(&30720));
    }

    #[test]
    fn test_id_count_mismatch() {
        let result = single(&banked(2, 3, "", 5));
        assert!(matches!(result, Err(IdfError::MalformedIdList { .. })));
    }

    #[test]
    fn test_empty_location_run_rejected() {
        let result = single(&banked(1, 0, "", 1));
        match result {
            Err(IdfError::InvalidAttribute { attribute, .. }) => assert_eq!(attribute, "n-elements"),
            other => panic!("unexpected {:?}", other.as_ref().map(Vec::len)),
        }
    }

    #[test]
    fn test_no_pixel_types() {
        let xml = r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <component type="box"><location /></component>
  <type name="box" />
</instrument>"#;
        assert!(matches!(resolve(xml), Err(IdfError::NotFoundInIdf { .. })));
    }

    #[test]
    fn test_inconsistent_pixel_types() {
        let levels = r#"<type name="other-pixel" is="detector">
    <cylinder id="wide">
      <centre-of-bottom-base x="0" y="0" z="0" />
      <axis x="0" y="0" z="1" />
      <radius val="0.1" />
      <height val="0.1" />
    </cylinder>
  </type>
  <component type="mixed" idlist="ids"><location /></component>
  <type name="mixed">
    <component type="pixel"><location /></component>
    <component type="other-pixel"><location x="1" /></component>
  </type>"#;
        let outcomes = resolve(&banked(1, 1, levels, 1)).unwrap();
        let mixed = outcomes.iter().find(|o| o.name == "mixed").unwrap();
        match &mixed.result {
            Err(IdfError::InconsistentPixelType { type_name, pixel_types, .. }) => {
                assert_eq!(type_name, "mixed");
                assert_eq!(pixel_types.len(), 2);
            }
            other => panic!("unexpected {:?}", other.as_ref().map(Vec::len)),
        }
        let bank = outcomes.iter().find(|o| o.name == "bank").unwrap();
        assert!(bank.result.is_ok());
    }

    #[test]
    fn test_cyclic_types() {
        let levels = r#"<component type="loop-a" idlist="ids"><location /></component>
  <type name="loop-a">
    <component type="loop-b"><location /></component>
    <component type="pixel"><location /></component>
  </type>
  <type name="loop-b">
    <component type="loop-a"><location /></component>
  </type>"#;
        // loop-a has a parent, so it is never top-level; the bank still resolves
        let xml = banked(1, 2, levels, 2);
        let outcomes = resolve(&xml).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].result.is_ok());

        let document = parse_document(&xml).unwrap();
        let root = document.root_element();
        let normalizer = CoordinateNormalizer::new(&read_defaults(root).unwrap()).unwrap();
        let arena = TypeArena::build(root);
        let idlists = IdLists::index(root);
        let resolver = HierarchyResolver::new(root, &arena, &normalizer, &idlists);
        let pixels: Vec<usize> = arena.of_kind("detector").collect();
        let relevant = arena.ancestors(&pixels);
        let (outcomes, _) = resolver.resolve_types(&pixels, &relevant);
        let loop_a = arena.id("loop-a").unwrap();
        assert!(matches!(outcomes[&loop_a], Err(IdfError::CyclicTypeReference(ref n)) if n == "loop-a"));
    }

    #[test]
    fn test_wrapper_merge() {
        let xml = format!(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <component type="wrapper"><location /></component>
  <type name="wrapper">
    <component type="tube" idlist="tube-ids"><location x="3" name="tube_one" /></component>
  </type>
  <type name="tube">
    <component type="pixel"><locations y="0" y-end="1" n-elements="2" /></component>
  </type>
  {PIXEL}
  <idlist idname="tube-ids"><id start="10" end="11" /></idlist>
</instrument>"#
        );
        let detectors = single(&xml).unwrap();
        assert_eq!(detectors[0].name, "tube_one");
        assert_eq!(detectors[0].ids, vec![10, 11]);
        assert_relative_eq!(detectors[0].location, Point::new(3.0, 0.0, 0.0));
        assert_relative_eq!(detectors[0].offsets[1], Point::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_missing_idlist() {
        let xml = format!(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <component type="tube"><location x="1" /></component>
  <type name="tube">
    <component type="pixel"><location /></component>
  </type>
  {PIXEL}
</instrument>"#
        );
        assert!(matches!(single(&xml), Err(IdfError::MalformedIdList { .. })));
    }

    #[test]
    fn test_repeated_locations_split_ids() {
        let xml = format!(
            r#"<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="T">
  <component type="tube" idlist="ids">
    <location x="1" />
    <location x="2" />
  </component>
  <type name="tube">
    <component type="pixel"><locations y="0" y-end="1" n-elements="2" /></component>
  </type>
  {PIXEL}
  <idlist idname="ids"><id start="1" end="4" /></idlist>
</instrument>"#
        );
        let detectors = single(&xml).unwrap();
        assert_eq!(detectors.len(), 2);
        assert_eq!(detectors[0].name, "tube_1");
        assert_eq!(detectors[1].ids, vec![3, 4]);
    }

    proptest! {
        #[test]
        fn prop_pixel_count_is_product(tubes in 1usize..8, pixels in 1usize..16) {
            let detectors = single(&banked(tubes, pixels, "", tubes * pixels)).unwrap();
            prop_assert_eq!(detectors[0].offsets.len(), tubes * pixels);
            prop_assert_eq!(detectors[0].ids.len(), tubes * pixels);
        }
    }
}
