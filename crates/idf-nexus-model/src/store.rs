// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dataset values and an in-memory [`NexusStore`]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{IdfError, Result};
use crate::traits::NexusStore;

/// Typed dataset payload
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum DatasetValue {
    Str(String),
    F64(Vec<f64>),
    F32(Vec<f32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

/// Attribute value
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    F64(f64),
    F64Array(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

/// A dataset with shape and attributes
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Dataset {
    pub value: DatasetValue,
    pub shape: Vec<usize>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Dataset {
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            value: DatasetValue::Str(s.into()),
            shape: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn scalar(v: f64) -> Self {
        Self {
            value: DatasetValue::F64(vec![v]),
            shape: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Row-major `rows x cols` matrix of floats
    pub fn f64_matrix(values: Vec<f64>, cols: usize) -> Self {
        let rows = if cols == 0 { 0 } else { values.len() / cols };
        Self {
            value: DatasetValue::F64(values),
            shape: vec![rows, cols],
            attributes: BTreeMap::new(),
        }
    }

    /// Row-major `rows x cols` matrix of single precision floats
    pub fn f32_matrix(values: Vec<f32>, cols: usize) -> Self {
        let rows = if cols == 0 { 0 } else { values.len() / cols };
        Self {
            value: DatasetValue::F32(values),
            shape: vec![rows, cols],
            attributes: BTreeMap::new(),
        }
    }

    pub fn f64_vec(values: Vec<f64>) -> Self {
        let len = values.len();
        Self {
            value: DatasetValue::F64(values),
            shape: vec![len],
            attributes: BTreeMap::new(),
        }
    }

    pub fn i32_vec(values: Vec<i32>) -> Self {
        let len = values.len();
        Self {
            value: DatasetValue::I32(values),
            shape: vec![len],
            attributes: BTreeMap::new(),
        }
    }

    pub fn i32_matrix(values: Vec<i32>, cols: usize) -> Self {
        let rows = if cols == 0 { 0 } else { values.len() / cols };
        Self {
            value: DatasetValue::I32(values),
            shape: vec![rows, cols],
            attributes: BTreeMap::new(),
        }
    }

    pub fn i64_matrix(values: Vec<i64>, cols: usize) -> Self {
        let rows = if cols == 0 { 0 } else { values.len() / cols };
        Self {
            value: DatasetValue::I64(values),
            shape: vec![rows, cols],
            attributes: BTreeMap::new(),
        }
    }

    pub fn i64_vec(values: Vec<i64>) -> Self {
        let len = values.len();
        Self {
            value: DatasetValue::I64(values),
            shape: vec![len],
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.value {
            DatasetValue::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.value {
            DatasetValue::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.value {
            DatasetValue::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.value {
            DatasetValue::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            DatasetValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::F64(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::F64Array(v)
    }
}

#[derive(Clone, Debug, Default)]
struct Group {
    nx_class: String,
    attributes: BTreeMap<String, AttrValue>,
}

/// [`NexusStore`] keeping everything in ordered maps
///
/// Used for tests and as a staging area before writing to a file.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    groups: BTreeMap<String, Group>,
    datasets: BTreeMap<String, Dataset>,
    links: BTreeMap<String, String>,
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "",
        Some(i) => &path[..i],
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a linked prefix with its target, once per link hop
    fn resolve_path(&self, path: &str) -> String {
        let mut current = path.to_string();
        for _ in 0..=self.links.len() {
            let hit = self.links.iter().find(|(link, _)| {
                current == **link || current.starts_with(&format!("{}/", link))
            });
            match hit {
                Some((link, target)) => current = format!("{}{}", target, &current[link.len()..]),
                None => break,
            }
        }
        current
    }

    fn exists(&self, path: &str) -> bool {
        let path = self.resolve_path(path);
        self.groups.contains_key(&path) || self.datasets.contains_key(&path)
    }

    fn check_parent(&self, path: &str) -> Result<()> {
        let parent = parent_of(path);
        if parent.is_empty() || self.groups.contains_key(&self.resolve_path(parent)) {
            Ok(())
        } else {
            Err(IdfError::store(path, format!("parent group '{}' does not exist", parent)))
        }
    }

    /// Dataset at `path`, following links
    pub fn dataset(&self, path: &str) -> Option<&Dataset> {
        self.datasets.get(&self.resolve_path(path))
    }

    /// `NX_class` of the group at `path`, following links
    pub fn group_class(&self, path: &str) -> Option<&str> {
        self.groups
            .get(&self.resolve_path(path))
            .map(|g| g.nx_class.as_str())
    }

    /// Attribute of a group or dataset
    pub fn attribute(&self, path: &str, name: &str) -> Option<&AttrValue> {
        let path = self.resolve_path(path);
        self.groups
            .get(&path)
            .and_then(|g| g.attributes.get(name))
            .or_else(|| self.datasets.get(&path).and_then(|d| d.attributes.get(name)))
    }

    /// Target of a link, if `path` is one
    pub fn link_target(&self, path: &str) -> Option<&str> {
        self.links.get(path).map(String::as_str)
    }

    /// Paths of groups with the given class
    pub fn groups_with_class<'a>(&'a self, nx_class: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.groups
            .iter()
            .filter(move |(_, g)| g.nx_class == nx_class)
            .map(|(p, _)| p.as_str())
    }

    /// Direct children names of a group
    pub fn children(&self, path: &str) -> Vec<&str> {
        let path = self.resolve_path(path);
        let prefix = format!("{}/", path);
        self.groups
            .keys()
            .chain(self.datasets.keys())
            .chain(self.links.keys())
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .collect()
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }
}

impl NexusStore for MemoryStore {
    fn create_group(&mut self, path: &str, nx_class: &str) -> Result<()> {
        if self.exists(path) {
            return Err(IdfError::store(path, "already exists"));
        }
        self.check_parent(path)?;
        self.groups.insert(
            path.to_string(),
            Group {
                nx_class: nx_class.to_string(),
                attributes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn write_dataset(&mut self, path: &str, dataset: Dataset) -> Result<()> {
        if self.exists(path) {
            return Err(IdfError::store(path, "already exists"));
        }
        self.check_parent(path)?;
        let resolved = self.resolve_path(path);
        self.datasets.insert(resolved, dataset);
        Ok(())
    }

    fn set_attribute(&mut self, path: &str, name: &str, value: AttrValue) -> Result<()> {
        let resolved = self.resolve_path(path);
        if let Some(group) = self.groups.get_mut(&resolved) {
            group.attributes.insert(name.to_string(), value);
            Ok(())
        } else if let Some(dataset) = self.datasets.get_mut(&resolved) {
            dataset.attributes.insert(name.to_string(), value);
            Ok(())
        } else {
            Err(IdfError::store(path, "no such group or dataset"))
        }
    }

    fn link(&mut self, path: &str, target: &str) -> Result<()> {
        if !self.exists(target) {
            return Err(IdfError::store(target, "link target does not exist"));
        }
        if self.exists(path) {
            return Err(IdfError::store(path, "already exists"));
        }
        self.check_parent(path)?;
        let resolved = self.resolve_path(target);
        self.links.insert(path.to_string(), resolved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_need_parents() {
        let mut store = MemoryStore::new();
        assert!(store.create_group("/entry/instrument", "NXinstrument").is_err());
        store.create_group("/entry", "NXentry").unwrap();
        store.create_group("/entry/instrument", "NXinstrument").unwrap();
        assert_eq!(store.group_class("/entry/instrument"), Some("NXinstrument"));
        assert!(store.create_group("/entry", "NXentry").is_err());
    }

    #[test]
    fn test_dataset_attributes() {
        let mut store = MemoryStore::new();
        store.create_group("/entry", "NXentry").unwrap();
        store
            .write_dataset("/entry/distance", Dataset::scalar(2.5).with_attr("units", "m"))
            .unwrap();
        let ds = store.dataset("/entry/distance").unwrap();
        assert_eq!(ds.as_f64(), Some(&[2.5][..]));
        assert_eq!(
            store.attribute("/entry/distance", "units").and_then(AttrValue::as_str),
            Some("m")
        );
    }

    #[test]
    fn test_links_resolve_to_target() {
        let mut store = MemoryStore::new();
        store.create_group("/entry", "NXentry").unwrap();
        store.create_group("/entry/a", "NXdetector").unwrap();
        store.create_group("/entry/a/pixel_shape", "NXoff_geometry").unwrap();
        store
            .write_dataset("/entry/a/pixel_shape/faces", Dataset::i32_vec(vec![0, 4]))
            .unwrap();
        store.create_group("/entry/b", "NXdetector").unwrap();
        store.link("/entry/b/pixel_shape", "/entry/a/pixel_shape").unwrap();

        assert_eq!(store.link_target("/entry/b/pixel_shape"), Some("/entry/a/pixel_shape"));
        assert_eq!(store.group_class("/entry/b/pixel_shape"), Some("NXoff_geometry"));
        assert!(store.dataset("/entry/b/pixel_shape/faces").is_some());
        assert_eq!(store.children("/entry/b"), vec!["pixel_shape"]);
        assert!(store.link("/entry/c", "/entry/missing").is_err());
    }
}
