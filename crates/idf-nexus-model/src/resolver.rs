// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transformation lookup trait for resolving `depends_on` chains

use crate::geometry::{DependsOn, TransformNode};
use crate::graph::Component;

/// Transformation lookup and component access
///
/// Implementations should provide O(1) lookup of a transformation by its
/// absolute path.
///
/// # Example
///
/// ```ignore
/// use idf_nexus_model::{GeometryGraph, DependsOn};
///
/// fn chain_length(graph: &dyn GeometryGraph, start: &DependsOn) -> usize {
///     let mut length = 0;
///     let mut next = graph.resolve(start);
///     while let Some(node) = next {
///         length += 1;
///         next = graph.resolve(&node.depends_on);
///     }
///     length
/// }
/// ```
pub trait GeometryGraph: Send + Sync {
    /// Get a transformation by absolute path
    fn transform(&self, path: &str) -> Option<&TransformNode>;

    /// Resolve a `depends_on` reference
    ///
    /// # Returns
    /// `None` for the terminal marker or an unknown path
    fn resolve(&self, depends_on: &DependsOn) -> Option<&TransformNode> {
        depends_on.as_path().and_then(|p| self.transform(p))
    }

    /// All components in insertion order
    fn components(&self) -> &[Component];

    /// Components carrying a shape
    fn geometry_components(&self) -> Vec<&Component> {
        self.components()
            .iter()
            .filter(|c| c.shape.is_some())
            .collect()
    }

    /// Number of indexed transformations
    fn transform_count(&self) -> usize;
}

/// Extension methods for GeometryGraph
pub trait GeometryGraphExt: GeometryGraph {
    /// Get a component by absolute path
    fn component(&self, path: &str) -> Option<&Component> {
        self.components().iter().find(|c| c.path == path)
    }

    /// Check whether a transformation exists
    fn has_transform(&self, path: &str) -> bool {
        self.transform(path).is_some()
    }
}

// Blanket implementation for all GeometryGraph types
impl<T: GeometryGraph + ?Sized> GeometryGraphExt for T {}
