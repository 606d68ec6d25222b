// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detector id lists

use idf_nexus_model::{IdfError, Result, SourcePos};
use roxmltree::Node;
use rustc_hash::FxHashMap;

use crate::document::{attr_i64, children, pos};

/// Index of the root `<idlist>` elements by `idname`
pub struct IdLists<'a, 'input> {
    lists: FxHashMap<&'a str, Node<'a, 'input>>,
}

impl<'a, 'input> IdLists<'a, 'input> {
    pub fn index(root: Node<'a, 'input>) -> Self {
        let lists = children(root, "idlist")
            .filter_map(|node| {
                node.attribute("idname")
                    .or_else(|| node.attribute("name"))
                    .map(|name| (name, node))
            })
            .collect();
        Self { lists }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Expand a named list in declaration order
    ///
    /// `<id start=.. end=.. step=..>` covers start to end inclusive;
    /// `<id val=..>` adds a single id.
    pub fn expand(&self, name: &str, component: &str, at: SourcePos) -> Result<Vec<i64>> {
        let node = self.lists.get(name).ok_or_else(|| {
            IdfError::idlist(component, format!("idlist '{}' is not defined", name), at)
        })?;

        let mut ids = Vec::new();
        for id in children(*node, "id") {
            if let Some(val) = attr_i64(id, "val")? {
                ids.push(val);
                continue;
            }
            let (Some(start), Some(end)) = (attr_i64(id, "start")?, attr_i64(id, "end")?) else {
                return Err(IdfError::idlist(
                    component,
                    "<id> needs either val or start and end",
                    pos(id),
                ));
            };
            let step = attr_i64(id, "step")?.unwrap_or(1);
            if step == 0 || (end - start).signum() * step.signum() < 0 {
                return Err(IdfError::idlist(
                    component,
                    format!("step {} never reaches {} from {}", step, end, start),
                    pos(id),
                ));
            }
            let mut current = start;
            while (step > 0 && current <= end) || (step < 0 && current >= end) {
                ids.push(current);
                current += step;
            }
        }
        Ok(ids)
    }
}

/// Fail unless exactly one id per pixel was given
pub fn check_id_count(ids: &[i64], pixels: usize, component: &str, at: SourcePos) -> Result<()> {
    if ids.len() != pixels {
        return Err(IdfError::idlist(
            component,
            format!("{} ids for {} pixels", ids.len(), pixels),
            at,
        ));
    }
    Ok(())
}
