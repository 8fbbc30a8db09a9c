//! Name-indexed set of tool descriptors.

use crate::schema::{build_all, ResourceCatalog, ToolDescriptor};
use std::collections::HashMap;

/// All tools the server can dispatch, in build order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Index descriptors with unique names, as produced by [`build_all`].
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| (tool.name.clone(), i))
            .collect();
        Self { tools, index }
    }

    pub fn from_catalog(catalog: &ResourceCatalog) -> Self {
        Self::new(build_all(catalog))
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn all(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools matching an optional category and resource substring.
    ///
    /// The category matches exactly and the resource by substring, both
    /// case-insensitive. An empty filter matches everything.
    pub fn filter(&self, category: Option<&str>, resource: Option<&str>) -> Vec<&ToolDescriptor> {
        let category = category.filter(|c| !c.is_empty());
        let resource = resource
            .filter(|r| !r.is_empty())
            .map(|r| r.to_lowercase());

        self.tools
            .iter()
            .filter(|tool| {
                category.map_or(true, |c| tool.category.as_str().eq_ignore_ascii_case(c))
            })
            .filter(|tool| {
                resource
                    .as_deref()
                    .map_or(true, |r| tool.resource.to_lowercase().contains(r))
            })
            .collect()
    }
}
