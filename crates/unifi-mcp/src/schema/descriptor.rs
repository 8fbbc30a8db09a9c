//! Resource → tool descriptors, one per supported operation.

use super::normalize::{extract_field_schemas, AttributeDescriptor, AttributeKind};
use super::{RawResource, ResourceCatalog};
use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Operation kind of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::List,
        Category::Get,
        Category::Create,
        Category::Update,
        Category::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::List => "list",
            Category::Get => "get",
            Category::Create => "create",
            Category::Update => "update",
            Category::Delete => "delete",
        }
    }

    /// Prefix of the controller operation name, e.g. `List` in `ListNetwork`.
    pub fn operation_prefix(self) -> &'static str {
        match self {
            Category::List => "List",
            Category::Get => "Get",
            Category::Create => "Create",
            Category::Update => "Update",
            Category::Delete => "Delete",
        }
    }

    /// Whether the category carries a data payload.
    pub fn has_payload(self) -> bool {
        matches!(self, Category::Create | Category::Update)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "Unknown category '{}' - must be list, get, create, update, or delete",
                    s
                )
            })
    }
}

/// One invocable tool derived from a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub resource: String,
    pub is_setting: bool,
    /// Data attributes; populated for create/update only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDescriptor>,
}

impl ToolDescriptor {
    /// Controller operation implementing this tool, e.g. `ListNetwork`.
    pub fn operation_name(&self) -> String {
        format!("{}{}", self.category.operation_prefix(), self.resource)
    }

    /// Whether the tool takes an `id` argument.
    pub fn takes_id(&self) -> bool {
        !self.is_setting && matches!(self.category, Category::Get | Category::Update | Category::Delete)
    }

    /// JSON-schema object describing the tool arguments.
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();

        properties.insert(
            "site".to_string(),
            json!({
                "type": "string",
                "description": "UniFi site name (default: \"default\")"
            }),
        );
        if self.takes_id() {
            properties.insert(
                "id".to_string(),
                json!({
                    "type": "string",
                    "description": format!("ID of the {} to {}", self.resource, self.category)
                }),
            );
            required.push(Value::from("id"));
        }

        for attribute in &self.attributes {
            properties.insert(attribute.name.clone(), attribute_schema(attribute));
            if attribute.required {
                required.push(Value::from(attribute.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::from("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert("required".to_string(), Value::Array(required));
        schema
    }
}

fn attribute_schema(attribute: &AttributeDescriptor) -> Value {
    let mut property = Map::new();
    property.insert("type".to_string(), Value::from(attribute.kind.as_str()));
    if let Some(description) = &attribute.description {
        property.insert("description".to_string(), Value::from(description.clone()));
    }
    if !attribute.enum_values.is_empty() {
        property.insert("enum".to_string(), json!(attribute.enum_values));
    }
    if let Some(pattern) = &attribute.pattern {
        property.insert("pattern".to_string(), Value::from(pattern.clone()));
    }
    if attribute.kind == AttributeKind::Array {
        if let Some(item) = attribute.item_kind {
            property.insert("items".to_string(), json!({ "type": item.as_str() }));
        }
    }
    Value::Object(property)
}

/// Operations a resource supports, in category order.
pub fn infer_operations(resource: &RawResource) -> Vec<Category> {
    let supported: &[Category] = if resource.is_setting {
        &[Category::Get, Category::Update]
    } else {
        &Category::ALL
    };
    match &resource.operations {
        Some(explicit) => supported
            .iter()
            .copied()
            .filter(|c| explicit.contains(c))
            .collect(),
        None => supported.to_vec(),
    }
}

/// Descriptors for one resource.
pub fn build(resource: &RawResource) -> Vec<ToolDescriptor> {
    let snake = resource.name.to_snake_case();
    let attributes = extract_field_schemas(resource);

    infer_operations(resource)
        .into_iter()
        .map(|category| ToolDescriptor {
            name: format!("{}_{}", category, snake),
            description: describe(category, &resource.name, resource.is_setting),
            category,
            resource: resource.name.clone(),
            is_setting: resource.is_setting,
            attributes: if category.has_payload() {
                attributes.clone()
            } else {
                Vec::new()
            },
        })
        .collect()
}

/// Descriptors for every exposed resource, sorted by resource name.
///
/// Tool names are unique; a later duplicate is dropped with a warning.
pub fn build_all(catalog: &ResourceCatalog) -> Vec<ToolDescriptor> {
    let mut resources: Vec<&RawResource> = catalog.exposed().collect();
    resources.sort_by(|a, b| a.name.cmp(&b.name));

    let mut seen = HashSet::new();
    let mut descriptors = Vec::new();
    for resource in resources {
        for descriptor in build(resource) {
            if seen.insert(descriptor.name.clone()) {
                descriptors.push(descriptor);
            } else {
                log::warn!(
                    "Duplicate tool '{}' from resource {} ignored",
                    descriptor.name,
                    resource.name
                );
            }
        }
    }
    descriptors
}

fn describe(category: Category, resource: &str, is_setting: bool) -> String {
    match (category, is_setting) {
        (Category::List, _) => format!("List all {} resources", resource),
        (Category::Get, true) => format!("Get the {} settings", resource),
        (Category::Get, false) => format!("Get a {} by ID", resource),
        (Category::Create, _) => format!("Create a new {}", resource),
        (Category::Update, true) => format!("Update the {} settings", resource),
        (Category::Update, false) => format!("Update an existing {}", resource),
        (Category::Delete, _) => format!("Delete a {} by ID", resource),
    }
}
