//! Resource field definitions and their normalization into tool descriptors.
//!
//! The catalog is the raw input: one record per controller resource with the
//! field list exported from the controller's field JSON files. [`normalize`]
//! turns each raw field into an [`AttributeDescriptor`], and [`descriptor`]
//! assembles those into one [`ToolDescriptor`] per supported operation.

pub mod descriptor;
pub mod normalize;

pub use descriptor::{build, build_all, Category, ToolDescriptor};
pub use normalize::{extract_field_schemas, AttributeDescriptor, AttributeKind, BindShape};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Catalog embedded in the binary, used when no override path is configured.
const BUILTIN_CATALOG: &str = include_str!("../../catalog/resources.yaml");

/// One raw field of a resource as it appears in the field definition source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    /// Wire (JSON) key, e.g. `dhcpd_enabled`.
    pub json_name: String,
    /// In-memory field identifier, e.g. `DHCPDEnabled`.
    #[serde(default)]
    pub field_name: String,
    /// Declared type, e.g. `string`, `int`, `[]string`, `DeviceConfigNetwork`.
    pub field_type: String,
    #[serde(default)]
    pub is_array: bool,
    /// Marker for optional fields; absence makes the attribute required.
    #[serde(default)]
    pub omit_empty: bool,
    /// Free-text validation pattern from the field definition.
    #[serde(default)]
    pub validation: String,
}

/// Controller API generation a resource belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

/// One controller resource with its raw field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResource {
    /// Resource name, e.g. `Network`, `SettingMgmt`.
    pub name: String,
    /// REST collection (`networkconf`) or setting key (`mgmt`).
    pub endpoint: String,
    /// Singleton-per-site resource without an identifier.
    #[serde(default, rename = "setting")]
    pub is_setting: bool,
    #[serde(default)]
    pub api: ApiVersion,
    /// Resources the server must not expose.
    #[serde(default)]
    pub excluded: bool,
    /// Explicit operation set; inferred from `is_setting` when absent.
    #[serde(default)]
    pub operations: Option<Vec<Category>>,
    #[serde(default)]
    pub fields: Option<Vec<RawField>>,
}

/// The full field definition source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCatalog {
    pub resources: Vec<RawResource>,
}

/// Errors loading a resource catalog.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid resource '{name}': {reason}")]
    InvalidResource { name: String, reason: String },
}

impl From<serde_yaml::Error> for SchemaError {
    fn from(err: serde_yaml::Error) -> Self {
        SchemaError::Parse(err.to_string())
    }
}

impl ResourceCatalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::parse(BUILTIN_CATALOG)
    }

    /// Load a catalog from a YAML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse a catalog from YAML (JSON documents parse as well).
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let catalog: ResourceCatalog = serde_yaml::from_str(text)?;
        catalog.check()?;
        Ok(catalog)
    }

    /// Resources that are not excluded, in catalog order.
    pub fn exposed(&self) -> impl Iterator<Item = &RawResource> {
        self.resources.iter().filter(|r| !r.excluded)
    }

    fn check(&self) -> Result<(), SchemaError> {
        for resource in &self.resources {
            let invalid = |reason: &str| SchemaError::InvalidResource {
                name: resource.name.clone(),
                reason: reason.to_string(),
            };
            if resource.name.is_empty() {
                return Err(invalid("name must not be empty"));
            }
            if !resource.name.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(invalid("name may only contain ASCII letters and digits"));
            }
            if resource.endpoint.is_empty() {
                return Err(invalid("endpoint must not be empty"));
            }
            if resource.is_setting {
                if let Some(ops) = &resource.operations {
                    if ops.contains(&Category::Delete) || ops.contains(&Category::List) {
                        return Err(invalid("settings support only get and update"));
                    }
                }
            }
        }
        Ok(())
    }
}

impl RawResource {
    /// Field list, treating an absent list as empty.
    pub fn fields(&self) -> &[RawField] {
        self.fields.as_deref().unwrap_or_default()
    }
}
