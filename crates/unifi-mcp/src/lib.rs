//! MCP server exposing the UniFi Network controller as generated tools.
//!
//! Startup flow: resource catalog → [`schema::build_all`] → [`registry::ToolRegistry`]
//! and [`client::TypeRegistry`] → controller [`client::OperationTable`] →
//! [`dispatch::validate::validate_all`] → [`mcp::UnifiMcpServer`].

pub mod client;
pub mod config;
pub mod dispatch;
pub mod mcp;
pub mod registry;
pub mod schema;

use client::http::HttpController;
use client::{OperationTable, TypeRegistry};
use dispatch::Dispatcher;
use registry::ToolRegistry;
use schema::ResourceCatalog;
use std::path::Path;
use std::sync::Arc;

/// Built-in catalog, or the one at `path` when given.
pub fn load_catalog(path: Option<&Path>) -> Result<ResourceCatalog, schema::SchemaError> {
    match path {
        Some(path) => {
            log::info!("Loading resource catalog from {}", path.display());
            ResourceCatalog::from_file(path)
        }
        None => ResourceCatalog::builtin(),
    }
}

/// Wire the HTTP controller, registries and dispatcher for a catalog.
pub fn build_dispatcher(
    config: &config::Config,
    catalog: &ResourceCatalog,
) -> anyhow::Result<Dispatcher<OperationTable>> {
    let tools = Arc::new(ToolRegistry::from_catalog(catalog));
    let types = Arc::new(TypeRegistry::from_tools(&tools));
    log::info!(
        "Catalog: {} resources, {} tools, {} payload types",
        catalog.exposed().count(),
        tools.len(),
        types.len()
    );

    let controller = Arc::new(HttpController::new(config)?);
    log::info!("Controller at {}", controller.base_url());
    let table = controller.operation_table(catalog);
    Ok(Dispatcher::new(Arc::new(table), tools, types))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DEFAULT_API_PREFIX};
    use crate::mcp::ToolMode;

    fn config() -> Config {
        Config {
            host: "https://192.168.1.1".to_string(),
            api_key: "key".to_string(),
            verify_ssl: false,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            mode: ToolMode::Lazy,
            catalog: None,
        }
    }

    #[test]
    fn test_load_catalog_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"resources": [{"name": "Tag", "endpoint": "tag", "fields": [{"json_name": "name", "field_type": "string"}]}]}"#,
        )
        .unwrap();

        let catalog = load_catalog(Some(&path)).unwrap();
        assert_eq!(catalog.exposed().count(), 1);
        assert!(load_catalog(None).unwrap().exposed().count() > 1);
    }

    #[test]
    fn test_build_dispatcher_passes_validation() {
        let catalog = load_catalog(None).unwrap();
        let dispatcher = build_dispatcher(&config(), &catalog).unwrap();
        dispatch::validate::validate_all(
            Some(dispatcher.client().as_ref()),
            dispatcher.tools(),
            dispatcher.types(),
        )
        .unwrap();
        assert!(dispatcher.tools().get("list_network").is_some());
    }
}
