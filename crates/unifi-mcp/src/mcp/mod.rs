//! MCP (Model Context Protocol) server for the UniFi controller.
//!
//! In eager mode every generated tool is listed with its own input schema.
//! In lazy mode only `tool_index`, `execute` and `batch` are listed and the
//! generated tools are reached through them, which keeps the tool list small
//! for clients with limited context. Both modes dispatch through the same
//! [`Dispatcher`].

pub mod meta;

use crate::client::{CallContext, ControllerOperations};
use crate::dispatch::validate::{validate_all, StartupError};
use crate::dispatch::{DispatchError, DispatchOutcome, Dispatcher};
use meta::{BatchRequest, ExecuteRequest, IndexRequest, BATCH, EXECUTE, TOOL_INDEX};
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler, ServiceExt};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Which tools the server lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolMode {
    /// Only the three meta-tools.
    #[default]
    Lazy,
    /// Every generated tool.
    Eager,
}

impl std::str::FromStr for ToolMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lazy" => Ok(ToolMode::Lazy),
            "eager" => Ok(ToolMode::Eager),
            other => Err(format!("Unknown tool mode '{}' - must be lazy or eager", other)),
        }
    }
}

impl std::fmt::Display for ToolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolMode::Lazy => f.write_str("lazy"),
            ToolMode::Eager => f.write_str("eager"),
        }
    }
}

/// UniFi MCP server over any controller surface.
pub struct UnifiMcpServer<C: ControllerOperations> {
    dispatcher: Dispatcher<C>,
    mode: ToolMode,
    tools: Arc<Vec<Tool>>,
}

impl<C: ControllerOperations> Clone for UnifiMcpServer<C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            mode: self.mode,
            tools: self.tools.clone(),
        }
    }
}

/// Validate the controller surface, then build the listed tools.
pub fn register_all<C: ControllerOperations>(
    dispatcher: &Dispatcher<C>,
    mode: ToolMode,
) -> Result<Vec<Tool>, StartupError> {
    validate_all(
        Some(dispatcher.client().as_ref()),
        dispatcher.tools(),
        dispatcher.types(),
    )?;

    let tools = match mode {
        ToolMode::Eager => dispatcher
            .tools()
            .all()
            .iter()
            .map(|d| {
                Tool::new(
                    d.name.clone(),
                    d.description.clone(),
                    Arc::new(d.input_schema()),
                )
            })
            .collect(),
        ToolMode::Lazy => meta_tools(),
    };
    Ok(tools)
}

fn meta_tools() -> Vec<Tool> {
    vec![
        Tool::new(
            TOOL_INDEX,
            "List the available UniFi tools with their input schemas. \
             Optionally filter by category (list, get, create, update, delete) \
             and by resource name substring. Call this first to discover tool names.",
            meta::input_schema::<IndexRequest>(),
        ),
        Tool::new(
            EXECUTE,
            "Run one UniFi tool by name with its arguments. \
             Tool names and argument schemas come from tool_index.",
            meta::input_schema::<ExecuteRequest>(),
        ),
        Tool::new(
            BATCH,
            "Run several UniFi tools in parallel. Results are returned in call order, \
             each with its index, tool name, and either a result or an error.",
            meta::input_schema::<BatchRequest>(),
        ),
    ]
}

impl<C: ControllerOperations> UnifiMcpServer<C> {
    /// Build the server; fails if any tool has no matching operation.
    pub fn new(dispatcher: Dispatcher<C>, mode: ToolMode) -> Result<Self, StartupError> {
        let tools = register_all(&dispatcher, mode)?;
        log::info!(
            "Registered {} MCP tools ({} mode, {} generated)",
            tools.len(),
            mode,
            dispatcher.tools().len()
        );
        Ok(Self {
            dispatcher,
            mode,
            tools: Arc::new(tools),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    /// Listed tools.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Route a call by name; `None` when this server does not list the tool.
    pub async fn call(
        &self,
        ctx: &CallContext,
        name: &str,
        args: &Map<String, Value>,
    ) -> Option<DispatchOutcome> {
        match (self.mode, name) {
            (ToolMode::Lazy, TOOL_INDEX) => Some(self.dispatcher.index(args)),
            (ToolMode::Lazy, EXECUTE) => Some(self.dispatcher.execute(ctx, args).await),
            (ToolMode::Lazy, BATCH) => Some(self.dispatcher.batch(ctx, args).await),
            (ToolMode::Lazy, _) => None,
            (ToolMode::Eager, _) => {
                let tool = self.dispatcher.tools().get(name)?;
                Some(self.dispatcher.dispatch(ctx, tool, args).await)
            }
        }
    }

    /// Serve over stdin/stdout until the client disconnects.
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        log::info!("MCP server ready, listening on stdio...");
        self.serve(rmcp::transport::stdio()).await?.waiting().await?;
        Ok(())
    }
}

impl<C: ControllerOperations> ServerHandler for UnifiMcpServer<C> {
    fn get_info(&self) -> ServerInfo {
        let instructions = match self.mode {
            ToolMode::Lazy => {
                "UniFi Network controller tools. Recommended workflow:\n\
                 1) tool_index: find tools by category (list/get/create/update/delete) or resource\n\
                 2) execute: run one tool with its arguments\n\
                 3) batch: run several independent tools in parallel\n\
                 Every tool takes an optional `site` (default: \"default\")."
            }
            ToolMode::Eager => {
                "UniFi Network controller tools, one per resource operation \
                 (list_*, get_*, create_*, update_*, delete_*). \
                 Every tool takes an optional `site` (default: \"default\")."
            }
        };
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(instructions.into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools.to_vec()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::new(context.ct.clone());
        let args = request.arguments.unwrap_or_default();
        match self.call(&ctx, &request.name, &args).await {
            Some(outcome) => Ok(outcome.into_call_tool_result()),
            None => Err(ErrorData::invalid_params(
                DispatchError::UnknownTool(request.name.to_string()).to_string(),
                None,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockController;
    use crate::client::{OperationTable, TypeRegistry};
    use crate::registry::ToolRegistry;
    use crate::schema::ResourceCatalog;
    use serde_json::json;

    fn dispatcher(table: OperationTable) -> Dispatcher<OperationTable> {
        let catalog = ResourceCatalog::builtin().unwrap();
        let tools = Arc::new(ToolRegistry::from_catalog(&catalog));
        let types = Arc::new(TypeRegistry::from_tools(&tools));
        Dispatcher::new(Arc::new(table), tools, types)
    }

    fn mock_table() -> OperationTable {
        let catalog = ResourceCatalog::builtin().unwrap();
        Arc::new(MockController::new()).operation_table(&catalog)
    }

    #[test]
    fn test_tool_mode_parse() {
        assert_eq!("lazy".parse::<ToolMode>().unwrap(), ToolMode::Lazy);
        assert_eq!(" EAGER ".parse::<ToolMode>().unwrap(), ToolMode::Eager);
        assert!("both".parse::<ToolMode>().is_err());
        assert_eq!(ToolMode::default(), ToolMode::Lazy);
    }

    #[test]
    fn test_lazy_lists_meta_tools() {
        let server = UnifiMcpServer::new(dispatcher(mock_table()), ToolMode::Lazy).unwrap();
        let names: Vec<&str> = server.tools().iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec![TOOL_INDEX, EXECUTE, BATCH]);
    }

    #[test]
    fn test_eager_lists_every_descriptor() {
        let server = UnifiMcpServer::new(dispatcher(mock_table()), ToolMode::Eager).unwrap();
        assert_eq!(server.tools().len(), server.dispatcher().tools().len());
        let list = server
            .tools()
            .iter()
            .find(|t| t.name == "list_network")
            .unwrap();
        assert_eq!(list.input_schema.get("type"), Some(&json!("object")));
    }

    #[test]
    fn test_startup_error_in_both_modes() {
        for mode in [ToolMode::Lazy, ToolMode::Eager] {
            let mut table = mock_table();
            table.remove("DeleteWLAN");
            let err = UnifiMcpServer::new(dispatcher(table), mode).err().unwrap();
            assert_eq!(
                err.to_string(),
                "missing client method: DeleteWLAN (for tool delete_wlan)"
            );
        }
    }

    #[tokio::test]
    async fn test_call_routing_by_mode() {
        let ctx = CallContext::default();
        let args = Map::new();

        let lazy = UnifiMcpServer::new(dispatcher(mock_table()), ToolMode::Lazy).unwrap();
        assert!(lazy.call(&ctx, "list_network", &args).await.is_none());
        assert!(lazy.call(&ctx, TOOL_INDEX, &args).await.unwrap().is_success());

        let eager = UnifiMcpServer::new(dispatcher(mock_table()), ToolMode::Eager).unwrap();
        assert!(eager.call(&ctx, TOOL_INDEX, &args).await.is_none());
        assert_eq!(
            eager.call(&ctx, "list_network", &args).await,
            Some(DispatchOutcome::Success(json!([])))
        );
    }

    #[test]
    fn test_server_info() {
        let server = UnifiMcpServer::new(dispatcher(mock_table()), ToolMode::Lazy).unwrap();
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("tool_index"));
    }
}
