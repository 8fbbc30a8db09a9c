//! Generic tool dispatch: descriptor + arguments → controller operation.
//!
//! Every generated tool goes through [`Dispatcher::dispatch`]. The dispatcher
//! resolves the operation by name, checks and binds the arguments, invokes
//! the closure and folds the result into a [`DispatchOutcome`]. No step is
//! specific to a resource.

pub mod validate;

use crate::client::{
    CallContext, ControllerOperations, Operation, RemoteError, Signature, TypeRegistry,
};
use crate::registry::ToolRegistry;
use crate::schema::{Category, ToolDescriptor};
use rmcp::model::{CallToolResult, Content};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Site used when the caller names none.
pub const DEFAULT_SITE: &str = "default";

/// Per-call dispatch failures. Each becomes a failed tool result.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("method {0} not found")]
    OperationNotFound(String),
    #[error("required parameter '{0}' is missing or invalid")]
    MissingParameter(&'static str),
    #[error("unexpected parameters: {}", .0.join(", "))]
    UnexpectedParameters(Vec<String>),
    #[error("no fields provided")]
    NoFieldsProvided,
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("tool name is required")]
    MissingToolName,
    #[error("invalid call format: expected object with 'tool' and 'arguments'")]
    InvalidCallFormat,
    #[error("calls array is required and must not be empty")]
    EmptyBatch,
    #[error("missing type in registry for resource {0}")]
    NoPayloadType(String),
    #[error("method {method} is a {actual} operation, which does not fit tool {tool}")]
    SignatureMismatch {
        method: String,
        actual: &'static str,
        tool: String,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Result of one tool call: a JSON value or a failure message, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success(Value),
    Failure(String),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }

    /// Pretty-printed JSON on success, the message on failure.
    pub fn to_text(&self) -> String {
        match self {
            DispatchOutcome::Success(value) => serde_json::to_string_pretty(value)
                .unwrap_or_else(|e| format!("failed to marshal response: {}", e)),
            DispatchOutcome::Failure(message) => message.clone(),
        }
    }

    pub fn into_call_tool_result(self) -> CallToolResult {
        let text = self.to_text();
        if self.is_success() {
            CallToolResult::success(vec![Content::text(text)])
        } else {
            CallToolResult::error(vec![Content::text(text)])
        }
    }
}

impl From<DispatchError> for DispatchOutcome {
    fn from(err: DispatchError) -> Self {
        DispatchOutcome::Failure(err.to_string())
    }
}

/// Shared dispatch state: controller, tool catalog and payload factories.
pub struct Dispatcher<C: ControllerOperations> {
    client: Arc<C>,
    tools: Arc<ToolRegistry>,
    types: Arc<TypeRegistry>,
}

impl<C: ControllerOperations> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            tools: self.tools.clone(),
            types: self.types.clone(),
        }
    }
}

impl<C: ControllerOperations> Dispatcher<C> {
    pub fn new(client: Arc<C>, tools: Arc<ToolRegistry>, types: Arc<TypeRegistry>) -> Self {
        Self {
            client,
            tools,
            types,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Run one tool call. Never panics on bad input; every failure is
    /// reported in the outcome.
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        tool: &ToolDescriptor,
        args: &Map<String, Value>,
    ) -> DispatchOutcome {
        match self.try_dispatch(ctx, tool, args).await {
            Ok(value) => DispatchOutcome::Success(value),
            Err(e) => {
                log::debug!("Tool {} failed: {}", tool.name, e);
                e.into()
            }
        }
    }

    /// Look a tool up by name and dispatch it.
    pub async fn dispatch_named(
        &self,
        ctx: &CallContext,
        name: &str,
        args: &Map<String, Value>,
    ) -> DispatchOutcome {
        match self.tools.get(name) {
            Some(tool) => self.dispatch(ctx, tool, args).await,
            None => DispatchError::UnknownTool(name.to_string()).into(),
        }
    }

    async fn try_dispatch(
        &self,
        ctx: &CallContext,
        tool: &ToolDescriptor,
        args: &Map<String, Value>,
    ) -> Result<Value, DispatchError> {
        let method = tool.operation_name();
        log::debug!("Dispatching {} → {}", tool.name, method);
        let operation = self
            .client
            .operation(&method)
            .ok_or_else(|| DispatchError::OperationNotFound(method.clone()))?;

        let mismatch = |op: &Operation| DispatchError::SignatureMismatch {
            method: method.clone(),
            actual: op.kind(),
            tool: tool.name.clone(),
        };
        if operation.signature() != Signature::expected(tool.category, tool.is_setting) {
            return Err(mismatch(&operation));
        }

        let site = site_of(args);
        match (tool.category, operation) {
            (Category::List, Operation::Scoped(call)) => Ok(call(ctx.clone(), site).await?),
            (Category::Get, Operation::Scoped(call)) => Ok(call(ctx.clone(), site).await?),
            (Category::Get, Operation::Keyed(call)) => {
                let id = required_id(args)?;
                Ok(call(ctx.clone(), site, id).await?)
            }
            (Category::Create | Category::Update, Operation::Payload(call)) => {
                let payload = self.bind(tool, args)?;
                Ok(call(ctx.clone(), site, payload).await?)
            }
            (Category::Delete, Operation::Remove(call)) => {
                let id = required_id(args)?;
                call(ctx.clone(), site, id).await?;
                Ok(json!({"success": true}))
            }
            (_, other) => Err(mismatch(&other)),
        }
    }

    /// Check, assemble and bind a create/update payload.
    fn bind(
        &self,
        tool: &ToolDescriptor,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn crate::client::ResourcePayload>, DispatchError> {
        let takes_id = tool.category == Category::Update && !tool.is_setting;

        let mut allowed: HashSet<&str> = tool.attributes.iter().map(|a| a.name.as_str()).collect();
        allowed.insert("site");
        if takes_id {
            allowed.insert("id");
        }

        let mut unexpected: Vec<String> = args
            .keys()
            .filter(|k| !allowed.contains(k.as_str()))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(DispatchError::UnexpectedParameters(unexpected));
        }

        let mut data: Map<String, Value> = args
            .iter()
            .filter(|(k, _)| k.as_str() != "site" && k.as_str() != "id")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if data.is_empty() {
            return Err(DispatchError::NoFieldsProvided);
        }

        if takes_id {
            let id = required_id(args)?;
            data.entry("_id").or_insert(Value::String(id));
        }

        let factory = self
            .types
            .get(&tool.resource)
            .ok_or_else(|| DispatchError::NoPayloadType(tool.resource.clone()))?;
        factory(Value::Object(data)).map_err(|e| DispatchError::InvalidData(e.0))
    }
}

/// Caller's `site`, or [`DEFAULT_SITE`] when absent, empty or not a string.
pub fn site_of(args: &Map<String, Value>) -> String {
    args.get("site")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SITE)
        .to_string()
}

fn required_id(args: &Map<String, Value>) -> Result<String, DispatchError> {
    args.get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(DispatchError::MissingParameter("id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockController;
    use crate::client::{typed_factory, OperationTable};
    use crate::schema::ResourceCatalog;
    use serde::{Deserialize, Serialize};

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn setup(mock: MockController) -> (Arc<MockController>, Dispatcher<OperationTable>) {
        let catalog = ResourceCatalog::builtin().unwrap();
        let tools = Arc::new(ToolRegistry::from_catalog(&catalog));
        let types = Arc::new(TypeRegistry::from_tools(&tools));
        let mock = Arc::new(mock);
        let table = Arc::new(mock.operation_table(&catalog));
        (mock, Dispatcher::new(table, tools, types))
    }

    async fn call(
        dispatcher: &Dispatcher<OperationTable>,
        name: &str,
        arguments: Value,
    ) -> DispatchOutcome {
        dispatcher
            .dispatch_named(&CallContext::default(), name, &args(arguments))
            .await
    }

    fn failure(outcome: DispatchOutcome) -> String {
        match outcome {
            DispatchOutcome::Failure(message) => message,
            DispatchOutcome::Success(v) => panic!("expected failure, got {}", v),
        }
    }

    fn success(outcome: DispatchOutcome) -> Value {
        match outcome {
            DispatchOutcome::Success(v) => v,
            DispatchOutcome::Failure(m) => panic!("expected success, got {}", m),
        }
    }

    #[tokio::test]
    async fn test_list_defaults_site() {
        let (mock, dispatcher) = setup(MockController::new().with_records(
            "default",
            "Network",
            vec![json!({"_id": "n1", "name": "LAN"})],
        ));
        let value = success(call(&dispatcher, "list_network", json!({})).await);
        assert_eq!(value, json!([{"_id": "n1", "name": "LAN"}]));

        call(&dispatcher, "list_network", json!({"site": ""})).await;
        call(&dispatcher, "list_network", json!({"site": 42})).await;
        call(&dispatcher, "list_network", json!({"site": "branch"})).await;
        assert_eq!(mock.sites(), vec!["default", "default", "default", "branch"]);
    }

    #[tokio::test]
    async fn test_get_requires_id_without_invoking() {
        let (mock, dispatcher) = setup(MockController::new());
        for bad in [json!({}), json!({"id": ""}), json!({"id": 7})] {
            let message = failure(call(&dispatcher, "get_network", bad).await);
            assert_eq!(message, "required parameter 'id' is missing or invalid");
        }
        let message = failure(call(&dispatcher, "delete_network", json!({})).await);
        assert_eq!(message, "required parameter 'id' is missing or invalid");
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_setting_takes_no_id() {
        let (_mock, dispatcher) = setup(
            MockController::new().with_setting("default", "SettingMgmt", json!({"led_enabled": true})),
        );
        let value = success(call(&dispatcher, "get_setting_mgmt", json!({})).await);
        assert_eq!(value["led_enabled"], true);
    }

    #[tokio::test]
    async fn test_create_rejects_unexpected_sorted() {
        let (mock, dispatcher) = setup(MockController::new());
        let message = failure(
            call(
                &dispatcher,
                "create_network",
                json!({"name": "x", "zeta": 1, "alpha": 2, "id": "nope"}),
            )
            .await,
        );
        assert_eq!(message, "unexpected parameters: alpha, id, zeta");
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let (_mock, dispatcher) = setup(MockController::new());
        let message = failure(call(&dispatcher, "create_network", json!({"site": "x"})).await);
        assert_eq!(message, "no fields provided");
    }

    #[tokio::test]
    async fn test_create_invalid_data() {
        let (mock, dispatcher) = setup(MockController::new());
        let message =
            failure(call(&dispatcher, "create_network", json!({"vlan": "ten"})).await);
        assert!(message.starts_with("invalid data: "), "{}", message);
        assert_eq!(mock.call_count("CreateNetwork"), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_mistyped_array_items() {
        let (mock, dispatcher) = setup(MockController::new());
        let message = failure(
            call(
                &dispatcher,
                "create_network",
                json!({"name": "x", "dhcpd_dns": [1, true, {"a": 1}]}),
            )
            .await,
        );
        assert_eq!(
            message,
            "invalid data: invalid type: integer, expected string for field `dhcpd_dns[0]`"
        );
        assert_eq!(mock.call_count("CreateNetwork"), 0);

        success(
            call(
                &dispatcher,
                "create_network",
                json!({"name": "x", "dhcpd_dns": ["1.1.1.1"]}),
            )
            .await,
        );
        assert_eq!(mock.call_count("CreateNetwork"), 1);
    }

    #[tokio::test]
    async fn test_create_then_update_injects_id() {
        let (mock, dispatcher) = setup(MockController::new());
        let created = success(
            call(&dispatcher, "create_network", json!({"name": "IoT", "vlan": 30})).await,
        );
        let id = created["_id"].as_str().unwrap().to_string();

        let updated = success(
            call(&dispatcher, "update_network", json!({"id": id, "name": "IoT-2"})).await,
        );
        assert_eq!(updated["_id"], json!(id));
        assert_eq!(updated["name"], "IoT-2");
        assert_eq!(updated["vlan"], 30);
        assert_eq!(mock.call_count("UpdateNetwork"), 1);
    }

    #[tokio::test]
    async fn test_update_requires_fields_before_id() {
        let (_mock, dispatcher) = setup(MockController::new());
        let message = failure(call(&dispatcher, "update_network", json!({"id": "a"})).await);
        assert_eq!(message, "no fields provided");
        let message = failure(call(&dispatcher, "update_network", json!({"name": "a"})).await);
        assert_eq!(message, "required parameter 'id' is missing or invalid");
    }

    #[tokio::test]
    async fn test_update_setting_rejects_id() {
        let (_mock, dispatcher) = setup(MockController::new());
        let message = failure(
            call(
                &dispatcher,
                "update_setting_mgmt",
                json!({"id": "x", "led_enabled": false}),
            )
            .await,
        );
        assert_eq!(message, "unexpected parameters: id");

        let value = success(
            call(&dispatcher, "update_setting_mgmt", json!({"led_enabled": false})).await,
        );
        assert_eq!(value["led_enabled"], false);
    }

    #[tokio::test]
    async fn test_delete_success_shape() {
        let (mock, dispatcher) = setup(MockController::new().with_records(
            "default",
            "Network",
            vec![json!({"_id": "n1"})],
        ));
        let outcome = call(&dispatcher, "delete_network", json!({"id": "n1"})).await;
        assert_eq!(outcome, DispatchOutcome::Success(json!({"success": true})));
        assert_eq!(outcome.to_text(), "{\n  \"success\": true\n}");
        assert!(mock.records("default", "Network").is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_verbatim() {
        let (mock, dispatcher) = setup(MockController::new());
        mock.fail("ListNetwork", "api.err.NoPermission");
        let outcome = call(&dispatcher, "list_network", json!({})).await;
        assert_eq!(outcome, DispatchOutcome::Failure("api.err.NoPermission".to_string()));
        let result = outcome.into_call_tool_result();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_missing_operation() {
        let catalog = ResourceCatalog::builtin().unwrap();
        let tools = Arc::new(ToolRegistry::from_catalog(&catalog));
        let types = Arc::new(TypeRegistry::from_tools(&tools));
        let dispatcher = Dispatcher::new(Arc::new(OperationTable::new()), tools, types);
        let message = failure(call(&dispatcher, "list_network", json!({})).await);
        assert_eq!(message, "method ListNetwork not found");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (_mock, dispatcher) = setup(MockController::new());
        let message = failure(call(&dispatcher, "frobnicate", json!({})).await);
        assert_eq!(message, "unknown tool: frobnicate");
    }

    #[tokio::test]
    async fn test_wrong_shape_is_not_invoked() {
        let catalog = ResourceCatalog::builtin().unwrap();
        let tools = Arc::new(ToolRegistry::from_catalog(&catalog));
        let types = Arc::new(TypeRegistry::from_tools(&tools));
        let mut table = OperationTable::new();
        // Registered as a keyed get instead of a scoped list
        table.get("Network", |_ctx, _site, _id| async move { Ok(json!([])) });
        table.insert("ListNetwork", table.operation("GetNetwork").unwrap());
        let dispatcher = Dispatcher::new(Arc::new(table), tools, types);
        let message = failure(call(&dispatcher, "list_network", json!({})).await);
        assert!(message.contains("ListNetwork"), "{}", message);
    }

    #[tokio::test]
    async fn test_typed_payload_binding() {
        #[derive(Debug, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        struct PortForward {
            name: String,
            #[serde(default)]
            fwd: Option<String>,
        }

        let catalog = ResourceCatalog::builtin().unwrap();
        let tools = Arc::new(ToolRegistry::from_catalog(&catalog));
        let mut types = TypeRegistry::from_tools(&tools);
        types.register("PortForward", typed_factory::<PortForward>());

        let mut table = OperationTable::new();
        table.create::<PortForward, _, _>("PortForward", |_ctx, _site, pf| async move {
            Ok(json!({"name": pf.name, "fwd": pf.fwd}))
        });
        let dispatcher = Dispatcher::new(Arc::new(table), tools, Arc::new(types));

        let value = success(
            call(&dispatcher, "create_port_forward", json!({"name": "ssh", "fwd": "10.0.0.2"})).await,
        );
        assert_eq!(value["fwd"], "10.0.0.2");

        let message =
            failure(call(&dispatcher, "create_port_forward", json!({"fwd": "10.0.0.2"})).await);
        assert!(message.starts_with("invalid data: missing field `name`"), "{}", message);
    }
}
