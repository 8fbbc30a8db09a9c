//! `tool_index`, `execute` and `batch`: the lazy-mode entry points.

use crate::client::{CallContext, ControllerOperations};
use crate::dispatch::{DispatchError, DispatchOutcome, Dispatcher};
use crate::schema::ToolDescriptor;
use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const TOOL_INDEX: &str = "tool_index";
pub const EXECUTE: &str = "execute";
pub const BATCH: &str = "batch";

// ── Argument shapes (schemas only; parsing is lenient) ──────────

#[derive(Debug, Default, JsonSchema)]
pub struct IndexRequest {
    /// Filter by category: list, get, create, update or delete
    pub category: Option<String>,
    /// Filter by resource name, case-insensitive substring (e.g. "firewall")
    pub resource: Option<String>,
}

#[derive(Debug, JsonSchema)]
pub struct ExecuteRequest {
    /// Tool name from tool_index (e.g. "list_network")
    pub tool: String,
    /// Arguments for the tool
    pub arguments: Option<Map<String, Value>>,
}

#[derive(Debug, JsonSchema)]
pub struct BatchCall {
    /// Tool name from tool_index
    pub tool: String,
    /// Arguments for the tool
    pub arguments: Option<Map<String, Value>>,
}

#[derive(Debug, JsonSchema)]
pub struct BatchRequest {
    /// Tool calls to run in parallel
    pub calls: Vec<BatchCall>,
}

impl IndexRequest {
    pub fn from_args(args: &Map<String, Value>) -> Self {
        Self {
            category: str_arg(args, "category").map(str::to_string),
            resource: str_arg(args, "resource").map(str::to_string),
        }
    }
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// `arguments` as an object; anything else counts as no arguments.
fn object_arg(args: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match args.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

/// JSON schema of a request type, as an MCP input schema.
pub fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(schema) {
        Ok(Value::Object(mut map)) => {
            map.remove("$schema");
            Arc::new(map)
        }
        _ => Arc::new(JsonObject::new()),
    }
}

// ── Output shapes ───────────────────────────────────────────────

/// One `tool_index` row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub name: String,
    pub description: String,
    pub category: String,
    pub resource: String,
    pub input_schema: Map<String, Value>,
}

impl From<&ToolDescriptor> for IndexEntry {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            category: tool.category.to_string(),
            resource: tool.resource.clone(),
            input_schema: tool.input_schema(),
        }
    }
}

/// One positional `batch` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_error: bool,
}

impl BatchEntry {
    fn failed(index: usize, tool: Option<String>, error: String) -> Self {
        Self {
            index,
            tool,
            result: None,
            error: Some(error),
            is_error: true,
        }
    }

    fn from_outcome(index: usize, tool: String, outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Success(value) => Self {
                index,
                tool: Some(tool),
                result: Some(value),
                error: None,
                is_error: false,
            },
            DispatchOutcome::Failure(message) => Self::failed(index, Some(tool), message),
        }
    }
}

fn to_outcome<T: Serialize>(value: &T) -> DispatchOutcome {
    match serde_json::to_value(value) {
        Ok(v) => DispatchOutcome::Success(v),
        Err(e) => DispatchOutcome::Failure(format!("failed to marshal results: {}", e)),
    }
}

impl<C: ControllerOperations> Dispatcher<C> {
    /// Filtered tool catalog.
    pub fn index(&self, args: &Map<String, Value>) -> DispatchOutcome {
        let request = IndexRequest::from_args(args);
        let entries: Vec<IndexEntry> = self
            .tools()
            .filter(request.category.as_deref(), request.resource.as_deref())
            .into_iter()
            .map(IndexEntry::from)
            .collect();
        to_outcome(&entries)
    }

    /// Run one tool by name.
    pub async fn execute(&self, ctx: &CallContext, args: &Map<String, Value>) -> DispatchOutcome {
        let Some(tool) = str_arg(args, "tool").filter(|t| !t.is_empty()) else {
            return DispatchError::MissingToolName.into();
        };
        let arguments = object_arg(args, "arguments");
        self.dispatch_named(ctx, tool, &arguments).await
    }

    /// Run every call concurrently; results keep input order.
    pub async fn batch(&self, ctx: &CallContext, args: &Map<String, Value>) -> DispatchOutcome {
        let calls = match args.get("calls") {
            Some(Value::Array(calls)) if !calls.is_empty() => calls.clone(),
            _ => return DispatchError::EmptyBatch.into(),
        };
        log::debug!("Batch of {} calls", calls.len());

        let mut names = Vec::with_capacity(calls.len());
        let mut handles = Vec::with_capacity(calls.len());
        for (index, call) in calls.into_iter().enumerate() {
            names.push(
                call.get("tool")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
            let dispatcher = self.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.batch_entry(&ctx, index, call).await
            }));
        }

        let entries: Vec<BatchEntry> = futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .enumerate()
            .map(|(index, (joined, tool))| {
                joined.unwrap_or_else(|e| {
                    log::warn!("Batch call {} aborted: {}", index, e);
                    BatchEntry::failed(index, tool, format!("call aborted: {}", e))
                })
            })
            .collect();
        to_outcome(&entries)
    }

    async fn batch_entry(&self, ctx: &CallContext, index: usize, call: Value) -> BatchEntry {
        let Value::Object(call) = call else {
            return BatchEntry::failed(index, None, DispatchError::InvalidCallFormat.to_string());
        };
        let Some(tool) = str_arg(&call, "tool").filter(|t| !t.is_empty()) else {
            return BatchEntry::failed(index, None, DispatchError::MissingToolName.to_string());
        };
        let tool = tool.to_string();
        let arguments = object_arg(&call, "arguments");
        let outcome = self.dispatch_named(ctx, &tool, &arguments).await;
        BatchEntry::from_outcome(index, tool, outcome)
    }
}
