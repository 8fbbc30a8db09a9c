//! Operation surface of the UniFi controller.
//!
//! The dispatcher never calls the controller directly. It resolves an
//! operation name such as `ListNetwork` through [`ControllerOperations`] and
//! receives an [`Operation`] closure whose variant fixes its parameter and
//! return shape. [`OperationTable`] is the closure table built once at
//! startup, from [`http::HttpController`] in production or from
//! [`mock::MockController`] in tests.
//!
//! Create and update payloads travel type-erased as `Box<dyn ResourcePayload>`.
//! A [`TypeRegistry`] maps each resource to the [`PayloadFactory`] that binds
//! raw JSON arguments into that payload.

pub mod http;
#[cfg(any(test, feature = "test-harness"))]
pub mod mock;

use crate::registry::ToolRegistry;
use crate::schema::{AttributeDescriptor, AttributeKind, BindShape, Category};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result type for controller operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors reported by the controller or the transport in front of it.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Controller-level error message, e.g. `api.err.Invalid`.
    #[error("{0}")]
    Api(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload type mismatch: expected {0}")]
    PayloadMismatch(&'static str),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("request cancelled")]
    Cancelled,
}

/// Per-call context handed to every operation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

// ── Payloads ──────────────────────────────────────────────────────

/// A bound create/update input, erased to a trait object.
pub trait ResourcePayload: Send + Sync + std::fmt::Debug {
    fn to_json(&self) -> Result<Value, serde_json::Error>;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> ResourcePayload for T
where
    T: Serialize + std::fmt::Debug + Send + Sync + 'static,
{
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Failure binding raw arguments into a payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct BindError(pub String);

impl From<serde_json::Error> for BindError {
    fn from(err: serde_json::Error) -> Self {
        BindError(err.to_string())
    }
}

/// Builds a payload from the assembled argument map.
pub type PayloadFactory =
    Arc<dyn Fn(Value) -> Result<Box<dyn ResourcePayload>, BindError> + Send + Sync>;

/// Factory decoding into a concrete serde type.
pub fn typed_factory<T>() -> PayloadFactory
where
    T: DeserializeOwned + Serialize + std::fmt::Debug + Send + Sync + 'static,
{
    Arc::new(|value| {
        let payload: T = serde_json::from_value(value)?;
        Ok(Box::new(payload) as Box<dyn ResourcePayload>)
    })
}

/// Schema-checked generic resource body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRecord(pub Map<String, Value>);

impl ResourceRecord {
    pub fn id(&self) -> Option<&str> {
        self.0.get(crate::schema::normalize::ID_FIELD).and_then(Value::as_str)
    }
}

/// Factory producing [`ResourceRecord`]s, checking each known key (and each
/// array item) against its bind shape. `null` is accepted everywhere.
pub fn record_factory(attributes: &[AttributeDescriptor]) -> PayloadFactory {
    let shapes: HashMap<String, BindShape> = attributes
        .iter()
        .map(|a| (a.name.clone(), a.bind_shape()))
        .collect();

    Arc::new(move |value| {
        let Value::Object(map) = value else {
            return Err(BindError(format!(
                "invalid type: {}, expected a map",
                json_type_name(&value)
            )));
        };
        for (key, field) in &map {
            let shape = if key == crate::schema::normalize::ID_FIELD {
                Some(BindShape {
                    kind: AttributeKind::String,
                    item_kind: None,
                })
            } else {
                shapes.get(key).copied()
            };
            if let Some(shape) = shape {
                check_shape(key, shape, field)?;
            }
        }
        Ok(Box::new(ResourceRecord(map)) as Box<dyn ResourcePayload>)
    })
}

fn check_shape(key: &str, shape: BindShape, value: &Value) -> Result<(), BindError> {
    check_kind(key, shape.kind, value)?;
    if let (Some(item_kind), Value::Array(items)) = (shape.item_kind, value) {
        for (i, item) in items.iter().enumerate() {
            check_kind(&format!("{}[{}]", key, i), item_kind, item)?;
        }
    }
    Ok(())
}

fn check_kind(key: &str, kind: AttributeKind, value: &Value) -> Result<(), BindError> {
    if value.is_null() || kind_matches(kind, value) {
        return Ok(());
    }
    Err(BindError(format!(
        "invalid type: {}, expected {} for field `{}`",
        json_type_name(value),
        kind,
        key
    )))
}

fn kind_matches(kind: AttributeKind, value: &Value) -> bool {
    match kind {
        AttributeKind::String => value.is_string(),
        AttributeKind::Integer => value.is_i64() || value.is_u64(),
        AttributeKind::Number => value.is_number(),
        AttributeKind::Boolean => value.is_boolean(),
        AttributeKind::Array => value.is_array(),
        AttributeKind::Object => value.is_object(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "floating point",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}

/// Resource name → payload factory.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    factories: HashMap<String, PayloadFactory>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for the resource.
    pub fn register(&mut self, resource: impl Into<String>, factory: PayloadFactory) {
        self.factories.insert(resource.into(), factory);
    }

    pub fn get(&self, resource: &str) -> Option<&PayloadFactory> {
        self.factories.get(resource)
    }

    pub fn contains(&self, resource: &str) -> bool {
        self.factories.contains_key(resource)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Record factories for every resource with a create or update tool.
    pub fn from_tools(tools: &ToolRegistry) -> Self {
        let mut registry = Self::new();
        for tool in tools.all().iter().filter(|t| t.category.has_payload()) {
            if !registry.contains(&tool.resource) {
                registry.register(tool.resource.clone(), record_factory(&tool.attributes));
            }
        }
        registry
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("resources", &names).finish()
    }
}

// ── Operations ────────────────────────────────────────────────────

type ScopedFn = dyn Fn(CallContext, String) -> BoxFuture<'static, RemoteResult<Value>> + Send + Sync;
type KeyedFn =
    dyn Fn(CallContext, String, String) -> BoxFuture<'static, RemoteResult<Value>> + Send + Sync;
type PayloadFn = dyn Fn(CallContext, String, Box<dyn ResourcePayload>) -> BoxFuture<'static, RemoteResult<Value>>
    + Send
    + Sync;
type RemoveFn =
    dyn Fn(CallContext, String, String) -> BoxFuture<'static, RemoteResult<()>> + Send + Sync;

/// One controller operation. The variant fixes its shape.
#[derive(Clone)]
pub enum Operation {
    /// `(ctx, site) -> (value, error)`
    Scoped(Arc<ScopedFn>),
    /// `(ctx, site, id) -> (value, error)`
    Keyed(Arc<KeyedFn>),
    /// `(ctx, site, payload) -> (value, error)`
    Payload(Arc<PayloadFn>),
    /// `(ctx, site, id) -> (error)`
    Remove(Arc<RemoveFn>),
}

/// Parameter and return counts of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub params: usize,
    pub returns: usize,
}

impl Signature {
    pub const fn new(params: usize, returns: usize) -> Self {
        Self { params, returns }
    }

    /// Shape a tool of the given category must be implemented with.
    pub fn expected(category: Category, is_setting: bool) -> Self {
        match category {
            Category::List => Self::new(2, 2),
            Category::Get if is_setting => Self::new(2, 2),
            Category::Get | Category::Create | Category::Update => Self::new(3, 2),
            Category::Delete => Self::new(3, 1),
        }
    }
}

impl Operation {
    pub fn signature(&self) -> Signature {
        match self {
            Operation::Scoped(_) => Signature::new(2, 2),
            Operation::Keyed(_) | Operation::Payload(_) => Signature::new(3, 2),
            Operation::Remove(_) => Signature::new(3, 1),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Scoped(_) => "scoped",
            Operation::Keyed(_) => "keyed",
            Operation::Payload(_) => "payload",
            Operation::Remove(_) => "remove",
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sig = self.signature();
        write!(f, "Operation::{}({}→{})", self.kind(), sig.params, sig.returns)
    }
}

/// Name-based lookup of controller operations.
pub trait ControllerOperations: Send + Sync + 'static {
    /// Operation registered as `name` (e.g. `ListNetwork`), if any.
    fn operation(&self, name: &str) -> Option<Operation>;
}

/// Closure table keyed by operation name.
#[derive(Clone, Default)]
pub struct OperationTable {
    operations: HashMap<String, Operation>,
}

fn downcast_payload<T: 'static>(payload: Box<dyn ResourcePayload>) -> RemoteResult<T> {
    payload
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| RemoteError::PayloadMismatch(std::any::type_name::<T>()))
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, operation: Operation) {
        self.operations.insert(name.into(), operation);
    }

    pub fn remove(&mut self, name: &str) -> Option<Operation> {
        self.operations.remove(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// `List{resource}`.
    pub fn list<F, Fut>(&mut self, resource: &str, f: F) -> &mut Self
    where
        F: Fn(CallContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
    {
        self.insert(
            format!("List{}", resource),
            Operation::Scoped(Arc::new(move |ctx, site| f(ctx, site).boxed())),
        );
        self
    }

    /// `Get{resource}` keyed by id.
    pub fn get<F, Fut>(&mut self, resource: &str, f: F) -> &mut Self
    where
        F: Fn(CallContext, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
    {
        self.insert(
            format!("Get{}", resource),
            Operation::Keyed(Arc::new(move |ctx, site, id| f(ctx, site, id).boxed())),
        );
        self
    }

    /// `Get{resource}` for a per-site setting.
    pub fn get_setting<F, Fut>(&mut self, resource: &str, f: F) -> &mut Self
    where
        F: Fn(CallContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
    {
        self.insert(
            format!("Get{}", resource),
            Operation::Scoped(Arc::new(move |ctx, site| f(ctx, site).boxed())),
        );
        self
    }

    /// `Create{resource}` taking a `T` payload.
    pub fn create<T, F, Fut>(&mut self, resource: &str, f: F) -> &mut Self
    where
        T: 'static,
        F: Fn(CallContext, String, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
    {
        let name = format!("Create{}", resource);
        self.insert(name, payload_operation(f));
        self
    }

    /// `Update{resource}` taking a `T` payload.
    pub fn update<T, F, Fut>(&mut self, resource: &str, f: F) -> &mut Self
    where
        T: 'static,
        F: Fn(CallContext, String, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
    {
        let name = format!("Update{}", resource);
        self.insert(name, payload_operation(f));
        self
    }

    /// `Delete{resource}` keyed by id.
    pub fn delete<F, Fut>(&mut self, resource: &str, f: F) -> &mut Self
    where
        F: Fn(CallContext, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RemoteResult<()>> + Send + 'static,
    {
        self.insert(
            format!("Delete{}", resource),
            Operation::Remove(Arc::new(move |ctx, site, id| f(ctx, site, id).boxed())),
        );
        self
    }
}

fn payload_operation<T, F, Fut>(f: F) -> Operation
where
    T: 'static,
    F: Fn(CallContext, String, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RemoteResult<Value>> + Send + 'static,
{
    Operation::Payload(Arc::new(move |ctx, site, payload| {
        match downcast_payload::<T>(payload) {
            Ok(typed) => f(ctx, site, typed).boxed(),
            Err(e) => futures::future::ready(Err(e)).boxed(),
        }
    }))
}

impl ControllerOperations for OperationTable {
    fn operation(&self, name: &str) -> Option<Operation> {
        self.operations.get(name).cloned()
    }
}

impl std::fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("OperationTable").field("operations", &names).finish()
    }
}
