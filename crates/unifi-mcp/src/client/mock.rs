//! In-memory controller for tests and the `test-harness` feature.

use super::{CallContext, OperationTable, RemoteError, RemoteResult, ResourceRecord};
use crate::schema::descriptor::infer_operations;
use crate::schema::{Category, ResourceCatalog};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Stores records per `(site, resource)` and counts calls per operation.
pub struct MockController {
    records: Mutex<HashMap<(String, String), Vec<Value>>>,
    settings: Mutex<HashMap<(String, String), Value>>,
    calls: Mutex<HashMap<String, usize>>,
    sites: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

impl MockController {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            settings: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            sites: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seed `resource` on `site`.
    pub fn with_records(self, site: &str, resource: &str, records: Vec<Value>) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert((site.to_string(), resource.to_string()), records);
        self
    }

    pub fn with_setting(self, site: &str, resource: &str, value: Value) -> Self {
        self.settings
            .lock()
            .unwrap()
            .insert((site.to_string(), resource.to_string()), value);
        self
    }

    /// Make `operation` fail with `message`.
    pub fn fail(&self, operation: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(operation.to_string(), message.to_string());
    }

    /// Number of times `operation` was invoked.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Sites seen by invocations, in call order.
    pub fn sites(&self) -> Vec<String> {
        self.sites.lock().unwrap().clone()
    }

    pub fn records(&self, site: &str, resource: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(&(site.to_string(), resource.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn enter(&self, operation: &str, site: &str) -> RemoteResult<()> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_insert(0) += 1;
        self.sites.lock().unwrap().push(site.to_string());
        match self.failures.lock().unwrap().get(operation) {
            Some(message) => Err(RemoteError::Api(message.clone())),
            None => Ok(()),
        }
    }

    fn list(&self, site: &str, resource: &str) -> RemoteResult<Value> {
        self.enter(&format!("List{}", resource), site)?;
        Ok(Value::Array(self.records(site, resource)))
    }

    fn get(&self, site: &str, resource: &str, id: &str) -> RemoteResult<Value> {
        self.enter(&format!("Get{}", resource), site)?;
        self.records(site, resource)
            .into_iter()
            .find(|r| r.get("_id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| RemoteError::NotFound(format!("{} {}", resource, id)))
    }

    fn get_setting(&self, site: &str, resource: &str) -> RemoteResult<Value> {
        self.enter(&format!("Get{}", resource), site)?;
        self.settings
            .lock()
            .unwrap()
            .get(&(site.to_string(), resource.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(resource.to_string()))
    }

    fn create(&self, site: &str, resource: &str, record: ResourceRecord) -> RemoteResult<Value> {
        self.enter(&format!("Create{}", resource), site)?;
        let mut body = record.0;
        let id = format!("{:024x}", self.next_id.fetch_add(1, Ordering::SeqCst));
        body.insert("_id".to_string(), json!(id));
        let value = Value::Object(body);
        self.records
            .lock()
            .unwrap()
            .entry((site.to_string(), resource.to_string()))
            .or_default()
            .push(value.clone());
        Ok(value)
    }

    fn update(
        &self,
        site: &str,
        resource: &str,
        is_setting: bool,
        record: ResourceRecord,
    ) -> RemoteResult<Value> {
        self.enter(&format!("Update{}", resource), site)?;
        let key = (site.to_string(), resource.to_string());
        if is_setting {
            let mut settings = self.settings.lock().unwrap();
            let current = settings.entry(key).or_insert_with(|| json!({}));
            merge(current, record.0);
            return Ok(current.clone());
        }

        let id = record.id().map(str::to_string).unwrap_or_default();
        let mut records = self.records.lock().unwrap();
        let existing = records
            .get_mut(&key)
            .and_then(|items| {
                items
                    .iter_mut()
                    .find(|r| r.get("_id").and_then(Value::as_str) == Some(id.as_str()))
            })
            .ok_or_else(|| RemoteError::NotFound(format!("{} {}", resource, id)))?;
        merge(existing, record.0);
        Ok(existing.clone())
    }

    fn delete(&self, site: &str, resource: &str, id: &str) -> RemoteResult<()> {
        self.enter(&format!("Delete{}", resource), site)?;
        let mut records = self.records.lock().unwrap();
        let items = records
            .get_mut(&(site.to_string(), resource.to_string()))
            .ok_or_else(|| RemoteError::NotFound(format!("{} {}", resource, id)))?;
        let before = items.len();
        items.retain(|r| r.get("_id").and_then(Value::as_str) != Some(id));
        if items.len() == before {
            return Err(RemoteError::NotFound(format!("{} {}", resource, id)));
        }
        Ok(())
    }

    /// Operation table for every exposed resource of `catalog`.
    pub fn operation_table(self: &Arc<Self>, catalog: &ResourceCatalog) -> OperationTable {
        let mut table = OperationTable::new();
        for resource in catalog.exposed() {
            let name = resource.name.clone();
            let is_setting = resource.is_setting;
            for category in infer_operations(resource) {
                let mock = self.clone();
                let name = name.clone();
                match category {
                    Category::List => {
                        table.list(&resource.name, move |_ctx: CallContext, site: String| {
                            let result = mock.list(&site, &name);
                            async move { result }
                        });
                    }
                    Category::Get if is_setting => {
                        table.get_setting(&resource.name, move |_ctx, site| {
                            let result = mock.get_setting(&site, &name);
                            async move { result }
                        });
                    }
                    Category::Get => {
                        table.get(&resource.name, move |_ctx, site, id| {
                            let result = mock.get(&site, &name, &id);
                            async move { result }
                        });
                    }
                    Category::Create => {
                        table.create::<ResourceRecord, _, _>(
                            &resource.name,
                            move |_ctx, site, record| {
                                let result = mock.create(&site, &name, record);
                                async move { result }
                            },
                        );
                    }
                    Category::Update => {
                        table.update::<ResourceRecord, _, _>(
                            &resource.name,
                            move |_ctx, site, record| {
                                let result = mock.update(&site, &name, is_setting, record);
                                async move { result }
                            },
                        );
                    }
                    Category::Delete => {
                        table.delete(&resource.name, move |_ctx, site, id| {
                            let result = mock.delete(&site, &name, &id);
                            async move { result }
                        });
                    }
                }
            }
        }
        table
    }
}

fn merge(target: &mut Value, patch: serde_json::Map<String, Value>) {
    if let Value::Object(existing) = target {
        existing.extend(patch);
    } else {
        *target = Value::Object(patch);
    }
}
