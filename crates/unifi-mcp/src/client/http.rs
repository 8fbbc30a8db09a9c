//! reqwest-backed UniFi controller client.

use super::{CallContext, OperationTable, RemoteError, RemoteResult, ResourceRecord};
use crate::config::Config;
use crate::schema::descriptor::infer_operations;
use crate::schema::{ApiVersion, Category, RawResource, ResourceCatalog};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const API_KEY_HEADER: &str = "X-API-KEY";

/// Where a resource lives on the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRoute {
    pub endpoint: String,
    pub api: ApiVersion,
    pub is_setting: bool,
}

impl From<&RawResource> for ResourceRoute {
    fn from(resource: &RawResource) -> Self {
        Self {
            endpoint: resource.endpoint.clone(),
            api: resource.api,
            is_setting: resource.is_setting,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Meta {
    rc: String,
    #[serde(default)]
    msg: Option<String>,
}

/// v1 response envelope: `{"meta": {"rc": "ok"}, "data": [...]}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    meta: Meta,
    #[serde(default)]
    data: Vec<Value>,
}

/// Client for one controller, shared by every operation closure.
#[derive(Debug, Clone)]
pub struct HttpController {
    client: reqwest::Client,
    base_url: String,
}

impl HttpController {
    pub fn new(config: &Config) -> RemoteResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut key = reqwest::header::HeaderValue::from_str(&config.api_key)
            .map_err(|e| RemoteError::Decode(format!("invalid API key header: {}", e)))?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        Ok(Self {
            client,
            base_url: join_base(&config.host, &config.api_prefix),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Collection URL of a resource on a site.
    pub fn collection_url(&self, site: &str, route: &ResourceRoute) -> String {
        match route.api {
            ApiVersion::V1 => format!("{}/api/s/{}/rest/{}", self.base_url, site, route.endpoint),
            ApiVersion::V2 => format!("{}/v2/api/site/{}/{}", self.base_url, site, route.endpoint),
        }
    }

    pub fn item_url(&self, site: &str, route: &ResourceRoute, id: &str) -> String {
        format!("{}/{}", self.collection_url(site, route), id)
    }

    pub fn setting_url(&self, site: &str, route: &ResourceRoute, write: bool) -> String {
        let verb = if write { "set" } else { "get" };
        format!(
            "{}/api/s/{}/{}/setting/{}",
            self.base_url, site, verb, route.endpoint
        )
    }

    pub async fn list(&self, ctx: &CallContext, site: &str, route: &ResourceRoute) -> RemoteResult<Value> {
        let url = self.collection_url(site, route);
        let data = self.send(ctx, Method::GET, &url, route.api, None).await?;
        Ok(Value::Array(data))
    }

    pub async fn get(
        &self,
        ctx: &CallContext,
        site: &str,
        route: &ResourceRoute,
        id: &str,
    ) -> RemoteResult<Value> {
        let url = self.item_url(site, route, id);
        let data = self.send(ctx, Method::GET, &url, route.api, None).await?;
        first(data, id)
    }

    pub async fn get_setting(
        &self,
        ctx: &CallContext,
        site: &str,
        route: &ResourceRoute,
    ) -> RemoteResult<Value> {
        let url = self.setting_url(site, route, false);
        let data = self.send(ctx, Method::GET, &url, route.api, None).await?;
        first(data, &route.endpoint)
    }

    pub async fn create(
        &self,
        ctx: &CallContext,
        site: &str,
        route: &ResourceRoute,
        record: ResourceRecord,
    ) -> RemoteResult<Value> {
        let url = self.collection_url(site, route);
        let body = Value::Object(record.0);
        let data = self.send(ctx, Method::POST, &url, route.api, Some(body)).await?;
        first(data, &route.endpoint)
    }

    pub async fn update(
        &self,
        ctx: &CallContext,
        site: &str,
        route: &ResourceRoute,
        record: ResourceRecord,
    ) -> RemoteResult<Value> {
        let url = if route.is_setting {
            self.setting_url(site, route, true)
        } else {
            let id = record
                .id()
                .ok_or_else(|| RemoteError::NotFound("record without _id".to_string()))?;
            self.item_url(site, route, id)
        };
        let body = Value::Object(record.0);
        let data = self.send(ctx, Method::PUT, &url, route.api, Some(body)).await?;
        first(data, &route.endpoint)
    }

    pub async fn delete(
        &self,
        ctx: &CallContext,
        site: &str,
        route: &ResourceRoute,
        id: &str,
    ) -> RemoteResult<()> {
        let url = self.item_url(site, route, id);
        self.send(ctx, Method::DELETE, &url, route.api, None).await?;
        Ok(())
    }

    /// Issue a request, honouring cancellation, and return the data items.
    async fn send(
        &self,
        ctx: &CallContext,
        method: Method,
        url: &str,
        api: ApiVersion,
        body: Option<Value>,
    ) -> RemoteResult<Vec<Value>> {
        log::debug!("{} {}", method, url);
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            decode_response(status, &text, api)
        };

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(RemoteError::Cancelled),
            result = exchange => result,
        }
    }

    /// Closure table covering every exposed resource of the catalog.
    pub fn operation_table(self: Arc<Self>, catalog: &ResourceCatalog) -> OperationTable {
        let mut table = OperationTable::new();
        for resource in catalog.exposed() {
            let route = ResourceRoute::from(resource);
            for category in infer_operations(resource) {
                register(&mut table, &self, &resource.name, &route, category);
            }
        }
        log::debug!("Controller operation table has {} entries", table.len());
        table
    }
}

fn register(
    table: &mut OperationTable,
    controller: &Arc<HttpController>,
    resource: &str,
    route: &ResourceRoute,
    category: Category,
) {
    let this = controller.clone();
    let route = route.clone();
    match category {
        Category::List => {
            table.list(resource, move |ctx, site| {
                let (c, r) = (this.clone(), route.clone());
                async move { c.list(&ctx, &site, &r).await }
            });
        }
        Category::Get if route.is_setting => {
            table.get_setting(resource, move |ctx, site| {
                let (c, r) = (this.clone(), route.clone());
                async move { c.get_setting(&ctx, &site, &r).await }
            });
        }
        Category::Get => {
            table.get(resource, move |ctx, site, id| {
                let (c, r) = (this.clone(), route.clone());
                async move { c.get(&ctx, &site, &r, &id).await }
            });
        }
        Category::Create => {
            table.create::<ResourceRecord, _, _>(resource, move |ctx, site, record| {
                let (c, r) = (this.clone(), route.clone());
                async move { c.create(&ctx, &site, &r, record).await }
            });
        }
        Category::Update => {
            table.update::<ResourceRecord, _, _>(resource, move |ctx, site, record| {
                let (c, r) = (this.clone(), route.clone());
                async move { c.update(&ctx, &site, &r, record).await }
            });
        }
        Category::Delete => {
            table.delete(resource, move |ctx, site, id| {
                let (c, r) = (this.clone(), route.clone());
                async move { c.delete(&ctx, &site, &r, &id).await }
            });
        }
    }
}

fn join_base(host: &str, prefix: &str) -> String {
    let host = host.trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        host.to_string()
    } else {
        format!("{}/{}", host, prefix)
    }
}

fn first(data: Vec<Value>, what: &str) -> RemoteResult<Value> {
    data.into_iter()
        .next()
        .ok_or_else(|| RemoteError::NotFound(what.to_string()))
}

/// Turn a raw response into data items.
///
/// v1 bodies are wrapped in the `meta`/`data` envelope; v2 bodies are the
/// bare object or array.
fn decode_response(status: StatusCode, text: &str, api: ApiVersion) -> RemoteResult<Vec<Value>> {
    let parsed: Option<Value> = if text.trim().is_empty() {
        None
    } else {
        serde_json::from_str(text).ok()
    };

    if !status.is_success() {
        if let Some(msg) = parsed.as_ref().and_then(error_message) {
            return Err(RemoteError::Api(msg));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(text.to_string()));
        }
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body: text.to_string(),
        });
    }

    let Some(body) = parsed else {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        return Err(RemoteError::Decode(format!("body is not JSON: {}", text)));
    };

    match api {
        ApiVersion::V1 => {
            let envelope: Envelope =
                serde_json::from_value(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
            if envelope.meta.rc != "ok" {
                return Err(RemoteError::Api(
                    envelope.meta.msg.unwrap_or_else(|| envelope.meta.rc.clone()),
                ));
            }
            Ok(envelope.data)
        }
        ApiVersion::V2 => match body {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        },
    }
}

/// Error text from either envelope style.
fn error_message(body: &Value) -> Option<String> {
    body.pointer("/meta/msg")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
