//! CLI command implementations.
//!
//! Each `run_*` function opens the store named by the config, performs one
//! operation, and prints its result as pretty JSON on stdout.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use apiary_core::models::KV;
use apiary_core::{Kind, Request, RequestData, RequestId, Response};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::executor_http::registry_from_config;
use crate::orchestrator::{Endpoint, Orchestrator};
use crate::store::RequestStore;

/// A request as printed by the CLI: the payload plus its kind.
#[derive(Debug, Serialize)]
pub struct RequestView<'a> {
    pub id: &'a RequestId,
    pub kind: Kind,
    pub path: &'a str,
    pub data: &'a RequestData,
    pub responses: &'a [Response],
}

impl<'a> From<&'a Request> for RequestView<'a> {
    fn from(request: &'a Request) -> Self {
        Self {
            id: &request.id,
            kind: request.kind(),
            path: &request.path,
            data: &request.data,
            responses: &request.responses,
        }
    }
}

/// Open the configured store with every built-in kind registered.
pub async fn open(config: &Config) -> Result<Orchestrator> {
    let registry = registry_from_config(&config.http)?;
    let store = RequestStore::open(&config.store.path, Arc::new(registry))
        .await
        .with_context(|| format!("Failed to open store: {}", config.store.path.display()))?;
    Ok(Orchestrator::new(Arc::new(store)))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_json(data: &str) -> Result<Value> {
    serde_json::from_str(data).with_context(|| "Failed to parse --data as JSON")
}

/// Parse a `key=value` argument.
pub fn parse_pair(raw: &str) -> Result<KV> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok(KV::new(key.trim(), value)),
        _ => bail!("expected key=value, got '{}'", raw),
    }
}

fn parse_pairs(raw: &[String]) -> Result<Vec<KV>> {
    raw.iter().map(|r| parse_pair(r)).collect()
}

/// Build an [`Endpoint`] from `call` arguments.
pub fn endpoint_from_args(
    method: &str,
    path: &str,
    body: Option<String>,
    headers: &[String],
    query: &[String],
    params: &[String],
) -> Result<Endpoint> {
    Ok(Endpoint {
        method: method.to_string(),
        path: path.to_string(),
        path_params: parse_pairs(params)?,
        query: parse_pairs(query)?,
        body: body.unwrap_or_default(),
        headers: parse_pairs(headers)?,
    })
}

pub async fn run_kinds(config: &Config) -> Result<()> {
    let app = open(config).await?;
    print_json(&app.store().kinds())
}

pub async fn run_list(config: &Config, tree: bool, ids: Vec<String>) -> Result<()> {
    let app = open(config).await?;
    if tree {
        return print_json(&app.store().tree().await);
    }

    let ids: Vec<RequestId> = ids.into_iter().map(RequestId::from).collect();
    let filter = if ids.is_empty() { None } else { Some(ids.as_slice()) };
    let requests = app.store().list(filter).await?;
    let views: Vec<RequestView> = requests.iter().map(RequestView::from).collect();
    print_json(&views)
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let app = open(config).await?;
    let request = app.store().get(&RequestId::from(id)).await?;
    print_json(&RequestView::from(&request))
}

pub async fn run_create(config: &Config, path: &str, kind: &str, data: Option<&str>) -> Result<()> {
    let app = open(config).await?;
    let kind = Kind::new(kind);
    let id = match data {
        None => app.store().create_empty(path, &kind).await?,
        Some(raw) => {
            let data = RequestData::from_json(&kind, parse_json(raw)?)?;
            app.store().create(path, data).await?
        }
    };
    print_json(&json!({ "id": id }))
}

/// Replace the payload of `id`. The JSON is read as the request's current
/// kind.
pub async fn run_update(config: &Config, id: &str, data: &str) -> Result<()> {
    let app = open(config).await?;
    let id = RequestId::from(id);
    let kind = app.store().get(&id).await?.kind();
    let data = RequestData::from_json(&kind, parse_json(data)?)?;
    app.store().update(&id, data).await?;
    print_json(&json!({ "id": id }))
}

pub async fn run_rename(config: &Config, id: &str, path: &str) -> Result<()> {
    let app = open(config).await?;
    let id = RequestId::from(id);
    app.store().rename(&id, path).await?;
    print_json(&json!({ "id": id, "path": path }))
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let app = open(config).await?;
    let id = RequestId::from(id);
    let deleted = app.store().delete(&id).await?;
    print_json(&json!({ "id": id, "deleted": deleted }))
}

pub async fn run_duplicate(config: &Config, id: &str) -> Result<()> {
    let app = open(config).await?;
    let copy = app.store().duplicate(&RequestId::from(id)).await?;
    print_json(&json!({ "id": copy }))
}

pub async fn run_perform(config: &Config, id: &str) -> Result<()> {
    let app = open(config).await?;
    let performed = app.perform(&RequestId::from(id)).await?;
    print_json(&json!({
        "id": performed.request.id,
        "kind": performed.request.kind(),
        "sent_at": performed.sent_at,
        "received_at": performed.received_at,
        "response": performed.response,
    }))
}

pub async fn run_query(config: &Config, source_id: &str, query: &str) -> Result<()> {
    let app = open(config).await?;
    let explored = app.query_source(&RequestId::from(source_id), query).await?;
    print_json(&explored)
}

pub async fn run_call(config: &Config, source_id: &str, endpoint: Endpoint) -> Result<()> {
    let app = open(config).await?;
    let explored = app
        .call_endpoint(&RequestId::from(source_id), endpoint)
        .await?;
    print_json(&explored)
}

pub async fn run_endpoints(config: &Config, source_id: &str) -> Result<()> {
    let app = open(config).await?;
    let endpoints = app.endpoints(&RequestId::from(source_id)).await?;
    print_json(&endpoints)
}

/// Print the example call for one described endpoint and the HTTP request
/// it turns into. Nothing is sent.
pub async fn run_example(
    config: &Config,
    source_id: &str,
    method: &str,
    path: &str,
) -> Result<()> {
    let app = open(config).await?;
    let source_id = RequestId::from(source_id);
    let endpoint = app.example_endpoint(&source_id, method, path).await?;
    let request = app.source_request(&source_id, endpoint.clone()).await?;
    print_json(&json!({ "endpoint": endpoint, "request": request }))
}
