//! Execution of stored requests.
//!
//! Two entry points share the same executors but differ in what they leave
//! behind:
//!
//! | Entry point | Executes | Records a response |
//! |-------------|----------|--------------------|
//! | [`Orchestrator::perform`] | the stored payload | yes |
//! | [`Orchestrator::query_source`] | SQL against a source | no |
//! | [`Orchestrator::call_endpoint`] | HTTP against a source | no |
//!
//! Executors run outside the store lock. Only the final
//! [`RequestStore::create_response`] takes it.
//!
//! An `http-source` also carries an API description. [`Orchestrator::endpoints`]
//! lists its operations and [`Orchestrator::example_endpoint`] fills one in
//! with example values, ready for [`Orchestrator::call_endpoint`].

use std::sync::Arc;
use std::time::Instant;

use apiary_core::models::{
    AuthConfig, AuthType, HttpRequest, HttpSourceRequest, SpecSource, SqlRequest, KV,
};
use apiary_core::openapi::{self, EndpointInfo, SpecError};
use apiary_core::{
    EntryData, Kind, PluginRegistry, Request, RequestData, RequestId, Response, ResponseData,
    StoreError, StoreResult,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::RequestStore;

/// Result of a history-bearing execution.
#[derive(Debug, Clone, Serialize)]
pub struct Performed {
    /// The request as it was when execution started.
    pub request: Request,
    pub response: ResponseData,
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Result of an exploratory execution. Nothing is stored.
#[derive(Debug, Clone, Serialize)]
pub struct Explored {
    pub response: ResponseData,
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// An ad-hoc call against an HTTP source.
///
/// `path` is appended to the source's server URL after every `{key}` in it
/// is replaced by the matching `path_params` value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    pub path_params: Vec<KV>,
    pub query: Vec<KV>,
    pub body: String,
    pub headers: Vec<KV>,
}

impl Endpoint {
    /// A call to `info` with an example value for every path, query, and
    /// header parameter, and an example body with its `Content-Type`.
    pub fn example(info: &EndpointInfo) -> Self {
        let mut endpoint = Endpoint {
            method: info.method.clone(),
            path: info.path.clone(),
            ..Default::default()
        };
        for param in &info.parameters {
            match param.location.as_str() {
                "path" => endpoint
                    .path_params
                    .push(KV::new(&param.name, openapi::path_example(param))),
                "query" => endpoint
                    .query
                    .push(KV::new(&param.name, openapi::parameter_example(param))),
                "header" => endpoint
                    .headers
                    .push(KV::new(&param.name, openapi::parameter_example(param))),
                _ => {}
            }
        }
        if let Some((media_type, body)) = info.request_body.as_ref().and_then(openapi::body_example)
        {
            endpoint.headers.push(KV::new("Content-Type", media_type));
            endpoint.body = body;
        }
        endpoint
    }
}

pub struct Orchestrator {
    store: Arc<RequestStore>,
    registry: Arc<PluginRegistry>,
}

impl Orchestrator {
    pub fn new(store: Arc<RequestStore>) -> Self {
        let registry = store.registry().clone();
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    /// Execute the stored payload of `id` and append the result to its
    /// history.
    ///
    /// Executor failures are returned as [`StoreError::Perform`] and leave
    /// no trace in the store.
    pub async fn perform(&self, id: &RequestId) -> StoreResult<Performed> {
        let request = self.store.get(id).await?;
        let (response, sent_at, received_at) = self.execute(id, &request.data).await?;

        self.store
            .create_response(
                id,
                Response {
                    sent_at,
                    received_at,
                    response: response.clone(),
                },
            )
            .await?;

        Ok(Performed {
            request,
            response,
            sent_at,
            received_at,
        })
    }

    /// Run `query` with the connection parameters of the `sql-source`
    /// request `source_id`, through the `sql` executor.
    pub async fn query_source(&self, source_id: &RequestId, query: &str) -> StoreResult<Explored> {
        let source = self.store.get(source_id).await?;
        let RequestData::SqlSource(params) = &source.data else {
            return Err(StoreError::KindMismatch {
                id: source_id.clone(),
                expected: Kind::SQL_SOURCE,
                actual: source.kind(),
            });
        };

        let data = RequestData::Sql(SqlRequest {
            dsn: params.dsn.clone(),
            database: params.database,
            query: query.to_string(),
        });
        self.explore(source_id, data).await
    }

    /// Call `endpoint` on the server of the `http-source` request
    /// `source_id`, through the `http` executor, with the source's auth.
    pub async fn call_endpoint(
        &self,
        source_id: &RequestId,
        endpoint: Endpoint,
    ) -> StoreResult<Explored> {
        let request = self.source_request(source_id, endpoint).await?;
        self.explore(source_id, RequestData::Http(request)).await
    }

    /// The HTTP request [`Orchestrator::call_endpoint`] would send.
    pub async fn source_request(
        &self,
        source_id: &RequestId,
        endpoint: Endpoint,
    ) -> StoreResult<HttpRequest> {
        let source = self.http_source(source_id).await?;
        endpoint_request(&source.server_url, &source.auth, endpoint)
    }

    /// The operations described by the API document of the `http-source`
    /// request `source_id`.
    ///
    /// A `file` source holds the document itself in `specData`. A `url`
    /// source is fetched through the `http` executor and must answer 200.
    pub async fn endpoints(&self, source_id: &RequestId) -> StoreResult<Vec<EndpointInfo>> {
        let source = self.http_source(source_id).await?;
        let text = self.fetch_spec(source_id, &source).await?;
        openapi::parse_spec(&text).map_err(|source| StoreError::Spec {
            id: source_id.clone(),
            source,
        })
    }

    /// The described `method` `path` operation of `source_id`, filled in
    /// with example values.
    pub async fn example_endpoint(
        &self,
        source_id: &RequestId,
        method: &str,
        path: &str,
    ) -> StoreResult<Endpoint> {
        self.endpoints(source_id)
            .await?
            .iter()
            .find(|e| e.method.eq_ignore_ascii_case(method) && e.path == path)
            .map(Endpoint::example)
            .ok_or_else(|| StoreError::UnknownEndpoint {
                id: source_id.clone(),
                method: method.to_uppercase(),
                path: path.to_string(),
            })
    }

    async fn http_source(&self, source_id: &RequestId) -> StoreResult<HttpSourceRequest> {
        let source = self.store.get(source_id).await?;
        match source.data {
            RequestData::HttpSource(params) => Ok(params),
            other => Err(StoreError::KindMismatch {
                id: source_id.clone(),
                expected: Kind::HTTP_SOURCE,
                actual: other.kind(),
            }),
        }
    }

    async fn fetch_spec(
        &self,
        source_id: &RequestId,
        source: &HttpSourceRequest,
    ) -> StoreResult<String> {
        if source.spec_source == SpecSource::File {
            return Ok(source.spec_data.clone());
        }

        let request = RequestData::Http(HttpRequest {
            url: source.spec_data.clone(),
            ..Default::default()
        });
        let (response, _, _) = self.execute(source_id, &request).await?;
        match response {
            ResponseData::Http(r) if r.code == 200 => Ok(r.body),
            ResponseData::Http(r) => Err(StoreError::Spec {
                id: source_id.clone(),
                source: SpecError::Fetch(r.code),
            }),
            other => Err(StoreError::KindMismatch {
                id: source_id.clone(),
                expected: Kind::HTTP,
                actual: other.kind(),
            }),
        }
    }

    async fn explore(&self, origin: &RequestId, data: RequestData) -> StoreResult<Explored> {
        let (response, sent_at, received_at) = self.execute(origin, &data).await?;
        Ok(Explored {
            response,
            sent_at,
            received_at,
        })
    }

    /// Timestamp and run `data` through the executor of its kind.
    async fn execute(
        &self,
        id: &RequestId,
        data: &RequestData,
    ) -> StoreResult<(ResponseData, DateTime<Utc>, DateTime<Utc>)> {
        let kind = data.kind();
        let executor = self
            .registry
            .lookup(&kind)?
            .executor()
            .ok_or_else(|| StoreError::NotExecutable {
                id: id.clone(),
                kind: kind.clone(),
            })?;

        tracing::debug!(%id, %kind, "executing");
        let started = Instant::now();
        let sent_at = Utc::now();
        let result = executor.perform(data).await;
        let received_at = Utc::now().max(sent_at);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) if response.kind() == kind => {
                tracing::info!(%id, %kind, elapsed_ms, "executed");
                Ok((response, sent_at, received_at))
            }
            Ok(response) => Err(StoreError::KindMismatch {
                id: id.clone(),
                expected: kind,
                actual: response.kind(),
            }),
            Err(source) => {
                tracing::warn!(%id, %kind, elapsed_ms, error = %source, "execution failed");
                Err(StoreError::Perform {
                    id: id.clone(),
                    kind,
                    source,
                })
            }
        }
    }
}

/// Build the HTTP request for `endpoint`: auth headers of the source first,
/// then the caller's headers. Query pairs are form-encoded onto the URL.
pub fn endpoint_request(
    server_url: &str,
    auth: &AuthConfig,
    endpoint: Endpoint,
) -> StoreResult<HttpRequest> {
    let mut headers = auth_headers(auth);
    headers.extend(endpoint.headers);

    let method = if endpoint.method.is_empty() {
        "GET".to_string()
    } else {
        endpoint.method.to_uppercase()
    };

    let path = endpoint
        .path_params
        .iter()
        .fold(endpoint.path, |path, param| {
            path.replace(&format!("{{{}}}", param.key), &param.value)
        });
    let url = with_query(format!("{}{}", server_url, path), &endpoint.query)?;

    Ok(HttpRequest {
        url,
        method,
        body: endpoint.body,
        headers,
    })
}

fn with_query(url: String, query: &[KV]) -> StoreResult<String> {
    if query.is_empty() {
        return Ok(url);
    }
    let mut parsed = reqwest::Url::parse(&url).map_err(|e| StoreError::InvalidUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;
    parsed
        .query_pairs_mut()
        .extend_pairs(query.iter().map(|kv| (kv.key.as_str(), kv.value.as_str())));
    Ok(parsed.into())
}

fn auth_headers(auth: &AuthConfig) -> Vec<KV> {
    match auth.auth_type {
        AuthType::Basic if !auth.username.is_empty() || !auth.password.is_empty() => {
            let credentials = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
            vec![KV::new("Authorization", format!("Basic {}", credentials))]
        }
        AuthType::Bearer => vec![KV::new("Authorization", format!("Bearer {}", auth.token))],
        AuthType::ApiKey if !auth.key_name.is_empty() => {
            vec![KV::new(auth.key_name.clone(), auth.key_value.clone())]
        }
        _ => Vec::new(),
    }
}
