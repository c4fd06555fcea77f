//! Built-in executor for the `http` kind.
//!
//! Non-2xx statuses are successful executions: the status, body, and headers
//! are returned as the response payload. Only transport failures (DNS,
//! connect, timeout, invalid method or header) are errors.

use std::sync::Arc;

use anyhow::Result;
use apiary_core::models::{HttpRequest, HttpResponse, KV};
use apiary_core::{
    EntryData, Executor, Kind, PluginRegistry, RequestData, ResponseData, StandardPlugin,
};
use async_trait::async_trait;
use reqwest::Method;

use crate::config::HttpConfig;

#[derive(Debug, thiserror::Error)]
pub enum HttpExecutorError {
    #[error("http executor cannot run a {0} payload")]
    UnexpectedPayload(Kind),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("{method} {url} failed")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpExecutorError> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| HttpExecutorError::InvalidMethod(request.method.clone()))?;
        let transport = |source| HttpExecutorError::Transport {
            method: method.to_string(),
            url: request.url.clone(),
            source,
        };

        let mut builder = self.client.request(method.clone(), &request.url);
        for header in &request.headers {
            builder = builder.header(&header.key, &header.value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(transport)?;
        let code = response.status().as_u16();

        let mut headers: Vec<KV> = Vec::new();
        for (name, value) in response.headers() {
            if headers.iter().any(|h| h.key == name.as_str()) {
                continue;
            }
            if let Ok(v) = value.to_str() {
                headers.push(KV::new(name.as_str(), v));
            }
        }
        headers.sort_by(|a, b| a.key.cmp(&b.key));

        let body = response.text().await.map_err(transport)?;
        Ok(HttpResponse {
            code,
            body,
            headers,
        })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn perform(&self, request: &RequestData) -> Result<ResponseData> {
        let RequestData::Http(http) = request else {
            return Err(HttpExecutorError::UnexpectedPayload(request.kind()).into());
        };
        tracing::debug!(method = %http.method, url = %http.url, "sending http request");
        let response = self.send(http).await?;
        tracing::debug!(code = response.code, url = %http.url, "http response received");
        Ok(ResponseData::Http(response))
    }
}

/// Every built-in kind, with the HTTP executor attached to `http`.
pub fn registry_from_config(config: &HttpConfig) -> Result<PluginRegistry> {
    let mut registry = PluginRegistry::with_builtins();
    let executor = Arc::new(HttpExecutor::new(config)?);
    registry.register(Box::new(StandardPlugin::http().with_executor(executor)));
    Ok(registry)
}
