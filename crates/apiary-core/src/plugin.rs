//! Per-kind plugins and the registry that maps kinds to them.
//!
//! A [`Plugin`] bundles everything the store needs to know about one
//! request family: a default payload, an optional [`Executor`], and the
//! persistence hooks invoked by create, update, and response recording.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             PluginRegistry               │
//! │  ┌────────┐ ┌────────┐ ┌──────────────┐ │
//! │  │ http   │ │ sql    │ │ md, sources, │ │
//! │  │+ exec  │ │ ± exec │ │ no history   │ │
//! │  └────────┘ └────────┘ └──────────────┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!   RequestStore hooks · Orchestrator::perform
//! ```
//!
//! # Usage
//!
//! ```rust
//! use apiary_core::plugin::{PluginRegistry, StandardPlugin};
//! use apiary_core::Kind;
//!
//! let mut registry = PluginRegistry::with_builtins();
//! registry.register(Box::new(StandardPlugin::md().without_history()));
//! assert!(registry.contains(&Kind::HTTP));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    EntryData, GrpcRequest, HttpRequest, HttpSourceRequest, JqRequest, Kind, MdRequest,
    RedisRequest, Request, RequestData, RequestId, RequestMap, Response, ResponseData,
    SqlRequest, SqlSourceRequest,
};

// ═══════════════════════════════════════════════════════════════════════
// Executor Trait
// ═══════════════════════════════════════════════════════════════════════

/// The side-effecting capability of a kind: send the HTTP call, run the
/// query, render the document.
///
/// Implementations must not touch the store and must be safe to call
/// concurrently. Dropping the returned future cancels the call; nothing is
/// recorded for a cancelled call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use apiary_core::models::{HttpResponse, RequestData, ResponseData};
/// use apiary_core::plugin::Executor;
///
/// struct AlwaysOk;
///
/// #[async_trait]
/// impl Executor for AlwaysOk {
///     async fn perform(&self, _request: &RequestData) -> anyhow::Result<ResponseData> {
///         Ok(ResponseData::Http(HttpResponse {
///             code: 200,
///             body: "ok".to_string(),
///             headers: vec![],
///         }))
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute `request` and return its result payload.
    ///
    /// Protocol-level failures that still produce a result (an HTTP 500)
    /// are successes. Transport failures are errors and are never recorded.
    async fn perform(&self, request: &RequestData) -> anyhow::Result<ResponseData>;
}

// ═══════════════════════════════════════════════════════════════════════
// Plugin Trait
// ═══════════════════════════════════════════════════════════════════════

/// Descriptor of one request family.
///
/// The hooks run inside the store's exclusive section against the working
/// copy of the collection; an error from a hook aborts the mutation before
/// anything is flushed. The store has already checked that `id` exists for
/// update and response recording.
pub trait Plugin: Send + Sync {
    /// The kind this plugin handles.
    fn kind(&self) -> Kind;

    /// Display name for kind pickers (e.g. `"HTTP"`).
    fn label(&self) -> &str;

    /// A ready-to-edit default payload. Must report [`Plugin::kind`].
    fn empty_request(&self) -> RequestData;

    /// The execution capability, if this kind can be performed.
    fn executor(&self) -> Option<&dyn Executor> {
        None
    }

    /// Insert the initial record for a freshly minted id.
    fn on_create(
        &self,
        requests: &mut RequestMap,
        id: RequestId,
        path: String,
        data: RequestData,
    ) -> StoreResult<()> {
        requests.insert(
            id.clone(),
            Request {
                id,
                path,
                data,
                responses: Vec::new(),
            },
        );
        Ok(())
    }

    /// Replace the payload in place.
    fn on_update(
        &self,
        requests: &mut RequestMap,
        id: &RequestId,
        data: RequestData,
    ) -> StoreResult<()> {
        let request = requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        request.data = data;
        Ok(())
    }

    /// Add a response to the request's history.
    fn on_record_response(
        &self,
        requests: &mut RequestMap,
        id: &RequestId,
        response: Response,
    ) -> StoreResult<()> {
        record_response(requests, id, response)
    }
}

/// Insert `response` into the history of `id`, keeping it sorted by
/// `sent_at`.
///
/// Rejects responses received before they were sent, responses of another
/// kind, and a second response with an already recorded `sent_at`.
pub fn record_response(
    requests: &mut RequestMap,
    id: &RequestId,
    response: Response,
) -> StoreResult<()> {
    let request = requests
        .get_mut(id)
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;

    if response.sent_at > response.received_at {
        return Err(StoreError::InvalidResponse {
            id: id.clone(),
            reason: format!(
                "received_at {} precedes sent_at {}",
                response.received_at, response.sent_at
            ),
        });
    }

    let actual = response.response.kind();
    if actual != request.kind() {
        return Err(StoreError::KindMismatch {
            id: id.clone(),
            expected: request.kind(),
            actual,
        });
    }

    match request
        .responses
        .binary_search_by(|r| r.sent_at.cmp(&response.sent_at))
    {
        Ok(_) => Err(StoreError::InvalidResponse {
            id: id.clone(),
            reason: format!("a response sent at {} is already recorded", response.sent_at),
        }),
        Err(pos) => {
            request.responses.insert(pos, response);
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// StandardPlugin
// ═══════════════════════════════════════════════════════════════════════

/// The plugin used for every built-in kind: default hooks, an optional
/// executor, and an optional history switch.
pub struct StandardPlugin {
    kind: Kind,
    label: String,
    empty: RequestData,
    executor: Option<Arc<dyn Executor>>,
    history: bool,
}

impl StandardPlugin {
    /// A history-keeping plugin for the kind of `empty`, with no executor.
    pub fn new(label: impl Into<String>, empty: RequestData) -> Self {
        Self {
            kind: empty.kind(),
            label: label.into(),
            empty,
            executor: None,
            history: true,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Make response recording a no-op for this kind.
    pub fn without_history(mut self) -> Self {
        self.history = false;
        self
    }

    pub fn keeps_history(&self) -> bool {
        self.history
    }

    pub fn http() -> Self {
        Self::new("HTTP", RequestData::Http(HttpRequest::default()))
    }

    pub fn sql() -> Self {
        Self::new("SQL", RequestData::Sql(SqlRequest::default()))
    }

    pub fn grpc() -> Self {
        Self::new("GRPC", RequestData::Grpc(GrpcRequest::default()))
    }

    pub fn jq() -> Self {
        Self::new("JQ", RequestData::Jq(JqRequest::default()))
    }

    pub fn redis() -> Self {
        Self::new("REDIS", RequestData::Redis(RedisRequest::default()))
    }

    /// Rendered documents are not kept as history.
    pub fn md() -> Self {
        Self::new("MD", RequestData::Md(MdRequest::default())).without_history()
    }

    pub fn sql_source() -> Self {
        Self::new(
            "SQLSource",
            RequestData::SqlSource(SqlSourceRequest::default()),
        )
        .without_history()
    }

    pub fn http_source() -> Self {
        Self::new(
            "HTTPSource",
            RequestData::HttpSource(HttpSourceRequest::default()),
        )
        .without_history()
    }
}

impl Plugin for StandardPlugin {
    fn kind(&self) -> Kind {
        self.kind.clone()
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn empty_request(&self) -> RequestData {
        self.empty.clone()
    }

    fn executor(&self) -> Option<&dyn Executor> {
        self.executor.as_deref()
    }

    fn on_record_response(
        &self,
        requests: &mut RequestMap,
        id: &RequestId,
        response: Response,
    ) -> StoreResult<()> {
        if !self.history {
            tracing::debug!(%id, kind = %self.kind, "kind keeps no history, response dropped");
            return Ok(());
        }
        record_response(requests, id, response)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Mapping from kind to its plugin. Built once at startup, then shared
/// read-only (typically behind an `Arc`).
pub struct PluginRegistry {
    plugins: BTreeMap<Kind, Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Create a registry with every built-in kind and no executors.
    ///
    /// Executors are attached by re-registering a kind, e.g.
    /// `StandardPlugin::http().with_executor(..)`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(StandardPlugin::http()));
        registry.register(Box::new(StandardPlugin::sql()));
        registry.register(Box::new(StandardPlugin::grpc()));
        registry.register(Box::new(StandardPlugin::jq()));
        registry.register(Box::new(StandardPlugin::redis()));
        registry.register(Box::new(StandardPlugin::md()));
        registry.register(Box::new(StandardPlugin::sql_source()));
        registry.register(Box::new(StandardPlugin::http_source()));
        registry
    }

    /// Register a plugin, replacing and returning any previous plugin of
    /// the same kind.
    ///
    /// The plugin's default payload must be of the plugin's own kind.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Option<Box<dyn Plugin>> {
        let kind = plugin.kind();
        debug_assert_eq!(
            plugin.empty_request().kind(),
            kind,
            "plugin {} defaults to a payload of another kind",
            kind
        );
        self.plugins.insert(kind, plugin)
    }

    /// Find the plugin for `kind`.
    pub fn lookup(&self, kind: &Kind) -> StoreResult<&dyn Plugin> {
        self.plugins
            .get(kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| StoreError::UnknownKind(kind.clone()))
    }

    pub fn contains(&self, kind: &Kind) -> bool {
        self.plugins.contains_key(kind)
    }

    /// All plugins, ordered by kind.
    pub fn plugins(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.values().map(|p| p.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
