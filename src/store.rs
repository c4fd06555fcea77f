//! File-backed request store.
//!
//! The whole collection lives in memory behind one `tokio::sync::RwLock`
//! and is rewritten to disk after every mutation. Reads take the shared
//! lock. Mutations take the exclusive lock for their whole duration,
//! including the flush, so a reader never sees a state that is not also
//! on disk.
//!
//! # Mutation protocol
//!
//! ```text
//! write lock ─▶ clone map ─▶ plugin hook ─▶ encode ─▶ tmp+sync ─▶ rename ─▶ swap map
//!                                 │            │          │          │
//!                                 └────────────┴──────────┴──────────┴─▶ error: nothing changes
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use apiary_core::{
    build_listing, EntryData, Kind, Listing, PluginRegistry, Request, RequestData, RequestId,
    RequestMap, Response, StoreError, StoreResult, VersionedCodec,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A registered kind as shown in kind pickers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindInfo {
    pub kind: Kind,
    pub label: String,
}

pub struct RequestStore {
    path: PathBuf,
    registry: Arc<PluginRegistry>,
    codec: VersionedCodec,
    requests: RwLock<RequestMap>,
}

impl RequestStore {
    /// Load the document at `path`.
    ///
    /// A missing file opens an empty store; the file is created by the first
    /// mutation. Any decode failure aborts, the store never runs against a
    /// document it cannot fully interpret.
    pub async fn open(
        path: impl Into<PathBuf>,
        registry: Arc<PluginRegistry>,
    ) -> StoreResult<Self> {
        let path = path.into();
        let codec = VersionedCodec::new(registry.clone());

        let requests = match tokio::fs::read(&path).await {
            Ok(bytes) => codec.decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no document yet, starting empty");
                RequestMap::new()
            }
            Err(e) => return Err(StoreError::io("read", &path, e)),
        };

        tracing::info!(
            path = %path.display(),
            requests = requests.len(),
            "opened request store"
        );

        Ok(Self {
            path,
            registry,
            codec,
            requests: RwLock::new(requests),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════

    /// All requests ordered by path then id, or exactly the requests named
    /// by `ids` in the given order.
    ///
    /// A single unknown id fails the whole call.
    pub async fn list(&self, ids: Option<&[RequestId]>) -> StoreResult<Vec<Request>> {
        let requests = self.requests.read().await;
        match ids {
            Some(ids) => ids
                .iter()
                .map(|id| {
                    requests
                        .get(id)
                        .cloned()
                        .ok_or_else(|| StoreError::NotFound(id.clone()))
                })
                .collect(),
            None => {
                let mut all: Vec<Request> = requests.values().cloned().collect();
                all.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.id.cmp(&b.id)));
                Ok(all)
            }
        }
    }

    pub async fn get(&self, id: &RequestId) -> StoreResult<Request> {
        self.requests
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }

    /// Directory tree and previews of every request.
    pub async fn tree(&self) -> Listing {
        build_listing(&*self.requests.read().await)
    }

    pub fn kinds(&self) -> Vec<KindInfo> {
        self.registry
            .plugins()
            .map(|p| KindInfo {
                kind: p.kind(),
                label: p.label().to_string(),
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════

    /// Store `data` under a fresh id at `path`.
    pub async fn create(
        &self,
        path: impl Into<String>,
        data: RequestData,
    ) -> StoreResult<RequestId> {
        let path = path.into();
        let kind = data.kind();
        let id = self
            .mutate("create", |requests| {
                let plugin = self.registry.lookup(&kind)?;
                let id = fresh_id(requests);
                plugin.on_create(requests, id.clone(), path, data)?;
                Ok(id)
            })
            .await?;
        tracing::debug!(%id, %kind, "created request");
        Ok(id)
    }

    /// Store the default payload of `kind` under a fresh id.
    pub async fn create_empty(
        &self,
        path: impl Into<String>,
        kind: &Kind,
    ) -> StoreResult<RequestId> {
        let data = self.registry.lookup(kind)?.empty_request();
        self.create(path, data).await
    }

    /// Replace the payload of `id`. The kind of a request never changes.
    pub async fn update(&self, id: &RequestId, data: RequestData) -> StoreResult<()> {
        self.mutate("update", |requests| {
            let current = requests
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?
                .kind();
            let plugin = self.registry.lookup(&data.kind())?;
            if current != data.kind() {
                return Err(StoreError::KindMismatch {
                    id: id.clone(),
                    expected: current,
                    actual: data.kind(),
                });
            }
            plugin.on_update(requests, id, data)
        })
        .await?;
        tracing::debug!(%id, "updated request");
        Ok(())
    }

    pub async fn rename(&self, id: &RequestId, path: impl Into<String>) -> StoreResult<()> {
        let path = path.into();
        self.mutate("rename", |requests| {
            let request = requests
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            request.path = path;
            Ok(())
        })
        .await?;
        tracing::debug!(%id, "renamed request");
        Ok(())
    }

    /// Remove `id` and its history. Returns whether anything was removed;
    /// deleting an absent id does not touch the file.
    pub async fn delete(&self, id: &RequestId) -> StoreResult<bool> {
        let mut guard = self.requests.write().await;
        if !guard.contains_key(id) {
            tracing::debug!(%id, "delete of absent request ignored");
            return Ok(false);
        }

        let mut working = guard.clone();
        working.remove(id);
        self.flush(&working).await?;
        *guard = working;

        tracing::debug!(%id, "deleted request");
        Ok(true)
    }

    /// Copy the payload of `id`, without history, to a fresh id at
    /// `"<path> (n)"` with the smallest unused `n`.
    pub async fn duplicate(&self, id: &RequestId) -> StoreResult<RequestId> {
        let copy = self
            .mutate("duplicate", |requests| {
                let source = requests
                    .get(id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                let plugin = self.registry.lookup(&source.kind())?;
                let path = duplicate_path(requests, &source.path);
                let data = source.data.clone();
                let copy = fresh_id(requests);
                plugin.on_create(requests, copy.clone(), path, data)?;
                Ok(copy)
            })
            .await?;
        tracing::debug!(%id, %copy, "duplicated request");
        Ok(copy)
    }

    /// Append `response` to the history of `id` through its kind's record
    /// hook.
    pub async fn create_response(&self, id: &RequestId, response: Response) -> StoreResult<()> {
        self.mutate("record response", |requests| {
            let kind = requests
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?
                .kind();
            self.registry
                .lookup(&kind)?
                .on_record_response(requests, id, response)
        })
        .await?;
        tracing::debug!(%id, "recorded response");
        Ok(())
    }

    /// Flush the current state one last time.
    pub async fn close(self) -> StoreResult<()> {
        let requests = self.requests.into_inner();
        // A store that was never written and holds nothing leaves no file.
        if requests.is_empty() && tokio::fs::metadata(&self.path).await.is_err() {
            return Ok(());
        }
        let bytes = self.codec.encode(&requests)?;
        write_atomic(&self.path, &bytes).await?;
        tracing::debug!(path = %self.path.display(), "closed request store");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════════════

    /// Run `operation` on a copy of the collection, persist the copy, and
    /// only then make it current. Any error leaves both memory and disk as
    /// they were.
    async fn mutate<T, F>(&self, action: &'static str, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut RequestMap) -> StoreResult<T>,
    {
        let mut guard = self.requests.write().await;
        let mut working = guard.clone();
        let result = operation(&mut working).inspect_err(|e| {
            tracing::debug!(action, error = %e, "mutation rejected");
        })?;
        self.flush(&working).await?;
        *guard = working;
        Ok(result)
    }

    async fn flush(&self, requests: &RequestMap) -> StoreResult<()> {
        let bytes = self.codec.encode(requests)?;
        write_atomic(&self.path, &bytes).await?;
        tracing::trace!(
            path = %self.path.display(),
            bytes = bytes.len(),
            "flushed document"
        );
        Ok(())
    }
}

/// Replace `path` with `bytes` via a sibling temp file and a rename, so the
/// document on disk is always either the old or the new version.
/// The temp file is synced to disk before it is renamed over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io("create directory", parent, e))?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    if let Err(e) = write_synced(&temp_path, bytes).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StoreError::io("write", &temp_path, e));
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StoreError::io("replace", path, e));
    }
    Ok(())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn fresh_id(requests: &RequestMap) -> RequestId {
    loop {
        let id = RequestId::generate();
        if !requests.contains_key(&id) {
            return id;
        }
    }
}

fn duplicate_path(requests: &RequestMap, path: &str) -> String {
    (1..)
        .map(|n| format!("{} ({})", path, n))
        .find(|candidate| !requests.values().any(|r| &r.path == candidate))
        .unwrap_or_else(|| path.to_string())
}
