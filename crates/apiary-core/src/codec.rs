//! Versioned JSON codec for the whole request collection.
//!
//! The document never stores a polymorphic payload field. Instead it keeps
//! a flat index of `{id, kind, path}` and one statically typed side-table
//! per kind; decoding joins the index against the table named by each
//! entry's kind.
//!
//! # Layout (version 1)
//!
//! ```text
//! {
//!   "$version": 1,
//!   "app_version": "0.3.0",
//!   "request":  [{"id", "kind", "path"}, ...]          sorted by id
//!   "response": [{"id", "sent_at", "received_at"}, ...] sorted by sent_at
//!   "http":  {id: {"request": {..}, "responses": [{"sent_at", "received_at", "data"}]}}
//!   "sql" | "grpc" | "jq" | "redis" | "md": same shape as "http"
//!   "sql-source" | "http-source": {id: payload}
//! }
//! ```
//!
//! A document without `$version` is version 0 and decodes to an empty
//! collection. Any other version is rejected.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    EntryData, GrpcRequest, GrpcResponse, HttpRequest, HttpResponse, HttpSourceRequest,
    JqRequest, JqResponse, Kind, MdRequest, MdResponse, RedisRequest, RedisResponse, Request,
    RequestData, RequestId, RequestMap, Response, ResponseData, SqlRequest, SqlResponse,
    SqlSourceRequest,
};
use crate::plugin::PluginRegistry;

/// The only version this build reads and writes.
pub const CURRENT_VERSION: i64 = 1;

/// Every top-level key a version 1 document may carry.
const V1_KEYS: [&str; 12] = [
    "$version",
    "app_version",
    "request",
    "response",
    "http",
    "sql",
    "grpc",
    "jq",
    "redis",
    "md",
    "sql-source",
    "http-source",
];

// ═══════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct VersionHeader {
    #[serde(rename = "$version", default)]
    version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    id: RequestId,
    kind: Kind,
    path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TimingEntry {
    id: RequestId,
    sent_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryEntry<T> {
    sent_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
    data: T,
}

#[derive(Debug, Serialize, Deserialize)]
struct SideEntry<Req, Resp> {
    request: Req,
    #[serde(default = "Vec::new")]
    responses: Vec<HistoryEntry<Resp>>,
}

type SideTable<Req, Resp> = BTreeMap<RequestId, SideEntry<Req, Resp>>;

#[derive(Debug, Serialize, Deserialize)]
struct DocumentV1 {
    #[serde(rename = "$version")]
    version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_version: Option<String>,
    #[serde(default)]
    request: Vec<IndexEntry>,
    /// `None` only when decoding a document that omits the timing index.
    #[serde(default)]
    response: Option<Vec<TimingEntry>>,
    #[serde(default)]
    http: SideTable<HttpRequest, HttpResponse>,
    #[serde(default)]
    sql: SideTable<SqlRequest, SqlResponse>,
    #[serde(default)]
    grpc: SideTable<GrpcRequest, GrpcResponse>,
    #[serde(default)]
    jq: SideTable<JqRequest, JqResponse>,
    #[serde(default)]
    redis: SideTable<RedisRequest, RedisResponse>,
    #[serde(default)]
    md: SideTable<MdRequest, MdResponse>,
    #[serde(default, rename = "sql-source")]
    sql_source: BTreeMap<RequestId, SqlSourceRequest>,
    #[serde(default, rename = "http-source")]
    http_source: BTreeMap<RequestId, HttpSourceRequest>,
}

// ═══════════════════════════════════════════════════════════════════════
// Codec
// ═══════════════════════════════════════════════════════════════════════

/// Maps a [`RequestMap`] to and from its on-disk JSON document.
///
/// Decoding validates every kind against the registry; the codec refuses
/// documents it cannot fully interpret rather than dropping parts of them.
#[derive(Clone)]
pub struct VersionedCodec {
    registry: Arc<PluginRegistry>,
    app_version: String,
}

impl VersionedCodec {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the `app_version` stamp written into encoded documents.
    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = app_version.into();
        self
    }

    /// Decode a document into a collection.
    pub fn decode(&self, bytes: &[u8]) -> StoreResult<RequestMap> {
        let value: Value = serde_json::from_slice(bytes)?;
        let header = VersionHeader::deserialize(&value)?;
        match header.version {
            0 => {
                if value.as_object().is_some_and(|o| !o.is_empty()) {
                    tracing::warn!(
                        "document has no $version marker, starting from an empty collection"
                    );
                }
                Ok(RequestMap::new())
            }
            CURRENT_VERSION => {
                check_keys(&value)?;
                self.decode_v1(value)
            }
            other => Err(StoreError::UnsupportedVersion(other)),
        }
    }

    /// Encode a collection as a current-version document.
    ///
    /// Output is deterministic: the index is sorted by id, the timing
    /// index by send time, side-tables by id, and every side-table key is
    /// present even when empty.
    pub fn encode(&self, requests: &RequestMap) -> StoreResult<Vec<u8>> {
        let mut doc = DocumentV1::empty(self.app_version.clone());
        let mut index = Vec::with_capacity(requests.len());
        let mut timings = Vec::new();

        for request in requests.values() {
            index.push(IndexEntry {
                id: request.id.clone(),
                kind: request.kind(),
                path: request.path.clone(),
            });
            timings.extend(request.responses.iter().map(|r| TimingEntry {
                id: request.id.clone(),
                sent_at: r.sent_at,
                received_at: r.received_at,
            }));
            doc.insert(request)?;
        }

        index.sort_by(|a, b| a.id.cmp(&b.id));
        timings.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
        doc.request = index;
        doc.response = Some(timings);

        Ok(serde_json::to_vec_pretty(&doc)?)
    }

    fn decode_v1(&self, value: Value) -> StoreResult<RequestMap> {
        let mut doc: DocumentV1 = serde_json::from_value(value)?;
        let index = std::mem::take(&mut doc.request);
        let mut requests = RequestMap::with_capacity(index.len());

        for entry in index {
            self.registry.lookup(&entry.kind)?;
            if requests.contains_key(&entry.id) {
                return Err(StoreError::inconsistent(format!(
                    "request {} is indexed more than once",
                    entry.id
                )));
            }

            let (data, mut responses) = doc.take(&entry)?;
            responses.sort_by_key(|r| r.sent_at);
            check_history(&entry.id, &responses)?;

            requests.insert(
                entry.id.clone(),
                Request {
                    id: entry.id,
                    path: entry.path,
                    data,
                    responses,
                },
            );
        }

        doc.ensure_drained()?;
        if let Some(timings) = doc.response.take() {
            cross_check_timings(&requests, timings)?;
        }

        tracing::debug!(requests = requests.len(), "decoded version 1 document");
        Ok(requests)
    }
}

/// A key outside [`V1_KEYS`] names a side-table this build cannot read.
fn check_keys(value: &Value) -> StoreResult<()> {
    let Some(object) = value.as_object() else {
        return Err(StoreError::inconsistent("document is not a JSON object"));
    };
    match object.keys().find(|k| !V1_KEYS.contains(&k.as_str())) {
        Some(key) => Err(StoreError::inconsistent(format!(
            "unknown top-level key '{}'",
            key
        ))),
        None => Ok(()),
    }
}

fn check_history(id: &RequestId, responses: &[Response]) -> StoreResult<()> {
    for r in responses {
        if r.sent_at > r.received_at {
            return Err(StoreError::inconsistent(format!(
                "response of request {} sent at {} was received before it was sent",
                id, r.sent_at
            )));
        }
    }
    if let Some(pair) = responses.windows(2).find(|w| w[0].sent_at == w[1].sent_at) {
        return Err(StoreError::inconsistent(format!(
            "request {} has two responses sent at {}",
            id, pair[0].sent_at
        )));
    }
    Ok(())
}

/// The timing index must list exactly the responses found in the
/// side-tables.
fn cross_check_timings(requests: &RequestMap, timings: Vec<TimingEntry>) -> StoreResult<()> {
    let mut indexed: HashMap<RequestId, Vec<(DateTime<Utc>, DateTime<Utc>)>> = HashMap::new();
    for t in timings {
        if !requests.contains_key(&t.id) {
            return Err(StoreError::inconsistent(format!(
                "timing index references unknown request {}",
                t.id
            )));
        }
        indexed
            .entry(t.id)
            .or_default()
            .push((t.sent_at, t.received_at));
    }

    for request in requests.values() {
        let mut listed = indexed.remove(&request.id).unwrap_or_default();
        listed.sort();
        let recorded: Vec<_> = request
            .responses
            .iter()
            .map(|r| (r.sent_at, r.received_at))
            .collect();
        if listed != recorded {
            return Err(StoreError::inconsistent(format!(
                "timing index lists {} responses for request {}, side-table holds {}",
                listed.len(),
                request.id,
                recorded.len()
            )));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Side-table plumbing
// ═══════════════════════════════════════════════════════════════════════

impl DocumentV1 {
    fn empty(app_version: String) -> Self {
        Self {
            version: CURRENT_VERSION,
            app_version: Some(app_version),
            request: Vec::new(),
            response: None,
            http: BTreeMap::new(),
            sql: BTreeMap::new(),
            grpc: BTreeMap::new(),
            jq: BTreeMap::new(),
            redis: BTreeMap::new(),
            md: BTreeMap::new(),
            sql_source: BTreeMap::new(),
            http_source: BTreeMap::new(),
        }
    }

    /// Route a request into the side-table of its kind.
    fn insert(&mut self, request: &Request) -> StoreResult<()> {
        let id = request.id.clone();
        match &request.data {
            RequestData::Http(r) => {
                let entry = side_entry(request, r, as_http)?;
                self.http.insert(id, entry);
            }
            RequestData::Sql(r) => {
                let entry = side_entry(request, r, as_sql)?;
                self.sql.insert(id, entry);
            }
            RequestData::Grpc(r) => {
                let entry = side_entry(request, r, as_grpc)?;
                self.grpc.insert(id, entry);
            }
            RequestData::Jq(r) => {
                let entry = side_entry(request, r, as_jq)?;
                self.jq.insert(id, entry);
            }
            RequestData::Redis(r) => {
                let entry = side_entry(request, r, as_redis)?;
                self.redis.insert(id, entry);
            }
            RequestData::Md(r) => {
                let entry = side_entry(request, r, as_md)?;
                self.md.insert(id, entry);
            }
            RequestData::SqlSource(r) => {
                self.sql_source.insert(id, r.clone());
            }
            RequestData::HttpSource(r) => {
                self.http_source.insert(id, r.clone());
            }
        }
        Ok(())
    }

    /// Remove and return the payload and history indexed by `entry`.
    fn take(&mut self, entry: &IndexEntry) -> StoreResult<(RequestData, Vec<Response>)> {
        let id = &entry.id;
        let taken = match entry.kind.as_str() {
            "http" => take_entry(&mut self.http, id, RequestData::Http, ResponseData::Http),
            "sql" => take_entry(&mut self.sql, id, RequestData::Sql, ResponseData::Sql),
            "grpc" => take_entry(&mut self.grpc, id, RequestData::Grpc, ResponseData::Grpc),
            "jq" => take_entry(&mut self.jq, id, RequestData::Jq, ResponseData::Jq),
            "redis" => take_entry(&mut self.redis, id, RequestData::Redis, ResponseData::Redis),
            "md" => take_entry(&mut self.md, id, RequestData::Md, ResponseData::Md),
            "sql-source" => self
                .sql_source
                .remove(id)
                .map(|r| (RequestData::SqlSource(r), Vec::new())),
            "http-source" => self
                .http_source
                .remove(id)
                .map(|r| (RequestData::HttpSource(r), Vec::new())),
            _ => return Err(StoreError::UnknownKind(entry.kind.clone())),
        };
        taken.ok_or_else(|| {
            StoreError::inconsistent(format!(
                "request {} of kind {} has no row in its side-table",
                id, entry.kind
            ))
        })
    }

    /// Fail if any side-table row was not claimed by the index.
    fn ensure_drained(&self) -> StoreResult<()> {
        let stray = self
            .http
            .keys()
            .map(|id| (Kind::HTTP, id))
            .chain(self.sql.keys().map(|id| (Kind::SQL, id)))
            .chain(self.grpc.keys().map(|id| (Kind::GRPC, id)))
            .chain(self.jq.keys().map(|id| (Kind::JQ, id)))
            .chain(self.redis.keys().map(|id| (Kind::REDIS, id)))
            .chain(self.md.keys().map(|id| (Kind::MD, id)))
            .chain(self.sql_source.keys().map(|id| (Kind::SQL_SOURCE, id)))
            .chain(self.http_source.keys().map(|id| (Kind::HTTP_SOURCE, id)))
            .next();

        match stray {
            Some((kind, id)) => Err(StoreError::inconsistent(format!(
                "{} side-table row {} is not reachable from the request index",
                kind, id
            ))),
            None => Ok(()),
        }
    }
}

fn take_entry<Req, Resp>(
    table: &mut SideTable<Req, Resp>,
    id: &RequestId,
    wrap_request: fn(Req) -> RequestData,
    wrap_response: fn(Resp) -> ResponseData,
) -> Option<(RequestData, Vec<Response>)> {
    let entry = table.remove(id)?;
    let responses = entry
        .responses
        .into_iter()
        .map(|h| Response {
            sent_at: h.sent_at,
            received_at: h.received_at,
            response: wrap_response(h.data),
        })
        .collect();
    Some((wrap_request(entry.request), responses))
}

fn side_entry<Req: Clone, Resp: Clone>(
    request: &Request,
    payload: &Req,
    unwrap: fn(&ResponseData) -> Option<&Resp>,
) -> StoreResult<SideEntry<Req, Resp>> {
    let mut responses = request
        .responses
        .iter()
        .map(|r| {
            unwrap(&r.response)
                .map(|data| HistoryEntry {
                    sent_at: r.sent_at,
                    received_at: r.received_at,
                    data: data.clone(),
                })
                .ok_or_else(|| StoreError::KindMismatch {
                    id: request.id.clone(),
                    expected: request.kind(),
                    actual: r.response.kind(),
                })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    responses.sort_by_key(|h| h.sent_at);
    Ok(SideEntry {
        request: payload.clone(),
        responses,
    })
}

fn as_http(r: &ResponseData) -> Option<&HttpResponse> {
    match r {
        ResponseData::Http(x) => Some(x),
        _ => None,
    }
}

fn as_sql(r: &ResponseData) -> Option<&SqlResponse> {
    match r {
        ResponseData::Sql(x) => Some(x),
        _ => None,
    }
}

fn as_grpc(r: &ResponseData) -> Option<&GrpcResponse> {
    match r {
        ResponseData::Grpc(x) => Some(x),
        _ => None,
    }
}

fn as_jq(r: &ResponseData) -> Option<&JqResponse> {
    match r {
        ResponseData::Jq(x) => Some(x),
        _ => None,
    }
}

fn as_redis(r: &ResponseData) -> Option<&RedisResponse> {
    match r {
        ResponseData::Redis(x) => Some(x),
        _ => None,
    }
}

fn as_md(r: &ResponseData) -> Option<&MdResponse> {
    match r {
        ResponseData::Md(x) => Some(x),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthConfig, AuthType, ColumnType, Database, SpecSource, KV};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn codec() -> VersionedCodec {
        VersionedCodec::new(Arc::new(PluginRegistry::with_builtins())).with_app_version("test")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn response(secs: i64, data: ResponseData) -> Response {
        Response {
            sent_at: at(secs),
            received_at: at(secs) + Duration::milliseconds(40),
            response: data,
        }
    }

    fn insert(
        map: &mut RequestMap,
        id: &str,
        path: &str,
        data: RequestData,
        responses: Vec<Response>,
    ) {
        let id = RequestId::from(id);
        map.insert(
            id.clone(),
            Request {
                id,
                path: path.to_string(),
                data,
                responses,
            },
        );
    }

    /// One request of every kind, with history where the kind keeps one.
    fn every_kind() -> RequestMap {
        let mut map = RequestMap::new();
        insert(
            &mut map,
            "h1",
            "api/users",
            RequestData::Http(HttpRequest {
                url: "https://example.test/users".to_string(),
                method: "POST".to_string(),
                body: r#"{"name":"ann"}"#.to_string(),
                headers: vec![KV::new("Content-Type", "application/json")],
            }),
            vec![
                response(
                    20,
                    ResponseData::Http(HttpResponse {
                        code: 500,
                        body: "boom".to_string(),
                        headers: vec![],
                    }),
                ),
                response(
                    10,
                    ResponseData::Http(HttpResponse {
                        code: 201,
                        body: "{}".to_string(),
                        headers: vec![KV::new("X-Id", "7")],
                    }),
                ),
            ],
        );
        insert(
            &mut map,
            "s1",
            "db/report",
            RequestData::Sql(SqlRequest {
                dsn: "postgres://localhost/app".to_string(),
                database: Database::Postgres,
                query: "select 1 as one".to_string(),
            }),
            vec![response(
                5,
                ResponseData::Sql(SqlResponse {
                    columns: vec!["one".to_string()],
                    types: vec![ColumnType::Number],
                    rows: vec![vec![json!(1)]],
                }),
            )],
        );
        insert(
            &mut map,
            "g1",
            "rpc/ping",
            RequestData::Grpc(GrpcRequest {
                target: "localhost:50051".to_string(),
                method: "health.Health/Check".to_string(),
                payload: "{}".to_string(),
                metadata: vec![],
            }),
            vec![response(
                7,
                ResponseData::Grpc(GrpcResponse {
                    response: r#"{"status":"SERVING"}"#.to_string(),
                    code: 0,
                    metadata: vec![],
                }),
            )],
        );
        insert(
            &mut map,
            "j1",
            "jq/identity",
            RequestData::Jq(JqRequest::default()),
            vec![response(
                8,
                ResponseData::Jq(JqResponse {
                    response: vec!["{}".to_string()],
                }),
            )],
        );
        insert(
            &mut map,
            "r1",
            "cache/keys",
            RequestData::Redis(RedisRequest::default()),
            vec![response(
                9,
                ResponseData::Redis(RedisResponse {
                    response: "(empty)".to_string(),
                }),
            )],
        );
        insert(&mut map, "m1", "notes/readme", RequestData::Md(MdRequest::default()), vec![]);
        insert(
            &mut map,
            "ss1",
            "sources/pg",
            RequestData::SqlSource(SqlSourceRequest {
                database: Database::Sqlite,
                dsn: "file:app.db".to_string(),
            }),
            vec![],
        );
        insert(
            &mut map,
            "hs1",
            "sources/petstore",
            RequestData::HttpSource(HttpSourceRequest {
                server_url: "https://petstore.test/v2".to_string(),
                spec_source: SpecSource::Url,
                spec_data: "https://petstore.test/swagger.json".to_string(),
                auth: AuthConfig {
                    auth_type: AuthType::Bearer,
                    token: "t0k".to_string(),
                    ..Default::default()
                },
            }),
            vec![],
        );
        map
    }

    fn sorted_history(mut map: RequestMap) -> RequestMap {
        for r in map.values_mut() {
            r.responses.sort_by_key(|x| x.sent_at);
        }
        map
    }

    #[test]
    fn test_round_trip_every_kind() {
        let original = every_kind();
        let codec = codec();
        let bytes = codec.encode(&original).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, sorted_history(original));
    }

    #[test]
    fn test_side_tables_do_not_mix_kinds() {
        let bytes = codec().encode(&every_kind()).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        for (table, id) in [
            ("http", "h1"),
            ("sql", "s1"),
            ("grpc", "g1"),
            ("jq", "j1"),
            ("redis", "r1"),
            ("md", "m1"),
            ("sql-source", "ss1"),
            ("http-source", "hs1"),
        ] {
            let rows = doc[table].as_object().unwrap();
            assert_eq!(rows.len(), 1, "table {} should hold one row", table);
            assert!(rows.contains_key(id), "table {} should hold {}", table, id);
        }
    }

    #[test]
    fn test_encode_empty_collection_keeps_every_table() {
        let bytes = codec().encode(&RequestMap::new()).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["$version"], json!(1));
        assert_eq!(doc["app_version"], json!("test"));
        assert_eq!(doc["request"], json!([]));
        assert_eq!(doc["response"], json!([]));
        for table in ["http", "sql", "grpc", "jq", "redis", "md", "sql-source", "http-source"] {
            assert_eq!(doc[table], json!({}), "table {} must be present", table);
        }
    }

    #[test]
    fn test_encode_is_sorted_and_stable() {
        let codec = codec();
        let map = every_kind();
        let first = codec.encode(&map).unwrap();
        let second = codec.encode(&codec.decode(&first).unwrap()).unwrap();
        assert_eq!(first, second);

        let doc: Value = serde_json::from_slice(&first).unwrap();
        let ids: Vec<&str> = doc["request"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap())
            .collect();
        let mut sorted_ids = ids.clone();
        sorted_ids.sort();
        assert_eq!(ids, sorted_ids);

        let sent: Vec<DateTime<Utc>> = doc["response"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| serde_json::from_value(e["sent_at"].clone()).unwrap())
            .collect();
        assert_eq!(sent.len(), 6);
        assert!(sent.windows(2).all(|w| w[0] <= w[1]));

        let http_history = doc["http"]["h1"]["responses"].as_array().unwrap();
        assert_eq!(http_history[0]["data"]["code"], json!(201));
        assert_eq!(http_history[1]["data"]["code"], json!(500));
    }

    #[test]
    fn test_unversioned_document_is_empty() {
        let codec = codec();
        assert!(codec.decode(b"{}").unwrap().is_empty());
        let legacy = json!({"request": [{"id": "x", "kind": "http", "path": "p"}]});
        assert!(codec
            .decode(&serde_json::to_vec(&legacy).unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let err = codec().decode(br#"{"$version": 2, "request": []}"#).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_non_numeric_version_is_malformed() {
        let err = codec().decode(br#"{"$version": "1"}"#).unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn test_unregistered_kind_is_rejected() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "websocket", "path": "ws"}],
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownKind(k) if k.as_str() == "websocket"));
    }

    #[test]
    fn test_kind_missing_from_smaller_registry_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(Box::new(crate::plugin::StandardPlugin::http()));
        let narrow = VersionedCodec::new(Arc::new(registry));
        let bytes = codec().encode(&every_kind()).unwrap();
        let err = narrow.decode(&bytes).unwrap_err();
        assert!(matches!(err, StoreError::UnknownKind(_)));
    }

    #[test]
    fn test_index_entry_without_row_is_inconsistent() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "http", "path": "p"}],
            "http": {},
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn test_unreachable_row_is_inconsistent() {
        let doc = json!({
            "$version": 1,
            "request": [],
            "sql": {"orphan": {"request": {"dsn": "", "database": "mysql", "query": ""}}},
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(msg) if msg.contains("orphan")));
    }

    #[test]
    fn test_unknown_side_table_is_inconsistent() {
        let doc = json!({
            "$version": 1,
            "request": [],
            "response": [],
            "ws": {"orphan": {"request": {"url": "ws://x"}}},
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(msg) if msg.contains("'ws'")));
    }

    #[test]
    fn test_every_encoded_key_is_known() {
        let bytes = codec().encode(&every_kind()).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        let keys: Vec<&str> = doc.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), V1_KEYS.len());
        assert!(keys.iter().all(|k| V1_KEYS.contains(k)));
    }

    #[test]
    fn test_row_under_wrong_kind_is_inconsistent() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "redis", "path": "p"}],
            "jq": {"a": {"request": {"query": ".", "json": "{}"}}},
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn test_duplicate_index_entry_is_inconsistent() {
        let doc = json!({
            "$version": 1,
            "request": [
                {"id": "a", "kind": "md", "path": "p"},
                {"id": "a", "kind": "md", "path": "q"}
            ],
            "md": {"a": {"request": {"data": "x"}}},
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn test_timing_index_mismatch_is_inconsistent() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "redis", "path": "p"}],
            "response": [],
            "redis": {"a": {
                "request": {"dsn": "localhost:6379", "query": "PING"},
                "responses": [{
                    "sent_at": "2025-03-01T09:00:00Z",
                    "received_at": "2025-03-01T09:00:01Z",
                    "data": {"response": "PONG"}
                }]
            }},
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn test_missing_timing_index_is_tolerated() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "redis", "path": "p"}],
            "redis": {"a": {
                "request": {"dsn": "localhost:6379", "query": "PING"},
                "responses": [{
                    "sent_at": "2025-03-01T09:00:00Z",
                    "received_at": "2025-03-01T09:00:01Z",
                    "data": {"response": "PONG"}
                }]
            }},
        });
        let decoded = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap();
        let request = &decoded[&RequestId::from("a")];
        assert_eq!(request.responses.len(), 1);
        assert_eq!(
            request.responses[0].response,
            ResponseData::Redis(RedisResponse {
                response: "PONG".to_string()
            })
        );
    }

    #[test]
    fn test_history_is_sorted_on_decode() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "jq", "path": "p"}],
            "jq": {"a": {
                "request": {"query": ".", "json": "1"},
                "responses": [
                    {
                        "sent_at": "2025-03-01T09:00:05Z",
                        "received_at": "2025-03-01T09:00:06Z",
                        "data": {"response": ["2"]}
                    },
                    {
                        "sent_at": "2025-03-01T09:00:01Z",
                        "received_at": "2025-03-01T09:00:02Z",
                        "data": {"response": ["1"]}
                    }
                ]
            }},
        });
        let decoded = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap();
        let responses = &decoded[&RequestId::from("a")].responses;
        assert!(responses[0].sent_at < responses[1].sent_at);
    }

    #[test]
    fn test_received_before_sent_is_inconsistent() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "jq", "path": "p"}],
            "jq": {"a": {
                "request": {"query": ".", "json": "1"},
                "responses": [{
                    "sent_at": "2025-03-01T09:00:05Z",
                    "received_at": "2025-03-01T09:00:01Z",
                    "data": {"response": []}
                }]
            }},
        });
        let err = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn test_missing_payload_fields_take_defaults() {
        let doc = json!({
            "$version": 1,
            "request": [{"id": "a", "kind": "http", "path": "p"}],
            "http": {"a": {"request": {"url": "http://localhost"}}},
        });
        let decoded = codec().decode(&serde_json::to_vec(&doc).unwrap()).unwrap();
        match &decoded[&RequestId::from("a")].data {
            RequestData::Http(r) => {
                assert_eq!(r.url, "http://localhost");
                assert!(r.headers.is_empty());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = codec().decode(b"{not json").unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }
}
