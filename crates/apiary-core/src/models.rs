//! Core data models: kinds, ids, per-kind payloads, and stored requests.
//!
//! Request and response payloads are closed enums ([`RequestData`],
//! [`ResponseData`]) with one variant per kind. The JSON field names of the
//! payload structs are part of the on-disk format, see [`crate::codec`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════

/// Discriminator tag of a request family (`"http"`, `"sql"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(Cow<'static, str>);

impl Kind {
    pub const HTTP: Kind = Kind(Cow::Borrowed("http"));
    pub const SQL: Kind = Kind(Cow::Borrowed("sql"));
    pub const GRPC: Kind = Kind(Cow::Borrowed("grpc"));
    pub const JQ: Kind = Kind(Cow::Borrowed("jq"));
    pub const REDIS: Kind = Kind(Cow::Borrowed("redis"));
    pub const MD: Kind = Kind(Cow::Borrowed("md"));
    pub const SQL_SOURCE: Kind = Kind(Cow::Borrowed("sql-source"));
    pub const HTTP_SOURCE: Kind = Kind(Cow::Borrowed("http-source"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Kind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Opaque, client-generated request identifier.
///
/// Minted once by [`RequestId::generate`] (a url-safe random token) and
/// never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Any payload that can report its own kind.
pub trait EntryData {
    fn kind(&self) -> Kind;
}

/// A single header or metadata pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KV {
    pub key: String,
    pub value: String,
}

impl KV {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub body: String,
    pub headers: Vec<KV>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            body: String::new(),
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpResponse {
    pub code: u16,
    pub body: String,
    pub headers: Vec<KV>,
}

// ═══════════════════════════════════════════════════════════════════════
// SQL
// ═══════════════════════════════════════════════════════════════════════

/// SQL dialect a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
    Clickhouse,
}

impl Database {
    pub fn as_str(&self) -> &'static str {
        match self {
            Database::Postgres => "postgres",
            Database::Mysql => "mysql",
            Database::Sqlite => "sqlite",
            Database::Clickhouse => "clickhouse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlRequest {
    pub dsn: String,
    pub database: Database,
    pub query: String,
}

/// Column type reported by a SQL executor. Driver-specific names are kept
/// verbatim in [`ColumnType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Time,
    Boolean,
    /// Never one of the built-in names above, which would decode as their
    /// own variant. Build it through [`ColumnType::from_driver`].
    #[serde(untagged)]
    Other(String),
}

impl ColumnType {
    /// Classify a type name reported by a driver.
    pub fn from_driver(name: &str) -> Self {
        match name {
            "string" => ColumnType::String,
            "number" => ColumnType::Number,
            "time" => ColumnType::Time,
            "boolean" => ColumnType::Boolean,
            other => ColumnType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlResponse {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<Value>>,
}

/// Connection parameters for ad-hoc queries. Never executed directly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlSourceRequest {
    pub database: Database,
    pub dsn: String,
}

// ═══════════════════════════════════════════════════════════════════════
// gRPC, JQ, Redis, Markdown
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcRequest {
    pub target: String,
    /// Fully qualified method name.
    pub method: String,
    pub payload: String,
    pub metadata: Vec<KV>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcResponse {
    pub response: String,
    pub code: i32,
    pub metadata: Vec<KV>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JqRequest {
    pub query: String,
    pub json: String,
}

impl Default for JqRequest {
    fn default() -> Self {
        Self {
            query: ".".to_string(),
            json: r#"{
  "string": "string",
  "number": 42,
  "bool": true,
  "list": [1, 2, 3],
  "null": null
}"#
            .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JqResponse {
    pub response: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisRequest {
    pub dsn: String,
    pub query: String,
}

impl Default for RedisRequest {
    fn default() -> Self {
        Self {
            dsn: "localhost:6379".to_string(),
            query: "KEYS".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisResponse {
    pub response: String,
}

const DEFAULT_MARKDOWN: &str = "# New document

Write **markdown** here. Lists, tables, and code blocks are supported:

```sh
apiary perform <id>
```
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdRequest {
    pub data: String,
}

impl Default for MdRequest {
    fn default() -> Self {
        Self {
            data: DEFAULT_MARKDOWN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MdResponse {
    pub data: String,
}

// ═══════════════════════════════════════════════════════════════════════
// HTTP source
// ═══════════════════════════════════════════════════════════════════════

/// Where an OpenAPI document for an HTTP source comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecSource {
    #[default]
    File,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
    #[serde(rename = "apikey")]
    ApiKey,
    #[serde(rename = "oauth")]
    OAuth,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_value: String,
}

/// An HTTP server description used as a template for ad-hoc calls.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpSourceRequest {
    pub server_url: String,
    pub spec_source: SpecSource,
    pub spec_data: String,
    pub auth: AuthConfig,
}

// ═══════════════════════════════════════════════════════════════════════
// Closed payload enums
// ═══════════════════════════════════════════════════════════════════════

/// A request payload of any registered family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestData {
    Http(HttpRequest),
    Sql(SqlRequest),
    Grpc(GrpcRequest),
    Jq(JqRequest),
    Redis(RedisRequest),
    Md(MdRequest),
    SqlSource(SqlSourceRequest),
    HttpSource(HttpSourceRequest),
}

impl EntryData for RequestData {
    fn kind(&self) -> Kind {
        match self {
            RequestData::Http(_) => Kind::HTTP,
            RequestData::Sql(_) => Kind::SQL,
            RequestData::Grpc(_) => Kind::GRPC,
            RequestData::Jq(_) => Kind::JQ,
            RequestData::Redis(_) => Kind::REDIS,
            RequestData::Md(_) => Kind::MD,
            RequestData::SqlSource(_) => Kind::SQL_SOURCE,
            RequestData::HttpSource(_) => Kind::HTTP_SOURCE,
        }
    }
}

impl RequestData {
    /// Parse an untyped JSON payload as the request type of `kind`.
    pub fn from_json(kind: &Kind, value: Value) -> StoreResult<Self> {
        let data = match kind.as_str() {
            "http" => RequestData::Http(serde_json::from_value(value)?),
            "sql" => RequestData::Sql(serde_json::from_value(value)?),
            "grpc" => RequestData::Grpc(serde_json::from_value(value)?),
            "jq" => RequestData::Jq(serde_json::from_value(value)?),
            "redis" => RequestData::Redis(serde_json::from_value(value)?),
            "md" => RequestData::Md(serde_json::from_value(value)?),
            "sql-source" => RequestData::SqlSource(serde_json::from_value(value)?),
            "http-source" => RequestData::HttpSource(serde_json::from_value(value)?),
            _ => return Err(StoreError::UnknownKind(kind.clone())),
        };
        Ok(data)
    }

    /// Short qualifier shown next to the kind in listings: the HTTP method
    /// or the SQL dialect.
    pub fn sub_kind(&self) -> &str {
        match self {
            RequestData::Http(r) => &r.method,
            RequestData::Sql(r) => r.database.as_str(),
            _ => "",
        }
    }
}

/// A response payload of any family that keeps history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Http(HttpResponse),
    Sql(SqlResponse),
    Grpc(GrpcResponse),
    Jq(JqResponse),
    Redis(RedisResponse),
    Md(MdResponse),
}

impl EntryData for ResponseData {
    fn kind(&self) -> Kind {
        match self {
            ResponseData::Http(_) => Kind::HTTP,
            ResponseData::Sql(_) => Kind::SQL,
            ResponseData::Grpc(_) => Kind::GRPC,
            ResponseData::Jq(_) => Kind::JQ,
            ResponseData::Redis(_) => Kind::REDIS,
            ResponseData::Md(_) => Kind::MD,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Stored records
// ═══════════════════════════════════════════════════════════════════════

/// One recorded execution. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub response: ResponseData,
}

/// A stored request with its execution history, ordered by `sent_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: RequestId,
    /// Slash-delimited display path. Not unique.
    pub path: String,
    pub data: RequestData,
    pub responses: Vec<Response>,
}

impl Request {
    pub fn kind(&self) -> Kind {
        self.data.kind()
    }
}

/// The whole in-memory collection.
pub type RequestMap = HashMap<RequestId, Request>;
