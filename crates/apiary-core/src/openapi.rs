//! Endpoint catalogue of an `http-source` API description.
//!
//! [`parse_spec`] reads a Swagger 2.0 or OpenAPI 3.x document in JSON,
//! resolves its local `$ref`s, and lists every operation with its
//! parameters, request body, and responses. The `*_example` functions
//! derive placeholder values from those schemas so a call can be sent
//! without filling anything in by hand.
//!
//! # Ordering
//!
//! Endpoints are sorted by path, then by method in the order
//! `get, head, post, put, patch, delete, options`. Example objects list
//! their properties alphabetically.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

/// Operation keys of a path item, in listing order.
const METHODS: [&str; 7] = ["get", "head", "post", "put", "patch", "delete", "options"];

/// Object examples stop growing at this many properties when the schema
/// marks none as required.
const MAX_OPTIONAL_PROPERTIES: usize = 10;

const DEFAULT_MEDIA_TYPE: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("API description is not valid JSON")]
    Json(#[from] serde_json::Error),

    #[error("API description declares neither a `swagger` nor an `openapi` version")]
    Unversioned,

    #[error("`paths` of the API description is not an object")]
    InvalidPaths,

    #[error("fetching the API description returned status {0}")]
    Fetch(u16),
}

// ═══════════════════════════════════════════════════════════════════════
// Catalogue types
// ═══════════════════════════════════════════════════════════════════════

/// One operation of the described API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    pub path: String,
    /// Upper-case HTTP method.
    pub method: String,
    pub summary: String,
    pub parameters: Vec<ParameterInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBodyInfo>,
    /// Keyed by status code (or `default`).
    pub responses: BTreeMap<String, ResponseInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub name: String,
    /// `path`, `query`, `header`, `cookie`, `body` or `formData`.
    #[serde(rename = "in")]
    pub location: String,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBodyInfo {
    pub description: String,
    pub required: bool,
    /// Keyed by media type.
    pub content: BTreeMap<String, MediaTypeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaTypeInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseInfo {
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, MediaTypeInfo>,
}

// ═══════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════

/// List the endpoints of a JSON API description.
///
/// A document without `paths` has no endpoints. A `$ref` that points
/// outside the document, or back into a schema that is being expanded, is
/// left in place.
pub fn parse_spec(text: &str) -> Result<Vec<EndpointInfo>, SpecError> {
    let doc: Value = serde_json::from_str(text)?;
    let swagger2 = doc.get("swagger").is_some();
    if !swagger2 && doc.get("openapi").is_none() {
        return Err(SpecError::Unversioned);
    }

    let paths = match doc.get("paths") {
        None => return Ok(Vec::new()),
        Some(Value::Object(_)) => expand_refs(&doc["paths"], &doc, &mut Vec::new()),
        Some(_) => return Err(SpecError::InvalidPaths),
    };
    let Value::Object(paths) = paths else {
        return Err(SpecError::InvalidPaths);
    };

    let document = Document { root: &doc, swagger2 };
    let mut names: Vec<&String> = paths.keys().collect();
    names.sort();

    let mut endpoints = Vec::new();
    for path in names {
        let item = &paths[path];
        for method in METHODS {
            if let Some(operation) = item.get(method).filter(|o| o.is_object()) {
                endpoints.push(document.endpoint(path, method, item, operation));
            }
        }
    }
    tracing::debug!(endpoints = endpoints.len(), swagger2, "parsed API description");
    Ok(endpoints)
}

/// Inline every local `$ref` reachable from `value`.
fn expand_refs(value: &Value, root: &Value, expanding: &mut Vec<String>) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let target = reference
                    .strip_prefix('#')
                    .and_then(|pointer| root.pointer(pointer));
                return match target {
                    Some(target) if !expanding.contains(reference) => {
                        expanding.push(reference.clone());
                        let expanded = expand_refs(target, root, expanding);
                        expanding.pop();
                        expanded
                    }
                    _ => value.clone(),
                };
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), expand_refs(v, root, expanding)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| expand_refs(v, root, expanding))
                .collect(),
        ),
        other => other.clone(),
    }
}

struct Document<'a> {
    root: &'a Value,
    swagger2: bool,
}

impl Document<'_> {
    fn endpoint(&self, path: &str, method: &str, item: &Value, operation: &Value) -> EndpointInfo {
        let mut parameters: Vec<ParameterInfo> = Vec::new();
        let declared = list(item.get("parameters"))
            .iter()
            .chain(list(operation.get("parameters")));
        for raw in declared {
            let Some(param) = self.parameter(raw) else {
                continue;
            };
            // operation-level parameters override path-level ones
            match parameters
                .iter_mut()
                .find(|p| p.name == param.name && p.location == param.location)
            {
                Some(existing) => *existing = param,
                None => parameters.push(param),
            }
        }

        let request_body = if self.swagger2 {
            self.swagger2_body(operation, &parameters)
        } else {
            operation.get("requestBody").map(openapi3_body)
        };

        let responses = operation
            .get("responses")
            .and_then(Value::as_object)
            .map(|responses| {
                responses
                    .iter()
                    .map(|(code, r)| (code.clone(), self.response(operation, r)))
                    .collect()
            })
            .unwrap_or_default();

        EndpointInfo {
            path: path.to_string(),
            method: method.to_uppercase(),
            summary: text(operation.get("summary")),
            parameters,
            request_body,
            responses,
        }
    }

    fn parameter(&self, raw: &Value) -> Option<ParameterInfo> {
        let name = raw.get("name")?.as_str()?.to_string();
        let location = raw.get("in")?.as_str()?.to_string();
        // Swagger 2.0 describes non-body parameters inline instead of
        // under `schema`.
        let schema = raw.get("schema").cloned().or_else(|| {
            if !self.swagger2 {
                return None;
            }
            let inline: Map<String, Value> = ["type", "format", "enum", "items", "default"]
                .into_iter()
                .filter_map(|key| raw.get(key).map(|v| (key.to_string(), v.clone())))
                .collect();
            (!inline.is_empty()).then_some(Value::Object(inline))
        });

        Some(ParameterInfo {
            name,
            location,
            description: text(raw.get("description")),
            required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
            schema,
            example: raw.get("example").cloned(),
        })
    }

    /// Swagger 2.0 carries the body as the single `in: body` parameter.
    fn swagger2_body(
        &self,
        operation: &Value,
        parameters: &[ParameterInfo],
    ) -> Option<RequestBodyInfo> {
        let body = parameters.iter().find(|p| p.location == "body")?;
        let mut content = BTreeMap::new();
        if let Some(schema) = &body.schema {
            content.insert(
                self.media_type(operation, "consumes"),
                MediaTypeInfo {
                    schema: Some(schema.clone()),
                    example: body.example.clone(),
                },
            );
        }
        Some(RequestBodyInfo {
            description: body.description.clone(),
            required: body.required,
            content,
        })
    }

    fn response(&self, operation: &Value, raw: &Value) -> ResponseInfo {
        let content = if self.swagger2 {
            raw.get("schema")
                .map(|schema| {
                    let media = MediaTypeInfo {
                        schema: Some(schema.clone()),
                        example: None,
                    };
                    BTreeMap::from([(self.media_type(operation, "produces"), media)])
                })
                .unwrap_or_default()
        } else {
            content_map(raw.get("content"))
        };
        ResponseInfo {
            description: text(raw.get("description")),
            content,
        }
    }

    /// First entry of the operation's `consumes`/`produces`, falling back
    /// to the document-wide list, then to JSON.
    fn media_type(&self, operation: &Value, key: &str) -> String {
        [operation.get(key), self.root.get(key)]
            .into_iter()
            .flatten()
            .find_map(|types| types.get(0).and_then(Value::as_str))
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string()
    }
}

fn openapi3_body(raw: &Value) -> RequestBodyInfo {
    RequestBodyInfo {
        description: text(raw.get("description")),
        required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
        content: content_map(raw.get("content")),
    }
}

fn content_map(raw: Option<&Value>) -> BTreeMap<String, MediaTypeInfo> {
    raw.and_then(Value::as_object)
        .map(|content| {
            content
                .iter()
                .map(|(media, m)| {
                    let info = MediaTypeInfo {
                        schema: m.get("schema").cloned(),
                        example: m.get("example").cloned(),
                    };
                    (media.clone(), info)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn list(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn text(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

// ═══════════════════════════════════════════════════════════════════════
// Examples
// ═══════════════════════════════════════════════════════════════════════

/// Value substituted for `{name}` in the path template.
pub fn path_example(param: &ParameterInfo) -> String {
    if let Some(example) = &param.example {
        return plain(example);
    }
    match schema_type(param.schema.as_ref()) {
        "string" => "string".to_string(),
        "integer" => "1".to_string(),
        _ => "placeholder".to_string(),
    }
}

/// Value of a query or header parameter.
pub fn parameter_example(param: &ParameterInfo) -> String {
    if let Some(example) = &param.example {
        return plain(example);
    }
    let Some(schema) = &param.schema else {
        return "placeholder".to_string();
    };
    match schema_type(Some(schema)) {
        "string" => plain(&string_example(schema)),
        "integer" | "number" => number_example(schema).to_string(),
        "boolean" => "true".to_string(),
        // comma-separated, as query strings carry lists
        "array" => "item1,item2".to_string(),
        _ => "example".to_string(),
    }
}

/// Media type and serialized body for a request body, preferring JSON.
/// `None` when the body has no content to derive an example from.
pub fn body_example(body: &RequestBodyInfo) -> Option<(String, String)> {
    let (media, info) = body
        .content
        .get_key_value(DEFAULT_MEDIA_TYPE)
        .or_else(|| body.content.iter().next())?;
    let value = match (&info.example, &info.schema) {
        (Some(example), _) => example.clone(),
        (None, Some(schema)) => schema_example(schema),
        (None, None) => return None,
    };
    Some((media.clone(), value.to_string()))
}

/// An example instance of `schema`.
pub fn schema_example(schema: &Value) -> Value {
    match schema_type(Some(schema)) {
        "object" => object_example(schema),
        "array" => match schema.get("items").filter(|i| i.is_object()) {
            Some(items) => json!([schema_example(items)]),
            None => json!([]),
        },
        "string" => string_example(schema),
        "integer" | "number" => number_example(schema),
        "boolean" => json!(true),
        "null" => Value::Null,
        _ => json!({}),
    }
}

/// Required properties only, or the first few alphabetically when none
/// are required. Nested values are shallow placeholders.
fn object_example(schema: &Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return json!({});
    };
    let required: Vec<&str> = list(schema.get("required"))
        .iter()
        .filter_map(Value::as_str)
        .collect();

    let mut names: Vec<&String> = properties.keys().collect();
    names.sort();

    let mut example = Map::new();
    for name in names {
        let property = &properties[name];
        if !property.is_object() {
            continue;
        }
        if !required.is_empty() && !required.contains(&name.as_str()) {
            continue;
        }
        let value = match schema_type(Some(property)) {
            "string" => string_example(property),
            "integer" | "number" => number_example(property),
            "boolean" => json!(true),
            "array" => json!(["item1", "item2"]),
            "object" => json!({"key": "value"}),
            _ => Value::Null,
        };
        example.insert(name.clone(), value);
        if required.is_empty() && example.len() >= MAX_OPTIONAL_PROPERTIES {
            break;
        }
    }
    Value::Object(example)
}

fn string_example(schema: &Value) -> Value {
    if let Some(first) = list(schema.get("enum")).first() {
        return first.clone();
    }
    let example = match schema.get("format").and_then(Value::as_str) {
        Some("date-time") => "2024-01-01T12:00:00Z",
        Some("date") => "2024-01-01",
        Some("email") => "user@example.com",
        Some("uuid") => "123e4567-e89b-12d3-a456-426614174000",
        _ => "example",
    };
    json!(example)
}

fn number_example(schema: &Value) -> Value {
    match schema.get("format").and_then(Value::as_str) {
        Some("float") | Some("double") => json!(1.5),
        _ => json!(42),
    }
}

fn schema_type(schema: Option<&Value>) -> &str {
    schema
        .and_then(|s| s.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Render a JSON scalar the way it appears in a URL or header.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
