//! Semantic chunking of OpenAPI / Swagger documents.
//!
//! API specs already have natural retrieval units, so they bypass the
//! character-window chunker: one chunk per operation and one per named
//! schema. Both OpenAPI 3 (`components.schemas`, `requestBody`) and
//! Swagger 2 (`definitions`, `in: body` parameters) layouts are read.
//!
//! Chunk ids:
//!
//! | Kind | `doc_id` | `meta.type` |
//! |------|----------|-------------|
//! | operation | `swagger::op::<METHOD>::<path>` | `operation` |
//! | schema | `swagger::schema::<name>` | `schema` |
//!
//! Output order follows the document: operations in `paths` order, then
//! schemas.

use serde_json::{json, Value};

use crate::models::{Chunk, Meta};

/// Keys under a path item that are operations. Others (`parameters`,
/// `summary`, `servers`, …) are not.
const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// One chunk produced from an API spec, ready for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecChunk {
    pub doc_id: String,
    pub text: String,
    pub meta: Meta,
}

impl From<SpecChunk> for Chunk {
    fn from(chunk: SpecChunk) -> Self {
        Chunk::new(chunk.doc_id, chunk.text, chunk.meta)
    }
}

/// Split an OpenAPI document into operation and schema chunks.
pub fn openapi_to_chunks(spec: &Value, source_url: &str, service_name: &str) -> Vec<SpecChunk> {
    let mut chunks = Vec::new();

    if let Some(paths) = spec.get("paths").and_then(Value::as_object) {
        for (path, item) in paths {
            let shared_params = item.get("parameters");
            let Some(ops) = item.as_object() else {
                continue;
            };
            for (method, op) in ops {
                if !HTTP_METHODS.contains(&method.to_lowercase().as_str()) {
                    continue;
                }
                chunks.push(operation_chunk(
                    path,
                    &method.to_uppercase(),
                    op,
                    shared_params,
                    source_url,
                    service_name,
                ));
            }
        }
    }

    let schemas = spec
        .pointer("/components/schemas")
        .or_else(|| spec.get("definitions"))
        .and_then(Value::as_object);
    if let Some(schemas) = schemas {
        for (name, schema) in schemas {
            chunks.push(schema_chunk(name, schema, source_url, service_name));
        }
    }

    chunks
}

/// One line per operation: `GET /path  operationId=…  summary=…`.
pub fn summarise_openapi(spec: &Value) -> String {
    let mut lines = vec!["OpenAPI Summary:".to_string()];
    if let Some(paths) = spec.get("paths").and_then(Value::as_object) {
        for (path, item) in paths {
            let Some(ops) = item.as_object() else {
                continue;
            };
            for (method, op) in ops {
                if !HTTP_METHODS.contains(&method.to_lowercase().as_str()) {
                    continue;
                }
                lines.push(format!(
                    "{} {}  operationId={}  summary={}",
                    method.to_uppercase(),
                    path,
                    str_field(op, "operationId"),
                    str_field(op, "summary"),
                ));
            }
        }
    }
    lines.join("\n")
}

fn operation_chunk(
    path: &str,
    method: &str,
    op: &Value,
    shared_params: Option<&Value>,
    source_url: &str,
    service_name: &str,
) -> SpecChunk {
    let operation_id = str_field(op, "operationId");
    let summary = str_field(op, "summary");

    let mut lines = vec![
        format!("Service: {}", service_name),
        format!("Operation: {} {}", method, path),
    ];
    if !operation_id.is_empty() {
        lines.push(format!("operationId: {}", operation_id));
    }
    if !summary.is_empty() {
        lines.push(format!("Summary: {}", summary));
    }
    let description = str_field(op, "description");
    if !description.is_empty() {
        lines.push(format!("Description: {}", description));
    }
    if let Some(tags) = op.get("tags").and_then(Value::as_array) {
        let tags: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
        if !tags.is_empty() {
            lines.push(format!("Tags: {}", tags.join(", ")));
        }
    }

    let params: Vec<&Value> = shared_params
        .and_then(Value::as_array)
        .into_iter()
        .chain(op.get("parameters").and_then(Value::as_array))
        .flatten()
        .collect();

    let described: Vec<String> = params
        .iter()
        .filter(|p| str_field(p, "in") != "body")
        .map(|p| describe_parameter(p))
        .collect();
    if !described.is_empty() {
        lines.push(format!("Parameters: {}", described.join("; ")));
    }

    let request_schema = op
        .pointer("/requestBody/content")
        .and_then(first_media_schema)
        .or_else(|| {
            params
                .iter()
                .find(|p| str_field(p, "in") == "body")
                .and_then(|p| p.get("schema"))
        });
    if let Some(schema) = request_schema {
        lines.push(format!("Request body: {}", schema_name(schema)));
    }

    if let Some(responses) = op.get("responses").and_then(Value::as_object) {
        let described: Vec<String> = responses
            .iter()
            .map(|(code, resp)| {
                let schema = resp
                    .get("content")
                    .and_then(first_media_schema)
                    .or_else(|| resp.get("schema"));
                match schema {
                    Some(s) => format!("{} -> {}", code, schema_name(s)),
                    None => code.clone(),
                }
            })
            .collect();
        if !described.is_empty() {
            lines.push(format!("Responses: {}", described.join("; ")));
        }
    }

    let meta = object(json!({
        "type": "operation",
        "method": method,
        "path": path,
        "operation_id": operation_id,
        "summary": summary,
        "source": "swagger",
        "url": source_url,
        "service": service_name,
    }));

    SpecChunk {
        doc_id: format!("swagger::op::{}::{}", method, path),
        text: lines.join("\n"),
        meta,
    }
}

fn schema_chunk(name: &str, schema: &Value, source_url: &str, service_name: &str) -> SpecChunk {
    let mut lines = vec![
        format!("Service: {}", service_name),
        format!("Schema: {}", name),
    ];
    let kind = str_field(schema, "type");
    if !kind.is_empty() {
        lines.push(format!("Type: {}", kind));
    }
    let description = str_field(schema, "description");
    if !description.is_empty() {
        lines.push(format!("Description: {}", description));
    }
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        let required: Vec<&str> = required.iter().filter_map(Value::as_str).collect();
        if !required.is_empty() {
            lines.push(format!("Required: {}", required.join(", ")));
        }
    }
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        lines.push("Properties:".to_string());
        for (prop, prop_schema) in props {
            lines.push(format!("- {}: {}", prop, schema_name(prop_schema)));
        }
    }
    if let Some(values) = schema.get("enum").and_then(Value::as_array) {
        let values: Vec<String> = values.iter().map(value_label).collect();
        lines.push(format!("Enum: {}", values.join(", ")));
    }

    let meta = object(json!({
        "type": "schema",
        "schema_name": name,
        "source": "swagger",
        "url": source_url,
        "service": service_name,
    }));

    SpecChunk {
        doc_id: format!("swagger::schema::{}", name),
        text: lines.join("\n"),
        meta,
    }
}

fn describe_parameter(param: &Value) -> String {
    let name = match str_field(param, "name") {
        "" => param.get("$ref").and_then(Value::as_str).map(ref_name).unwrap_or("?"),
        n => n,
    };
    let location = str_field(param, "in");
    let kind = param
        .get("schema")
        .map(schema_name)
        .unwrap_or_else(|| str_field(param, "type").to_string());

    let mut attrs: Vec<&str> = Vec::new();
    if !location.is_empty() {
        attrs.push(location);
    }
    if param.get("required").and_then(Value::as_bool).unwrap_or(false) {
        attrs.push("required");
    }
    if !kind.is_empty() {
        attrs.push(&kind);
    }

    if attrs.is_empty() {
        name.to_string()
    } else {
        format!("{} ({})", name, attrs.join(", "))
    }
}

/// Human label for a schema node: the `$ref` target name, `array<item>`,
/// or the primitive type (with format when present).
fn schema_name(schema: &Value) -> String {
    if let Some(r) = schema.get("$ref").and_then(Value::as_str) {
        return ref_name(r).to_string();
    }
    match str_field(schema, "type") {
        "array" => {
            let item = schema.get("items").map(schema_name).unwrap_or_default();
            format!("array<{}>", item)
        }
        "" => "object".to_string(),
        kind => match str_field(schema, "format") {
            "" => kind.to_string(),
            format => format!("{} ({})", kind, format),
        },
    }
}

/// Schema of the first media type in an OpenAPI 3 `content` map.
fn first_media_schema(content: &Value) -> Option<&Value> {
    content
        .as_object()?
        .values()
        .find_map(|media| media.get("schema"))
}

fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn object(value: Value) -> Meta {
    match value {
        Value::Object(map) => map,
        _ => Meta::new(),
    }
}
