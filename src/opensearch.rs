//! OpenSearch-compatible [`SearchIndex`] over HTTP.
//!
//! Every call is a single request with the configured timeout. Nothing is
//! retried here: a timeout or service error goes straight back to the
//! caller, which decides whether to try again.
//!
//! Error bodies are decoded by their `error.type`:
//!
//! | `error.type` | Mapped to |
//! |--------------|-----------|
//! | `resource_already_exists_exception` | [`IndexError::AlreadyExists`] |
//! | `index_not_found_exception` | [`IndexError::NotFound`] |
//! | `illegal_argument_exception` (mapping update) | [`IndexError::IncompatibleMapping`] |
//! | anything else | [`IndexError::Service`] |

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};

use capture_catalog_core::index::{IndexError, IndexMapping, IndexSettings, SearchIndex};
use capture_catalog_core::schema::FieldType;

use crate::config::IndexConfig;

pub struct OpenSearchIndex {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    refresh: bool,
}

impl OpenSearchIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password()?,
            refresh: config.refresh,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    async fn send(&self, index: &str, req: RequestBuilder) -> Result<Response, IndexError> {
        req.send().await.map_err(|e| transport_error(index, e))
    }

    /// Send and require a 2xx response, decoding error bodies otherwise.
    async fn send_ok(
        &self,
        index: &str,
        req: RequestBuilder,
        fields: &[&str],
    ) -> Result<Response, IndexError> {
        let resp = self.send(index, req).await?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(decode_error(index, status, &body, fields))
    }

    async fn json_body(index: &str, resp: Response) -> Result<Value, IndexError> {
        resp.json::<Value>()
            .await
            .map_err(|e| IndexError::service(index, format!("invalid response body: {}", e)))
    }
}

fn transport_error(index: &str, err: reqwest::Error) -> IndexError {
    if err.is_timeout() {
        IndexError::Timeout {
            index: index.to_string(),
        }
    } else {
        IndexError::service(index, err.to_string())
    }
}

/// Decode an error response. `fields` are the mapping fields a request was
/// about, used when the service reason does not name one.
pub fn decode_error(index: &str, status: StatusCode, body: &str, fields: &[&str]) -> IndexError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = parsed.get("error");
    let error_type = error
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let reason = error
        .and_then(|e| e.get("reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());

    match error_type {
        "resource_already_exists_exception" => IndexError::AlreadyExists {
            index: index.to_string(),
        },
        "index_not_found_exception" => IndexError::NotFound {
            index: index.to_string(),
        },
        "illegal_argument_exception" if !fields.is_empty() => {
            let field = mapper_field(&reason)
                .or_else(|| fields.first().map(|f| f.to_string()))
                .unwrap_or_default();
            IndexError::IncompatibleMapping {
                index: index.to_string(),
                field,
                reason,
            }
        }
        _ if status == StatusCode::NOT_FOUND => IndexError::NotFound {
            index: index.to_string(),
        },
        _ => IndexError::service(index, format!("HTTP {}: {}", status.as_u16(), reason)),
    }
}

/// Field named in a "mapper [field] cannot be changed ..." reason.
fn mapper_field(reason: &str) -> Option<String> {
    let start = reason.find("mapper [")? + "mapper [".len();
    let len = reason[start..].find(']')?;
    Some(reason[start..start + len].to_string())
}

/// `{"properties": {field: {"type": ...}}}`
pub fn mapping_to_json(mapping: &IndexMapping) -> Value {
    let properties: Map<String, Value> = mapping
        .iter()
        .map(|(field, ty)| (field.clone(), json!({ "type": ty.as_str() })))
        .collect();
    json!({ "properties": properties })
}

/// Parse the `properties` of a mappings object. Fields with types the
/// catalog does not model are skipped.
pub fn mapping_from_json(mappings: &Value) -> IndexMapping {
    let mut out = IndexMapping::new();
    let Some(properties) = mappings.get("properties").and_then(Value::as_object) else {
        return out;
    };
    for (field, spec) in properties {
        let ty = match spec.get("type").and_then(Value::as_str) {
            Some(t) => t.parse::<FieldType>().ok(),
            None if spec.get("properties").is_some() => Some(FieldType::Object),
            None => None,
        };
        match ty {
            Some(ty) => {
                out.insert(field.clone(), ty);
            }
            None => tracing::debug!(field = %field, "skipping unmodelled mapping type"),
        }
    }
    out
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    async fn exists(&self, index: &str) -> Result<bool, IndexError> {
        let resp = self.send(index, self.request(Method::HEAD, index)).await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(IndexError::service(index, format!("HTTP {} on exists", s.as_u16()))),
        }
    }

    async fn create(
        &self,
        index: &str,
        mapping: &IndexMapping,
        settings: &IndexSettings,
    ) -> Result<(), IndexError> {
        let body = json!({
            "settings": {
                "number_of_shards": settings.shards,
                "number_of_replicas": settings.replicas,
            },
            "mappings": mapping_to_json(mapping),
        });
        self.send_ok(index, self.request(Method::PUT, index).json(&body), &[])
            .await?;
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<IndexMapping, IndexError> {
        let path = format!("{}/_mapping", index);
        let resp = self
            .send_ok(index, self.request(Method::GET, &path), &[])
            .await?;
        let body = Self::json_body(index, resp).await?;
        // The response is keyed by concrete index name, which differs from
        // `index` when it is an alias.
        let mappings = body
            .get(index)
            .or_else(|| body.as_object().and_then(|o| o.values().next()))
            .and_then(|i| i.get("mappings"))
            .ok_or_else(|| IndexError::service(index, "mapping response without mappings"))?;
        Ok(mapping_from_json(mappings))
    }

    async fn put_mapping(&self, index: &str, mapping: &IndexMapping) -> Result<(), IndexError> {
        let path = format!("{}/_mapping", index);
        let fields: Vec<&str> = mapping.keys().map(String::as_str).collect();
        self.send_ok(
            index,
            self.request(Method::PUT, &path).json(&mapping_to_json(mapping)),
            &fields,
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, index: &str, doc_id: &str, document: &Value) -> Result<(), IndexError> {
        let path = format!("{}/_doc/{}?refresh={}", index, doc_id, self.refresh);
        let req = self.request(Method::PUT, &path).json(document);
        self.send_ok(index, req, &[]).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), IndexError> {
        self.send_ok(index, self.request(Method::DELETE, index), &[])
            .await?;
        Ok(())
    }

    async fn get_document(&self, index: &str, doc_id: &str) -> Result<Option<Value>, IndexError> {
        let path = format!("{}/_doc/{}", index, doc_id);
        let resp = self.send(index, self.request(Method::GET, &path)).await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            let parsed: Value = serde_json::from_str(&body)
                .map_err(|e| IndexError::service(index, format!("invalid response body: {}", e)))?;
            return Ok(parsed.get("_source").cloned());
        }
        match decode_error(index, status, &body, &[]) {
            // A 404 for a missing document carries `"found": false`, not an error type.
            IndexError::NotFound { .. } if body.contains("\"found\":false") => Ok(None),
            e => Err(e),
        }
    }

    async fn count(&self, index: &str) -> Result<u64, IndexError> {
        let path = format!("{}/_count", index);
        let resp = self
            .send_ok(index, self.request(Method::GET, &path), &[])
            .await?;
        let body = Self::json_body(index, resp).await?;
        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| IndexError::service(index, "count response without count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompatible_mapping_is_decoded_with_field() {
        let body = r#"{"error":{"root_cause":[],"type":"illegal_argument_exception",
            "reason":"mapper [gain] cannot be changed from type [keyword] to [float]"},"status":400}"#;
        let err = decode_error("captures-drf", StatusCode::BAD_REQUEST, body, &["gain"]);
        match err {
            IndexError::IncompatibleMapping { field, index, .. } => {
                assert_eq!(field, "gain");
                assert_eq!(index, "captures-drf");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn already_exists_and_not_found_are_decoded() {
        let body = r#"{"error":{"type":"resource_already_exists_exception","reason":"index [captures-drf/abc] already exists"},"status":400}"#;
        assert!(matches!(
            decode_error("captures-drf", StatusCode::BAD_REQUEST, body, &[]),
            IndexError::AlreadyExists { .. }
        ));
        let body = r#"{"error":{"type":"index_not_found_exception","reason":"no such index"},"status":404}"#;
        assert!(matches!(
            decode_error("captures-drf", StatusCode::NOT_FOUND, body, &[]),
            IndexError::NotFound { .. }
        ));
    }

    #[test]
    fn other_failures_are_service_errors() {
        let err = decode_error("captures-drf", StatusCode::INTERNAL_SERVER_ERROR, "boom", &[]);
        assert!(matches!(err, IndexError::Service { ref message, .. } if message.contains("500")));

        // Outside a mapping update, illegal_argument_exception is not a mapping conflict.
        let body = r#"{"error":{"type":"illegal_argument_exception","reason":"bad doc"}}"#;
        assert!(matches!(
            decode_error("captures-drf", StatusCode::BAD_REQUEST, body, &[]),
            IndexError::Service { .. }
        ));
    }

    #[test]
    fn mapping_json_translates_both_ways() {
        let mapping: IndexMapping = [
            ("gain".to_string(), FieldType::Float),
            ("custom_attrs".to_string(), FieldType::Object),
        ]
        .into_iter()
        .collect();
        let value = mapping_to_json(&mapping);
        assert_eq!(value["properties"]["gain"]["type"], "float");

        let live = json!({
            "properties": {
                "gain": { "type": "float" },
                "custom_attrs": { "properties": { "note": { "type": "text" } } },
                "location": { "type": "geo_point" }
            }
        });
        let parsed = mapping_from_json(&live);
        assert_eq!(parsed["gain"], FieldType::Float);
        assert_eq!(parsed["custom_attrs"], FieldType::Object);
        assert!(!parsed.contains_key("location"));
    }
}
