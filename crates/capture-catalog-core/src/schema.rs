//! Schema registry and metadata validation.
//!
//! Each [`CaptureType`] has a [`CaptureSchema`]: the fields the catalog
//! knows about, their expected [`FieldType`], and whether they are
//! required. The same schema drives two things:
//!
//! - validation of extracted metadata ([`CaptureSchema::validate`]), and
//! - the target search-index mapping (see [`crate::lifecycle`]).
//!
//! # Key matching
//!
//! Archive formats nest property names under prefixes
//! (`mboard_info/center_freq`), so a schema field matches a raw key when
//! one of its patterns is a substring of that key. Patterns are the field
//! name followed by any aliases and are precomputed per schema. For each
//! field, an exact match on any pattern wins over a substring match; within
//! each pass raw keys are scanned in sorted order and the first unclaimed
//! key wins.
//!
//! # Faults
//!
//! Validation never fails. A value that cannot be coerced to its declared
//! type is dropped with a warning; a missing required field is reported
//! with a warning. Raw keys no field claims are moved into `custom_attrs`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::models::CaptureType;

/// Key under which unmatched raw properties are collected.
pub const CUSTOM_ATTRS: &str = "custom_attrs";

/// Declared type of a metadata field. Names follow search-index mapping types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Text,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Date,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Keyword => "keyword",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "keyword" => FieldType::Keyword,
            "text" => FieldType::Text,
            "integer" => FieldType::Integer,
            "long" => FieldType::Long,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "object" | "nested" => FieldType::Object,
            other => bail!("Unsupported field type: '{}'", other),
        })
    }
}

/// One field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub aliases: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            aliases: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Non-fatal validation findings. Each one is also logged.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// The value under `raw_key` could not be coerced; the field was dropped.
    CoercionFailed {
        field: String,
        raw_key: String,
        value: String,
        expected: FieldType,
    },
    /// A required field was not found in the raw map.
    MissingRequired { field: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::CoercionFailed {
                field,
                raw_key,
                value,
                expected,
            } => write!(
                f,
                "field '{}' (from '{}') dropped: cannot coerce {} to {}",
                field, raw_key, value, expected
            ),
            ValidationWarning::MissingRequired { field } => {
                write!(f, "required field '{}' is missing", field)
            }
        }
    }
}

/// Output of [`CaptureSchema::validate`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedMetadata {
    /// Schema fields under their canonical names, coerced to declared types.
    pub fields: Map<String, Value>,
    /// Raw properties no schema field claimed.
    pub custom_attrs: Map<String, Value>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidatedMetadata {
    /// Flatten into the normalized property map: canonical fields plus a
    /// `custom_attrs` object when any unclaimed properties exist.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut out = self.fields.clone();
        if !self.custom_attrs.is_empty() {
            out.insert(
                CUSTOM_ATTRS.to_string(),
                Value::Object(self.custom_attrs.clone()),
            );
        }
        out
    }
}

/// Field definitions for one capture type, with the precomputed alias table.
#[derive(Debug, Clone)]
pub struct CaptureSchema {
    capture_type: CaptureType,
    fields: Vec<FieldSpec>,
    /// `patterns[i]` holds the raw-key patterns for `fields[i]`, name first.
    patterns: Vec<Vec<String>>,
}

impl CaptureSchema {
    pub fn new(capture_type: CaptureType, fields: Vec<FieldSpec>) -> Self {
        let patterns = fields
            .iter()
            .map(|f| {
                let mut p = vec![f.name.clone()];
                for alias in &f.aliases {
                    if !p.contains(alias) {
                        p.push(alias.clone());
                    }
                }
                p
            })
            .collect();
        Self {
            capture_type,
            fields,
            patterns,
        }
    }

    pub fn capture_type(&self) -> CaptureType {
        self.capture_type
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Map each schema field to the raw key it claims, in field order.
    fn resolve_keys<'k>(&self, raw_keys: &[&'k str]) -> Vec<Option<&'k str>> {
        let mut claimed: BTreeSet<&str> = BTreeSet::new();
        let mut resolved = Vec::with_capacity(self.fields.len());

        for patterns in &self.patterns {
            let exact = patterns.iter().find_map(|p| {
                raw_keys
                    .iter()
                    .copied()
                    .find(|k| *k == p.as_str() && !claimed.contains(k))
            });
            let found = exact.or_else(|| {
                patterns.iter().find_map(|p| {
                    raw_keys
                        .iter()
                        .copied()
                        .find(|k| k.contains(p.as_str()) && !claimed.contains(k))
                })
            });
            if let Some(k) = found {
                claimed.insert(k);
            }
            resolved.push(found);
        }
        resolved
    }

    /// Validate and normalize a raw property map.
    ///
    /// Validating an already-validated map (see [`ValidatedMetadata::to_map`])
    /// returns it unchanged.
    pub fn validate(&self, raw: &Map<String, Value>) -> ValidatedMetadata {
        let mut out = ValidatedMetadata::default();

        if let Some(Value::Object(existing)) = raw.get(CUSTOM_ATTRS) {
            out.custom_attrs = existing.clone();
        }

        let mut raw_keys: Vec<&str> = raw
            .keys()
            .map(String::as_str)
            .filter(|k| *k != CUSTOM_ATTRS || !raw[*k].is_object())
            .collect();
        raw_keys.sort_unstable();

        let resolved = self.resolve_keys(&raw_keys);
        let mut consumed: BTreeSet<&str> = BTreeSet::new();

        for (spec, key) in self.fields.iter().zip(resolved) {
            let Some(key) = key else {
                if spec.required {
                    tracing::warn!(
                        capture_type = %self.capture_type,
                        field = %spec.name,
                        "required metadata field missing"
                    );
                    out.warnings.push(ValidationWarning::MissingRequired {
                        field: spec.name.clone(),
                    });
                }
                continue;
            };
            consumed.insert(key);
            let value = &raw[key];

            if value.is_null() {
                if spec.required {
                    tracing::warn!(
                        capture_type = %self.capture_type,
                        field = %spec.name,
                        "required metadata field is null"
                    );
                    out.warnings.push(ValidationWarning::MissingRequired {
                        field: spec.name.clone(),
                    });
                }
                continue;
            }

            match coerce(value, spec.field_type) {
                Some(v) => {
                    out.fields.insert(spec.name.clone(), v);
                }
                None => {
                    tracing::warn!(
                        capture_type = %self.capture_type,
                        field = %spec.name,
                        raw_key = %key,
                        expected = %spec.field_type,
                        "dropping metadata field that failed type coercion"
                    );
                    out.warnings.push(ValidationWarning::CoercionFailed {
                        field: spec.name.clone(),
                        raw_key: key.to_string(),
                        value: value.to_string(),
                        expected: spec.field_type,
                    });
                }
            }
        }

        for key in raw_keys {
            if !consumed.contains(key) {
                out.custom_attrs.insert(key.to_string(), raw[key].clone());
            }
        }

        out
    }
}

/// Coerce `value` to `ty`, returning `None` when no lossless reading exists.
pub fn coerce(value: &Value, ty: FieldType) -> Option<Value> {
    match ty {
        FieldType::Integer | FieldType::Long => coerce_int(value).map(Value::from),
        FieldType::Float | FieldType::Double => coerce_float(value)
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => coerce_bool(value).map(Value::Bool),
        FieldType::Keyword | FieldType::Text => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        FieldType::Date => match value {
            Value::String(s) if !s.trim().is_empty() => Some(value.clone()),
            Value::Number(_) => Some(value.clone()),
            _ => None,
        },
        FieldType::Object => match value {
            Value::Object(_) => Some(value.clone()),
            _ => None,
        },
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Per-capture-type schemas.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<CaptureType, CaptureSchema>,
}

impl SchemaRegistry {
    /// Registry with the built-in schemas for every [`CaptureType`].
    pub fn builtin() -> Self {
        let mut schemas = HashMap::new();
        for schema in [drf_schema(), radiohound_schema(), sigmf_schema()] {
            schemas.insert(schema.capture_type(), schema);
        }
        Self { schemas }
    }

    /// Replace the schema for its capture type.
    /// A registry with no schemas; add them with [`Self::with_schema`].
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn with_schema(mut self, schema: CaptureSchema) -> Self {
        self.schemas.insert(schema.capture_type(), schema);
        self
    }

    pub fn schema(&self, capture_type: CaptureType) -> anyhow::Result<&CaptureSchema> {
        match self.schemas.get(&capture_type) {
            Some(s) => Ok(s),
            None => bail!("No schema registered for capture type '{}'", capture_type),
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn drf_schema() -> CaptureSchema {
    use FieldType::*;
    CaptureSchema::new(
        CaptureType::Drf,
        vec![
            FieldSpec::new("samples_per_second", Double).required(),
            FieldSpec::new("sample_rate_numerator", Long),
            FieldSpec::new("sample_rate_denominator", Long),
            FieldSpec::new("start_bound", Double).required(),
            FieldSpec::new("end_bound", Double).required(),
            FieldSpec::new("center_freq", Double)
                .required()
                .alias("center_frequencies"),
            FieldSpec::new("span", Double),
            FieldSpec::new("gain", Float),
            FieldSpec::new("bandwidth", Double),
            FieldSpec::new("is_complex", Boolean),
            FieldSpec::new("is_continuous", Boolean),
            FieldSpec::new("num_subchannels", Integer),
            FieldSpec::new("subdir_cadence_secs", Integer),
            FieldSpec::new("file_cadence_millisecs", Integer),
            FieldSpec::new("epoch", Keyword),
            FieldSpec::new("digital_rf_version", Keyword),
            FieldSpec::new("uuid_str", Keyword),
            FieldSpec::new("init_utc_timestamp", Long),
            FieldSpec::new("computer_time", Long),
            FieldSpec::new("sequence_num", Long),
        ],
    )
}

fn radiohound_schema() -> CaptureSchema {
    use FieldType::*;
    CaptureSchema::new(
        CaptureType::RadioHound,
        vec![
            FieldSpec::new("center_frequency", Double).required(),
            FieldSpec::new("sample_rate", Double).required(),
            FieldSpec::new("timestamp", Date).required(),
            FieldSpec::new("latitude", Double),
            FieldSpec::new("longitude", Double),
            FieldSpec::new("altitude", Double),
            FieldSpec::new("gain", Float),
            FieldSpec::new("mac_address", Keyword),
            FieldSpec::new("short_name", Keyword),
            FieldSpec::new("scan_time", Double),
            FieldSpec::new("hardware_version", Keyword),
            FieldSpec::new("software_version", Keyword),
        ],
    )
}

fn sigmf_schema() -> CaptureSchema {
    use FieldType::*;
    CaptureSchema::new(
        CaptureType::SigMf,
        vec![
            FieldSpec::new("datatype", Keyword).required(),
            FieldSpec::new("sample_rate", Double).required(),
            FieldSpec::new("frequency", Double).alias("center_freq"),
            FieldSpec::new("datetime", Date),
            FieldSpec::new("hw", Text),
            FieldSpec::new("author", Keyword),
            FieldSpec::new("description", Text),
            FieldSpec::new("version", Keyword),
        ],
    )
}
