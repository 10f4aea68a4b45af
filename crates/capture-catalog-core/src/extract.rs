//! Channel metadata extraction.
//!
//! Reads a channel's sample bounds and properties from an archive, converts
//! the bounds to epoch seconds using the reported sample rate, overlays the
//! forward-filled auxiliary metadata, and validates the merged map against
//! the capture type's schema.
//!
//! Only an unopenable archive or unreadable bounds abort extraction.
//! Unreadable properties or auxiliary metadata are logged and skipped. A
//! channel without a usable sample rate gets no time bounds; schema
//! validation then reports the missing fields as warnings.

use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::archive::{ArchiveError, ArchiveReader};
use crate::fill::FillPolicy;
use crate::schema::{coerce, CaptureSchema, FieldType, ValidatedMetadata};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot open archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error("cannot read bounds for channel '{channel}': {source}")]
    Bounds {
        channel: String,
        #[source]
        source: ArchiveError,
    },
}

/// Sample-index bounds converted to seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBounds {
    pub start_index: u64,
    pub end_index: u64,
    pub samples_per_second: f64,
    pub start_bound: f64,
    pub end_bound: f64,
}

impl TimeBounds {
    pub fn from_samples(start_index: u64, end_index: u64, samples_per_second: f64) -> Self {
        Self {
            start_index,
            end_index,
            samples_per_second,
            start_bound: start_index as f64 / samples_per_second,
            end_bound: end_index as f64 / samples_per_second,
        }
    }
}

/// Sample rate from `samples_per_second`, or from the numerator/denominator
/// pair when only those are present.
pub fn sample_rate(properties: &Map<String, Value>) -> Option<f64> {
    let as_f64 = |key: &str| {
        properties
            .get(key)
            .and_then(|v| coerce(v, FieldType::Double))
            .and_then(|v| v.as_f64())
    };

    let rate = as_f64("samples_per_second").or_else(|| {
        let num = as_f64("sample_rate_numerator")?;
        let den = as_f64("sample_rate_denominator")?;
        (den != 0.0).then(|| num / den)
    })?;

    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Read and merge a channel's raw metadata. Keys from auxiliary metadata
/// override archive properties; computed bounds override both.
///
/// Bounds are `None` when the channel reports no usable sample rate.
pub fn extract_channel(
    reader: &dyn ArchiveReader,
    path: &Path,
    channel: &str,
) -> Result<(Map<String, Value>, Option<TimeBounds>), ExtractError> {
    let handle = reader.open(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let (start, end) = handle
        .bounds(channel)
        .map_err(|source| ExtractError::Bounds {
            channel: channel.to_string(),
            source,
        })?;

    let mut merged = match handle.properties(channel, start) {
        Ok(properties) => properties,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                channel,
                error = %e,
                "channel properties unreadable"
            );
            Map::new()
        }
    };

    let bounds = sample_rate(&merged).map(|rate| TimeBounds::from_samples(start, end, rate));
    if bounds.is_none() {
        tracing::warn!(
            path = %path.display(),
            channel,
            "no usable sample rate; time bounds omitted"
        );
        merged.remove("samples_per_second");
    }

    match handle.digital_metadata(channel, start, FillPolicy::Forward) {
        Ok(aux) => merged.extend(aux),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                channel,
                error = %e,
                "auxiliary metadata unreadable; using archive properties only"
            );
        }
    }

    if let Some(bounds) = &bounds {
        for (key, value) in [
            ("start_bound", bounds.start_bound),
            ("end_bound", bounds.end_bound),
            ("samples_per_second", bounds.samples_per_second),
        ] {
            if let Some(n) = Number::from_f64(value) {
                merged.insert(key.to_string(), Value::Number(n));
            }
        }
    }

    Ok((merged, bounds))
}

/// Extract a channel and validate it against `schema`.
pub fn extract_metadata(
    reader: &dyn ArchiveReader,
    schema: &CaptureSchema,
    path: &Path,
    channel: &str,
) -> Result<ValidatedMetadata, ExtractError> {
    let (raw, _) = extract_channel(reader, path, channel)?;
    Ok(schema.validate(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::{InMemoryArchive, InMemoryChannel};
    use crate::models::CaptureType;
    use crate::schema::{SchemaRegistry, ValidationWarning};
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn archive() -> InMemoryArchive {
        InMemoryArchive::new().with_channel(
            "/data/run-42",
            "ch0",
            InMemoryChannel::new(
                1_000_000,
                1_150_000,
                obj(json!({ "samples_per_second": 150000, "is_complex": true })),
            )
            .with_metadata(vec![
                (0, obj(json!({ "center_freq": "100000000", "gain": 10.0 }))),
                (2_000_000, obj(json!({ "gain": 30.0 }))),
                (900_000, obj(json!({ "is_complex": false }))),
            ]),
        )
    }

    #[test]
    fn bounds_are_converted_to_seconds() {
        let (raw, bounds) =
            extract_channel(&archive(), Path::new("/data/run-42"), "ch0").unwrap();
        let bounds = bounds.unwrap();
        assert!((bounds.start_bound - 6.667).abs() < 1e-3);
        assert!((bounds.end_bound - 7.667).abs() < 1e-3);
        assert!((raw["start_bound"].as_f64().unwrap() - 6.6667).abs() < 1e-3);
    }

    #[test]
    fn auxiliary_metadata_is_forward_filled_and_overrides() {
        let (raw, _) = extract_channel(&archive(), Path::new("/data/run-42"), "ch0").unwrap();
        // Recorded at 0, still valid at 1_000_000; the 2_000_000 record is ahead.
        assert_eq!(raw["gain"], json!(10.0));
        // Auxiliary value recorded at 900_000 overrides the property.
        assert_eq!(raw["is_complex"], json!(false));
    }

    #[test]
    fn extracted_metadata_validates() {
        let registry = SchemaRegistry::builtin();
        let v = extract_metadata(
            &archive(),
            registry.schema(CaptureType::Drf).unwrap(),
            Path::new("/data/run-42"),
            "ch0",
        )
        .unwrap();
        assert_eq!(v.fields["center_freq"].as_f64(), Some(100_000_000.0));
        assert!(v.warnings.is_empty(), "{:?}", v.warnings);
    }

    #[test]
    fn bad_field_does_not_fail_extraction() {
        let reader = InMemoryArchive::new().with_channel(
            "/a",
            "ch0",
            InMemoryChannel::new(0, 10, obj(json!({ "samples_per_second": 10, "center_freq": "abc" }))),
        );
        let registry = SchemaRegistry::builtin();
        let v = extract_metadata(
            &reader,
            registry.schema(CaptureType::Drf).unwrap(),
            Path::new("/a"),
            "ch0",
        )
        .unwrap();
        assert!(!v.fields.contains_key("center_freq"));
        assert!(v.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::CoercionFailed { field, .. } if field == "center_freq"
        )));
    }

    #[test]
    fn missing_archive_is_fatal() {
        let err = extract_channel(&archive(), Path::new("/nope"), "ch0").unwrap_err();
        assert!(matches!(err, ExtractError::Open { .. }));
    }

    #[test]
    fn unreadable_bounds_are_fatal() {
        let mut channel = InMemoryChannel::new(0, 1, obj(json!({ "samples_per_second": 1 })));
        channel.bounds = None;
        let reader = InMemoryArchive::new().with_channel("/a", "ch0", channel);
        let err = extract_channel(&reader, Path::new("/a"), "ch0").unwrap_err();
        assert!(matches!(err, ExtractError::Bounds { .. }));

        let err = extract_channel(&reader, Path::new("/a"), "ch9").unwrap_err();
        assert!(matches!(err, ExtractError::Bounds { .. }));
    }

    #[test]
    fn missing_sample_rate_still_produces_metadata() {
        let reader = InMemoryArchive::new().with_channel(
            "/a",
            "ch0",
            InMemoryChannel::new(0, 10, obj(json!({ "center_freq": 1.0e8, "gain": 3 }))),
        );
        let (raw, bounds) = extract_channel(&reader, Path::new("/a"), "ch0").unwrap();
        assert!(bounds.is_none());
        assert!(!raw.contains_key("start_bound"));

        let registry = SchemaRegistry::builtin();
        let v = extract_metadata(
            &reader,
            registry.schema(CaptureType::Drf).unwrap(),
            Path::new("/a"),
            "ch0",
        )
        .unwrap();
        assert_eq!(v.fields["center_freq"].as_f64(), Some(1.0e8));
        assert!(!v.fields.contains_key("start_bound"));
        assert!(v.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::MissingRequired { field } if field == "start_bound"
        )));
    }

    #[test]
    fn unreadable_properties_are_skipped() {
        let mut channel = InMemoryChannel::new(0, 10, obj(json!({ "samples_per_second": 10 })));
        channel.unreadable_properties = true;
        let channel = channel.with_metadata(vec![(0, obj(json!({ "gain": 7.0 })))]);
        let reader = InMemoryArchive::new().with_channel("/a", "ch0", channel);
        let (raw, bounds) = extract_channel(&reader, Path::new("/a"), "ch0").unwrap();
        assert!(bounds.is_none());
        assert_eq!(raw["gain"], json!(7.0));
    }

    #[test]
    fn sample_rate_from_rational() {
        let props = obj(json!({ "sample_rate_numerator": 1_000_000, "sample_rate_denominator": 4 }));
        assert_eq!(sample_rate(&props), Some(250_000.0));
        assert_eq!(sample_rate(&obj(json!({ "samples_per_second": 0 }))), None);
    }
}
