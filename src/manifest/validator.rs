//! Structural checks of manifest files
//!
//! Only the header and the first entry are inspected, so these are cheap
//! enough to run on every upload.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde_json::Value;

use super::types::{ManifestType, SUPPORTED_VERSIONS};
use crate::error::{ManifestError, Result};

/// Whether `path` looks like a video manifest
pub fn is_video_manifest<P: AsRef<Path>>(path: P) -> bool {
    validate_manifest(path, ManifestType::Video).is_ok()
}

/// Whether `path` looks like an image manifest
pub fn is_dataset_manifest<P: AsRef<Path>>(path: P) -> bool {
    validate_manifest(path, ManifestType::Images).is_ok()
}

/// Whether `path` looks like a manifest of either type
pub fn is_manifest<P: AsRef<Path>>(path: P) -> bool {
    is_video_manifest(path.as_ref()) || is_dataset_manifest(path.as_ref())
}

/// Check the header and first entry of `path` against `expected`.
///
/// The error describes the first problem found.
pub fn validate_manifest<P: AsRef<Path>>(path: P, expected: ManifestType) -> Result<()> {
    let mut lines = HeaderLines::open(path.as_ref())?;

    let version = lines.next_object()?;
    let version = version.get("version").and_then(Value::as_str).unwrap_or_default();
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(invalid(format!("unsupported version {:?}", version)));
    }

    let kind = lines.next_object()?;
    let kind = kind.get("type").and_then(Value::as_str).unwrap_or_default();
    if kind != expected.as_str() {
        return Err(invalid(format!("expected type {:?}, found {:?}", expected.as_str(), kind)));
    }

    match expected {
        ManifestType::Video => {
            let properties = lines.next_object()?;
            let properties = properties
                .get("properties")
                .ok_or_else(|| invalid("missing properties".to_string()))?;
            check_video_properties(properties)?;
            let first = lines.next_object()?;
            require(&first, "number", Value::is_i64)?;
            require(&first, "pts", Value::is_i64)?;
        }
        ManifestType::Images => {
            let first = lines.next_object()?;
            require(&first, "name", Value::is_string)?;
            require(&first, "extension", Value::is_string)?;
        }
    }
    Ok(())
}

fn check_video_properties(properties: &Value) -> Result<()> {
    require(properties, "name", Value::is_string)?;
    require(properties, "resolution", Value::is_array)?;
    match properties.get("length").and_then(Value::as_i64) {
        Some(length) if length != 0 => Ok(()),
        _ => Err(invalid("'length' must be a non-zero integer".to_string())),
    }
}

fn require(object: &Value, field: &str, check: fn(&Value) -> bool) -> Result<()> {
    match object.get(field) {
        Some(value) if check(value) => Ok(()),
        Some(_) => Err(invalid(format!("'{}' has the wrong type", field))),
        None => Err(invalid(format!("'{}' is required, but not found", field))),
    }
}

fn invalid(message: String) -> ManifestError {
    ManifestError::InvalidManifest(message)
}

struct HeaderLines {
    lines: Lines<BufReader<File>>,
}

impl HeaderLines {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            lines: BufReader::new(File::open(path)?).lines(),
        })
    }

    fn next_object(&mut self) -> Result<Value> {
        let line = self
            .lines
            .next()
            .transpose()?
            .ok_or_else(|| invalid("unexpected end of file".to_string()))?;
        Ok(serde_json::from_str(&line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manifest(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    const VIDEO_HEADER: [&str; 3] = [
        r#"{"version":"1.1"}"#,
        r#"{"type":"video"}"#,
        r#"{"properties":{"name":"a.mp4","resolution":[640,480],"length":20}}"#,
    ];

    #[test]
    fn test_valid_video_manifest() {
        let mut lines = VIDEO_HEADER.to_vec();
        lines.push(r#"{"number":0,"pts":0,"checksum":"aa"}"#);
        let file = manifest(&lines);
        assert!(is_video_manifest(file.path()));
        assert!(!is_dataset_manifest(file.path()));
        assert!(is_manifest(file.path()));
    }

    #[test]
    fn test_valid_image_manifest() {
        let file = manifest(&[
            r#"{"version":"1.0"}"#,
            r#"{"type":"images"}"#,
            r#"{"name":"a","extension":".jpg","width":1,"height":1}"#,
        ]);
        assert!(is_dataset_manifest(file.path()));
        assert!(!is_video_manifest(file.path()));
    }

    #[test]
    fn test_unsupported_version() {
        let file = manifest(&[
            r#"{"version":"2.0"}"#,
            r#"{"type":"images"}"#,
            r#"{"name":"a","extension":".jpg"}"#,
        ]);
        assert!(!is_dataset_manifest(file.path()));
    }

    #[test]
    fn test_zero_length_video() {
        let file = manifest(&[
            VIDEO_HEADER[0],
            VIDEO_HEADER[1],
            r#"{"properties":{"name":"a.mp4","resolution":[640,480],"length":0}}"#,
            r#"{"number":0,"pts":0}"#,
        ]);
        assert!(!is_video_manifest(file.path()));

        let negative = manifest(&[
            VIDEO_HEADER[0],
            VIDEO_HEADER[1],
            r#"{"properties":{"name":"a.mp4","resolution":[640,480],"length":-3}}"#,
            r#"{"number":0,"pts":0}"#,
        ]);
        assert!(is_video_manifest(negative.path()));

        let fractional = manifest(&[
            VIDEO_HEADER[0],
            VIDEO_HEADER[1],
            r#"{"properties":{"name":"a.mp4","resolution":[640,480],"length":2.5}}"#,
            r#"{"number":0,"pts":0}"#,
        ]);
        assert!(!is_video_manifest(fractional.path()));
    }

    #[test]
    fn test_wrong_field_types() {
        let mut lines = VIDEO_HEADER.to_vec();
        lines.push(r#"{"number":"0","pts":0}"#);
        let file = manifest(&lines);
        let err = validate_manifest(file.path(), ManifestType::Video).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifest(ref m) if m.contains("'number'")));
    }

    #[test]
    fn test_missing_entries_and_garbage() {
        let file = manifest(&VIDEO_HEADER);
        assert!(!is_video_manifest(file.path()));

        let garbage = manifest(&["not json"]);
        assert!(!is_manifest(garbage.path()));
        assert!(!is_manifest("/nonexistent/manifest.jsonl"));
    }

    #[test]
    fn test_empty_file() {
        let file = manifest(&[]);
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), 0);
        assert!(!is_video_manifest(file.path()));
        assert!(!is_dataset_manifest(file.path()));
    }

    #[test]
    fn test_truncated_lines() {
        let header = manifest(&[r#"{"version":"1."#]);
        assert!(!is_video_manifest(header.path()));
        assert!(!is_dataset_manifest(header.path()));

        let mut lines = VIDEO_HEADER.to_vec();
        lines.push(r#"{"number":0,"pt"#);
        let video = manifest(&lines);
        assert!(!is_video_manifest(video.path()));

        let images = manifest(&[
            r#"{"version":"1.1"}"#,
            r#"{"type":"images"}"#,
            r#"{"name":"a","exten"#,
        ]);
        assert!(!is_dataset_manifest(images.path()));
    }

    #[test]
    fn test_placeholder_first_entry() {
        let file = manifest(&[r#"{"version":"1.1"}"#, r#"{"type":"images"}"#, "{}"]);
        assert!(!is_dataset_manifest(file.path()));
    }
}
