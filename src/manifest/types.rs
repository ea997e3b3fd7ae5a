//! On-disk record types of the manifest file
//!
//! Every line of a manifest is one JSON object. The first lines form the
//! header (version, type and, for videos, properties); every line after the
//! header is one entry.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ManifestError, Result};

/// Version written into new manifests
pub const MANIFEST_VERSION: &str = "1.1";

/// Versions this crate can read
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1"];

/// Default manifest file name
pub const MANIFEST_FILE_NAME: &str = "manifest.jsonl";

/// Default persisted index file name
pub const INDEX_FILE_NAME: &str = "index.json";

/// Kind of media a manifest describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestType {
    Video,
    Images,
}

impl ManifestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestType::Video => "video",
            ManifestType::Images => "images",
        }
    }

    /// Number of header lines before the first entry
    pub fn header_lines(&self) -> usize {
        match self {
            ManifestType::Video => 3,
            ManifestType::Images => 2,
        }
    }
}

impl std::fmt::Display for ManifestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct VersionLine {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TypeLine {
    #[serde(rename = "type")]
    pub manifest_type: ManifestType,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PropertiesLine {
    pub properties: VideoProperties,
}

/// Header block of a video manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProperties {
    /// File name of the video, without directories
    pub name: String,
    /// `(width, height)` after applying stored rotation
    pub resolution: (u32, u32),
    /// Total number of decoded frames
    pub length: usize,
}

/// One verified keyframe of a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFrameEntry {
    /// Position of the keyframe among the manifest entries, from 0 without gaps
    pub number: usize,
    /// Presentation timestamp in the stream's timebase
    pub pts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// One image of an image collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageProperties {
    /// Path without extension, `/`-separated, relative to the data root
    pub name: String,
    /// Extension including the leading dot, or empty
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ImageProperties {
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            width: None,
            height: None,
            meta: None,
            checksum: None,
        }
    }

    /// `name` followed by `extension`
    pub fn full_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }

    /// Copy with empty optional values dropped
    pub(crate) fn without_empty_optionals(&self) -> Self {
        let meta = self.meta.clone().filter(|m| match m {
            Value::Null => false,
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        });
        let checksum = self.checksum.clone().filter(|c| !c.is_empty());
        Self {
            name: self.name.clone(),
            extension: self.extension.clone(),
            width: self.width,
            height: self.height,
            meta,
            checksum,
        }
    }
}

/// A record type that can appear as a manifest entry
pub trait ManifestEntry: Serialize + DeserializeOwned {
    /// Fields that must be present (and non-null) on every entry line
    const REQUIRED_FIELDS: &'static [&'static str];
}

impl ManifestEntry for VideoFrameEntry {
    const REQUIRED_FIELDS: &'static [&'static str] = &["number", "pts"];
}

impl ManifestEntry for ImageProperties {
    const REQUIRED_FIELDS: &'static [&'static str] = &["name", "extension"];
}

/// Parse one entry line, checking required fields first.
///
/// `manifest_name` is only used in error messages.
pub(crate) fn parse_entry<E: ManifestEntry>(line: &str, manifest_name: &str) -> Result<E> {
    let value: Value = serde_json::from_str(line.trim_end()).map_err(|e| {
        ManifestError::InvalidManifest(format!(
            "Invalid '{}' file structure: {}",
            manifest_name, e
        ))
    })?;

    let Some(object) = value.as_object() else {
        return Err(ManifestError::InvalidManifest(format!(
            "Invalid '{}' file structure: entry is not an object",
            manifest_name
        )));
    };

    for field in E::REQUIRED_FIELDS {
        if object.get(*field).map_or(true, Value::is_null) {
            return Err(ManifestError::InvalidManifest(format!(
                "Invalid '{}' file structure: '{}' is required, but not found",
                manifest_name, field
            )));
        }
    }

    serde_json::from_value(value).map_err(|e| {
        ManifestError::InvalidManifest(format!(
            "Invalid '{}' file structure: {}",
            manifest_name, e
        ))
    })
}

/// Serialize one record as a compact JSON line
pub(crate) fn write_line<W: std::io::Write, T: Serialize>(writer: &mut W, record: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    Ok(())
}
