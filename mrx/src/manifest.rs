//! MRX manifest document
//!
//! The manifest describes every data stream in a file. Its `Configuration`
//! section is also the encoder's stream configuration: per-stream properties
//! override `DefaultStreamProperties`.

use crate::error::Result;
use crate::types::{FrameRate, Rational, Umid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Manifest format version written by this crate.
pub const MANIFEST_VERSION: &str = "1.0";

/// MRX format version written by this crate.
pub const MRX_VERSION: &str = "1.0";

/// The whole manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestDocument {
    pub configuration: Configuration,
    pub manifest: Manifest,
}

/// Stream configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Configuration {
    #[serde(rename = "MRXVersion")]
    pub mrx_version: String,
    pub default_stream_properties: StreamProperties,
    /// Overrides by stream index
    #[serde(default)]
    pub stream_properties: BTreeMap<usize, StreamProperties>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            mrx_version: MRX_VERSION.to_string(),
            default_stream_properties: StreamProperties {
                stream_type: Some("data".to_string()),
                frame_rate: Some(FrameRate::Clocked(Rational::fps_25())),
                name_space: Some(String::new()),
            },
            stream_properties: BTreeMap::new(),
        }
    }
}

impl Configuration {
    /// Parse a configuration from JSON.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Properties of stream `index`: its overrides on top of the defaults.
    pub fn stream_properties_for(&self, index: usize) -> StreamProperties {
        match self.stream_properties.get(&index) {
            Some(overrides) => overrides.merged_over(&self.default_stream_properties),
            None => self.default_stream_properties.clone(),
        }
    }
}

/// Properties of one stream; unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamProperties {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<FrameRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_space: Option<String>,
}

impl StreamProperties {
    /// `self` with unset fields taken from `defaults`.
    pub fn merged_over(&self, defaults: &StreamProperties) -> StreamProperties {
        StreamProperties {
            stream_type: self.stream_type.clone().or_else(|| defaults.stream_type.clone()),
            frame_rate: self.frame_rate.or(defaults.frame_rate),
            name_space: self.name_space.clone().or_else(|| defaults.name_space.clone()),
        }
    }
}

/// The manifest proper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "UMID")]
    pub umid: Umid,
    #[serde(rename = "Mrx Manifest Version")]
    pub version: String,
    #[serde(rename = "MRXTool")]
    pub tool: String,
    #[serde(rename = "Data Streams")]
    pub data_streams: Vec<DataStream>,
    #[serde(rename = "History", default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

/// One stream as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataStream {
    #[serde(rename = "StreamID")]
    pub stream_id: usize,
    /// Canonical dotted-hex essence key
    pub essence_key: String,
    #[serde(rename = "Type")]
    pub stream_type: String,
    pub frame_rate: FrameRate,
    pub name_space: String,
    pub clocked: bool,
}

/// An earlier manifest of the same material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryEntry {
    /// When the earlier manifest was superseded, RFC 3339
    pub timestamp: String,
    #[serde(rename = "UMID")]
    pub umid: Umid,
    #[serde(rename = "MRXTool")]
    pub tool: String,
    #[serde(rename = "Data Streams")]
    pub data_streams: Vec<DataStream>,
}

impl ManifestDocument {
    /// New manifest for freshly encoded material.
    pub fn new(
        configuration: Configuration,
        umid: Umid,
        tool: impl Into<String>,
        data_streams: Vec<DataStream>,
    ) -> Self {
        ManifestDocument {
            configuration,
            manifest: Manifest {
                umid,
                version: MANIFEST_VERSION.to_string(),
                tool: tool.into(),
                data_streams,
                history: Vec::new(),
            },
        }
    }

    /// Carry `previous` and its own history into this manifest's history,
    /// oldest first.
    pub fn with_previous(mut self, previous: Option<ManifestDocument>) -> Self {
        if let Some(previous) = previous {
            let earlier = previous.manifest;
            let mut history = earlier.history;
            history.push(HistoryEntry {
                timestamp: chrono::Utc::now().to_rfc3339(),
                umid: earlier.umid,
                tool: earlier.tool,
                data_streams: earlier.data_streams,
            });
            history.append(&mut self.manifest.history);
            self.manifest.history = history;
        }
        self
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a manifest from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a manifest from a JSON reader.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}
