//! Decoded-layout document
//!
//! The decoder's output: one entry per partition with its byte counts,
//! index table, content packages and package-size statistics. Serializes to
//! YAML or JSON with the field names used by existing MRX tooling.

use crate::error::Result;
use crate::metadata::IndexTable;
use crate::partition::PartitionKind;
use crate::stats::Statistics;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Output document format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// The whole decoded file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Layout {
    /// File-level soft warnings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub partitions: Vec<PartitionLayout>,
}

/// One decoded partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartitionLayout {
    pub partition_type: PartitionKind,
    pub header_length: u64,
    pub essence_byte_count: u64,
    pub content_package_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_table: Option<IndexTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_packages: Vec<ContentPackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_package_statistics: Option<Statistics>,
}

impl PartitionLayout {
    /// An empty partition of the given kind.
    pub fn new(partition_type: PartitionKind) -> Self {
        PartitionLayout {
            partition_type,
            header_length: 0,
            essence_byte_count: 0,
            content_package_count: 0,
            index_table: None,
            warning: None,
            content_packages: Vec::new(),
            content_package_statistics: None,
        }
    }
}

/// Essence items sharing one content package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPackage {
    #[serde(rename = "ContentPackage")]
    pub items: Vec<EssenceItem>,
}

impl ContentPackage {
    /// Package length: the full KLV size of every item.
    pub fn total_length(&self) -> u64 {
        self.items.iter().map(|item| item.total_byte_count).sum()
    }

    /// Canonical key of the first item.
    pub fn first_key(&self) -> Option<&str> {
        self.items.first().map(|item| item.key.as_str())
    }

    /// Whether this package stands in for a run of skipped packages.
    pub fn is_skip_marker(&self) -> bool {
        self.items.first().map_or(false, |item| item.total_container_count.is_some())
    }
}

/// One essence KLV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EssenceItem {
    /// Canonical dotted-hex key
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub description: String,
    /// Byte offset of the record from the start of the stream
    pub file_offset: u64,
    /// Value length
    pub length: u64,
    /// Key, length field and value
    pub total_byte_count: u64,
    /// Packages collapsed into a skip marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_container_count: Option<u64>,
}

impl Layout {
    /// Content packages across every partition.
    pub fn content_package_total(&self) -> usize {
        self.partitions.iter().map(|p| p.content_packages.len()).sum()
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render in the requested format.
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Yaml => self.to_yaml(),
            OutputFormat::Json => self.to_json(),
        }
    }

    /// Write the rendered document to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Yaml => serde_yaml::to_writer(&mut *writer, self)?,
            OutputFormat::Json => serde_json::to_writer_pretty(&mut *writer, self)?,
        }
        writer.flush()?;
        Ok(())
    }
}
