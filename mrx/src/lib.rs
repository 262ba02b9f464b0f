//! MRX (MXF-family) streaming container engine
//!
//! This crate decodes and encodes MRX files: partitioned, KLV-encoded
//! containers carrying header metadata, interleaved essence streams, index
//! tables, a Random Index Pack and a manifest describing the streams.
//!
//! # Features
//!
//! - Streaming decode over any [`tokio::io::AsyncRead`], with KLV records
//!   reassembled across read-buffer boundaries
//! - Partition walking with content-package grouping and size statistics
//! - Content-package sampling for summarizing large files
//! - YAML or JSON layout documents
//! - Encoding of clocked and unclocked data streams with header metadata,
//!   an embedded manifest and a Random Index Pack
//!
//! # Example
//!
//! ```no_run
//! use mrx::{decode, DecoderConfig};
//!
//! # async fn run() -> mrx::Result<()> {
//! let file = tokio::fs::File::open("captions.mrx").await?;
//! let layout = decode(file, &DecoderConfig::default()).await?;
//!
//! println!("Partitions: {}", layout.partitions.len());
//! println!("{}", layout.to_yaml()?);
//! # Ok(())
//! # }
//! ```

pub mod ber;
mod decoder;
mod encoder;
mod error;
mod klv;
mod layout;
mod manifest;
mod metadata;
mod partition;
mod registry;
pub mod sampler;
mod source;
mod stats;
mod stream;
mod streams;
mod types;
mod ul;

pub use decoder::{decode, decode_to_string, decode_with, DecoderConfig, ESSENCE_IN_HEADER, MISSING_RIP};
pub use encoder::{
    stream_key, EncodeSummary, EncoderConfig, EssenceTask, MrxEncoder, StreamDescription,
    StreamInformation, StreamSource,
};
pub use error::{MrxError, Result};
pub use klv::{local_set_items, read_local_set, write_local_set, Klv};
pub use layout::{ContentPackage, EssenceItem, Layout, OutputFormat, PartitionLayout};
pub use manifest::{
    Configuration, DataStream, HistoryEntry, Manifest, ManifestDocument, StreamProperties,
    MANIFEST_VERSION, MRX_VERSION,
};
pub use metadata::{
    decode_index_table, GroupEncoder, HeaderContext, HeaderMetadata, IndexTable, IndexValue,
    PrimerMap, PrimerPack,
};
pub use partition::{PartitionKind, PartitionPack, PartitionStatus, RandomIndexPack, RipEntry};
pub use registry::{EssenceRegistry, EssenceResolver, EssenceType, UNKNOWN_SYMBOL_PREFIX};
pub use source::{chunk_size, read_chunks, Chunk, CHUNK_BUDGET};
pub use stats::{RunningStats, Statistics};
pub use stream::KlvStream;
pub use streams::{EssenceKind, MemoryStreams, SingleStream};
pub use types::{EditRate, FrameRate, Rational, Umid};
pub use ul::{dotted_hex, labels, UniversalLabel, SKIP_MARKER_KEY, UL};
