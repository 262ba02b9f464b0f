//! Streaming MRX decoder
//!
//! A producer task reads the byte source in chunks while the decoder pulls
//! complete KLVs from a [`KlvStream`] and walks the partition structure:
//!
//! - a partition pack seals the current partition and opens the next,
//!   after which the declared header metadata and index table bytes are
//!   consumed;
//! - fill items are skipped;
//! - everything else is essence, grouped into content packages;
//! - the Random Index Pack ends the walk.

use crate::error::{MrxError, Result};
use crate::klv::Klv;
use crate::layout::{ContentPackage, EssenceItem, Layout, OutputFormat, PartitionLayout};
use crate::metadata::{decode_index_table, IndexTable, PrimerMap, PrimerPack};
use crate::partition::{PartitionKind, PartitionPack};
use crate::registry::EssenceResolver;
use crate::sampler::apply_limits;
use crate::source::read_chunks;
use crate::stats::RunningStats;
use crate::stream::KlvStream;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Warning recorded for essence inside a header partition.
pub const ESSENCE_IN_HEADER: &str = "essence found in the partition header";

/// Warning recorded when the stream ends without a Random Index Pack.
pub const MISSING_RIP: &str = "no random index pack found before the end of the stream";

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Splits the read budget into smaller chunks; 1 reads the largest chunks
    pub chunk_divisor: usize,
    /// Chunks buffered between the reader and the decoder
    pub channel_capacity: usize,
    /// Keep-window widths for content package sampling; empty keeps everything
    pub content_package_limits: Vec<usize>,
    /// Format used by [`decode_to_string`]
    pub output_format: OutputFormat,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            chunk_divisor: 1,
            channel_capacity: 64,
            content_package_limits: Vec::new(),
            output_format: OutputFormat::Yaml,
        }
    }
}

/// Decode `source` into a layout with a fresh essence resolver.
pub async fn decode<R>(source: R, config: &DecoderConfig) -> Result<Layout>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut resolver = EssenceResolver::default();
    decode_with(source, config, &mut resolver).await
}

/// Decode and render the layout in `config.output_format`.
pub async fn decode_to_string<R>(source: R, config: &DecoderConfig) -> Result<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    decode(source, config).await?.render(config.output_format)
}

/// Decode `source` using `resolver` for essence types.
///
/// Unregistered keys are numbered by `resolver`, so a resolver must not be
/// shared between files whose symbols should be independent.
pub async fn decode_with<R>(
    source: R,
    config: &DecoderConfig,
    resolver: &mut EssenceResolver,
) -> Result<Layout>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let producer = tokio::spawn(read_chunks(source, tx, config.chunk_divisor));

    // The decoder owns the receiver; dropping it on any exit drains the
    // channel, so the producer never stays blocked on a full channel.
    let consumer = PartitionDecoder::new(KlvStream::new(rx), resolver).run();

    let (decoded, produced) = tokio::join!(consumer, producer);
    // A read failure also ends the consumer early, usually as truncation.
    // Report the cause.
    produced??;
    let mut layout = decoded?;

    apply_limits(&mut layout, &config.content_package_limits);

    tracing::info!(
        partitions = layout.partitions.len(),
        content_packages = layout.content_package_total(),
        warnings = layout.warnings.len(),
        "decode complete"
    );
    Ok(layout)
}

struct OpenPartition {
    layout: PartitionLayout,
    stats: RunningStats,
    essence_in_header: bool,
}

impl OpenPartition {
    fn add(&mut self, item: EssenceItem) {
        if self.layout.partition_type == PartitionKind::Header {
            self.essence_in_header = true;
        }
        self.layout.essence_byte_count += item.total_byte_count;

        let packages = &mut self.layout.content_packages;
        match packages.last_mut() {
            Some(last) if last.first_key() != Some(item.key.as_str()) => last.items.push(item),
            last => {
                if let Some(closed) = last {
                    self.stats.push(closed.total_length());
                }
                packages.push(ContentPackage { items: vec![item] });
            }
        }
    }

    fn seal(mut self) -> PartitionLayout {
        if let Some(last) = self.layout.content_packages.last() {
            self.stats.push(last.total_length());
        }

        let mut layout = self.layout;
        layout.content_package_count = layout.content_packages.len() as u64;
        if self.stats.count() > 0 {
            layout.content_package_statistics = Some(self.stats.finalize());
        }
        if self.essence_in_header {
            tracing::warn!("{}", ESSENCE_IN_HEADER);
            add_warning(&mut layout.warning, ESSENCE_IN_HEADER);
        }
        layout
    }
}

fn add_warning(slot: &mut Option<String>, warning: &str) {
    match slot {
        Some(existing) => {
            existing.push_str("; ");
            existing.push_str(warning);
        }
        None => *slot = Some(warning.to_string()),
    }
}

/// Partition state machine over one KLV stream.
struct PartitionDecoder<'a> {
    stream: KlvStream,
    resolver: &'a mut EssenceResolver,
    layout: Layout,
    current: Option<OpenPartition>,
    primer: PrimerMap,
}

impl<'a> PartitionDecoder<'a> {
    fn new(stream: KlvStream, resolver: &'a mut EssenceResolver) -> Self {
        PartitionDecoder {
            stream,
            resolver,
            layout: Layout::default(),
            current: None,
            primer: PrimerMap::new(),
        }
    }

    async fn run(mut self) -> Result<Layout> {
        let mut saw_rip = false;

        loop {
            let offset = self.stream.position();
            let klv = match self.stream.next_klv().await? {
                Some(klv) => klv,
                None => break,
            };

            if klv.key.is_random_index_pack() {
                tracing::debug!(offset, "random index pack reached");
                saw_rip = true;
                break;
            }
            if klv.key.is_partition_pack() {
                self.enter_partition(&klv, offset).await?;
            } else if klv.key.is_fill_item() {
                continue;
            } else {
                self.add_essence(&klv, offset)?;
            }
        }

        self.seal();
        tracing::debug!(
            consumed = self.stream.position(),
            received = self.stream.bytes_received(),
            "partition walk finished"
        );
        if !saw_rip {
            tracing::warn!("{}", MISSING_RIP);
            self.layout.warnings.push(MISSING_RIP.to_string());
        }
        Ok(self.layout)
    }

    fn seal(&mut self) {
        if let Some(open) = self.current.take() {
            self.layout.partitions.push(open.seal());
        }
    }

    async fn enter_partition(&mut self, klv: &Klv, offset: u64) -> Result<()> {
        self.seal();

        let pack = PartitionPack::parse(&klv.key, &klv.value)?;
        let kind = pack.kind();
        let mut layout = PartitionLayout::new(kind);

        let kag = pack.kag_size as u64;
        layout.header_length = kag + pack.header_byte_count + pack.index_byte_count;
        if pack.kag_size == 1 {
            layout.header_length += klv.total_length() - 1;
        }
        if kind == PartitionKind::Invalid {
            let warning = format!("unrecognised partition type 0x{:02x}", klv.key.as_bytes()[13]);
            tracing::warn!(offset, "{}", warning);
            add_warning(&mut layout.warning, &warning);
        }

        tracing::debug!(
            offset,
            kind = ?kind,
            this_partition = pack.this_partition,
            header_byte_count = pack.header_byte_count,
            index_byte_count = pack.index_byte_count,
            body_sid = pack.body_sid,
            "entering partition"
        );

        self.primer.clear();
        self.flush_header(pack.header_byte_count).await?;
        if pack.index_byte_count > 0 {
            let table = self.read_index(pack.index_byte_count, &mut layout).await?;
            layout.index_table = table;
        }

        self.current = Some(OpenPartition {
            layout,
            stats: RunningStats::new(),
            essence_in_header: false,
        });
        Ok(())
    }

    /// Consume `expected` bytes of header metadata, keeping only the primer.
    async fn flush_header(&mut self, expected: u64) -> Result<()> {
        let mut consumed = 0u64;
        while consumed < expected {
            let klv = self.stream.next_klv().await?.ok_or(MrxError::StreamInterrupted {
                section: "header metadata",
                expected,
                consumed,
            })?;
            consumed += klv.total_length();

            if klv.key.is_primer_pack() {
                match PrimerPack::parse(&klv.value) {
                    Ok(primer) => {
                        self.primer = primer.to_map();
                        tracing::debug!(tags = self.primer.len(), "decoded primer pack");
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable primer pack"),
                }
            }
        }
        Ok(())
    }

    async fn read_index(
        &mut self,
        expected: u64,
        layout: &mut PartitionLayout,
    ) -> Result<Option<IndexTable>> {
        let klv = self.stream.next_klv().await?.ok_or(MrxError::StreamInterrupted {
            section: "index table",
            expected,
            consumed: 0,
        })?;

        if !klv.key.is_index_table_segment() {
            let warning = format!("index section starts with {}, not an index table segment", klv.key);
            tracing::warn!("{}", warning);
            add_warning(&mut layout.warning, &warning);
            return Ok(None);
        }

        match decode_index_table(&klv.value, &self.primer) {
            Ok(table) => Ok(Some(table)),
            Err(e) => {
                let warning = format!("index table could not be decoded: {}", e);
                tracing::warn!("{}", warning);
                add_warning(&mut layout.warning, &warning);
                Ok(None)
            }
        }
    }

    fn add_essence(&mut self, klv: &Klv, offset: u64) -> Result<()> {
        let current = self.current.as_mut().ok_or_else(|| {
            MrxError::invalid_file(format!(
                "essence key {} at byte {} before any partition pack",
                klv.key, offset
            ))
        })?;

        let essence = self.resolver.resolve(&klv.key);
        current.add(EssenceItem {
            key: klv.key.to_dotted_hex(),
            symbol: Some(essence.symbol),
            description: essence.description,
            file_offset: offset,
            length: klv.length_value,
            total_byte_count: klv.total_length(),
            total_container_count: None,
        });
        Ok(())
    }
}
