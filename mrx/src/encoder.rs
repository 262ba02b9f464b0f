//! MRX encoder
//!
//! Writes a header partition with header metadata, one body partition that
//! multiplexes every clocked stream, one generic stream partition per
//! unclocked stream, an optional manifest partition, the footer and the
//! Random Index Pack. The output only needs to be written sequentially.

use crate::error::{MrxError, Result};
use crate::klv::Klv;
use crate::manifest::{Configuration, DataStream, ManifestDocument};
use crate::metadata::{GroupEncoder, HeaderContext, HeaderMetadata};
use crate::partition::{PartitionPack, RandomIndexPack};
use crate::types::{FrameRate, Rational, Umid};
use crate::ul::{dotted_hex, labels, UL};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A task feeding one essence channel.
pub type EssenceTask = JoinHandle<Result<()>>;

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Frames buffered per stream channel
    pub channel_capacity: usize,
    /// Operational pattern written in every partition pack
    pub operational_pattern: UL,
    /// Embed the manifest as a final generic stream partition
    pub write_manifest: bool,
    /// Tool name recorded in the manifest
    pub tool_name: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            channel_capacity: 64,
            operational_pattern: labels::OP1A,
            write_manifest: true,
            tool_name: format!("mrx {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// One stream to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescription {
    /// Position among all streams, from 0
    pub index: usize,
    /// Key written on every essence KLV of the stream
    pub essence_key: UL,
    pub frame_rate: FrameRate,
    pub stream_type: String,
    pub name_space: String,
}

impl StreamDescription {
    /// Frame-wrapped streams are clocked; clip-wrapped ones are not.
    pub fn is_clocked(&self) -> bool {
        matches!(self.frame_rate, FrameRate::Clocked(_))
    }

    /// Manifest entry for this stream.
    pub fn data_stream(&self) -> DataStream {
        DataStream {
            stream_id: self.index,
            essence_key: dotted_hex(&self.essence_key),
            stream_type: self.stream_type.clone(),
            frame_rate: self.frame_rate,
            name_space: self.name_space.clone(),
            clocked: self.is_clocked(),
        }
    }
}

/// Essence key for stream `index`: the ISXD data element with the wrapping
/// in byte 14 and the element number in byte 15.
pub fn stream_key(index: usize, clocked: bool) -> Result<UL> {
    let number = u8::try_from(index + 1)
        .map_err(|_| MrxError::config(format!("stream index {} out of range", index)))?;
    let mut key = labels::ISXD_DATA_ELEMENT;
    key[14] = if clocked { 0x01 } else { 0x02 };
    key[15] = number;
    Ok(key)
}

/// Everything the encoder needs to know about the streams up front.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInformation {
    pub configuration: Configuration,
    pub streams: Vec<StreamDescription>,
}

impl StreamInformation {
    /// Describe `count` streams from `configuration`.
    pub fn from_configuration(configuration: &Configuration, count: usize) -> Result<Self> {
        let streams = (0..count)
            .map(|index| {
                let properties = configuration.stream_properties_for(index);
                let frame_rate = properties.frame_rate.unwrap_or(FrameRate::Static);
                Ok(StreamDescription {
                    index,
                    essence_key: stream_key(index, matches!(frame_rate, FrameRate::Clocked(_)))?,
                    frame_rate,
                    stream_type: properties.stream_type.unwrap_or_default(),
                    name_space: properties.name_space.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StreamInformation {
            configuration: configuration.clone(),
            streams,
        })
    }

    pub fn clocked(&self) -> impl Iterator<Item = &StreamDescription> {
        self.streams.iter().filter(|s| s.is_clocked())
    }

    pub fn unclocked(&self) -> impl Iterator<Item = &StreamDescription> {
        self.streams.iter().filter(|s| !s.is_clocked())
    }
}

/// Where the encoder gets its streams from.
pub trait StreamSource {
    /// Describe the streams.
    fn stream_information(&self) -> Result<StreamInformation>;

    /// Start feeding each stream into its channel, one sender per stream in
    /// stream order. Each channel must be fed by its own task: the encoder
    /// reads channels one after another, so a task feeding several would
    /// block. A failed send means the encoder stopped reading that stream;
    /// the task should then return `Ok`.
    fn essence_channels(&mut self, senders: Vec<mpsc::Sender<Bytes>>) -> Result<Vec<EssenceTask>>;

    /// The manifest of the material this source was decoded from, if any.
    fn round_trip(&self) -> Option<ManifestDocument>;
}

/// Result of a finished encode.
#[derive(Debug, Clone)]
pub struct EncodeSummary {
    pub bytes_written: u64,
    pub umid: Umid,
    pub rip: RandomIndexPack,
    pub manifest: Option<ManifestDocument>,
}

/// MRX encoder
pub struct MrxEncoder<W> {
    writer: W,
    config: EncoderConfig,
    group_encoder: Box<dyn GroupEncoder>,
    total_byte_count: u64,
    previous_partition: u64,
    rip: RandomIndexPack,
    next_sid: u32,
}

impl<W: AsyncWrite + Unpin> MrxEncoder<W> {
    /// Create new encoder using the built-in header metadata.
    pub fn new(writer: W, config: EncoderConfig) -> Self {
        MrxEncoder {
            writer,
            config,
            group_encoder: Box::new(HeaderMetadata),
            total_byte_count: 0,
            previous_partition: 0,
            rip: RandomIndexPack::new(),
            next_sid: 1,
        }
    }

    /// Replace the header metadata encoder.
    pub fn with_group_encoder(mut self, group_encoder: Box<dyn GroupEncoder>) -> Self {
        self.group_encoder = group_encoder;
        self
    }

    /// Encode everything `source` provides.
    pub async fn encode<S: StreamSource>(mut self, source: &mut S) -> Result<EncodeSummary> {
        let info = source.stream_information()?;
        if info.streams.is_empty() {
            return Err(MrxError::config("no streams to encode"));
        }

        let umid = Umid::generate();
        let context = HeaderContext {
            umid,
            operational_pattern: self.config.operational_pattern,
            essence_containers: vec![labels::ISXD_CONTAINER],
        };
        let header_metadata = self.group_encoder.encode_header_metadata(&context)?;

        let mut header = self.pack(PartitionPack::header());
        header.header_byte_count = header_metadata.len() as u64;
        self.write_partition(header).await?;
        self.write_bytes(&header_metadata).await?;

        let capacity = self.config.channel_capacity.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) =
            info.streams.iter().map(|_| mpsc::channel::<Bytes>(capacity)).unzip();
        let tasks = source.essence_channels(senders)?;
        let mut receivers: Vec<Option<mpsc::Receiver<Bytes>>> =
            receivers.into_iter().map(Some).collect();

        let clocked: Vec<&StreamDescription> = info.clocked().collect();
        if !clocked.is_empty() {
            self.write_clocked(&clocked, &mut receivers).await?;
        }
        for stream in info.unclocked() {
            if let Some(rx) = receivers[stream.index].take() {
                self.write_unclocked(stream, rx).await?;
            }
        }

        // Any producer failure fails the encode before the file is closed.
        for task in tasks {
            task.await??;
        }

        let manifest = if self.config.write_manifest {
            let data_streams = info.streams.iter().map(StreamDescription::data_stream).collect();
            let manifest = ManifestDocument::new(
                info.configuration.clone(),
                umid,
                self.config.tool_name.clone(),
                data_streams,
            )
            .with_previous(source.round_trip());
            self.write_manifest(&manifest).await?;
            Some(manifest)
        } else {
            None
        };

        let mut footer = self.pack(PartitionPack::footer());
        footer.footer_partition = self.total_byte_count;
        self.write_partition(footer).await?;

        let rip = self.rip.to_vec()?;
        self.write_bytes(&rip).await?;
        self.writer
            .flush()
            .await
            .map_err(|e| MrxError::io_failure("flushing output", e))?;

        tracing::info!(
            bytes = self.total_byte_count,
            partitions = self.rip.entries.len(),
            streams = info.streams.len(),
            "encode complete"
        );

        Ok(EncodeSummary {
            bytes_written: self.total_byte_count,
            umid,
            rip: self.rip,
            manifest,
        })
    }

    fn pack(&self, mut pack: PartitionPack) -> PartitionPack {
        pack.operational_pattern = self.config.operational_pattern;
        pack.add_essence_container(labels::ISXD_CONTAINER);
        pack
    }

    fn take_sid(&mut self) -> u32 {
        let sid = self.next_sid;
        self.next_sid += 1;
        sid
    }

    /// Round-robin the clocked streams. Each base tick, a stream emits
    /// frames until it has written `floor(tick * rate / base_rate)`.
    async fn write_clocked(
        &mut self,
        clocked: &[&StreamDescription],
        receivers: &mut [Option<mpsc::Receiver<Bytes>>],
    ) -> Result<()> {
        let base = clocked[0].frame_rate.rate().unwrap_or_default();
        let ratios: Vec<f64> = clocked
            .iter()
            .map(|s| s.frame_rate.rate().map_or(1.0, |rate: Rational| rate.ratio_to(base)))
            .collect();
        if let Some(slot) = ratios.iter().position(|r| *r <= 0.0) {
            return Err(MrxError::config(format!(
                "stream {} has frame rate {}",
                clocked[slot].index, clocked[slot].frame_rate
            )));
        }
        let sid = self.take_sid();
        let body = self.pack(PartitionPack::body(sid));
        self.write_partition(body).await?;

        let mut emitted = vec![0u64; clocked.len()];
        let mut open = vec![true; clocked.len()];

        let mut tick = 0u64;
        'ticks: loop {
            tick += 1;
            for (slot, stream) in clocked.iter().enumerate() {
                if !open[slot] {
                    continue;
                }
                let target = (tick as f64 * ratios[slot]).floor() as u64;
                while emitted[slot] < target {
                    let frame = match receivers[stream.index].as_mut() {
                        Some(rx) => rx.recv().await,
                        None => None,
                    };
                    match frame {
                        Some(frame) => {
                            self.write_klv(&Klv::new(stream.essence_key, frame)).await?;
                            emitted[slot] += 1;
                        }
                        None if slot == 0 => break 'ticks,
                        None => {
                            open[slot] = false;
                            break;
                        }
                    }
                }
            }
        }

        for stream in &clocked[1..] {
            if let Some(mut rx) = receivers[stream.index].take() {
                rx.close();
                let mut dropped = 0u64;
                while rx.recv().await.is_some() {
                    dropped += 1;
                }
                if dropped > 0 {
                    tracing::warn!(
                        stream = stream.index,
                        dropped,
                        "primary clocked stream ended, dropping remaining frames"
                    );
                }
            }
        }
        receivers[clocked[0].index] = None;

        tracing::debug!(sid, ticks = tick - 1, frames = ?emitted, "clocked streams written");
        Ok(())
    }

    /// Write an unclocked stream as one KLV in its own generic stream partition.
    async fn write_unclocked(
        &mut self,
        stream: &StreamDescription,
        mut rx: mpsc::Receiver<Bytes>,
    ) -> Result<()> {
        let mut data = Vec::new();
        while let Some(frame) = rx.recv().await {
            data.extend_from_slice(&frame);
        }

        let sid = self.take_sid();
        let partition = self.pack(PartitionPack::generic_stream(sid));
        self.write_partition(partition).await?;
        self.write_klv(&Klv::new(stream.essence_key, data)).await?;

        tracing::debug!(stream = stream.index, sid, "unclocked stream written");
        Ok(())
    }

    async fn write_manifest(&mut self, manifest: &ManifestDocument) -> Result<()> {
        let json = manifest.to_json()?;
        let sid = self.take_sid();
        let partition = self.pack(PartitionPack::generic_stream(sid));
        self.write_partition(partition).await?;
        self.write_klv(&Klv::new(labels::GENERIC_STREAM_DATA_ELEMENT, json.into_bytes()))
            .await
    }

    /// Fill in the offsets, record the partition in the RIP and write it.
    async fn write_partition(&mut self, mut pack: PartitionPack) -> Result<()> {
        pack.this_partition = self.total_byte_count;
        pack.previous_partition = self.previous_partition;
        self.rip.add_entry(pack.body_sid, self.total_byte_count);
        self.previous_partition = self.total_byte_count;

        tracing::debug!(
            offset = pack.this_partition,
            kind = ?pack.kind(),
            body_sid = pack.body_sid,
            "writing partition"
        );
        let bytes = pack.to_vec()?;
        self.write_bytes(&bytes).await
    }

    async fn write_klv(&mut self, klv: &Klv) -> Result<()> {
        self.write_bytes(&klv.to_vec()).await
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await.map_err(|e| {
            MrxError::io_failure(format!("writing at byte {}", self.total_byte_count), e)
        })?;
        self.total_byte_count += bytes.len() as u64;
        Ok(())
    }
}
