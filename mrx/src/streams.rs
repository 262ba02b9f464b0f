//! Stream sources for the encoder
//!
//! - [`MemoryStreams`]: streams already held in memory as frames
//! - [`SingleStream`]: one stream read from any async reader and cut into
//!   fixed-size frames

use crate::encoder::{EssenceTask, StreamInformation, StreamSource};
use crate::error::{MrxError, Result};
use crate::manifest::{Configuration, ManifestDocument};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Whether a stream carries text or binary frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssenceKind {
    Text,
    Binary,
}

impl EssenceKind {
    /// UTF-8 frames are text.
    pub fn detect(frame: &[u8]) -> Self {
        if std::str::from_utf8(frame).is_ok() {
            EssenceKind::Text
        } else {
            EssenceKind::Binary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EssenceKind::Text => "text",
            EssenceKind::Binary => "binary",
        }
    }
}

/// Streams held in memory, one `Vec` of frames per stream.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreams {
    configuration: Configuration,
    streams: Vec<(EssenceKind, Vec<Bytes>)>,
    previous: Option<ManifestDocument>,
}

impl MemoryStreams {
    pub fn new(configuration: Configuration) -> Self {
        MemoryStreams {
            configuration,
            streams: Vec::new(),
            previous: None,
        }
    }

    /// Record the manifest of the material being re-encoded.
    pub fn with_previous_manifest(mut self, previous: ManifestDocument) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Add a stream, returning its index. All frames must be of one kind.
    pub fn push_stream(&mut self, frames: Vec<Bytes>) -> Result<usize> {
        let index = self.streams.len();
        let kind = frames
            .first()
            .map_or(EssenceKind::Binary, |frame| EssenceKind::detect(frame));

        if let Some(position) = frames.iter().position(|f| EssenceKind::detect(f) != kind) {
            return Err(MrxError::MixedEssenceTypes(format!(
                "stream {} starts with {} frames but frame {} is {}",
                index,
                kind.as_str(),
                position,
                EssenceKind::detect(&frames[position]).as_str()
            )));
        }

        self.streams.push((kind, frames));
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl StreamSource for MemoryStreams {
    /// Streams without a configured `Type` are typed by their content.
    fn stream_information(&self) -> Result<StreamInformation> {
        let mut info = StreamInformation::from_configuration(&self.configuration, self.streams.len())?;
        for (description, (kind, _)) in info.streams.iter_mut().zip(&self.streams) {
            let configured = self
                .configuration
                .stream_properties
                .get(&description.index)
                .and_then(|p| p.stream_type.as_ref());
            if configured.is_none() {
                description.stream_type = kind.as_str().to_string();
            }
        }
        Ok(info)
    }

    fn essence_channels(&mut self, senders: Vec<mpsc::Sender<Bytes>>) -> Result<Vec<EssenceTask>> {
        if senders.len() != self.streams.len() {
            return Err(MrxError::config(format!(
                "{} channels for {} streams",
                senders.len(),
                self.streams.len()
            )));
        }

        let tasks = senders
            .into_iter()
            .zip(self.streams.iter().map(|(_, frames)| frames.clone()))
            .map(|(tx, frames)| {
                tokio::spawn(async move {
                    for frame in frames {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok::<(), MrxError>(())
                })
            })
            .collect();
        Ok(tasks)
    }

    fn round_trip(&self) -> Option<ManifestDocument> {
        self.previous.clone()
    }
}

/// One stream read from an async reader in frames of `frame_size` bytes.
/// The last frame may be shorter.
pub struct SingleStream<R> {
    reader: Option<R>,
    frame_size: usize,
    configuration: Configuration,
    previous: Option<ManifestDocument>,
}

impl<R> SingleStream<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, frame_size: usize, configuration: Configuration) -> Self {
        SingleStream {
            reader: Some(reader),
            frame_size: frame_size.max(1),
            configuration,
            previous: None,
        }
    }

    /// Record the manifest of the material being re-encoded.
    pub fn with_previous_manifest(mut self, previous: ManifestDocument) -> Self {
        self.previous = Some(previous);
        self
    }
}

async fn read_frames<R>(mut reader: R, frame_size: usize, tx: mpsc::Sender<Bytes>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = 0u64;
    loop {
        let mut frame = vec![0u8; frame_size];
        let mut filled = 0;
        while filled < frame_size {
            match reader.read(&mut frame[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(MrxError::io_failure(format!("reading frame {}", frames), e)),
            }
        }
        if filled == 0 {
            break;
        }
        frame.truncate(filled);
        if tx.send(Bytes::from(frame)).await.is_err() {
            break;
        }
        frames += 1;
        if filled < frame_size {
            break;
        }
    }
    tracing::debug!(frames, "single stream read complete");
    Ok(())
}

impl<R> StreamSource for SingleStream<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn stream_information(&self) -> Result<StreamInformation> {
        StreamInformation::from_configuration(&self.configuration, 1)
    }

    fn essence_channels(&mut self, senders: Vec<mpsc::Sender<Bytes>>) -> Result<Vec<EssenceTask>> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| MrxError::config("single stream already consumed"))?;
        let tx = senders
            .into_iter()
            .next()
            .ok_or_else(|| MrxError::config("no channel for the single stream"))?;

        Ok(vec![tokio::spawn(read_frames(reader, self.frame_size, tx))])
    }

    fn round_trip(&self) -> Option<ManifestDocument> {
        self.previous.clone()
    }
}
