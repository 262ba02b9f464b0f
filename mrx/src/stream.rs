//! KLV reconstruction across chunk boundaries
//!
//! [`KlvStream`] is the consumer half of the decode pipeline. It pulls chunks
//! from the channel fed by [`read_chunks`](crate::source::read_chunks) and
//! assembles complete KLV records, however the records straddle the chunks.
//! Requests that fall inside the current chunk are served as zero-copy slices;
//! only records that span chunks are copied into a fresh buffer.

use crate::ber::{ber_decode, field_size};
use crate::error::{MrxError, Result};
use crate::klv::Klv;
use crate::source::{Chunk, CHUNK_BUDGET};
use crate::ul::UniversalLabel;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Pull-based KLV reader over a chunk channel.
///
/// Dropping the stream closes the channel and discards anything still
/// queued, so a producer blocked on a full channel is always released.
pub struct KlvStream {
    rx: mpsc::Receiver<Chunk>,
    current: Bytes,
    offset: usize,
    open: bool,
    next_sequence: u64,
    bytes_received: u64,
    position: u64,
}

impl KlvStream {
    /// Wrap the receiving end of a chunk channel.
    pub fn new(rx: mpsc::Receiver<Chunk>) -> Self {
        KlvStream {
            rx,
            current: Bytes::new(),
            offset: 0,
            open: true,
            next_sequence: 0,
            bytes_received: 0,
            position: 0,
        }
    }

    /// Bytes consumed as complete records so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes received from the producer so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Read the next complete KLV, or `None` at a clean end of stream.
    pub async fn next_klv(&mut self) -> Result<Option<Klv>> {
        let result = self.read_record().await;
        if result.is_err() {
            self.drain();
        }
        result
    }

    async fn read_record(&mut self) -> Result<Option<Klv>> {
        let record_offset = self.position;

        let key = match self.bridge(16).await? {
            Some(key) => key,
            None if self.bytes_received == 0 => return Err(MrxError::EmptyStream),
            None => return Ok(None),
        };
        let mut key_bytes = [0u8; 16];
        key_bytes.copy_from_slice(&key);

        let first = self.bridge_within_record(1).await?;
        let size = field_size(first[0]).ok_or_else(|| {
            MrxError::invalid_klv(
                record_offset,
                format!("length field declares {} bytes", first[0] & 0x0F),
            )
        })?;

        let length = if size == 1 {
            first
        } else {
            let rest = self.bridge_within_record(size - 1).await?;
            let mut field = BytesMut::with_capacity(size);
            field.extend_from_slice(&first);
            field.extend_from_slice(&rest);
            field.freeze()
        };

        let (length_value, _) = ber_decode(&length);
        let value_len = usize::try_from(length_value).map_err(|_| {
            MrxError::invalid_klv(record_offset, format!("value length {} too large", length_value))
        })?;
        let value = self.bridge_within_record(value_len).await?;

        let klv = Klv {
            key: UniversalLabel(key_bytes),
            length,
            value,
            length_value,
        };
        self.position += klv.total_length();
        Ok(Some(klv))
    }

    /// Bridge bytes that belong to a record already started; running out is truncation.
    async fn bridge_within_record(&mut self, n: usize) -> Result<Bytes> {
        match self.bridge(n).await? {
            Some(bytes) => Ok(bytes),
            None => Err(MrxError::StreamTruncated {
                expected_remaining: n as u64,
            }),
        }
    }

    /// Assemble exactly `n` bytes, pulling chunks as needed.
    ///
    /// Returns `None` if the channel closed before any of the `n` bytes
    /// arrived, and `StreamTruncated` if it closed part way.
    async fn bridge(&mut self, n: usize) -> Result<Option<Bytes>> {
        if n == 0 {
            return Ok(Some(Bytes::new()));
        }

        let available = self.current.len() - self.offset;
        if available >= n {
            let out = self.current.slice(self.offset..self.offset + n);
            self.offset += n;
            return Ok(Some(out));
        }

        // The declared length is untrusted; grow with the data instead.
        let mut out = BytesMut::with_capacity(n.min(available + CHUNK_BUDGET));
        while out.len() < n {
            if self.offset == self.current.len() {
                if !self.pull().await {
                    if out.is_empty() {
                        return Ok(None);
                    }
                    return Err(MrxError::StreamTruncated {
                        expected_remaining: (n - out.len()) as u64,
                    });
                }
                continue;
            }

            let take = (n - out.len()).min(self.current.len() - self.offset);
            out.extend_from_slice(&self.current[self.offset..self.offset + take]);
            self.offset += take;
        }

        Ok(Some(out.freeze()))
    }

    /// Load the next chunk; `false` once the channel is closed and empty.
    async fn pull(&mut self) -> bool {
        if !self.open {
            return false;
        }
        match self.rx.recv().await {
            Some(chunk) => {
                debug_assert_eq!(chunk.sequence, self.next_sequence, "chunks out of order");
                self.next_sequence = chunk.sequence + 1;
                self.bytes_received += chunk.data.len() as u64;
                self.current = chunk.data;
                self.offset = 0;
                true
            }
            None => {
                self.open = false;
                false
            }
        }
    }

    /// Close the channel and discard anything still queued.
    fn drain(&mut self) {
        self.open = false;
        self.rx.close();
        let mut discarded = 0usize;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "drained unread chunks");
        }
    }
}

impl Drop for KlvStream {
    fn drop(&mut self) {
        self.drain();
    }
}
