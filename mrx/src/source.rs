//! Chunked byte source
//!
//! The producer half of the decode pipeline: reads fixed-size buffers from
//! any async reader and publishes them, in order, on a bounded channel.

use crate::error::{MrxError, Result};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Total read budget that the divisor splits into chunks.
pub const CHUNK_BUDGET: usize = 1_000_000;

/// One buffer read from the source.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position of this chunk in the read sequence, starting at 0.
    pub sequence: u64,
    /// Bytes read.
    pub data: Bytes,
}

/// Chunk size for a divisor; a larger divisor gives smaller chunks.
pub fn chunk_size(divisor: usize) -> usize {
    (CHUNK_BUDGET / divisor.max(1)).max(1)
}

/// Read `source` to the end, sending chunks on `tx`.
///
/// The channel is closed when this returns, whichever way it returns. A
/// closed receiver means the consumer has already failed; the producer then
/// stops quietly and leaves the error reporting to the consumer.
pub async fn read_chunks<R>(mut source: R, tx: mpsc::Sender<Chunk>, divisor: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let size = chunk_size(divisor);
    let mut sequence = 0u64;
    let mut total = 0u64;

    tracing::debug!(chunk_size = size, "starting chunked read");

    loop {
        let mut buf = vec![0u8; size];
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(MrxError::io_failure(
                    format!("reading chunk {} at byte {}", sequence, total),
                    e,
                ))
            }
        };
        buf.truncate(n);
        total += n as u64;

        let chunk = Chunk {
            sequence,
            data: Bytes::from(buf),
        };
        if tx.send(chunk).await.is_err() {
            tracing::debug!(sequence, "consumer closed the chunk channel");
            return Ok(());
        }
        sequence += 1;
    }

    tracing::debug!(chunks = sequence, bytes = total, "chunked read complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    struct FailingReader {
        served: bool,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.served {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
            } else {
                self.served = true;
                buf.put_slice(&[1, 2, 3]);
                Poll::Ready(Ok(()))
            }
        }
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(1), CHUNK_BUDGET);
        assert_eq!(chunk_size(10), CHUNK_BUDGET / 10);
        assert_eq!(chunk_size(1_000_000), 1);
        assert_eq!(chunk_size(0), CHUNK_BUDGET);
        assert_eq!(chunk_size(usize::MAX), 1);
    }

    #[tokio::test]
    async fn test_chunks_in_order() {
        let data: Vec<u8> = (0..=255u8).collect();
        let (tx, mut rx) = mpsc::channel(4);

        let producer = tokio::spawn(read_chunks(std::io::Cursor::new(data.clone()), tx, 20_000));

        let mut collected = Vec::new();
        let mut expected_sequence = 0;
        while let Some(chunk) = rx.recv().await {
            assert_eq!(chunk.sequence, expected_sequence);
            assert!(chunk.data.len() <= 50);
            expected_sequence += 1;
            collected.extend_from_slice(&chunk.data);
        }

        producer.await.unwrap().unwrap();
        assert_eq!(collected, data);
    }

    #[tokio::test]
    async fn test_read_error_closes_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let result = read_chunks(FailingReader { served: false }, tx, 1).await;

        assert!(matches!(result, Err(MrxError::IoFailure { .. })));
        assert_eq!(rx.recv().await.unwrap().data.as_ref(), &[1, 2, 3]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_consumer_stops_producer() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let result = read_chunks(std::io::Cursor::new(vec![0u8; 64]), tx, 1).await;
        assert!(result.is_ok());
    }
}
