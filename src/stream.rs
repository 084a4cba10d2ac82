/*!
 * Byte Streams
 * Bounded-channel chunk pipelines between providers of differing I/O shapes
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{FsError, FsResult};

/// Chunk size used by buffered reads, writes and pipes (Linux pipe default)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// In-flight chunks a stream buffers before the producer blocks
const QUEUE_DEPTH: usize = 8;

enum StreamItem {
    Data(Vec<u8>),
    Error(FsError),
    End,
}

/// Push-readable byte stream.
///
/// The producer side blocks once `QUEUE_DEPTH` chunks are buffered; a dropped
/// reader terminates the producer with an error on its next write.
pub struct ByteStream {
    rx: flume::Receiver<StreamItem>,
}

/// Producer half of a [`ByteStream`]
pub struct StreamWriter {
    tx: flume::Sender<StreamItem>,
}

/// Create a connected writer/stream pair
#[must_use]
pub fn byte_stream() -> (StreamWriter, ByteStream) {
    let (tx, rx) = flume::bounded(QUEUE_DEPTH);
    (StreamWriter { tx }, ByteStream { rx })
}

impl StreamWriter {
    /// Push a chunk, blocking while the stream is at capacity
    pub fn write(&self, chunk: Vec<u8>) -> FsResult<()> {
        self.tx
            .send(StreamItem::Data(chunk))
            .map_err(|_| FsError::Unavailable("stream reader dropped".to_string()))
    }

    /// Terminate the stream with an error
    pub fn error(&self, error: FsError) {
        let _ = self.tx.send(StreamItem::Error(error));
    }

    /// Mark the end of the stream
    pub fn finish(self) {
        let _ = self.tx.send(StreamItem::End);
    }
}

/// Result of [`ByteStream::consume_with_limit`]
pub enum Consumed {
    /// The stream ended within the limit
    Full(Vec<u8>),
    /// More chunks remain; `rest` continues where `prefix` stopped
    Partial { prefix: Vec<u8>, rest: ByteStream },
}

impl ByteStream {
    /// A pre-filled stream over an owned buffer
    #[must_use]
    pub fn from_buffer(data: Vec<u8>) -> Self {
        let (tx, rx) = flume::unbounded();
        for chunk in data.chunks(CHUNK_SIZE) {
            let _ = tx.send(StreamItem::Data(chunk.to_vec()));
        }
        let _ = tx.send(StreamItem::End);
        Self { rx }
    }

    /// Next chunk, `Ok(None)` at end of stream
    pub fn next_chunk(&self) -> FsResult<Option<Vec<u8>>> {
        match self.rx.recv() {
            Ok(StreamItem::Data(chunk)) => Ok(Some(chunk)),
            Ok(StreamItem::Error(error)) => Err(error),
            Ok(StreamItem::End) => Ok(None),
            Err(_) => Err(FsError::Unavailable(
                "stream producer dropped".to_string(),
            )),
        }
    }

    /// Concatenate every remaining chunk
    pub fn consume(self) -> FsResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Concatenate up to `max_chunks` chunks.
    ///
    /// Returns the full content when the stream ends within the limit, or the
    /// prefix plus a resumable tail otherwise.
    pub fn consume_with_limit(self, max_chunks: usize) -> FsResult<Consumed> {
        let mut prefix = Vec::new();
        for _ in 0..max_chunks {
            match self.next_chunk()? {
                Some(chunk) => prefix.extend_from_slice(&chunk),
                None => return Ok(Consumed::Full(prefix)),
            }
        }
        Ok(Consumed::Partial { prefix, rest: self })
    }
}

/// Pull contract for incremental producers
pub trait Readable: Send {
    /// Next chunk, `Ok(None)` when exhausted
    fn read(&mut self) -> FsResult<Option<Vec<u8>>>;
}

/// One of the three accepted write-input shapes
pub enum WriteSource {
    Buffer(Vec<u8>),
    Readable(Box<dyn Readable>),
    Stream(ByteStream),
}

impl WriteSource {
    /// Materialize the source into a single owned buffer
    pub fn into_buffer(self) -> FsResult<Vec<u8>> {
        match self {
            WriteSource::Buffer(data) => Ok(data),
            WriteSource::Readable(mut readable) => {
                let mut out = Vec::new();
                while let Some(chunk) = readable.read()? {
                    out.extend_from_slice(&chunk);
                }
                Ok(out)
            }
            WriteSource::Stream(stream) => stream.consume(),
        }
    }

    /// Next chunk, regardless of shape; a buffer yields itself once
    pub(crate) fn next_chunk(&mut self) -> FsResult<Option<Vec<u8>>> {
        match self {
            WriteSource::Buffer(data) => {
                if data.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(std::mem::take(data)))
                }
            }
            WriteSource::Readable(readable) => readable.read(),
            WriteSource::Stream(stream) => stream.next_chunk(),
        }
    }

    #[must_use]
    pub(crate) const fn is_buffer(&self) -> bool {
        matches!(self, WriteSource::Buffer(_))
    }
}

impl From<Vec<u8>> for WriteSource {
    fn from(data: Vec<u8>) -> Self {
        WriteSource::Buffer(data)
    }
}

impl From<&[u8]> for WriteSource {
    fn from(data: &[u8]) -> Self {
        WriteSource::Buffer(data.to_vec())
    }
}

impl From<&str> for WriteSource {
    fn from(data: &str) -> Self {
        WriteSource::Buffer(data.as_bytes().to_vec())
    }
}

impl From<ByteStream> for WriteSource {
    fn from(stream: ByteStream) -> Self {
        WriteSource::Stream(stream)
    }
}

/// Cooperative cancellation flag polled at chunk boundaries
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
