/*!
 * Read Operations
 * Capability-adaptive whole-file and chunked handle reads
 */

use std::sync::Arc;
use std::thread;

use log::warn;

use super::FileService;
use crate::provider::{FileHandle, FileSystemProvider};
use crate::stream::{byte_stream, ByteStream, CancellationToken, StreamWriter, CHUNK_SIZE};
use crate::types::{
    FileStat, FsError, FsResult, OpenOptions, ReadFileOptions, ResolveOptions,
};
use crate::uri::Uri;

/// Fully materialized file content
pub struct FileContent {
    pub stat: FileStat,
    pub value: Vec<u8>,
}

/// Streaming file content
pub struct FileStreamContent {
    pub stat: FileStat,
    pub stream: ByteStream,
}

impl FileService {
    /// Read a file into one buffer
    pub fn read_file(&self, uri: &Uri, options: &ReadFileOptions) -> FsResult<FileContent> {
        let content = self.read_file_stream(uri, options, &CancellationToken::new())?;
        Ok(FileContent {
            stat: content.stat,
            value: content.stream.consume()?,
        })
    }

    /// Read a file as a chunk stream.
    ///
    /// Prefers the provider's whole-file path when requested or when it is
    /// the only shape; otherwise streams through a handle in `CHUNK_SIZE`
    /// pieces. The token aborts a chunked read at the next chunk boundary.
    pub fn read_file_stream(
        &self,
        uri: &Uri,
        options: &ReadFileOptions,
        token: &CancellationToken,
    ) -> FsResult<FileStreamContent> {
        let provider = self.registry.provider_for(uri)?;
        let capabilities = provider.capabilities();
        let stat = self.validate_read(uri, options)?;

        if capabilities.has_whole_file()
            && (options.prefer_unbuffered || !capabilities.has_random_access())
        {
            let data = provider
                .read_file(uri)
                .map_err(|e| e.with_context(&format!("read {uri}")))?;
            let data = slice_buffer(data, options.position, options.length);
            return Ok(FileStreamContent {
                stat,
                stream: ByteStream::from_buffer(data),
            });
        }

        if !capabilities.has_random_access() {
            return Err(FsError::NotSupported(format!(
                "provider for '{}' supports neither read shape",
                uri.scheme()
            )));
        }

        let handle = provider
            .open(uri, &OpenOptions { create: false })
            .map_err(|e| e.with_context(&format!("read {uri}")))?;
        let (writer, stream) = byte_stream();
        let position = options.position.unwrap_or(0);
        let length = options.length;
        let token = token.clone();
        let resource = uri.clone();
        thread::spawn(move || {
            pump_handle_read(provider, resource, handle, writer, position, length, token);
        });

        Ok(FileStreamContent { stat, stream })
    }

    fn validate_read(&self, uri: &Uri, options: &ReadFileOptions) -> FsResult<FileStat> {
        let stat = self.resolve(uri, &ResolveOptions::metadata())?;
        if stat.is_directory() {
            return Err(FsError::FileIsDirectory(uri.to_string()));
        }
        if let Some(etag) = &options.etag {
            if !etag.is_empty() && *etag == stat.etag {
                return Err(FsError::FileNotModifiedSince(uri.to_string()));
            }
        }
        Ok(stat)
    }
}

/// Apply a position/length window, clamped to the buffer
fn slice_buffer(data: Vec<u8>, position: Option<u64>, length: Option<u64>) -> Vec<u8> {
    let len = data.len();
    let start = (position.unwrap_or(0) as usize).min(len);
    let end = match length {
        Some(length) => (start + length as usize).min(len),
        None => len,
    };
    if start == 0 && end == len {
        data
    } else {
        data[start..end].to_vec()
    }
}

/// Chunk loop behind `read_file_stream`; the handle is closed on every exit
/// path
#[allow(clippy::too_many_arguments)]
fn pump_handle_read(
    provider: Arc<dyn FileSystemProvider>,
    uri: Uri,
    handle: FileHandle,
    writer: StreamWriter,
    mut position: u64,
    length: Option<u64>,
    token: CancellationToken,
) {
    let mut remaining = length;
    let outcome = (|| -> FsResult<()> {
        loop {
            if token.is_cancelled() {
                return Err(FsError::Cancelled);
            }
            let want = match remaining {
                Some(0) => break,
                Some(left) => CHUNK_SIZE.min(left as usize),
                None => CHUNK_SIZE,
            };
            let mut buf = vec![0u8; want];
            let n = provider.read(handle, position, &mut buf)?;
            if n == 0 {
                break;
            }
            buf.truncate(n);
            position += n as u64;
            if let Some(left) = remaining.as_mut() {
                *left -= n as u64;
            }
            if writer.write(buf).is_err() {
                // Reader went away; stop producing
                break;
            }
        }
        Ok(())
    })();

    if let Err(error) = provider.close(handle) {
        warn!("Failed to close read handle {handle}: {error}");
    }

    match outcome {
        Ok(()) => writer.finish(),
        Err(error) => writer.error(error.with_context(&format!("read {uri}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_buffer_windows() {
        let data = b"0123456789".to_vec();
        assert_eq!(slice_buffer(data.clone(), None, None), b"0123456789");
        assert_eq!(slice_buffer(data.clone(), Some(3), None), b"3456789");
        assert_eq!(slice_buffer(data.clone(), Some(3), Some(4)), b"3456");
        // Beyond the end: truncated suffix, clean termination
        assert_eq!(slice_buffer(data.clone(), Some(8), Some(10)), b"89");
        assert_eq!(slice_buffer(data, Some(20), Some(5)), b"");
    }
}
