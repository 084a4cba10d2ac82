/*!
 * Write Operations
 * Preflight validation, dirty-write prevention and shape-adaptive dispatch,
 * serialized per resource through the write queue
 */

use std::sync::Arc;

use log::warn;

use super::FileService;
use crate::capability::ProviderCapabilities;
use crate::provider::FileSystemProvider;
use crate::stream::WriteSource;
use crate::types::{
    etag, CreateOptions, FileOperation, FileOperationEvent, FileStat, FsError, FsResult,
    OpenOptions, ResolveOptions, WriteFileOptions, WriteOptions, ETAG_DISABLED,
};
use crate::uri::Uri;

impl FileService {
    /// Write a file from a buffer, readable or stream.
    ///
    /// All writes to the same resource key run in strict FIFO order; a failed
    /// write does not block the next one. Missing parent directories are
    /// created.
    pub fn write_file(
        &self,
        uri: &Uri,
        source: WriteSource,
        options: &WriteOptions,
    ) -> FsResult<FileStat> {
        let provider = self.registry.provider_for(uri)?;
        let capabilities = provider.capabilities();
        if !capabilities.can_read_write() {
            return Err(FsError::NotSupported(format!(
                "provider for '{}' supports neither write shape",
                uri.scheme()
            )));
        }

        let key = Self::queue_key(capabilities, uri);
        self.run_write_task(key, || {
            self.do_write_file(&provider, capabilities, uri, source, options)
        })?;

        let stat = self.resolve(uri, &ResolveOptions::metadata())?;
        self.emit_operation(
            FileOperationEvent::new(FileOperation::Write, uri.clone()).with_stat(stat.clone()),
        );
        Ok(stat)
    }

    /// Create a file, failing when it exists and `overwrite` is not set
    pub fn create_file(
        &self,
        uri: &Uri,
        source: WriteSource,
        options: &CreateOptions,
    ) -> FsResult<FileStat> {
        let provider = self.registry.provider_for(uri)?;
        let capabilities = provider.capabilities();
        if !capabilities.can_read_write() {
            return Err(FsError::NotSupported(format!(
                "provider for '{}' supports neither write shape",
                uri.scheme()
            )));
        }

        self.run_participants(FileOperation::Create, uri, None);

        if !options.overwrite && self.exists(uri) {
            return Err(FsError::FileModifiedSince(uri.to_string()));
        }

        let key = Self::queue_key(capabilities, uri);
        self.run_write_task(key, || {
            self.do_write_file(&provider, capabilities, uri, source, &WriteOptions::default())
        })?;

        let stat = self.resolve(uri, &ResolveOptions::metadata())?;
        self.emit_operation(
            FileOperationEvent::new(FileOperation::Create, uri.clone()).with_stat(stat.clone()),
        );
        Ok(stat)
    }

    fn do_write_file(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        capabilities: ProviderCapabilities,
        uri: &Uri,
        source: WriteSource,
        options: &WriteOptions,
    ) -> FsResult<()> {
        self.validate_write(provider, capabilities, uri, options)?;

        // Whole-file sinks, and buffer inputs where the sink accepts them,
        // take the materialized path; everything else pumps through a handle.
        if !capabilities.has_random_access()
            || (source.is_buffer() && capabilities.has_whole_file())
        {
            let data = source.into_buffer()?;
            provider
                .write_file(
                    uri,
                    &data,
                    &WriteFileOptions {
                        create: true,
                        overwrite: true,
                    },
                )
                .map_err(|e| e.with_context(&format!("write {uri}")))
        } else {
            write_through_handle(provider, uri, source)
        }
    }

    fn validate_write(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        capabilities: ProviderCapabilities,
        uri: &Uri,
        options: &WriteOptions,
    ) -> FsResult<()> {
        if capabilities.is_readonly() {
            return Err(FsError::FileReadOnly(uri.to_string()));
        }

        match provider.stat(uri) {
            Ok(stat) => {
                if stat.is_dir() {
                    return Err(FsError::FileIsDirectory(uri.to_string()));
                }
                // Dirty-write prevention. The etag is recomputed from the
                // caller's mtime and the on-disk size, so a size-neutral
                // write that only advanced a coarse timestamp does not
                // conflict.
                if let (Some(mtime), Some(caller_etag)) = (options.mtime, options.etag.as_deref())
                {
                    if caller_etag != ETAG_DISABLED
                        && stat.mtime > mtime
                        && etag(mtime, stat.size) != caller_etag
                    {
                        return Err(FsError::FileModifiedSince(uri.to_string()));
                    }
                }
            }
            Err(FsError::FileNotFound(_)) => {
                if let Some(parent) = uri.parent() {
                    self.mkdirp(provider, &parent)?;
                }
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }
}

/// Pump a source into a random-access sink chunk by chunk, tolerating
/// partial writes; the handle is closed on every exit path
pub(super) fn write_through_handle(
    provider: &Arc<dyn FileSystemProvider>,
    uri: &Uri,
    mut source: WriteSource,
) -> FsResult<()> {
    let handle = provider
        .open(uri, &OpenOptions { create: true })
        .map_err(|e| e.with_context(&format!("write {uri}")))?;

    let outcome = (|| -> FsResult<()> {
        let mut position = 0u64;
        while let Some(chunk) = source.next_chunk()? {
            let mut offset = 0usize;
            while offset < chunk.len() {
                let written = provider.write(handle, position, &chunk[offset..])?;
                if written == 0 {
                    return Err(FsError::Io("no write progress".to_string()));
                }
                offset += written;
                position += written as u64;
            }
        }
        Ok(())
    })();

    if let Err(error) = provider.close(handle) {
        warn!("Failed to close write handle {handle}: {error}");
    }
    outcome.map_err(|e| e.with_context(&format!("write {uri}")))
}
