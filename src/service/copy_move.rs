/*!
 * Move & Copy Engine
 * Shared validation plus capability-matched byte transfer between providers
 */

use std::sync::Arc;
use std::thread;

use log::warn;

use super::write::write_through_handle;
use super::FileService;
use crate::capability::ProviderCapabilities;
use crate::provider::{FileHandle, FileSystemProvider};
use crate::stream::{WriteSource, CHUNK_SIZE};
use crate::types::{
    DeleteOptions, FileOperation, FileOperationEvent, FileStat, FsError, FsResult, OpenOptions,
    ResolveOptions, WriteFileOptions,
};
use crate::uri::Uri;

/// What a transfer actually did; a cross-provider move degrades to a copy
/// followed by a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferMode {
    Move,
    Copy,
}

impl FileService {
    /// Move a resource, falling back to copy-and-delete across providers.
    ///
    /// The emitted operation event reflects the transfer actually performed.
    pub fn move_to(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<FileStat> {
        let source_provider = self.registry.provider_for(source)?;
        let target_provider = self.registry.provider_for(target)?;

        self.run_participants(FileOperation::Move, source, Some(target));

        let performed = self.do_move_copy(
            &source_provider,
            source,
            &target_provider,
            target,
            TransferMode::Move,
            overwrite,
        )?;

        let stat = self.resolve(target, &ResolveOptions::metadata())?;
        let operation = match performed {
            TransferMode::Move => FileOperation::Move,
            TransferMode::Copy => FileOperation::Copy,
        };
        self.emit_operation(
            FileOperationEvent::new(operation, source.clone())
                .with_target(target.clone())
                .with_stat(stat.clone()),
        );
        Ok(stat)
    }

    /// Copy a resource, matching source and target I/O shapes
    pub fn copy_to(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<FileStat> {
        let source_provider = self.registry.provider_for(source)?;
        let target_provider = self.registry.provider_for(target)?;

        self.run_participants(FileOperation::Copy, source, Some(target));

        self.do_move_copy(
            &source_provider,
            source,
            &target_provider,
            target,
            TransferMode::Copy,
            overwrite,
        )?;

        let stat = self.resolve(target, &ResolveOptions::metadata())?;
        self.emit_operation(
            FileOperationEvent::new(FileOperation::Copy, source.clone())
                .with_target(target.clone())
                .with_stat(stat.clone()),
        );
        Ok(stat)
    }

    fn do_move_copy(
        &self,
        source_provider: &Arc<dyn FileSystemProvider>,
        source: &Uri,
        target_provider: &Arc<dyn FileSystemProvider>,
        target: &Uri,
        mode: TransferMode,
        overwrite: bool,
    ) -> FsResult<TransferMode> {
        if source.to_string() == target.to_string() {
            return Ok(mode);
        }

        let same_provider = Arc::ptr_eq(source_provider, target_provider);
        let case_sensitive = source_provider.capabilities().is_case_sensitive();

        // Same file reached through a different casing of the same path
        let same_resource_different_case =
            same_provider && !case_sensitive && source.is_equal(target, false);

        if same_resource_different_case && mode == TransferMode::Copy {
            return Err(FsError::FileMoveConflict(format!(
                "'{source}' and '{target}' are the same file with different path case"
            )));
        }

        if !same_resource_different_case && target.is_equal_or_parent(source, case_sensitive) {
            return Err(FsError::Other(format!(
                "unable to move/copy '{source}' into a path inside itself: '{target}'"
            )));
        }

        let target_exists = target_provider.stat(target).is_ok();
        if target_exists && !same_resource_different_case {
            if !overwrite {
                return Err(FsError::FileMoveConflict(target.to_string()));
            }
            if same_provider && source.is_equal_or_parent(target, case_sensitive) {
                return Err(FsError::Other(format!(
                    "unable to overwrite '{target}': deleting it would also delete '{source}'"
                )));
            }
            self.del(
                target,
                DeleteOptions {
                    recursive: true,
                    use_trash: false,
                },
            )?;
        }

        if let Some(parent) = target.parent() {
            self.mkdirp(target_provider, &parent)?;
        }

        match mode {
            TransferMode::Copy => {
                if same_provider
                    && source_provider
                        .capabilities()
                        .contains(ProviderCapabilities::FILE_FOLDER_COPY)
                {
                    source_provider
                        .copy(source, target, overwrite)
                        .map_err(|e| e.with_context(&format!("copy {source} -> {target}")))?;
                } else {
                    let stat = source_provider.stat(source)?;
                    if stat.is_dir() {
                        self.copy_folder(source_provider, source, target_provider, target)?;
                    } else {
                        self.copy_file(source_provider, source, target_provider, target)?;
                    }
                }
                Ok(TransferMode::Copy)
            }
            TransferMode::Move => {
                if same_provider {
                    source_provider
                        .rename(source, target, overwrite)
                        .map_err(|e| e.with_context(&format!("move {source} -> {target}")))?;
                    Ok(TransferMode::Move)
                } else {
                    self.do_move_copy(
                        source_provider,
                        source,
                        target_provider,
                        target,
                        TransferMode::Copy,
                        overwrite,
                    )?;
                    self.del(
                        source,
                        DeleteOptions {
                            recursive: true,
                            use_trash: false,
                        },
                    )?;
                    Ok(TransferMode::Copy)
                }
            }
        }
    }

    /// Materialize the target directory, then transfer children concurrently
    fn copy_folder(
        &self,
        source_provider: &Arc<dyn FileSystemProvider>,
        source: &Uri,
        target_provider: &Arc<dyn FileSystemProvider>,
        target: &Uri,
    ) -> FsResult<()> {
        target_provider.mkdir(target)?;
        let entries = source_provider.readdir(source)?;

        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(entries.len());
            for entry in &entries {
                let child_source = source.join(&entry.name);
                let child_target = target.join(&entry.name);
                workers.push(scope.spawn(move || {
                    if entry.file_type.is_dir() {
                        self.copy_folder(
                            source_provider,
                            &child_source,
                            target_provider,
                            &child_target,
                        )
                    } else {
                        self.copy_file(
                            source_provider,
                            &child_source,
                            target_provider,
                            &child_target,
                        )
                    }
                }));
            }
            for worker in workers {
                worker
                    .join()
                    .map_err(|_| FsError::Other("folder copy worker panicked".to_string()))??;
            }
            Ok(())
        })
    }

    /// Single-file transfer across the four source/target shape combinations
    fn copy_file(
        &self,
        source_provider: &Arc<dyn FileSystemProvider>,
        source: &Uri,
        target_provider: &Arc<dyn FileSystemProvider>,
        target: &Uri,
    ) -> FsResult<()> {
        let source_caps = source_provider.capabilities();
        let target_caps = target_provider.capabilities();

        let outcome = if source_caps.has_random_access() && target_caps.has_random_access() {
            self.pipe_buffered(source_provider, source, target_provider, target)
        } else if source_caps.has_random_access() && target_caps.has_whole_file() {
            read_all_through_handle(source_provider, source).and_then(|data| {
                target_provider.write_file(
                    target,
                    &data,
                    &WriteFileOptions {
                        create: true,
                        overwrite: true,
                    },
                )
            })
        } else if source_caps.has_whole_file() && target_caps.has_random_access() {
            source_provider.read_file(source).and_then(|data| {
                let key = Self::queue_key(target_caps, target);
                self.run_write_task(key, || {
                    write_through_handle(target_provider, target, WriteSource::Buffer(data))
                })
            })
        } else if source_caps.has_whole_file() && target_caps.has_whole_file() {
            source_provider.read_file(source).and_then(|data| {
                target_provider.write_file(
                    target,
                    &data,
                    &WriteFileOptions {
                        create: true,
                        overwrite: true,
                    },
                )
            })
        } else {
            Err(FsError::NotSupported(format!(
                "no compatible I/O shape to copy '{source}' to '{target}'"
            )))
        };

        outcome.map_err(|e| e.with_context(&format!("copy {source} -> {target}")))
    }

    /// Handle-to-handle pipe through a fixed-size buffer, serialized with
    /// writes to the target
    fn pipe_buffered(
        &self,
        source_provider: &Arc<dyn FileSystemProvider>,
        source: &Uri,
        target_provider: &Arc<dyn FileSystemProvider>,
        target: &Uri,
    ) -> FsResult<()> {
        let key = Self::queue_key(target_provider.capabilities(), target);
        self.run_write_task(key, || {
            let source_handle = source_provider.open(source, &OpenOptions { create: false })?;

            let outcome = (|| -> FsResult<()> {
                let target_handle = target_provider.open(target, &OpenOptions { create: true })?;
                let piped = pipe_handles(
                    source_provider,
                    source_handle,
                    target_provider,
                    target_handle,
                );
                if let Err(error) = target_provider.close(target_handle) {
                    warn!("Failed to close copy target handle: {error}");
                }
                piped
            })();

            if let Err(error) = source_provider.close(source_handle) {
                warn!("Failed to close copy source handle: {error}");
            }
            outcome
        })
    }
}

fn pipe_handles(
    source_provider: &Arc<dyn FileSystemProvider>,
    source_handle: FileHandle,
    target_provider: &Arc<dyn FileSystemProvider>,
    target_handle: FileHandle,
) -> FsResult<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut position = 0u64;
    loop {
        let n = source_provider.read(source_handle, position, &mut buf)?;
        if n == 0 {
            return Ok(());
        }
        let mut offset = 0usize;
        let mut write_position = position;
        while offset < n {
            let written = target_provider.write(target_handle, write_position, &buf[offset..n])?;
            if written == 0 {
                return Err(FsError::Io("no write progress".to_string()));
            }
            offset += written;
            write_position += written as u64;
        }
        position += n as u64;
    }
}

/// Drain a random-access source into one buffer
fn read_all_through_handle(
    provider: &Arc<dyn FileSystemProvider>,
    uri: &Uri,
) -> FsResult<Vec<u8>> {
    let handle = provider.open(uri, &OpenOptions { create: false })?;

    let outcome = (|| -> FsResult<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut position = 0u64;
        loop {
            let n = provider.read(handle, position, &mut buf)?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&buf[..n]);
            position += n as u64;
        }
    })();

    if let Err(error) = provider.close(handle) {
        warn!("Failed to close read handle {handle}: {error}");
    }
    outcome
}
