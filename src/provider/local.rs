/*!
 * Local Disk Provider
 * Wraps std::fs for host filesystem access, rooted at a directory
 */

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{FileHandle, FileSystemProvider};
use crate::capability::ProviderCapabilities;
use crate::events::{Disposable, EventBroadcaster};
use crate::types::{
    ChangeKind, DeleteOptions, DirEntry, FileChange, FileType, FsError, FsResult, OpenOptions,
    Stat, WatchOptions, WriteFileOptions,
};
use crate::uri::Uri;

/// Local filesystem provider
///
/// Change events are emitted for mutations performed through this provider;
/// external modifications to the underlying directory are not observed.
pub struct LocalFs {
    root: PathBuf,
    handles: Arc<DashMap<FileHandle, Mutex<fs::File>, RandomState>>,
    next_handle: AtomicU64,
    changes: EventBroadcaster<Vec<FileChange>>,
    readonly: bool,
}

impl LocalFs {
    /// Create a provider rooted at the given host directory
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            handles: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_handle: AtomicU64::new(1),
            changes: EventBroadcaster::default(),
            readonly: false,
        }
    }

    /// Read-only variant
    pub fn readonly<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            readonly: true,
            ..Self::new(root)
        }
    }

    /// Resolve a URI path under the root with manual component processing.
    /// `..` cannot escape the root boundary.
    fn resolve(&self, uri: &Uri) -> PathBuf {
        let mut components: Vec<&std::ffi::OsStr> = Vec::with_capacity(8);
        let path = Path::new(uri.path());
        for component in path.components() {
            match component {
                Component::Normal(name) => components.push(name),
                Component::ParentDir => {
                    components.pop();
                }
                _ => {}
            }
        }
        let mut result = self.root.clone();
        for component in components {
            result.push(component);
        }
        result
    }

    fn guard_mutation(&self, uri: &Uri) -> FsResult<()> {
        if self.readonly {
            return Err(FsError::FileReadOnly(uri.to_string()));
        }
        Ok(())
    }

    fn map_metadata(metadata: &fs::Metadata) -> Stat {
        let to_millis = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0)
        };
        let file_type = if metadata.is_dir() {
            FileType::Directory
        } else if metadata.file_type().is_symlink() {
            FileType::SymbolicLink
        } else {
            FileType::File
        };
        Stat {
            file_type,
            mtime: to_millis(metadata.modified()),
            ctime: to_millis(metadata.created()),
            size: metadata.len(),
        }
    }

    fn map_io(uri: &Uri, err: std::io::Error) -> FsError {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => FsError::FileNotFound(uri.to_string()),
            ErrorKind::AlreadyExists => FsError::FileExists(uri.to_string()),
            ErrorKind::PermissionDenied => FsError::FilePermissionDenied(uri.to_string()),
            _ => FsError::Io(format!("{uri}: {err}")),
        }
    }

    fn emit(&self, uri: &Uri, kind: ChangeKind) {
        self.changes.emit(vec![FileChange::new(uri.clone(), kind)]);
    }
}

impl FileSystemProvider for LocalFs {
    fn capabilities(&self) -> ProviderCapabilities {
        let mut caps = ProviderCapabilities::FILE_READ_WRITE
            | ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE
            | ProviderCapabilities::PATH_CASE_SENSITIVE;
        if self.readonly {
            caps |= ProviderCapabilities::READONLY;
        }
        caps
    }

    fn stat(&self, uri: &Uri) -> FsResult<Stat> {
        let path = self.resolve(uri);
        let metadata = fs::symlink_metadata(&path).map_err(|e| Self::map_io(uri, e))?;
        Ok(Self::map_metadata(&metadata))
    }

    fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        let path = self.resolve(uri);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| Self::map_io(uri, e))? {
            let entry = entry.map_err(|e| Self::map_io(uri, e))?;
            let file_type = entry
                .file_type()
                .map(|t| {
                    if t.is_dir() {
                        FileType::Directory
                    } else if t.is_symlink() {
                        FileType::SymbolicLink
                    } else {
                        FileType::File
                    }
                })
                .unwrap_or(FileType::Unknown);
            entries.push(DirEntry::new_unchecked(
                entry.file_name().to_string_lossy().into_owned(),
                file_type,
            ));
        }
        Ok(entries)
    }

    fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.guard_mutation(uri)?;
        fs::create_dir(self.resolve(uri)).map_err(|e| Self::map_io(uri, e))?;
        self.emit(uri, ChangeKind::Added);
        Ok(())
    }

    fn delete(&self, uri: &Uri, options: &DeleteOptions) -> FsResult<()> {
        self.guard_mutation(uri)?;
        let path = self.resolve(uri);
        let metadata = fs::symlink_metadata(&path).map_err(|e| Self::map_io(uri, e))?;
        if metadata.is_dir() {
            if options.recursive {
                fs::remove_dir_all(&path).map_err(|e| Self::map_io(uri, e))?;
            } else {
                fs::remove_dir(&path).map_err(|e| Self::map_io(uri, e))?;
            }
        } else {
            fs::remove_file(&path).map_err(|e| Self::map_io(uri, e))?;
        }
        self.emit(uri, ChangeKind::Deleted);
        Ok(())
    }

    fn rename(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<()> {
        self.guard_mutation(target)?;
        let src = self.resolve(source);
        let dst = self.resolve(target);
        if !overwrite && dst.exists() {
            return Err(FsError::FileExists(target.to_string()));
        }
        fs::rename(&src, &dst).map_err(|e| Self::map_io(source, e))?;
        self.changes.emit(vec![
            FileChange::new(source.clone(), ChangeKind::Deleted),
            FileChange::new(target.clone(), ChangeKind::Added),
        ]);
        Ok(())
    }

    fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        let path = self.resolve(uri);
        if path.is_dir() {
            return Err(FsError::FileIsDirectory(uri.to_string()));
        }
        fs::read(&path).map_err(|e| Self::map_io(uri, e))
    }

    fn write_file(&self, uri: &Uri, data: &[u8], options: &WriteFileOptions) -> FsResult<()> {
        self.guard_mutation(uri)?;
        let path = self.resolve(uri);
        let existed = path.exists();
        if existed && !options.overwrite {
            return Err(FsError::FileExists(uri.to_string()));
        }
        if !existed && !options.create {
            return Err(FsError::FileNotFound(uri.to_string()));
        }
        fs::write(&path, data).map_err(|e| Self::map_io(uri, e))?;
        self.emit(
            uri,
            if existed {
                ChangeKind::Updated
            } else {
                ChangeKind::Added
            },
        );
        Ok(())
    }

    fn open(&self, uri: &Uri, options: &OpenOptions) -> FsResult<FileHandle> {
        if options.create {
            self.guard_mutation(uri)?;
        }
        let path = self.resolve(uri);
        let file = if options.create {
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
        } else {
            fs::OpenOptions::new().read(true).open(&path)
        }
        .map_err(|e| Self::map_io(uri, e))?;

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(handle, Mutex::new(file));
        Ok(handle)
    }

    fn close(&self, handle: FileHandle) -> FsResult<()> {
        self.handles
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| FsError::Io(format!("invalid handle: {handle}")))
    }

    fn read(&self, handle: FileHandle, pos: u64, buf: &mut [u8]) -> FsResult<usize> {
        let entry = self
            .handles
            .get(&handle)
            .ok_or_else(|| FsError::Io(format!("invalid handle: {handle}")))?;
        let mut file = entry.lock();
        file.seek(SeekFrom::Start(pos))
            .map_err(|e| FsError::Io(e.to_string()))?;
        file.read(buf).map_err(|e| FsError::Io(e.to_string()))
    }

    fn write(&self, handle: FileHandle, pos: u64, data: &[u8]) -> FsResult<usize> {
        let entry = self
            .handles
            .get(&handle)
            .ok_or_else(|| FsError::Io(format!("invalid handle: {handle}")))?;
        let mut file = entry.lock();
        file.seek(SeekFrom::Start(pos))
            .map_err(|e| FsError::Io(e.to_string()))?;
        file.write(data).map_err(|e| FsError::Io(e.to_string()))
    }

    fn watch(&self, _uri: &Uri, _options: &WatchOptions) -> FsResult<Disposable> {
        // Mutation events flow from this provider's own operations; there is
        // no host-level watcher behind this session.
        Ok(Disposable::empty())
    }

    fn subscribe_changes(&self) -> tokio::sync::broadcast::Receiver<Vec<FileChange>> {
        self.changes.subscribe()
    }
}
