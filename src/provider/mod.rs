/*!
 * Storage Providers
 * The backend abstraction behind each URI scheme
 */

pub mod local;
pub mod memory;

use tokio::sync::broadcast;

use crate::capability::ProviderCapabilities;
use crate::events::Disposable;
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FsError, FsResult, OpenOptions, Stat, WatchOptions,
    WriteFileOptions,
};
use crate::uri::Uri;

pub use local::LocalFs;
pub use memory::MemoryFs;

/// Opaque handle returned by `open` and consumed by `read`/`write`/`close`
pub type FileHandle = u64;

/// A storage backend serving one URI scheme.
///
/// `capabilities` determines which of the optional methods exist: callers
/// must not invoke an I/O shape the provider does not advertise, and the
/// default bodies treat such calls as programming errors by failing with
/// `NotSupported`. At least one of the two I/O shapes is required.
///
/// Operations should be atomic where possible and return appropriate errors
/// on failure.
pub trait FileSystemProvider: Send + Sync {
    /// Capability bits for this provider
    fn capabilities(&self) -> ProviderCapabilities;

    /// Metadata for a resource
    fn stat(&self, uri: &Uri) -> FsResult<Stat>;

    /// List directory contents
    fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>>;

    /// Create a directory; the parent must exist
    fn mkdir(&self, uri: &Uri) -> FsResult<()>;

    /// Delete a file or directory
    fn delete(&self, uri: &Uri, options: &DeleteOptions) -> FsResult<()>;

    /// Rename within this provider
    fn rename(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<()>;

    /// Native copy; requires `FILE_FOLDER_COPY`
    fn copy(&self, _source: &Uri, _target: &Uri, _overwrite: bool) -> FsResult<()> {
        Err(FsError::NotSupported("copy".to_string()))
    }

    /// Read entire file contents; requires `FILE_READ_WRITE`
    fn read_file(&self, _uri: &Uri) -> FsResult<Vec<u8>> {
        Err(FsError::NotSupported("read_file".to_string()))
    }

    /// Write entire file contents; requires `FILE_READ_WRITE`
    fn write_file(&self, _uri: &Uri, _data: &[u8], _options: &WriteFileOptions) -> FsResult<()> {
        Err(FsError::NotSupported("write_file".to_string()))
    }

    /// Open a handle; requires `FILE_OPEN_READ_WRITE_CLOSE`.
    ///
    /// `create: true` opens for writing, creating the file when missing and
    /// truncating existing content; `create: false` opens for reading.
    fn open(&self, _uri: &Uri, _options: &OpenOptions) -> FsResult<FileHandle> {
        Err(FsError::NotSupported("open".to_string()))
    }

    /// Close a handle; every open handle must be closed on all exit paths
    fn close(&self, _handle: FileHandle) -> FsResult<()> {
        Err(FsError::NotSupported("close".to_string()))
    }

    /// Read at an offset, returning the number of bytes read (0 at EOF)
    fn read(&self, _handle: FileHandle, _pos: u64, _buf: &mut [u8]) -> FsResult<usize> {
        Err(FsError::NotSupported("read".to_string()))
    }

    /// Write at an offset, returning the number of bytes written; partial
    /// writes are allowed
    fn write(&self, _handle: FileHandle, _pos: u64, _data: &[u8]) -> FsResult<usize> {
        Err(FsError::NotSupported("write".to_string()))
    }

    /// Open an underlying watch for the resource.
    ///
    /// The returned disposable closes the watch; the service collapses
    /// identical subscriptions so each distinct `(uri, options)` reaches the
    /// provider at most once at a time.
    fn watch(&self, uri: &Uri, options: &WatchOptions) -> FsResult<Disposable>;

    /// Batched change events
    fn subscribe_changes(&self) -> broadcast::Receiver<Vec<FileChange>>;

    /// Capability-change events; fixed-capability providers never fire
    fn subscribe_capabilities(&self) -> broadcast::Receiver<ProviderCapabilities> {
        let (_tx, rx) = broadcast::channel(1);
        rx
    }
}
