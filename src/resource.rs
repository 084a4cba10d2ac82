/*!
 * Resource Façade
 * A long-lived, versioned view over one file, as editors consume it
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::debug;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::events::EventBroadcaster;
use crate::service::FileService;
use crate::stream::WriteSource;
use crate::types::{
    FileOperation, FsError, ReadFileOptions, ResolveOptions, WriteOptions,
};
use crate::uri::Uri;

/// Errors surfaced by the resource façade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource not found")]
    NotFound,

    #[error("Resource is out of sync with its storage")]
    OutOfSync,

    #[error(transparent)]
    Service(#[from] FsError),
}

/// Content identity of the last observed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentVersion {
    pub etag: String,
    pub mtime: i64,
    pub size: u64,
}

struct Cached {
    version: ContentVersion,
    content: Vec<u8>,
}

/// A single-URI view with cached content, version preconditions and change
/// notification.
///
/// After `init`, external modifications, deletes and moves affecting the URI
/// fire `on_did_change_contents`.
pub struct Resource {
    uri: Uri,
    service: Arc<FileService>,
    cached: Mutex<Option<Cached>>,
    changed: EventBroadcaster<()>,
    stop: Arc<AtomicBool>,
}

impl Resource {
    #[must_use]
    pub fn new(service: Arc<FileService>, uri: Uri) -> Self {
        Self {
            uri,
            service,
            cached: Mutex::new(None),
            changed: EventBroadcaster::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Resolve the resource and start listening for changes.
    ///
    /// Fails when the URI does not resolve to a file, including when its
    /// scheme has no provider.
    pub fn init(&self) -> Result<(), ResourceError> {
        let stat = self
            .service
            .resolve(&self.uri, &ResolveOptions::metadata())
            .map_err(map_read_error)?;
        if stat.is_directory() {
            return Err(ResourceError::Service(FsError::FileIsDirectory(
                self.uri.to_string(),
            )));
        }

        self.spawn_change_listener();
        self.spawn_operation_listener();
        Ok(())
    }

    fn spawn_change_listener(&self) {
        let mut rx = self.service.subscribe_file_changes();
        let changed = self.changed.clone();
        let stop = Arc::clone(&self.stop);
        let uri = self.uri.clone();
        thread::spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if event.contains(&uri) {
                        debug!("External change detected on {uri}");
                        changed.emit(());
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        });
    }

    fn spawn_operation_listener(&self) {
        let mut rx = self.service.subscribe_operations();
        let changed = self.changed.clone();
        let stop = Arc::clone(&self.stop);
        let uri = self.uri.clone();
        thread::spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let relevant = matches!(
                        event.operation,
                        FileOperation::Delete | FileOperation::Move
                    ) && uri.is_equal_or_parent(&event.resource, true);
                    if relevant {
                        changed.emit(());
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        });
    }

    /// Content-change notifications
    #[must_use]
    pub fn on_did_change_contents(&self) -> broadcast::Receiver<()> {
        self.changed.subscribe()
    }

    /// Last observed version, if any
    #[must_use]
    pub fn version(&self) -> Option<ContentVersion> {
        self.cached.lock().as_ref().map(|c| c.version.clone())
    }

    /// Read the content, serving the cache when storage is unchanged
    pub fn read_contents(&self) -> Result<Vec<u8>, ResourceError> {
        let etag = self.version().map(|v| v.etag);
        let options = ReadFileOptions {
            etag,
            ..Default::default()
        };

        match self.service.read_file(&self.uri, &options) {
            Ok(content) => {
                let version = ContentVersion {
                    etag: content.stat.etag.clone(),
                    mtime: content.stat.mtime,
                    size: content.stat.size,
                };
                *self.cached.lock() = Some(Cached {
                    version,
                    content: content.value.clone(),
                });
                Ok(content.value)
            }
            Err(FsError::FileNotModifiedSince(_)) => self
                .cached
                .lock()
                .as_ref()
                .map(|c| c.content.clone())
                .ok_or(ResourceError::NotFound),
            Err(FsError::FileNotFound(_)) => {
                *self.cached.lock() = None;
                Err(ResourceError::NotFound)
            }
            Err(error) => Err(ResourceError::Service(error)),
        }
    }

    /// Write content with the cached version as precondition
    pub fn save_contents(&self, content: &[u8]) -> Result<ContentVersion, ResourceError> {
        let options = match self.version() {
            Some(version) => WriteOptions {
                etag: Some(version.etag),
                mtime: Some(version.mtime),
            },
            None => WriteOptions::default(),
        };

        match self
            .service
            .write_file(&self.uri, WriteSource::from(content), &options)
        {
            Ok(stat) => {
                let version = ContentVersion {
                    etag: stat.etag.clone(),
                    mtime: stat.mtime,
                    size: stat.size,
                };
                *self.cached.lock() = Some(Cached {
                    version: version.clone(),
                    content: content.to_vec(),
                });
                Ok(version)
            }
            Err(FsError::FileModifiedSince(_)) => Err(ResourceError::OutOfSync),
            Err(error) => Err(ResourceError::Service(error)),
        }
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn map_read_error(error: FsError) -> ResourceError {
    match error {
        FsError::FileNotFound(_) => ResourceError::NotFound,
        other => ResourceError::Service(other),
    }
}
