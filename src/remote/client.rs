/*!
 * Remote Provider Client
 * Implements the full provider surface by forwarding calls across a
 * transport; reconciles watch state across reconnection
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::protocol::{
    decode, encode, Message, Notification, Request, RequestPayload, Response, ResponseBody,
    ResponsePayload,
};
use super::transport::MessageTransport;
use crate::capability::ProviderCapabilities;
use crate::events::{Disposable, EventBroadcaster};
use crate::provider::{FileHandle, FileSystemProvider};
use crate::types::{
    DeleteOptions, DirEntry, FileChange, FsError, FsResult, OpenOptions, Stat, WatchOptions,
    WriteFileOptions,
};
use crate::uri::Uri;

/// Assumed until the server answers `get_capabilities`
const BOOTSTRAP_CAPABILITIES: ProviderCapabilities = ProviderCapabilities::FILE_READ_WRITE
    .union(ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE)
    .union(ProviderCapabilities::FILE_FOLDER_COPY);

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

struct ClientInner {
    transport: Arc<dyn MessageTransport>,
    pending: DashMap<u64, flume::Sender<ResponseBody>, RandomState>,
    next_id: AtomicU64,
    capabilities: RwLock<ProviderCapabilities>,
    capability_events: EventBroadcaster<ProviderCapabilities>,
    changes: EventBroadcaster<Vec<FileChange>>,
    watches: DashMap<u64, (Uri, WatchOptions), RandomState>,
    next_watcher: AtomicU64,
}

impl ClientInner {
    fn call(&self, payload: RequestPayload) -> FsResult<ResponsePayload> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = flume::bounded(1);
        self.pending.insert(id, tx);

        let frame = encode(&Message::Request(Request { id, payload }))?;
        if let Err(error) = self.transport.send(frame) {
            self.pending.remove(&id);
            return Err(error);
        }

        match rx.recv_timeout(CALL_TIMEOUT) {
            Ok(ResponseBody::Ok(payload)) => Ok(payload),
            Ok(ResponseBody::Err(error)) => Err(error),
            Err(_) => {
                self.pending.remove(&id);
                Err(FsError::Unavailable("remote call timed out".to_string()))
            }
        }
    }

    fn handle_frame(&self, frame: &[u8]) {
        match decode(frame) {
            Ok(Message::Response(Response { id, body })) => {
                if let Some((_, tx)) = self.pending.remove(&id) {
                    let _ = tx.send(body);
                }
            }
            Ok(Message::Notification(Notification::DidChangeFile(batch))) => {
                self.changes.emit(batch);
            }
            Ok(Message::Notification(Notification::DidChangeCapabilities(capabilities))) => {
                *self.capabilities.write() = capabilities;
                self.capability_events.emit(capabilities);
            }
            Ok(Message::Request(_)) => {
                warn!("Remote client received a request frame; dropping it");
            }
            Err(error) => warn!("Remote client failed to decode a frame: {error}"),
        }
    }

    /// Runs on every connection-opened event; reconnects also re-issue every
    /// recorded watch under its original watcher id
    fn on_connected(&self, opens: u64) {
        match self.call(RequestPayload::GetCapabilities) {
            Ok(ResponsePayload::Capabilities(capabilities)) => {
                *self.capabilities.write() = capabilities;
                self.capability_events.emit(capabilities);
            }
            Ok(_) | Err(_) => {
                debug!("Capability exchange pending; keeping bootstrap defaults");
            }
        }

        if opens > 1 {
            for entry in self.watches.iter() {
                let (uri, options) = entry.value();
                debug!("Re-issuing watch {} for {uri} after reconnect", entry.key());
                if let Err(error) = self.call(RequestPayload::Watch {
                    watcher_id: *entry.key(),
                    path: uri.to_string(),
                    opts: options.clone(),
                }) {
                    warn!("Failed to re-issue watch for {uri}: {error}");
                }
            }
        }
    }
}

/// Client side of the remote bridge.
///
/// Starts from a conservative capability default until the server answers
/// `get_capabilities`; later capability notifications update the set and fire
/// the corresponding event.
pub struct RemoteFileSystemProvider {
    inner: Arc<ClientInner>,
}

impl RemoteFileSystemProvider {
    #[must_use]
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        let inner = Arc::new(ClientInner {
            transport,
            pending: DashMap::with_hasher(RandomState::new()),
            next_id: AtomicU64::new(1),
            capabilities: RwLock::new(BOOTSTRAP_CAPABILITIES),
            capability_events: EventBroadcaster::default(),
            changes: EventBroadcaster::default(),
            watches: DashMap::with_hasher(RandomState::new()),
            next_watcher: AtomicU64::new(1),
        });

        Self::spawn_dispatcher(&inner);
        Self::spawn_connection_listener(&inner);

        Self { inner }
    }

    fn spawn_dispatcher(inner: &Arc<ClientInner>) {
        let incoming = inner.transport.incoming();
        let weak: Weak<ClientInner> = Arc::downgrade(inner);
        thread::spawn(move || {
            for frame in incoming.iter() {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_frame(&frame);
            }
        });
    }

    fn spawn_connection_listener(inner: &Arc<ClientInner>) {
        let mut rx = inner.transport.subscribe_connections();
        let weak: Weak<ClientInner> = Arc::downgrade(inner);
        thread::spawn(move || {
            let mut opens: u64 = 0;
            loop {
                match rx.blocking_recv() {
                    Ok(()) => {
                        opens += 1;
                        let Some(inner) = weak.upgrade() else { break };
                        inner.on_connected(opens);
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    fn unexpected(method: &str) -> FsError {
        FsError::Io(format!("unexpected response shape for {method}"))
    }
}

impl FileSystemProvider for RemoteFileSystemProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        *self.inner.capabilities.read()
    }

    fn stat(&self, uri: &Uri) -> FsResult<Stat> {
        match self.inner.call(RequestPayload::Stat {
            path: uri.to_string(),
        })? {
            ResponsePayload::Stat(stat) => Ok(stat),
            _ => Err(Self::unexpected("stat")),
        }
    }

    fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        match self.inner.call(RequestPayload::Readdir {
            path: uri.to_string(),
        })? {
            ResponsePayload::Entries(entries) => Ok(entries
                .into_iter()
                .map(|(name, file_type)| DirEntry::new_unchecked(name, file_type))
                .collect()),
            _ => Err(Self::unexpected("readdir")),
        }
    }

    fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        match self.inner.call(RequestPayload::Mkdir {
            path: uri.to_string(),
        })? {
            ResponsePayload::Unit => Ok(()),
            _ => Err(Self::unexpected("mkdir")),
        }
    }

    fn delete(&self, uri: &Uri, options: &DeleteOptions) -> FsResult<()> {
        match self.inner.call(RequestPayload::Delete {
            path: uri.to_string(),
            opts: *options,
        })? {
            ResponsePayload::Unit => Ok(()),
            _ => Err(Self::unexpected("delete")),
        }
    }

    fn rename(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<()> {
        match self.inner.call(RequestPayload::Rename {
            from: source.to_string(),
            to: target.to_string(),
            overwrite,
        })? {
            ResponsePayload::Unit => Ok(()),
            _ => Err(Self::unexpected("rename")),
        }
    }

    fn copy(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<()> {
        match self.inner.call(RequestPayload::Copy {
            from: source.to_string(),
            to: target.to_string(),
            overwrite,
        })? {
            ResponsePayload::Unit => Ok(()),
            _ => Err(Self::unexpected("copy")),
        }
    }

    fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        match self.inner.call(RequestPayload::ReadFile {
            path: uri.to_string(),
        })? {
            ResponsePayload::Bytes(bytes) => Ok(bytes),
            _ => Err(Self::unexpected("read_file")),
        }
    }

    fn write_file(&self, uri: &Uri, data: &[u8], options: &WriteFileOptions) -> FsResult<()> {
        match self.inner.call(RequestPayload::WriteFile {
            path: uri.to_string(),
            content: data.to_vec(),
            opts: *options,
        })? {
            ResponsePayload::Unit => Ok(()),
            _ => Err(Self::unexpected("write_file")),
        }
    }

    fn open(&self, uri: &Uri, options: &OpenOptions) -> FsResult<FileHandle> {
        match self.inner.call(RequestPayload::Open {
            path: uri.to_string(),
            opts: *options,
        })? {
            ResponsePayload::Fd(fd) => Ok(fd),
            _ => Err(Self::unexpected("open")),
        }
    }

    fn close(&self, handle: FileHandle) -> FsResult<()> {
        match self.inner.call(RequestPayload::Close { fd: handle })? {
            ResponsePayload::Unit => Ok(()),
            _ => Err(Self::unexpected("close")),
        }
    }

    fn read(&self, handle: FileHandle, pos: u64, buf: &mut [u8]) -> FsResult<usize> {
        match self.inner.call(RequestPayload::Read {
            fd: handle,
            pos,
            length: buf.len() as u64,
        })? {
            ResponsePayload::BytesRead { bytes, bytes_read } => {
                let n = (bytes_read as usize).min(bytes.len()).min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            _ => Err(Self::unexpected("read")),
        }
    }

    fn write(&self, handle: FileHandle, pos: u64, data: &[u8]) -> FsResult<usize> {
        match self.inner.call(RequestPayload::Write {
            fd: handle,
            pos,
            content: data.to_vec(),
            offset: 0,
            length: data.len() as u64,
        })? {
            ResponsePayload::Written(n) => Ok(n as usize),
            _ => Err(Self::unexpected("write")),
        }
    }

    fn watch(&self, uri: &Uri, options: &WatchOptions) -> FsResult<Disposable> {
        let watcher_id = self.inner.next_watcher.fetch_add(1, Ordering::SeqCst);
        self.inner
            .watches
            .insert(watcher_id, (uri.clone(), options.clone()));

        let outcome = self.inner.call(RequestPayload::Watch {
            watcher_id,
            path: uri.to_string(),
            opts: options.clone(),
        });
        if let Err(error) = outcome {
            self.inner.watches.remove(&watcher_id);
            return Err(error);
        }

        let inner = Arc::clone(&self.inner);
        Ok(Disposable::new(move || {
            inner.watches.remove(&watcher_id);
            if let Err(error) = inner.call(RequestPayload::Unwatch { watcher_id }) {
                debug!("Failed to unwatch {watcher_id}: {error}");
            }
        }))
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<Vec<FileChange>> {
        self.inner.changes.subscribe()
    }

    fn subscribe_capabilities(&self) -> broadcast::Receiver<ProviderCapabilities> {
        self.inner.capability_events.subscribe()
    }
}
