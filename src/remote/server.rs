/*!
 * Remote Provider Server
 * Serves one wrapped provider to a connected client, with per-session fd and
 * watcher tables
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, warn};
use tokio::sync::broadcast::error::RecvError;

use super::protocol::{
    decode, encode, Message, Notification, Request, RequestPayload, Response, ResponseBody,
    ResponsePayload, BUFFER_SIZE,
};
use super::transport::MessageTransport;
use crate::events::Disposable;
use crate::provider::{FileHandle, FileSystemProvider};
use crate::types::{FsError, FsResult};
use crate::uri::Uri;

struct ServerInner {
    provider: Arc<dyn FileSystemProvider>,
    transport: Arc<dyn MessageTransport>,
    /// Wire fd -> provider handle; handles never cross the boundary raw
    fds: DashMap<u64, FileHandle, RandomState>,
    next_fd: AtomicU64,
    /// Client-supplied watcher id -> provider watch
    watchers: DashMap<u64, Disposable, RandomState>,
}

impl ServerInner {
    fn provider_handle(&self, fd: u64) -> FsResult<FileHandle> {
        self.fds
            .get(&fd)
            .map(|entry| *entry.value())
            .ok_or_else(|| FsError::Io(format!("unknown fd: {fd}")))
    }

    fn handle_request(&self, payload: RequestPayload) -> ResponseBody {
        match self.dispatch(payload) {
            Ok(payload) => ResponseBody::Ok(payload),
            Err(error) => ResponseBody::Err(error),
        }
    }

    fn dispatch(&self, payload: RequestPayload) -> FsResult<ResponsePayload> {
        match payload {
            RequestPayload::GetCapabilities => Ok(ResponsePayload::Capabilities(
                self.provider.capabilities(),
            )),
            RequestPayload::Stat { path } => {
                let uri = Uri::parse(&path)?;
                Ok(ResponsePayload::Stat(self.provider.stat(&uri)?))
            }
            RequestPayload::Readdir { path } => {
                let uri = Uri::parse(&path)?;
                let entries = self
                    .provider
                    .readdir(&uri)?
                    .into_iter()
                    .map(|entry| (entry.name, entry.file_type))
                    .collect();
                Ok(ResponsePayload::Entries(entries))
            }
            RequestPayload::ReadFile { path } => {
                let uri = Uri::parse(&path)?;
                Ok(ResponsePayload::Bytes(self.provider.read_file(&uri)?))
            }
            RequestPayload::WriteFile {
                path,
                content,
                opts,
            } => {
                let uri = Uri::parse(&path)?;
                self.provider.write_file(&uri, &content, &opts)?;
                Ok(ResponsePayload::Unit)
            }
            RequestPayload::Open { path, opts } => {
                let uri = Uri::parse(&path)?;
                let handle = self.provider.open(&uri, &opts)?;
                let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
                self.fds.insert(fd, handle);
                Ok(ResponsePayload::Fd(fd))
            }
            RequestPayload::Close { fd } => {
                let (_, handle) = self
                    .fds
                    .remove(&fd)
                    .ok_or_else(|| FsError::Io(format!("unknown fd: {fd}")))?;
                self.provider.close(handle)?;
                Ok(ResponsePayload::Unit)
            }
            RequestPayload::Read { fd, pos, length } => {
                let handle = self.provider_handle(fd)?;
                let mut bytes = vec![0u8; (length as usize).min(BUFFER_SIZE)];
                let bytes_read = self.provider.read(handle, pos, &mut bytes)?;
                bytes.truncate(bytes_read);
                Ok(ResponsePayload::BytesRead {
                    bytes,
                    bytes_read: bytes_read as u64,
                })
            }
            RequestPayload::Write {
                fd,
                pos,
                content,
                offset,
                length,
            } => {
                let handle = self.provider_handle(fd)?;
                let start = (offset as usize).min(content.len());
                let end = (start + length as usize).min(content.len());
                let written = self.provider.write(handle, pos, &content[start..end])?;
                Ok(ResponsePayload::Written(written as u64))
            }
            RequestPayload::Mkdir { path } => {
                let uri = Uri::parse(&path)?;
                self.provider.mkdir(&uri)?;
                Ok(ResponsePayload::Unit)
            }
            RequestPayload::Delete { path, opts } => {
                let uri = Uri::parse(&path)?;
                self.provider.delete(&uri, &opts)?;
                Ok(ResponsePayload::Unit)
            }
            RequestPayload::Rename {
                from,
                to,
                overwrite,
            } => {
                let source = Uri::parse(&from)?;
                let target = Uri::parse(&to)?;
                self.provider.rename(&source, &target, overwrite)?;
                Ok(ResponsePayload::Unit)
            }
            RequestPayload::Copy {
                from,
                to,
                overwrite,
            } => {
                let source = Uri::parse(&from)?;
                let target = Uri::parse(&to)?;
                self.provider.copy(&source, &target, overwrite)?;
                Ok(ResponsePayload::Unit)
            }
            RequestPayload::Watch {
                watcher_id,
                path,
                opts,
            } => {
                let uri = Uri::parse(&path)?;
                let guard = self.provider.watch(&uri, &opts)?;
                // A re-issued id (reconnect) replaces the previous watch
                if let Some(previous) = self.watchers.insert(watcher_id, guard) {
                    previous.dispose();
                }
                Ok(ResponsePayload::Unit)
            }
            RequestPayload::Unwatch { watcher_id } => {
                if let Some((_, guard)) = self.watchers.remove(&watcher_id) {
                    guard.dispose();
                } else {
                    debug!("Unwatch for unknown watcher {watcher_id}");
                }
                Ok(ResponsePayload::Unit)
            }
        }
    }

    fn send(&self, message: &Message) {
        match encode(message) {
            // Sends while the client is away are best-effort
            Ok(frame) => {
                let _ = self.transport.send(frame);
            }
            Err(error) => warn!("Server failed to encode a frame: {error}"),
        }
    }
}

/// Server side of the remote bridge; wraps one provider for one client
pub struct FileSystemProviderServer {
    inner: Arc<ServerInner>,
}

impl FileSystemProviderServer {
    #[must_use]
    pub fn new(
        provider: Arc<dyn FileSystemProvider>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        let inner = Arc::new(ServerInner {
            provider,
            transport,
            fds: DashMap::with_hasher(RandomState::new()),
            next_fd: AtomicU64::new(1),
            watchers: DashMap::with_hasher(RandomState::new()),
        });

        Self::spawn_request_loop(&inner);
        Self::spawn_change_forwarder(&inner);
        Self::spawn_capability_forwarder(&inner);

        Self { inner }
    }

    /// Number of live watches held for the client
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    fn spawn_request_loop(inner: &Arc<ServerInner>) {
        let incoming = inner.transport.incoming();
        let weak: Weak<ServerInner> = Arc::downgrade(inner);
        thread::spawn(move || {
            for frame in incoming.iter() {
                let Some(inner) = weak.upgrade() else { break };
                match decode(&frame) {
                    Ok(Message::Request(Request { id, payload })) => {
                        let body = inner.handle_request(payload);
                        inner.send(&Message::Response(Response { id, body }));
                    }
                    Ok(_) => warn!("Server received a non-request frame; dropping it"),
                    Err(error) => warn!("Server failed to decode a frame: {error}"),
                }
            }
        });
    }

    fn spawn_change_forwarder(inner: &Arc<ServerInner>) {
        let mut rx = inner.provider.subscribe_changes();
        let weak: Weak<ServerInner> = Arc::downgrade(inner);
        thread::spawn(move || loop {
            match rx.blocking_recv() {
                Ok(batch) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.send(&Message::Notification(Notification::DidChangeFile(batch)));
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Server dropped {missed} change batches");
                }
                Err(RecvError::Closed) => break,
            }
        });
    }

    fn spawn_capability_forwarder(inner: &Arc<ServerInner>) {
        let mut rx = inner.provider.subscribe_capabilities();
        let weak: Weak<ServerInner> = Arc::downgrade(inner);
        thread::spawn(move || loop {
            match rx.blocking_recv() {
                Ok(capabilities) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.send(&Message::Notification(Notification::DidChangeCapabilities(
                        capabilities,
                    )));
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        });
    }
}
