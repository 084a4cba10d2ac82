/*!
 * In-Memory Provider
 * Fast, volatile backend supporting both I/O shapes; the reference backend
 * for tests and scratch schemes
 */

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;

use super::{FileHandle, FileSystemProvider};
use crate::capability::ProviderCapabilities;
use crate::events::{Disposable, EventBroadcaster};
use crate::types::{
    now_millis, ChangeKind, DeleteOptions, DirEntry, FileChange, FileType, FsError, FsResult,
    OpenOptions, Stat, WatchOptions, WriteFileOptions,
};
use crate::uri::Uri;

/// In-memory filesystem node
#[derive(Debug, Clone)]
enum Node {
    File {
        path: String,
        data: Vec<u8>,
        mtime: i64,
        ctime: i64,
    },
    Directory {
        path: String,
        mtime: i64,
        ctime: i64,
    },
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    fn display_path(&self) -> &str {
        match self {
            Node::File { path, .. } | Node::Directory { path, .. } => path,
        }
    }

    fn set_display_path(&mut self, new_path: String) {
        match self {
            Node::File { path, .. } | Node::Directory { path, .. } => *path = new_path,
        }
    }

    fn stat(&self) -> Stat {
        match self {
            Node::File {
                data, mtime, ctime, ..
            } => Stat {
                file_type: FileType::File,
                mtime: *mtime,
                ctime: *ctime,
                size: data.len() as u64,
            },
            Node::Directory { mtime, ctime, .. } => Stat {
                file_type: FileType::Directory,
                mtime: *mtime,
                ctime: *ctime,
                size: 0,
            },
        }
    }

    fn file_type(&self) -> FileType {
        if self.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        }
    }
}

#[derive(Debug, Clone)]
struct OpenState {
    key: String,
    uri: Uri,
    writable: bool,
    created: bool,
}

/// In-memory provider
///
/// Nodes are keyed by their normalized path, case-folded when the instance is
/// case-insensitive; each node keeps its display path for listings.
pub struct MemoryFs {
    nodes: Arc<DashMap<String, Node, RandomState>>,
    handles: Arc<DashMap<FileHandle, OpenState, RandomState>>,
    next_handle: AtomicU64,
    changes: EventBroadcaster<Vec<FileChange>>,
    active_watches: Arc<AtomicUsize>,
    capabilities: ProviderCapabilities,
}

impl MemoryFs {
    /// Both I/O shapes, native copy, case-sensitive paths
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(
            ProviderCapabilities::FILE_READ_WRITE
                | ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE
                | ProviderCapabilities::FILE_FOLDER_COPY
                | ProviderCapabilities::PATH_CASE_SENSITIVE,
        )
    }

    /// Restrict or extend the advertised capability set
    #[must_use]
    pub fn with_capabilities(capabilities: ProviderCapabilities) -> Self {
        let nodes: DashMap<String, Node, RandomState> = DashMap::with_hasher(RandomState::new());
        let now = now_millis();
        nodes.insert(
            "/".to_string(),
            Node::Directory {
                path: "/".to_string(),
                mtime: now,
                ctime: now,
            },
        );
        Self {
            nodes: Arc::new(nodes),
            handles: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_handle: AtomicU64::new(1),
            changes: EventBroadcaster::default(),
            active_watches: Arc::new(AtomicUsize::new(0)),
            capabilities,
        }
    }

    /// Number of currently open provider-level watches
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.active_watches.load(Ordering::SeqCst)
    }

    fn case_sensitive(&self) -> bool {
        self.capabilities.is_case_sensitive()
    }

    fn key(&self, uri: &Uri) -> String {
        if self.case_sensitive() {
            uri.path().to_string()
        } else {
            uri.path().to_lowercase()
        }
    }

    fn parent_key(key: &str) -> Option<String> {
        if key == "/" {
            return None;
        }
        match key.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(idx) => Some(key[..idx].to_string()),
            None => None,
        }
    }

    fn ensure_parent(&self, key: &str, uri: &Uri) -> FsResult<()> {
        if let Some(parent) = Self::parent_key(key) {
            match self.nodes.get(&parent) {
                Some(node) if node.is_dir() => Ok(()),
                Some(_) => Err(FsError::FileNotADirectory(
                    uri.parent().map(|p| p.to_string()).unwrap_or_default(),
                )),
                None => Err(FsError::FileNotFound(
                    uri.parent().map(|p| p.to_string()).unwrap_or_default(),
                )),
            }
        } else {
            Ok(())
        }
    }

    fn guard_mutation(&self, uri: &Uri) -> FsResult<()> {
        if self.capabilities.is_readonly() {
            return Err(FsError::FileReadOnly(uri.to_string()));
        }
        Ok(())
    }

    /// Keys of `key` itself plus every descendant
    fn subtree_keys(&self, key: &str) -> Vec<String> {
        let prefix = if key == "/" {
            "/".to_string()
        } else {
            format!("{key}/")
        };
        self.nodes
            .iter()
            .filter(|entry| entry.key() == key || entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn has_children(&self, key: &str) -> bool {
        self.nodes
            .iter()
            .any(|entry| Self::parent_key(entry.key()).as_deref() == Some(key))
    }

    fn emit(&self, uri: &Uri, kind: ChangeKind) {
        self.changes.emit(vec![FileChange::new(uri.clone(), kind)]);
    }

    fn touch(previous: i64) -> i64 {
        // Keep mtimes strictly increasing so etags change on every mutation
        now_millis().max(previous + 1)
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystemProvider for MemoryFs {
    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn stat(&self, uri: &Uri) -> FsResult<Stat> {
        self.nodes
            .get(&self.key(uri))
            .map(|node| node.stat())
            .ok_or_else(|| FsError::FileNotFound(uri.to_string()))
    }

    fn readdir(&self, uri: &Uri) -> FsResult<Vec<DirEntry>> {
        let key = self.key(uri);
        match self.nodes.get(&key) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(FsError::FileNotADirectory(uri.to_string())),
            None => return Err(FsError::FileNotFound(uri.to_string())),
        }

        Ok(self
            .nodes
            .iter()
            .filter(|entry| Self::parent_key(entry.key()).as_deref() == Some(key.as_str()))
            .map(|entry| {
                let name = entry
                    .value()
                    .display_path()
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                DirEntry::new_unchecked(name, entry.value().file_type())
            })
            .collect())
    }

    fn mkdir(&self, uri: &Uri) -> FsResult<()> {
        self.guard_mutation(uri)?;
        let key = self.key(uri);
        if self.nodes.contains_key(&key) {
            return Err(FsError::FileExists(uri.to_string()));
        }
        self.ensure_parent(&key, uri)?;
        let now = now_millis();
        self.nodes.insert(
            key,
            Node::Directory {
                path: uri.path().to_string(),
                mtime: now,
                ctime: now,
            },
        );
        self.emit(uri, ChangeKind::Added);
        Ok(())
    }

    fn delete(&self, uri: &Uri, options: &DeleteOptions) -> FsResult<()> {
        self.guard_mutation(uri)?;
        let key = self.key(uri);
        let is_dir = match self.nodes.get(&key) {
            Some(node) => node.is_dir(),
            None => return Err(FsError::FileNotFound(uri.to_string())),
        };
        if is_dir && !options.recursive && self.has_children(&key) {
            return Err(FsError::DirectoryNotEmpty(uri.to_string()));
        }
        for stale in self.subtree_keys(&key) {
            self.nodes.remove(&stale);
        }
        self.emit(uri, ChangeKind::Deleted);
        Ok(())
    }

    fn rename(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<()> {
        self.guard_mutation(target)?;
        let src_key = self.key(source);
        let dst_key = self.key(target);

        let src_display = match self.nodes.get(&src_key) {
            Some(node) => node.display_path().to_string(),
            None => return Err(FsError::FileNotFound(source.to_string())),
        };

        if src_key == dst_key {
            // Same resource under a case-insensitive fold: adjust display
            // paths only
            let suffix_base = src_display.len();
            for stale in self.subtree_keys(&src_key) {
                if let Some(mut node) = self.nodes.get_mut(&stale) {
                    let suffix = node.display_path()[suffix_base..].to_string();
                    node.set_display_path(format!("{}{}", target.path(), suffix));
                }
            }
            self.changes.emit(vec![
                FileChange::new(source.clone(), ChangeKind::Deleted),
                FileChange::new(target.clone(), ChangeKind::Added),
            ]);
            return Ok(());
        }

        if self.nodes.contains_key(&dst_key) {
            if !overwrite {
                return Err(FsError::FileExists(target.to_string()));
            }
            for stale in self.subtree_keys(&dst_key) {
                self.nodes.remove(&stale);
            }
        }
        self.ensure_parent(&dst_key, target)?;

        for old_key in self.subtree_keys(&src_key) {
            if let Some((_, mut node)) = self.nodes.remove(&old_key) {
                let new_key = format!("{}{}", dst_key, &old_key[src_key.len()..]);
                let suffix = node.display_path()[src_display.len()..].to_string();
                node.set_display_path(format!("{}{}", target.path(), suffix));
                self.nodes.insert(new_key, node);
            }
        }
        self.changes.emit(vec![
            FileChange::new(source.clone(), ChangeKind::Deleted),
            FileChange::new(target.clone(), ChangeKind::Added),
        ]);
        Ok(())
    }

    fn copy(&self, source: &Uri, target: &Uri, overwrite: bool) -> FsResult<()> {
        self.guard_mutation(target)?;
        let src_key = self.key(source);
        let dst_key = self.key(target);

        let src_display = match self.nodes.get(&src_key) {
            Some(node) => node.display_path().to_string(),
            None => return Err(FsError::FileNotFound(source.to_string())),
        };

        if self.nodes.contains_key(&dst_key) {
            if !overwrite {
                return Err(FsError::FileExists(target.to_string()));
            }
            for stale in self.subtree_keys(&dst_key) {
                self.nodes.remove(&stale);
            }
        }
        self.ensure_parent(&dst_key, target)?;

        let now = now_millis();
        for old_key in self.subtree_keys(&src_key) {
            let Some(entry) = self.nodes.get(&old_key) else {
                continue;
            };
            let mut node = entry.value().clone();
            drop(entry);
            let new_key = format!("{}{}", dst_key, &old_key[src_key.len()..]);
            let suffix = node.display_path()[src_display.len()..].to_string();
            node.set_display_path(format!("{}{}", target.path(), suffix));
            match &mut node {
                Node::File { mtime, ctime, .. } | Node::Directory { mtime, ctime, .. } => {
                    *mtime = now;
                    *ctime = now;
                }
            }
            self.nodes.insert(new_key, node);
        }
        self.emit(target, ChangeKind::Added);
        Ok(())
    }

    fn read_file(&self, uri: &Uri) -> FsResult<Vec<u8>> {
        match self.nodes.get(&self.key(uri)) {
            Some(node) => match node.value() {
                Node::File { data, .. } => Ok(data.clone()),
                Node::Directory { .. } => Err(FsError::FileIsDirectory(uri.to_string())),
            },
            None => Err(FsError::FileNotFound(uri.to_string())),
        }
    }

    fn write_file(&self, uri: &Uri, data: &[u8], options: &WriteFileOptions) -> FsResult<()> {
        self.guard_mutation(uri)?;
        let key = self.key(uri);

        let (existed, previous_mtime, previous_ctime) = match self.nodes.get(&key) {
            Some(node) => match node.value() {
                Node::Directory { .. } => {
                    return Err(FsError::FileIsDirectory(uri.to_string()));
                }
                Node::File { mtime, ctime, .. } => (true, *mtime, *ctime),
            },
            None => (false, 0, 0),
        };

        if existed && !options.overwrite {
            return Err(FsError::FileExists(uri.to_string()));
        }
        if !existed {
            if !options.create {
                return Err(FsError::FileNotFound(uri.to_string()));
            }
            self.ensure_parent(&key, uri)?;
        }

        let mtime = Self::touch(previous_mtime);
        self.nodes.insert(
            key,
            Node::File {
                path: uri.path().to_string(),
                data: data.to_vec(),
                mtime,
                ctime: if existed { previous_ctime } else { mtime },
            },
        );
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
        let key = self.key(uri);
        let mut created = false;

        if options.create {
            self.guard_mutation(uri)?;
            match self.nodes.get_mut(&key).as_deref_mut() {
                Some(Node::Directory { .. }) => {
                    return Err(FsError::FileIsDirectory(uri.to_string()));
                }
                Some(Node::File { data, mtime, .. }) => {
                    // Opening for write truncates
                    data.clear();
                    *mtime = Self::touch(*mtime);
                }
                None => {
                    self.ensure_parent(&key, uri)?;
                    let now = now_millis();
                    self.nodes.insert(
                        key.clone(),
                        Node::File {
                            path: uri.path().to_string(),
                            data: Vec::new(),
                            mtime: now,
                            ctime: now,
                        },
                    );
                    created = true;
                }
            }
        } else {
            match self.nodes.get(&key) {
                Some(node) if node.is_dir() => {
                    return Err(FsError::FileIsDirectory(uri.to_string()));
                }
                Some(_) => {}
                None => return Err(FsError::FileNotFound(uri.to_string())),
            }
        }

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(
            handle,
            OpenState {
                key,
                uri: uri.clone(),
                writable: options.create,
                created,
            },
        );
        if created {
            self.emit(uri, ChangeKind::Added);
        }
        Ok(handle)
    }

    fn close(&self, handle: FileHandle) -> FsResult<()> {
        let (_, state) = self
            .handles
            .remove(&handle)
            .ok_or_else(|| FsError::Io(format!("invalid handle: {handle}")))?;
        if state.writable && !state.created {
            self.emit(&state.uri, ChangeKind::Updated);
        }
        Ok(())
    }

    fn read(&self, handle: FileHandle, pos: u64, buf: &mut [u8]) -> FsResult<usize> {
        let state = self
            .handles
            .get(&handle)
            .map(|s| s.value().clone())
            .ok_or_else(|| FsError::Io(format!("invalid handle: {handle}")))?;
        match self.nodes.get(&state.key).as_deref() {
            Some(Node::File { data, .. }) => {
                let pos = pos as usize;
                if pos >= data.len() {
                    return Ok(0);
                }
                let n = buf.len().min(data.len() - pos);
                buf[..n].copy_from_slice(&data[pos..pos + n]);
                Ok(n)
            }
            _ => Err(FsError::FileNotFound(state.uri.to_string())),
        }
    }

    fn write(&self, handle: FileHandle, pos: u64, data: &[u8]) -> FsResult<usize> {
        let state = self
            .handles
            .get(&handle)
            .map(|s| s.value().clone())
            .ok_or_else(|| FsError::Io(format!("invalid handle: {handle}")))?;
        if !state.writable {
            return Err(FsError::FilePermissionDenied(state.uri.to_string()));
        }
        match self.nodes.get_mut(&state.key).as_deref_mut() {
            Some(Node::File {
                data: content,
                mtime,
                ..
            }) => {
                let pos = pos as usize;
                if pos + data.len() > content.len() {
                    content.resize(pos + data.len(), 0);
                }
                content[pos..pos + data.len()].copy_from_slice(data);
                *mtime = Self::touch(*mtime);
                Ok(data.len())
            }
            _ => Err(FsError::FileNotFound(state.uri.to_string())),
        }
    }

    fn watch(&self, _uri: &Uri, _options: &WatchOptions) -> FsResult<Disposable> {
        self.active_watches.fetch_add(1, Ordering::SeqCst);
        let watches = Arc::clone(&self.active_watches);
        Ok(Disposable::new(move || {
            watches.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    fn subscribe_changes(&self) -> tokio::sync::broadcast::Receiver<Vec<FileChange>> {
        self.changes.subscribe()
    }
}
