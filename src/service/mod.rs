/*!
 * File Service
 * The public, URI-addressed filesystem API: validation, capability-adaptive
 * I/O, write serialization, watch ref-counting and event fan-out
 */

mod copy_move;
mod queue;
mod read;
mod resolve;
mod write;

pub use read::{FileContent, FileStreamContent};

use std::sync::Arc;

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use tokio::sync::broadcast;

use crate::capability::ProviderCapabilities;
use crate::events::{Disposable, EventBroadcaster};
use crate::participants::{FileOperationParticipant, Participants};
use crate::provider::FileSystemProvider;
use crate::registry::ProviderRegistry;
use crate::types::{
    DeleteOptions, FileChangesEvent, FileOperation, FileOperationEvent, FileStat, FsError,
    FsResult, ResolveOptions, WatchOptions,
};
use crate::uri::Uri;

use queue::WriteQueue;

struct WatchSession {
    count: usize,
    guard: Disposable,
}

/// The virtual filesystem service.
///
/// Multiplexes every registered provider behind one API; see the individual
/// operation impls for the capability adaptation rules.
pub struct FileService {
    registry: ProviderRegistry,
    write_queue: WriteQueue,
    watch_sessions: Arc<DashMap<String, WatchSession, RandomState>>,
    operations: EventBroadcaster<FileOperationEvent>,
    participants: Participants,
}

impl FileService {
    #[must_use]
    pub fn new(registry: ProviderRegistry) -> Self {
        info!("File service initialized");
        Self {
            registry,
            write_queue: WriteQueue::new(),
            watch_sessions: Arc::new(DashMap::with_hasher(RandomState::new())),
            operations: EventBroadcaster::default(),
            participants: Participants::new(),
        }
    }

    /// The provider registry backing this service
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Service-level operation events (`Create`/`Write`/`Move`/`Copy`/`Delete`)
    #[must_use]
    pub fn subscribe_operations(&self) -> broadcast::Receiver<FileOperationEvent> {
        self.operations.subscribe()
    }

    /// Change batches rebroadcast from every registered provider
    #[must_use]
    pub fn subscribe_file_changes(&self) -> broadcast::Receiver<FileChangesEvent> {
        self.registry.subscribe_file_changes()
    }

    /// Register a before-operation participant
    pub fn register_participant(&self, participant: Arc<dyn FileOperationParticipant>) {
        self.participants.register(participant);
    }

    pub(crate) fn emit_operation(&self, event: FileOperationEvent) {
        self.operations.emit(event);
    }

    pub(crate) fn run_participants(
        &self,
        operation: FileOperation,
        resource: &Uri,
        target: Option<&Uri>,
    ) {
        self.participants.participate(operation, resource, target);
    }

    /// Stable key identifying "the same resource under this provider"
    pub(crate) fn queue_key(capabilities: ProviderCapabilities, uri: &Uri) -> String {
        uri.comparison_key(capabilities.is_case_sensitive())
    }

    pub(crate) fn run_write_task<T>(&self, key: String, task: impl FnOnce() -> T) -> T {
        self.write_queue.run(key, task)
    }

    /// Watch a resource for changes.
    ///
    /// Identical `(provider, uri, options)` subscriptions share one backing
    /// provider watch: only the first opens it and only the last disposal
    /// closes it.
    pub fn watch(&self, uri: &Uri, options: WatchOptions) -> FsResult<Disposable> {
        let provider = self.registry.provider_for(uri)?;
        let capabilities = provider.capabilities();
        let key = format!(
            "{}|{}|{}",
            Self::queue_key(capabilities, uri),
            options.recursive,
            options.excludes.join(",")
        );

        match self.watch_sessions.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().count += 1;
            }
            Entry::Vacant(vacant) => {
                let guard = provider.watch(uri, &options)?;
                vacant.insert(WatchSession { count: 1, guard });
            }
        }

        let sessions = Arc::clone(&self.watch_sessions);
        Ok(Disposable::new(move || {
            if let Entry::Occupied(mut occupied) = sessions.entry(key.clone()) {
                occupied.get_mut().count -= 1;
                if occupied.get().count == 0 {
                    let session = occupied.remove();
                    session.guard.dispose();
                }
            }
        }))
    }

    /// Delete a resource.
    ///
    /// Non-recursive deletes refuse non-empty directories; `use_trash`
    /// requires the provider's trash capability.
    pub fn del(&self, uri: &Uri, options: DeleteOptions) -> FsResult<()> {
        let provider = self.registry.provider_for(uri)?;
        if options.use_trash
            && !provider
                .capabilities()
                .contains(ProviderCapabilities::TRASH)
        {
            return Err(FsError::NotSupported(format!(
                "provider for '{}' does not support trash",
                uri.scheme()
            )));
        }

        self.run_participants(FileOperation::Delete, uri, None);

        let stat = provider.stat(uri)?;
        if stat.is_dir() && !options.recursive {
            let children = provider.readdir(uri)?;
            if !children.is_empty() {
                return Err(FsError::DirectoryNotEmpty(uri.to_string()));
            }
        }

        provider.delete(uri, &options)?;
        self.emit_operation(FileOperationEvent::new(FileOperation::Delete, uri.clone()));
        Ok(())
    }

    /// Create a directory and any missing ancestors
    pub fn create_folder(&self, uri: &Uri) -> FsResult<FileStat> {
        let provider = self.registry.provider_for(uri)?;
        self.run_participants(FileOperation::Create, uri, None);
        self.mkdirp(&provider, uri)?;
        let stat = self.resolve(uri, &ResolveOptions::metadata())?;
        self.emit_operation(
            FileOperationEvent::new(FileOperation::Create, uri.clone()).with_stat(stat.clone()),
        );
        Ok(stat)
    }

    /// Create `dir` and every missing ancestor, bottom-up.
    ///
    /// The first existing ancestor must be a directory; creation tolerates
    /// concurrent `FileExists` races on each step.
    pub(crate) fn mkdirp(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        dir: &Uri,
    ) -> FsResult<()> {
        let mut missing: Vec<Uri> = Vec::new();
        let mut current = dir.clone();
        loop {
            match provider.stat(&current) {
                Ok(stat) if stat.is_dir() => break,
                Ok(_) => {
                    return Err(FsError::FileNotADirectory(current.to_string()));
                }
                Err(FsError::FileNotFound(_)) => {
                    missing.push(current.clone());
                    match current.parent() {
                        Some(parent) => current = parent,
                        None => break,
                    }
                }
                Err(error) => return Err(error),
            }
        }

        for dir in missing.iter().rev() {
            match provider.mkdir(dir) {
                Ok(()) | Err(FsError::FileExists(_)) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }
}
