/*!
 * polyfs
 * Virtual filesystem service multiplexing scheme-addressed storage providers
 * behind one URI-addressed API
 */

pub mod capability;
pub mod events;
pub mod participants;
pub mod provider;
pub mod registry;
pub mod remote;
pub mod resource;
pub mod service;
pub mod stream;
pub mod types;
pub mod uri;

pub use capability::ProviderCapabilities;
pub use events::{Disposable, EventBroadcaster};
pub use participants::{FileOperationParticipant, ParticipantEvent};
pub use provider::{FileHandle, FileSystemProvider, LocalFs, MemoryFs};
pub use registry::ProviderRegistry;
pub use remote::{
    DuplexTransport, FileSystemProviderServer, Link, MessageTransport, RemoteFileSystemProvider,
};
pub use resource::{ContentVersion, Resource, ResourceError};
pub use service::{FileContent, FileService, FileStreamContent};
pub use stream::{ByteStream, CancellationToken, Consumed, Readable, StreamWriter, WriteSource};
pub use types::{
    etag, ChangeKind, CreateOptions, DeleteOptions, DirEntry, FileChange, FileChangesEvent,
    FileOperation, FileOperationEvent, FileStat, FileType, FsError, FsResult, OpenOptions,
    ReadFileOptions, ResolveOptions, Stat, WatchOptions, WriteFileOptions, WriteOptions,
    ETAG_DISABLED,
};
pub use uri::Uri;
