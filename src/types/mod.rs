/*!
 * Core Types
 * Errors, metadata, events and option records shared across the service
 */

pub mod errors;
pub mod event;
pub mod file_type;
pub mod options;
pub mod stat;

pub use errors::{FsError, FsResult};
pub use event::{
    CapabilityChangeEvent, ChangeKind, FileChange, FileChangesEvent, FileOperation,
    FileOperationEvent, ProviderRegistrationEvent,
};
pub use file_type::FileType;
pub use options::{
    CreateOptions, DeleteOptions, OpenOptions, ReadFileOptions, ResolveOptions, WatchOptions,
    WriteFileOptions, WriteOptions,
};
pub use stat::{etag, now_millis, DirEntry, FileStat, Stat, ETAG_DISABLED};
