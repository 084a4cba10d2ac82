/*!
 * Operation Options
 * Option records for service and provider operations
 */

use serde::{Deserialize, Serialize};

use crate::uri::Uri;

/// Options for `FileService::resolve`
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Fetch full metadata for every resolved child (otherwise type only)
    pub resolve_metadata: bool,
    /// Descendants whose ancestor chain must be expanded during recursion
    pub resolve_to: Vec<Uri>,
    /// Expand directories that are the only child of their parent
    pub resolve_single_child_descendants: bool,
}

impl ResolveOptions {
    #[must_use]
    pub fn metadata() -> Self {
        Self {
            resolve_metadata: true,
            ..Default::default()
        }
    }
}

/// Options for `FileService::read_file` and `read_file_stream`
#[derive(Debug, Clone, Default)]
pub struct ReadFileOptions {
    /// Byte offset to start reading from
    pub position: Option<u64>,
    /// Maximum number of bytes to return
    pub length: Option<u64>,
    /// When set and matching the current state, the read short-circuits with
    /// `FileNotModifiedSince`
    pub etag: Option<String>,
    /// Prefer the provider's whole-file path over chunked handle reads
    pub prefer_unbuffered: bool,
}

/// Options for `FileService::write_file`
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Last known modification time, for dirty-write prevention
    pub mtime: Option<i64>,
    /// Last known etag, for dirty-write prevention
    pub etag: Option<String>,
}

/// Options for `FileService::create_file`
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    pub overwrite: bool,
}

/// Provider-level options for whole-file writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WriteFileOptions {
    pub create: bool,
    pub overwrite: bool,
}

/// Provider-level options for `open`
///
/// `create: true` opens for writing, creating the file when missing and
/// truncating existing content; `create: false` opens for reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OpenOptions {
    pub create: bool,
}

/// Options for `FileService::del` and provider deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeleteOptions {
    pub recursive: bool,
    pub use_trash: bool,
}

/// Options for watch subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct WatchOptions {
    pub recursive: bool,
    pub excludes: Vec<String>,
}
