/*!
 * File Metadata
 * Provider-level stat records and the service-level FileStat with etag
 */

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::errors::FsError;
use super::file_type::FileType;
use crate::uri::Uri;

/// Sentinel etag that disables optimistic-concurrency checks
pub const ETAG_DISABLED: &str = "";

/// Derive a validator from the pair that defines content identity.
///
/// Providers may supply their own etags; this is the fallback used everywhere
/// the service computes one.
#[must_use]
pub fn etag(mtime: i64, size: u64) -> String {
    let mut hasher = DefaultHasher::new();
    mtime.hash(&mut hasher);
    size.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Current wall clock in milliseconds since the UNIX epoch
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Provider-level metadata record
///
/// Timestamps are milliseconds since the UNIX epoch, which is also the wire
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Stat {
    pub file_type: FileType,
    pub mtime: i64,
    pub ctime: i64,
    pub size: u64,
}

impl Stat {
    #[inline]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        self.file_type.is_file()
    }

    #[inline]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }
}

/// Directory entry as yielded by `readdir`
///
/// Entry names must be non-empty and cannot contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    /// Create a new directory entry with name validation
    pub fn new(name: impl Into<String>, file_type: FileType) -> Result<Self, FsError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FsError::InvalidPath("entry name cannot be empty".into()));
        }
        if name.contains('\0') || name.contains('/') || name.contains('\\') {
            return Err(FsError::InvalidPath(format!(
                "entry name contains reserved characters: {name}"
            )));
        }
        Ok(Self { name, file_type })
    }

    pub(crate) fn new_unchecked(name: String, file_type: FileType) -> Self {
        Self { name, file_type }
    }
}

/// Service-level metadata for a resolved resource
///
/// `etag` is derived from `(mtime, size)` unless the provider supplied one.
/// `children` is populated only for directories and only as far as the
/// resolve options requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStat {
    pub resource: Uri,
    pub name: String,
    pub file_type: FileType,
    pub mtime: i64,
    pub ctime: i64,
    pub size: u64,
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub children: Option<Vec<FileStat>>,
}

impl FileStat {
    /// Build a FileStat from a provider stat, deriving the etag
    #[must_use]
    pub fn from_stat(resource: Uri, stat: Stat) -> Self {
        let name = resource.basename().to_string();
        Self {
            name,
            file_type: stat.file_type,
            mtime: stat.mtime,
            ctime: stat.ctime,
            size: stat.size,
            etag: etag(stat.mtime, stat.size),
            children: None,
            resource,
        }
    }

    /// Type-only stat for directory children resolved without metadata
    #[must_use]
    pub fn from_type(resource: Uri, file_type: FileType) -> Self {
        let name = resource.basename().to_string();
        Self {
            name,
            file_type,
            mtime: 0,
            ctime: 0,
            size: 0,
            etag: String::new(),
            children: None,
            resource,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        self.file_type.is_file()
    }

    #[inline]
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.file_type.is_dir()
    }

    #[inline]
    #[must_use]
    pub const fn is_symbolic_link(&self) -> bool {
        self.file_type.is_symlink()
    }
}
