/*!
 * Change & Operation Events
 * Batched provider change events and service-level operation events
 */

use serde::{Deserialize, Serialize};

use super::stat::FileStat;
use crate::capability::ProviderCapabilities;
use crate::uri::Uri;

/// Kind of a file change; the numeric values are part of the wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChangeKind {
    Added = 1,
    Updated = 2,
    Deleted = 3,
}

impl From<ChangeKind> for u8 {
    fn from(kind: ChangeKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for ChangeKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChangeKind::Added),
            2 => Ok(ChangeKind::Updated),
            3 => Ok(ChangeKind::Deleted),
            other => Err(format!("invalid change kind: {other}")),
        }
    }
}

/// A single change reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub resource: Uri,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
}

impl FileChange {
    #[must_use]
    pub fn new(resource: Uri, kind: ChangeKind) -> Self {
        Self { resource, kind }
    }
}

/// A batch of changes as delivered to subscribers
///
/// Providers batch changes; the service rebroadcasts batches without
/// reordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangesEvent {
    pub changes: Vec<FileChange>,
}

impl FileChangesEvent {
    #[must_use]
    pub fn new(changes: Vec<FileChange>) -> Self {
        Self { changes }
    }

    /// Whether the batch affects the given resource.
    ///
    /// Additions and updates match exactly; a deletion also matches every
    /// descendant of the deleted resource.
    #[must_use]
    pub fn contains(&self, uri: &Uri) -> bool {
        self.changes.iter().any(|change| match change.kind {
            ChangeKind::Deleted => uri.is_equal_or_parent(&change.resource, true),
            _ => change.resource == *uri,
        })
    }

    /// Whether the batch contains a change of the given kind for the resource
    #[must_use]
    pub fn contains_kind(&self, uri: &Uri, kind: ChangeKind) -> bool {
        self.changes
            .iter()
            .any(|change| change.kind == kind && change.resource == *uri)
    }
}

/// Operation performed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Create,
    Write,
    Move,
    Copy,
    Delete,
}

/// Service-level operation event with the resulting stat where available
#[derive(Debug, Clone, PartialEq)]
pub struct FileOperationEvent {
    pub operation: FileOperation,
    pub resource: Uri,
    pub target: Option<Uri>,
    pub stat: Option<FileStat>,
}

impl FileOperationEvent {
    #[must_use]
    pub fn new(operation: FileOperation, resource: Uri) -> Self {
        Self {
            operation,
            resource,
            target: None,
            stat: None,
        }
    }

    #[must_use]
    pub fn with_stat(mut self, stat: FileStat) -> Self {
        self.stat = Some(stat);
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: Uri) -> Self {
        self.target = Some(target);
        self
    }
}

/// Fired when a provider is registered or unregistered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRegistrationEvent {
    pub added: bool,
    pub scheme: String,
}

/// Fired when a provider's capability set changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityChangeEvent {
    pub scheme: String,
    pub capabilities: ProviderCapabilities,
}
