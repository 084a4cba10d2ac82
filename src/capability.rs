/*!
 * Provider Capability Model
 * Bitset describing the operation families a provider supports
 */

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Capability bits advertised by a provider.
    ///
    /// The numeric assignments are part of the wire contract and must not be
    /// reassigned.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProviderCapabilities: u32 {
        /// Whole-file `read_file`/`write_file`
        const FILE_READ_WRITE = 1 << 1;
        /// Random-access `open`/`read`/`write`/`close`
        const FILE_OPEN_READ_WRITE_CLOSE = 1 << 2;
        /// Native `copy` of files and folders
        const FILE_FOLDER_COPY = 1 << 3;
        /// Native streaming reads
        const FILE_READ_STREAM = 1 << 4;
        /// Paths are case-sensitive
        const PATH_CASE_SENSITIVE = 1 << 10;
        /// The provider rejects all mutation
        const READONLY = 1 << 11;
        /// Deletes may target the system trash
        const TRASH = 1 << 12;
    }
}

impl ProviderCapabilities {
    #[inline]
    #[must_use]
    pub const fn has_whole_file(&self) -> bool {
        self.contains(ProviderCapabilities::FILE_READ_WRITE)
    }

    #[inline]
    #[must_use]
    pub const fn has_random_access(&self) -> bool {
        self.contains(ProviderCapabilities::FILE_OPEN_READ_WRITE_CLOSE)
    }

    /// At least one of the two I/O shapes is required for read and for write
    #[inline]
    #[must_use]
    pub const fn can_read_write(&self) -> bool {
        self.has_whole_file() || self.has_random_access()
    }

    #[inline]
    #[must_use]
    pub const fn is_case_sensitive(&self) -> bool {
        self.contains(ProviderCapabilities::PATH_CASE_SENSITIVE)
    }

    #[inline]
    #[must_use]
    pub const fn is_readonly(&self) -> bool {
        self.contains(ProviderCapabilities::READONLY)
    }
}

impl Serialize for ProviderCapabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for ProviderCapabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(ProviderCapabilities::from_bits_truncate(bits))
    }
}
