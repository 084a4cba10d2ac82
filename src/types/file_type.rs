/*!
 * File Type
 * Kind of a directory entry
 */

use serde::{Deserialize, Serialize};

/// Type of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    #[default]
    Unknown,
    File,
    Directory,
    SymbolicLink,
}

impl FileType {
    #[inline]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    #[inline]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    #[inline]
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        matches!(self, FileType::SymbolicLink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_helpers() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert!(FileType::SymbolicLink.is_symlink());
        assert!(!FileType::Unknown.is_file());
    }
}
