/*!
 * URI Primitives
 * Scheme-addressed resource identifiers with provider-aware comparison
 */

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{FsError, FsResult};

/// A parsed resource identifier: `scheme://authority/path?query#fragment`
///
/// The path component is normalized on construction (`.`, `..` and repeated
/// separators collapse). Structural equality is case-sensitive; use
/// `is_equal`/`is_equal_or_parent` for comparisons under a provider's case
/// sensitivity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    authority: String,
    path: String,
    query: String,
    fragment: String,
}

impl Uri {
    /// Parse a URI string
    pub fn parse(input: &str) -> FsResult<Self> {
        let colon = input
            .find(':')
            .ok_or_else(|| FsError::InvalidPath(format!("missing scheme: {input}")))?;
        let scheme = &input[..colon];
        if scheme.is_empty()
            || !scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(FsError::InvalidPath(format!("invalid scheme: {input}")));
        }

        let mut rest = &input[colon + 1..];
        let mut authority = "";
        if let Some(after) = rest.strip_prefix("//") {
            let end = after
                .find(|c| matches!(c, '/' | '?' | '#'))
                .unwrap_or(after.len());
            authority = &after[..end];
            rest = &after[end..];
        }

        let mut fragment = "";
        if let Some(hash) = rest.find('#') {
            fragment = &rest[hash + 1..];
            rest = &rest[..hash];
        }

        let mut query = "";
        if let Some(q) = rest.find('?') {
            query = &rest[q + 1..];
            rest = &rest[..q];
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_string(),
            path: clean_path(rest),
            query: query.to_string(),
            fragment: fragment.to_string(),
        })
    }

    /// Build a URI from a scheme and an absolute path
    pub fn from_parts(scheme: &str, authority: &str, path: &str) -> FsResult<Self> {
        Self::parse(&if authority.is_empty() {
            format!("{scheme}:{path}")
        } else {
            format!("{scheme}://{authority}{path}")
        })
    }

    #[inline]
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[inline]
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the path component, keeping everything else
    #[must_use]
    pub fn with_path(&self, path: &str) -> Self {
        Self {
            path: clean_path(path),
            query: String::new(),
            fragment: String::new(),
            ..self.clone()
        }
    }

    /// Whether the path component is absolute
    #[inline]
    #[must_use]
    pub fn is_absolute_path(&self) -> bool {
        self.path.starts_with('/')
    }

    /// Path segments, root excluded
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// Final path segment, empty for the root
    #[must_use]
    pub fn basename(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// Parent resource, `None` at the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.path == "/" || self.path.is_empty() {
            return None;
        }
        let trimmed = self.path.trim_end_matches('/');
        let cut = trimmed.rfind('/')?;
        let parent_path = if cut == 0 { "/" } else { &trimmed[..cut] };
        Some(self.with_path(parent_path))
    }

    /// Append a single segment to the path
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let base = self.path.trim_end_matches('/');
        self.with_path(&format!("{base}/{name}"))
    }

    /// Resolve a relative path (`..` climbs, absolute paths replace)
    #[must_use]
    pub fn resolve(&self, relative: &str) -> Self {
        if relative.starts_with('/') {
            return self.with_path(relative);
        }
        let base = self.path.trim_end_matches('/');
        self.with_path(&format!("{base}/{relative}"))
    }

    /// Key that identifies "the same resource" for comparisons and maps.
    ///
    /// The authority is always case-folded; the path folds only when the
    /// owning provider is case-insensitive.
    #[must_use]
    pub fn comparison_key(&self, case_sensitive: bool) -> String {
        let path = if case_sensitive {
            self.path.clone()
        } else {
            self.path.to_lowercase()
        };
        format!(
            "{}://{}{}",
            self.scheme,
            self.authority.to_lowercase(),
            path
        )
    }

    /// Equality under the provider's case sensitivity
    #[must_use]
    pub fn is_equal(&self, other: &Uri, case_sensitive: bool) -> bool {
        self.comparison_key(case_sensitive) == other.comparison_key(case_sensitive)
    }

    /// True when `other` identifies the same resource as `self` or an
    /// ancestor of it, under the provider's case sensitivity.
    #[must_use]
    pub fn is_equal_or_parent(&self, other: &Uri, case_sensitive: bool) -> bool {
        if self.scheme != other.scheme
            || !self.authority.eq_ignore_ascii_case(&other.authority)
        {
            return false;
        }
        let (child, parent) = if case_sensitive {
            (self.path.clone(), other.path.clone())
        } else {
            (self.path.to_lowercase(), other.path.to_lowercase())
        };
        if child == parent {
            return true;
        }
        if parent == "/" {
            return child.starts_with('/');
        }
        child.starts_with(&format!("{parent}/"))
    }
}

/// Collapse `.`/`..`/repeated separators; empty paths become the root
fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let cleaned = path_clean::clean(path).to_string_lossy().into_owned();
    if cleaned == "." {
        "/".to_string()
    } else {
        cleaned
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.authority.is_empty() {
            write!(f, "{}:{}", self.scheme, self.path)?;
        } else {
            write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        }
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

impl Serialize for Uri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uri::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let uri = Uri::parse("mem:/a/b.txt").unwrap();
        assert_eq!(uri.scheme(), "mem");
        assert_eq!(uri.path(), "/a/b.txt");
        assert_eq!(uri.to_string(), "mem:/a/b.txt");

        let uri = Uri::parse("remote://host:8080/data/x?rev=2#frag").unwrap();
        assert_eq!(uri.authority(), "host:8080");
        assert_eq!(uri.path(), "/data/x");
        assert_eq!(uri.to_string(), "remote://host:8080/data/x?rev=2#frag");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Uri::parse("no-colon").is_err());
        assert!(Uri::parse(":missing").is_err());
        assert!(Uri::parse("1bad:/x").is_err());
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(Uri::parse("mem:/a/./b/../c").unwrap().path(), "/a/c");
        assert_eq!(Uri::parse("mem://auth//x///y").unwrap().path(), "/x/y");
        assert_eq!(Uri::parse("mem://auth").unwrap().path(), "/");
    }

    #[test]
    fn test_parent_join() {
        let uri = Uri::parse("mem:/a/b/c.txt").unwrap();
        assert_eq!(uri.basename(), "c.txt");
        let parent = uri.parent().unwrap();
        assert_eq!(parent.path(), "/a/b");
        assert_eq!(parent.join("d.txt").path(), "/a/b/d.txt");
        assert_eq!(Uri::parse("mem:/").unwrap().parent(), None);
        assert_eq!(Uri::parse("mem:/top").unwrap().parent().unwrap().path(), "/");
    }

    #[test]
    fn test_equal_or_parent() {
        let root = Uri::parse("mem:/a").unwrap();
        let child = Uri::parse("mem:/a/b/c").unwrap();
        let sibling = Uri::parse("mem:/ab").unwrap();

        assert!(child.is_equal_or_parent(&root, true));
        assert!(child.is_equal_or_parent(&child, true));
        // Segment boundaries are respected
        assert!(!sibling.is_equal_or_parent(&root, true));
        assert!(!root.is_equal_or_parent(&child, true));

        // Case sensitivity is the caller's choice
        let upper = Uri::parse("mem:/A/b").unwrap();
        assert!(upper.is_equal_or_parent(&root, false));
        assert!(!upper.is_equal_or_parent(&root, true));
    }

    #[test]
    fn test_serde_as_string() {
        let uri = Uri::parse("mem:/a/b.txt").unwrap();
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, "\"mem:/a/b.txt\"");
        let back: Uri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
    }
}
