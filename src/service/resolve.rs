/*!
 * Resolve Operations
 * Metadata resolution with prefix-seeded directory recursion
 */

use std::sync::Arc;

use log::warn;

use super::FileService;
use crate::provider::FileSystemProvider;
use crate::types::{FileStat, FileType, FsResult, ResolveOptions, Stat};
use crate::uri::Uri;

impl FileService {
    /// Resolve a resource to its metadata.
    ///
    /// Directories recurse along the prefixes seeded by the URI itself and
    /// `resolve_to`; per-child failures are logged and the child omitted, and
    /// a failed `readdir` yields an empty child list rather than failing the
    /// parent.
    pub fn resolve(&self, uri: &Uri, options: &ResolveOptions) -> FsResult<FileStat> {
        let provider = self.registry.provider_for(uri)?;
        let stat = provider.stat(uri)?;

        let mut seeds: Vec<Uri> = Vec::with_capacity(1 + options.resolve_to.len());
        seeds.push(uri.clone());
        seeds.extend(options.resolve_to.iter().cloned());

        Ok(self.resolve_node(&provider, uri, Some(stat), FileType::Unknown, None, options, &seeds))
    }

    /// Resolve several resources; failures are reported per item
    pub fn resolve_all(&self, items: &[(Uri, ResolveOptions)]) -> Vec<FsResult<FileStat>> {
        items
            .iter()
            .map(|(uri, options)| self.resolve(uri, options))
            .collect()
    }

    /// Whether the resource exists
    #[must_use]
    pub fn exists(&self, uri: &Uri) -> bool {
        self.resolve(uri, &ResolveOptions::default()).is_ok()
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_node(
        &self,
        provider: &Arc<dyn FileSystemProvider>,
        uri: &Uri,
        stat: Option<Stat>,
        file_type: FileType,
        siblings: Option<usize>,
        options: &ResolveOptions,
        seeds: &[Uri],
    ) -> FileStat {
        let case_sensitive = provider.capabilities().is_case_sensitive();
        let mut resolved = match stat {
            Some(stat) => FileStat::from_stat(uri.clone(), stat),
            None => FileStat::from_type(uri.clone(), file_type),
        };

        if !resolved.is_directory() {
            return resolved;
        }

        // Expand when a seed sits at or below this directory, or when the
        // directory is an only child and chains are being followed
        let expand = seeds
            .iter()
            .any(|seed| seed.is_equal_or_parent(uri, case_sensitive))
            || (options.resolve_single_child_descendants && siblings == Some(1));
        if !expand {
            return resolved;
        }

        match provider.readdir(uri) {
            Ok(entries) => {
                let sibling_count = entries.len();
                let mut children = Vec::with_capacity(sibling_count);
                for entry in entries {
                    let child_uri = uri.join(&entry.name);
                    if options.resolve_metadata {
                        match provider.stat(&child_uri) {
                            Ok(child_stat) => children.push(self.resolve_node(
                                provider,
                                &child_uri,
                                Some(child_stat),
                                entry.file_type,
                                Some(sibling_count),
                                options,
                                seeds,
                            )),
                            Err(error) => {
                                warn!("Skipping unreadable entry {child_uri}: {error}");
                            }
                        }
                    } else {
                        children.push(self.resolve_node(
                            provider,
                            &child_uri,
                            None,
                            entry.file_type,
                            Some(sibling_count),
                            options,
                            seeds,
                        ));
                    }
                }
                resolved.children = Some(children);
            }
            Err(error) => {
                warn!("Failed to list {uri}: {error}");
                resolved.children = Some(Vec::new());
            }
        }

        resolved
    }
}
