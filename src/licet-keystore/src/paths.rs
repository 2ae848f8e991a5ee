//! The configured search path for keypair and license files.
//!
//! A search path is an ordered list of directories, most general first
//! (e.g. the user's config directory) to most specific last (e.g. the
//! process working directory). Lookup order is deterministic; there are no
//! global singletons — callers hold a `SearchPath` and pass it down.

use std::path::{Path, PathBuf};

/// Filename suffix for keypair records.
pub const KEYPAIR_EXTENSION: &str = ".crypto-keypair";
/// Filename suffix for signed license records.
pub const LICENSE_EXTENSION: &str = ".crypto-license";
/// Filename suffix for raw seed material (64 hex characters).
pub const SEED_EXTENSION: &str = ".crypto-seed";

/// Ordered directory list, most general to most specific.
#[derive(Clone, Debug)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// Build a search path from explicit directories, most general first.
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// The conventional search path for an application name: the user's
    /// config directory (`~/.config/<app>` on Linux) and then the process
    /// working directory.
    #[must_use]
    pub fn for_application(app: &str) -> Self {
        let mut dirs = Vec::new();
        if let Some(config) = dirs::config_dir() {
            dirs.push(config.join(app));
        }
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        Self { dirs }
    }

    /// Directories in lookup order (most general → most specific).
    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    /// Directories in save order.
    ///
    /// Default saves go to the most general writable location; with
    /// `reverse_save` the walk starts from the most specific (typically the
    /// working directory) instead.
    pub fn save_dirs(&self, reverse_save: bool) -> Box<dyn Iterator<Item = &Path> + '_> {
        if reverse_save {
            Box::new(self.dirs.iter().rev().map(PathBuf::as_path))
        } else {
            Box::new(self.dirs.iter().map(PathBuf::as_path))
        }
    }

    /// All files under the search path whose name contains `suffix`
    /// (matching `*.crypto-keypair*` style patterns), in deterministic
    /// order: directory by directory, file names sorted within each.
    #[must_use]
    pub fn matching_files(&self, suffix: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut names: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.contains(suffix) && !n.ends_with('~'))
                })
                .collect();
            names.sort();
            found.extend(names);
        }
        found
    }
}
