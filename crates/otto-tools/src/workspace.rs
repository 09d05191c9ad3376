// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Shared view of the working directories.
///
/// Tools resolve relative paths against the primary directory; the session
/// lists all directories in the system prompt.  The worker mutates the set
/// (on `/add-dir`); tools only read, so a `RwLock` suffices.
pub struct Workspace {
    primary: RwLock<PathBuf>,
    extra: RwLock<Vec<PathBuf>>,
}

impl Workspace {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            primary: RwLock::new(primary.into()),
            extra: RwLock::new(Vec::new()),
        }
    }

    /// Resolve a tool-supplied path: absolute paths pass through, relative
    /// ones are anchored at the primary working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.primary.read().unwrap().join(p)
        }
    }

    pub fn primary(&self) -> PathBuf {
        self.primary.read().unwrap().clone()
    }

    /// Add a directory to the working set.  Returns false when it was
    /// already present.
    pub fn add_directory(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let mut extra = self.extra.write().unwrap();
        if *self.primary.read().unwrap() == path || extra.contains(&path) {
            return false;
        }
        extra.push(path);
        true
    }

    /// All directories, primary first.
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.primary()];
        dirs.extend(self.extra.read().unwrap().iter().cloned());
        dirs
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
