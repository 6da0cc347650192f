// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-file keyed mutex with deadlock-free multi-lock acquisition.
//!
//! An outer mutex guards only the path -> mutex map; per-path locks are
//! acquired outside it, so tasks touching distinct files run fully in
//! parallel. Guards are RAII: dropping a guard releases the path.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held file lock; the path stays locked until this is dropped.
pub type PathGuard = OwnedMutexGuard<()>;

/// Keyed mutex over file paths.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or lazily create the per-path mutex. Only the map access
    /// happens under the outer lock.
    fn entry(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock();
        map.entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock a single path.
    pub async fn lock(&self, path: &Path) -> PathGuard {
        self.entry(path).lock_owned().await
    }

    /// Lock a set of paths without deadlock risk: acquisition follows
    /// the lexicographic order of the (de-duplicated) paths, so no two
    /// multi-path lockers can wait on each other in a cycle.
    pub async fn lock_all(&self, paths: &[PathBuf]) -> Vec<PathGuard> {
        let mut sorted: Vec<&PathBuf> = paths.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for path in sorted {
            guards.push(self.lock(path).await);
        }
        guards
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
