//! Workspace-global monotonic id allocation.
//!
//! A single-writer allocator journaled to `.state/counters.json`. Each
//! allocation takes an advisory lock file, bumps the counter, and rewrites
//! the journal atomically, so suffixes are strictly increasing and survive
//! process restarts. Ids are never reused, including across crashes: the
//! journal is rewritten before the id is handed out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::io::write_atomic;

/// On-disk counter state.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterState {
    counters: BTreeMap<String, u64>,
}

/// Monotonic counter journal.
pub struct CounterJournal {
    journal_path: PathBuf,
    lock_path: PathBuf,
}

/// Advisory lock held for the duration of one allocation.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl CounterJournal {
    /// Open (or lazily create) the journal inside a state directory.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            journal_path: state_dir.join("counters.json"),
            lock_path: state_dir.join("counters.lock"),
        }
    }

    /// Allocate the next suffix for a prefix ("STRAT", "IDEA", "PROP").
    pub fn allocate(&self, prefix: &str) -> Result<u64> {
        let _lock = self.acquire_lock()?;

        let mut state = self.load()?;
        let counter = state.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        let allocated = *counter;

        let bytes = serde_json::to_vec_pretty(&state).context("Failed to serialize counters")?;
        write_atomic(&self.journal_path, &bytes)?;

        Ok(allocated)
    }

    /// Current value without allocating (0 if never allocated).
    pub fn current(&self, prefix: &str) -> Result<u64> {
        Ok(self
            .load()?
            .counters
            .get(prefix)
            .copied()
            .unwrap_or(0))
    }

    fn load(&self) -> Result<CounterState> {
        if !self.journal_path.exists() {
            return Ok(CounterState::default());
        }
        let text = std::fs::read_to_string(&self.journal_path)
            .with_context(|| format!("Failed to read {:?}", self.journal_path))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Corrupt counter journal {:?}", self.journal_path))
    }

    /// Take the lock file with bounded retries; a stale lock from a crashed
    /// writer is surfaced rather than silently stolen.
    fn acquire_lock(&self) -> Result<LockGuard> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        for _ in 0..50 {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(e) => return Err(e).context("Failed to create counter lock"),
            }
        }
        bail!(
            "counter lock {:?} held too long; remove it if no allocator is running",
            self.lock_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_allocation_is_strictly_increasing() {
        let dir = tempdir().unwrap();
        let journal = CounterJournal::new(dir.path());
        let a = journal.allocate("STRAT").unwrap();
        let b = journal.allocate("STRAT").unwrap();
        let c = journal.allocate("STRAT").unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn test_prefixes_are_independent() {
        let dir = tempdir().unwrap();
        let journal = CounterJournal::new(dir.path());
        journal.allocate("STRAT").unwrap();
        journal.allocate("STRAT").unwrap();
        assert_eq!(journal.allocate("IDEA").unwrap(), 1);
    }

    #[test]
    fn test_counters_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let journal = CounterJournal::new(dir.path());
            journal.allocate("PROP").unwrap();
            journal.allocate("PROP").unwrap();
        }
        let journal = CounterJournal::new(dir.path());
        assert_eq!(journal.current("PROP").unwrap(), 2);
        assert_eq!(journal.allocate("PROP").unwrap(), 3);
    }

    #[test]
    fn test_lock_released_after_allocation() {
        let dir = tempdir().unwrap();
        let journal = CounterJournal::new(dir.path());
        journal.allocate("STRAT").unwrap();
        assert!(!dir.path().join("counters.lock").exists());
    }
}
