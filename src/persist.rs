//! Snapshot file persistence.
//!
//! State is written to a sibling temp file and renamed into place, so a
//! crash mid-write leaves the previous state intact. Vector memory goes to
//! its own file next to the state file (see [`memory_path`]).
//!
//! [`Persister`] tracks a dirty flag set by store listeners and the memory's
//! revision; the daemon flushes it on a tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use miette::Diagnostic;
use thiserror::Error;

use crate::error::StoreError;
use crate::memory::{EmbeddingMemory, MemorySnapshot};
use crate::store::snapshot::Snapshot;
use crate::store::{RuleStore, ThoughtStore};

#[derive(Debug, Error, Diagnostic)]
pub enum PersistError {
    #[error("failed to read state file: {path}")]
    #[diagnostic(
        code(mindloop::persist::read),
        help("Check the file permissions, or pass a different --state path.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file: {path}")]
    #[diagnostic(
        code(mindloop::persist::write),
        help("Ensure the data directory exists and is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is unreadable")]
    #[diagnostic(
        code(mindloop::persist::corrupt),
        help("Restore a backup or move the file aside to start from an empty state.")
    )]
    Corrupt {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("memory file {path} is unreadable")]
    #[diagnostic(
        code(mindloop::persist::memory_corrupt),
        help("Move the file aside; memory starts empty and is rebuilt as entries are added.")
    )]
    MemoryCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type PersistResult<T> = std::result::Result<T, PersistError>;

/// Write a snapshot atomically.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> PersistResult<()> {
    let json = snapshot.to_json().map_err(|e| PersistError::Corrupt {
        path: path.display().to_string(),
        source: e,
    })?;
    write_atomic(path, &json)?;
    tracing::debug!(
        path = %path.display(),
        thoughts = snapshot.thoughts.len(),
        rules = snapshot.rules.len(),
        "state saved"
    );
    Ok(())
}

/// Read a snapshot. `None` if the file does not exist.
pub fn load_snapshot(path: &Path) -> PersistResult<Option<Snapshot>> {
    let Some(json) = read_optional(path)? else {
        return Ok(None);
    };
    let snapshot = Snapshot::from_json(&json).map_err(|e| PersistError::Corrupt {
        path: path.display().to_string(),
        source: e,
    })?;
    tracing::debug!(
        path = %path.display(),
        thoughts = snapshot.thoughts.len(),
        rules = snapshot.rules.len(),
        "state loaded"
    );
    Ok(Some(snapshot))
}

/// Memory file kept next to a state file: `state.json` -> `state.memory.json`.
pub fn memory_path(state: &Path) -> PathBuf {
    state.with_extension("memory.json")
}

/// Write memory entries and their vectors atomically.
pub fn save_memory(path: &Path, snapshot: &MemorySnapshot) -> PersistResult<()> {
    let json = serde_json::to_string(snapshot).map_err(|e| PersistError::MemoryCorrupt {
        path: path.display().to_string(),
        source: e,
    })?;
    write_atomic(path, &json)?;
    tracing::debug!(path = %path.display(), entries = snapshot.entries.len(), "memory saved");
    Ok(())
}

/// Read saved memory. `None` if the file does not exist.
pub fn load_memory(path: &Path) -> PersistResult<Option<MemorySnapshot>> {
    let Some(json) = read_optional(path)? else {
        return Ok(None);
    };
    let snapshot: MemorySnapshot =
        serde_json::from_str(&json).map_err(|e| PersistError::MemoryCorrupt {
            path: path.display().to_string(),
            source: e,
        })?;
    tracing::debug!(path = %path.display(), entries = snapshot.entries.len(), "memory loaded");
    Ok(Some(snapshot))
}

fn write_atomic(path: &Path, contents: &str) -> PersistResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PersistError::Write {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let tmp = temp_path(path);
    std::fs::write(&tmp, contents).map_err(|e| PersistError::Write {
        path: tmp.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| PersistError::Write {
        path: path.display().to_string(),
        source: e,
    })
}

fn read_optional(path: &Path) -> PersistResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PersistError::Read {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Coalesces store mutations into periodic saves.
#[derive(Debug, Clone)]
pub struct Persister {
    path: PathBuf,
    dirty: Arc<AtomicBool>,
    memory: Option<MemoryTrack>,
}

/// Memory saved alongside the state, with the revision last written.
#[derive(Debug, Clone)]
struct MemoryTrack {
    memory: Arc<EmbeddingMemory>,
    path: PathBuf,
    saved: Arc<AtomicU64>,
}

impl MemoryTrack {
    fn is_dirty(&self) -> bool {
        self.memory.revision() != self.saved.load(Ordering::Acquire)
    }

    fn save(&self) -> PersistResult<()> {
        let revision = self.memory.revision();
        save_memory(&self.path, &self.memory.snapshot())?;
        self.saved.store(revision, Ordering::Release);
        Ok(())
    }
}

impl Persister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dirty: Arc::new(AtomicBool::new(false)),
            memory: None,
        }
    }

    /// Also save `memory` to [`memory_path`] whenever its contents change.
    /// Its current contents count as saved.
    pub fn with_memory(mut self, memory: Arc<EmbeddingMemory>) -> Self {
        self.memory = Some(MemoryTrack {
            path: memory_path(&self.path),
            saved: Arc::new(AtomicU64::new(memory.revision())),
            memory,
        });
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark dirty on every mutation of either store.
    pub fn watch(&self, thoughts: &ThoughtStore, rules: &RuleStore) {
        let dirty = Arc::clone(&self.dirty);
        thoughts.add_listener(move |_| dirty.store(true, Ordering::Release));
        let dirty = Arc::clone(&self.dirty);
        rules.add_listener(move |_| dirty.store(true, Ordering::Release));
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire) || self.memory.as_ref().is_some_and(MemoryTrack::is_dirty)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Save if anything changed since the last save. Returns whether a save
    /// happened. On failure the flag is restored so the next tick retries.
    pub fn flush(&self, thoughts: &ThoughtStore, rules: &RuleStore) -> PersistResult<bool> {
        let mut saved = false;
        if self.dirty.swap(false, Ordering::AcqRel) {
            save_snapshot(&self.path, &Snapshot::capture(thoughts, rules)).inspect_err(|_| {
                self.mark_dirty();
            })?;
            saved = true;
        }
        if let Some(track) = self.memory.as_ref().filter(|t| t.is_dirty()) {
            track.save()?;
            saved = true;
        }
        Ok(saved)
    }

    /// Save unconditionally.
    pub fn save(&self, thoughts: &ThoughtStore, rules: &RuleStore) -> PersistResult<()> {
        self.dirty.store(false, Ordering::Release);
        save_snapshot(&self.path, &Snapshot::capture(thoughts, rules)).inspect_err(|_| {
            self.mark_dirty();
        })?;
        if let Some(track) = &self.memory {
            track.save()?;
        }
        Ok(())
    }
}
