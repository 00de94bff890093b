//! Vector memory: content stored by embedding, searched by similarity.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anndists::dist::DistCosine;
use dashmap::DashMap;
use hnsw_rs::hnsw::Hnsw;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{Generator, LlmError};

#[derive(Debug, Error, Diagnostic)]
pub enum MemoryError {
    #[error("failed to embed memory content: {0}")]
    #[diagnostic(
        code(mindloop::memory::embedding),
        help("Memory needs an embedding model. Check the [llm] section of the configuration.")
    )]
    Embedding(#[source] LlmError),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(mindloop::memory::dimension),
        help("All entries must be embedded with the same model. Clear memory after switching models.")
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl MemoryEntry {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A search result; higher `score` is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

/// Similarity-searchable memory, as seen by tools.
pub trait VectorMemory: Send + Sync {
    /// Store an entry, replacing any entry with the same id.
    fn add(&self, entry: MemoryEntry) -> MemoryResult<()>;

    /// Up to `k` entries nearest to `query`, nearest first. Empty on failure.
    fn search(&self, query: &str, k: usize) -> Vec<MemoryHit>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An entry together with its embedding, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(flatten)]
    pub entry: MemoryEntry,
    pub vector: Vec<f32>,
}

/// Serializable contents of an [`EmbeddingMemory`], in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub entries: Vec<MemoryRecord>,
}

/// Capacity hint for the ANN index.
const DEFAULT_CAPACITY: usize = 10_000;

struct Stored {
    entry: MemoryEntry,
    vector: Vec<f32>,
    point: usize,
    seq: u64,
}

/// HNSW graph plus the bookkeeping that must change with it.
struct Index {
    hnsw: Hnsw<'static, f32, DistCosine>,
    dimension: Option<usize>,
    /// Points whose entry was replaced. HNSW has no removal, so they stay
    /// in the graph and are filtered out of results.
    stale: usize,
}

impl Index {
    fn new(capacity: usize) -> Self {
        // max_nb_connection 16, max_layer 16, ef_construction 200
        Self {
            hnsw: Hnsw::new(16, capacity.max(1), 16, 200, DistCosine {}),
            dimension: None,
            stale: 0,
        }
    }
}

/// In-process memory over generator embeddings.
///
/// Vectors live in an HNSW index with cosine distance; a side table maps
/// index points back to entries.
pub struct EmbeddingMemory {
    generator: Arc<dyn Generator>,
    index: RwLock<Index>,
    capacity: usize,
    /// Index point to entry id, live points only.
    points: DashMap<usize, String>,
    entries: DashMap<String, Stored>,
    next_point: AtomicUsize,
    next_seq: AtomicU64,
    /// Bumped on every change, for persistence.
    revision: AtomicU64,
}

// Safety: Hnsw synchronizes its graph internally. Inserts and searches go
// through the RwLock, and the index is swapped only under the write lock.
unsafe impl Send for EmbeddingMemory {}
unsafe impl Sync for EmbeddingMemory {}

impl EmbeddingMemory {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self::with_capacity(generator, DEFAULT_CAPACITY)
    }

    /// `capacity` is a size hint for the index, not a limit.
    pub fn with_capacity(generator: Arc<dyn Generator>, capacity: usize) -> Self {
        Self {
            generator,
            index: RwLock::new(Index::new(capacity)),
            capacity,
            points: DashMap::new(),
            entries: DashMap::new(),
            next_point: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            revision: AtomicU64::new(0),
        }
    }

    /// Stored entries in insertion order.
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.snapshot().entries.into_iter().map(|r| r.entry).collect()
    }

    /// Counter that changes whenever the contents do.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let mut stored: Vec<(u64, MemoryRecord)> = self
            .entries
            .iter()
            .map(|s| {
                (
                    s.seq,
                    MemoryRecord {
                        entry: s.entry.clone(),
                        vector: s.vector.clone(),
                    },
                )
            })
            .collect();
        stored.sort_by_key(|(seq, _)| *seq);
        MemorySnapshot {
            entries: stored.into_iter().map(|(_, r)| r).collect(),
        }
    }

    /// Replace the contents with a snapshot and rebuild the index.
    /// Records whose dimension disagrees with the first one are skipped.
    pub fn restore(&self, snapshot: MemorySnapshot) {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        *index = Index::new(self.capacity.max(snapshot.entries.len()));
        self.points.clear();
        self.entries.clear();

        let mut skipped = 0usize;
        for record in snapshot.entries {
            if let Err(e) = self.insert_locked(&mut index, record.entry, record.vector) {
                tracing::warn!(error = %e, "memory restore: skipping entry");
                skipped += 1;
            }
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(entries = self.entries.len(), skipped, "memory restored");
    }

    /// Insert or replace under the index write lock.
    fn insert_locked(
        &self,
        index: &mut Index,
        entry: MemoryEntry,
        vector: Vec<f32>,
    ) -> MemoryResult<()> {
        match index.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(MemoryError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            _ => index.dimension = Some(vector.len()),
        }

        let point = self.next_point.fetch_add(1, Ordering::Relaxed);
        index.hnsw.insert((&vector, point));
        self.points.insert(point, entry.id.clone());

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = entry.id.clone();
        if let Some(old) = self.entries.insert(
            id,
            Stored {
                entry,
                vector,
                point,
                seq,
            },
        ) {
            self.points.remove(&old.point);
            index.stale += 1;
        }
        Ok(())
    }
}

impl VectorMemory for EmbeddingMemory {
    fn add(&self, entry: MemoryEntry) -> MemoryResult<()> {
        let vector = self
            .generator
            .embed(&entry.content)
            .map_err(MemoryError::Embedding)?;

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        let id = entry.id.clone();
        let dim = vector.len();
        self.insert_locked(&mut index, entry, vector)?;
        self.revision.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(%id, dim, "memory entry stored");
        Ok(())
    }

    fn search(&self, query: &str, k: usize) -> Vec<MemoryHit> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let query_vec = match self.generator.embed(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "memory search: failed to embed query");
                return Vec::new();
            }
        };

        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        if index.dimension != Some(query_vec.len()) {
            tracing::warn!(
                expected = ?index.dimension,
                actual = query_vec.len(),
                "memory search: query dimension does not match stored entries"
            );
            return Vec::new();
        }

        // Ask for extra neighbours to make up for replaced points.
        let wanted = k + index.stale;
        let ef_search = (wanted * 2).max(32);
        let neighbours = index.hnsw.search(&query_vec, wanted, ef_search);

        let mut hits: Vec<MemoryHit> = neighbours
            .into_iter()
            .filter_map(|n| {
                let id = self.points.get(&n.d_id)?.value().clone();
                let stored = self.entries.get(&id)?;
                // DistCosine is 1 - cos
                let score = if n.distance.is_finite() {
                    1.0 - n.distance
                } else {
                    0.0
                };
                Some(MemoryHit {
                    id,
                    content: stored.entry.content.clone(),
                    metadata: stored.entry.metadata.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        hits
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for EmbeddingMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingMemory")
            .field("entries", &self.len())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResult, OfflineGenerator};

    /// Embeds text as letter counts over a-z.
    struct LetterEmbedder;

    impl Generator for LetterEmbedder {
        fn generate(&self, prompt: &str) -> LlmResult<String> {
            Ok(prompt.to_string())
        }

        fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
            let mut v = vec![0.0; 26];
            for c in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                v[(c - b'a') as usize] += 1.0;
            }
            Ok(v)
        }
    }

    #[test]
    fn search_ranks_nearest_first() {
        let memory = EmbeddingMemory::new(Arc::new(LetterEmbedder));
        memory.add(MemoryEntry::new("a", "aaaa")).unwrap();
        memory.add(MemoryEntry::new("b", "bbbb")).unwrap();
        memory.add(MemoryEntry::new("ab", "aabb")).unwrap();

        let hits = memory.search("aaab", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "ab");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn fewer_than_k_results() {
        let memory = EmbeddingMemory::new(Arc::new(LetterEmbedder));
        memory.add(MemoryEntry::new("a", "abc")).unwrap();
        assert_eq!(memory.search("abc", 10).len(), 1);
        assert!(memory.search("abc", 0).is_empty());
    }

    #[test]
    fn same_id_replaces() {
        let memory = EmbeddingMemory::new(Arc::new(LetterEmbedder));
        memory.add(MemoryEntry::new("a", "abc")).unwrap();
        memory.add(MemoryEntry::new("a", "xyz").with_meta("k", "v")).unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.entries()[0].content, "xyz");
    }

    #[test]
    fn offline_memory_fails_add_and_searches_empty() {
        let memory = EmbeddingMemory::new(Arc::new(OfflineGenerator));
        assert!(matches!(
            memory.add(MemoryEntry::new("a", "abc")),
            Err(MemoryError::Embedding(_))
        ));
        assert!(memory.search("abc", 3).is_empty());
    }

    #[test]
    fn replaced_entries_leave_search() {
        let memory = EmbeddingMemory::new(Arc::new(LetterEmbedder));
        memory.add(MemoryEntry::new("x", "aaaa")).unwrap();
        memory.add(MemoryEntry::new("y", "cccc")).unwrap();
        memory.add(MemoryEntry::new("x", "bbbb")).unwrap();

        let hits = memory.search("aaaa", 5);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.content != "aaaa"));

        let hits = memory.search("bbbb", 1);
        assert_eq!(hits[0].id, "x");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dimension_is_fixed_by_first_entry() {
        let memory = EmbeddingMemory::new(Arc::new(LetterEmbedder));
        memory.add(MemoryEntry::new("a", "abc")).unwrap();
        let short = MemoryRecord {
            entry: MemoryEntry::new("b", "b"),
            vector: vec![1.0, 0.0],
        };
        let mut snapshot = memory.snapshot();
        snapshot.entries.push(short);
        memory.restore(snapshot);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn snapshot_restores_in_order() {
        let memory = EmbeddingMemory::new(Arc::new(LetterEmbedder));
        for (id, text) in [("c", "ccc"), ("a", "aaa"), ("b", "bbb")] {
            memory.add(MemoryEntry::new(id, text)).unwrap();
        }
        let before = memory.revision();
        let snapshot = memory.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"vector\""));

        let other = EmbeddingMemory::new(Arc::new(LetterEmbedder));
        other.restore(serde_json::from_str(&json).unwrap());
        let ids: Vec<String> = other.entries().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        assert_eq!(memory.revision(), before);
        assert!(other.revision() > 0);
        assert_eq!(other.search("aaa", 1)[0].id, "a");
    }
}
