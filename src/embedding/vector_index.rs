/// Exact cosine-similarity vector index
use ahash::AHashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    Insert(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with chunk ID and similarity score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// ID of the indexed chunk
    pub id: u64,
    /// Cosine similarity score (higher is more similar)
    pub score: f32,
}

struct Entry {
    id: u64,
    /// Unit-normalized vector; cosine similarity reduces to a dot product
    vector: Vec<f32>,
}

struct IndexInner {
    /// Entries kept in insertion order so equal scores break deterministically
    entries: Vec<Entry>,
    /// id -> slot, guards against duplicate insertion
    slots: AHashMap<u64, usize>,
}

/// Flat vector index with exact k-nearest-neighbor search
///
/// Every query scans all entries, which keeps the ordering contract exact:
/// results are sorted by decreasing cosine similarity with ties broken by
/// insertion order. Interior locking makes concurrent inserts during a
/// single-session build safe; published sessions only read.
pub struct VectorIndex {
    inner: RwLock<IndexInner>,
    dimension: usize,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                entries: Vec::new(),
                slots: AHashMap::new(),
            }),
            dimension,
        }
    }

    /// Insert a vector under a chunk id
    pub fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut inner = self.inner.write().unwrap();
        if inner.slots.contains_key(&id) {
            return Err(VectorIndexError::Insert(format!(
                "duplicate chunk id {}",
                id
            )));
        }

        let slot = inner.entries.len();
        inner.entries.push(Entry {
            id,
            vector: normalize(vector),
        });
        inner.slots.insert(id, slot);
        Ok(())
    }

    /// Query the k nearest neighbors of `query`
    ///
    /// Returns (id, score) pairs sorted by decreasing similarity; equal scores
    /// keep insertion order. Asking for more results than the index holds
    /// returns everything.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let normalized = normalize(query);
        let inner = self.inner.read().unwrap();

        let mut results: Vec<SearchResult> = inner
            .entries
            .iter()
            .map(|entry| SearchResult {
                id: entry.id,
                score: dot(&entry.vector, &normalized),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);

        Ok(results)
    }

    /// Remove a chunk's vector. Returns whether the id was present.
    /// Used only during session teardown.
    pub fn remove(&self, id: u64) -> bool {
        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;
        let Some(slot) = inner.slots.remove(&id) else {
            return false;
        };
        // Preserve insertion order for the remaining entries
        inner.entries.remove(slot);
        for moved in inner.entries.iter().skip(slot) {
            if let Some(s) = inner.slots.get_mut(&moved.id) {
                *s -= 1;
            }
        }
        true
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the index holds a vector for `id`
    pub fn contains(&self, id: u64) -> bool {
        self.inner.read().unwrap().slots.contains_key(&id)
    }

    /// All indexed chunk ids in insertion order
    pub fn ids(&self) -> Vec<u64> {
        self.inner
            .read()
            .unwrap()
            .entries
            .iter()
            .map(|e| e.id)
            .collect()
    }

    /// Vector dimension fixed at construction
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vector.iter().map(|x| x / magnitude).collect()
    } else {
        vector.to_vec()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
