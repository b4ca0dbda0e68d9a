//! Session management
//!
//! A session is the unit of lifecycle and isolation: one ingested repository
//! with its chunk table, vector index, issues, cached summary, and the
//! embedding/generation choices made at ingestion time. Sessions are
//! immutable once published. The store is process-wide shared state keyed by
//! an opaque repository key; `get` never observes a partially-built session
//! because publish swaps a fully-constructed value under the write lock.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::chunker::Chunk;
use crate::embedding::{EmbeddingProvider, VectorIndex};
use crate::generation::GenerationBackend;
use crate::ingest::Issue;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Query against a missing or already-cleaned key
    #[error("Session not found: {key}")]
    NotFound { key: String },

    /// A build for this key is already in flight; duplicates are rejected,
    /// not queued
    #[error("Session is already being built: {key}")]
    AlreadyBuilding { key: String },
}

/// A published repository context
///
/// All fields are fixed at publish time. The embedding provider travels with
/// the session so query-time embeddings can never mix models with the
/// ingestion-time vectors.
pub struct Session {
    /// Opaque repository key this session is stored under
    pub key: String,

    /// Unique session identifier
    pub id: Uuid,

    /// When the session was published
    pub created_at: DateTime<Utc>,

    /// Embedding provider chosen at ingestion
    pub provider: Arc<dyn EmbeddingProvider>,

    /// Generation backend chosen at ingestion
    pub backend: Arc<dyn GenerationBackend>,

    /// Vector index over all chunk embeddings
    pub index: VectorIndex,

    /// Chunk table, keyed by chunk id
    pub chunks: AHashMap<u64, Chunk>,

    /// Issues fetched for this repository
    pub issues: Vec<Issue>,

    /// Repository summary generated at ingestion, if generation succeeded
    pub summary: Option<String>,
}

impl Session {
    pub fn find_issue(&self, id: u64) -> Option<&Issue> {
        self.issues.iter().find(|i| i.id == id)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Listing entry for a published session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub backend: String,
    pub chunk_count: usize,
    pub issue_count: usize,
    pub has_summary: bool,
}

/// Process-wide session store
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<AHashMap<String, Arc<Session>>>,
    building: Mutex<HashSet<String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a published session
    pub fn get(&self, key: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::NotFound {
                key: key.to_string(),
            })
    }

    /// Claim the exclusive right to build a session for `key`.
    ///
    /// The returned guard releases the claim when dropped, whatever the exit
    /// path: publish, failure, or cancellation of the ingestion future.
    pub fn begin_build(&self, key: &str) -> Result<BuildGuard<'_>, SessionError> {
        let mut building = self.building.lock().unwrap();
        if !building.insert(key.to_string()) {
            return Err(SessionError::AlreadyBuilding {
                key: key.to_string(),
            });
        }
        Ok(BuildGuard {
            store: self,
            key: key.to_string(),
        })
    }

    /// Delete a session and release everything it owns
    pub fn remove(&self, key: &str) -> Result<(), SessionError> {
        let removed = self.sessions.write().unwrap().remove(key);
        match removed {
            // Index, chunk table, issues, and summary drop with the Arc once
            // the last concurrent reader is done with it
            Some(_) => Ok(()),
            None => Err(SessionError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Published sessions, newest first
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .read()
            .unwrap()
            .values()
            .map(|s| SessionInfo {
                key: s.key.clone(),
                created_at: s.created_at,
                embedding_model: s.provider.model_name().to_string(),
                backend: s.backend.name().to_string(),
                chunk_count: s.chunk_count(),
                issue_count: s.issues.len(),
                has_summary: s.summary.is_some(),
            })
            .collect();
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        infos
    }

    fn publish_inner(&self, key: &str, session: Session) -> Arc<Session> {
        let published = Arc::new(session);
        let previous = self
            .sessions
            .write()
            .unwrap()
            .insert(key.to_string(), Arc::clone(&published));
        // Replaced only after the new session is in place; a failed rebuild
        // never tears down a working predecessor
        drop(previous);
        published
    }

    fn release_build(&self, key: &str) {
        self.building.lock().unwrap().remove(key);
    }
}

/// Exclusive write handle for one in-flight session build
pub struct BuildGuard<'a> {
    store: &'a SessionStore,
    key: String,
}

impl BuildGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Atomically publish the finished session, replacing any prior session
    /// for this key, and release the build claim
    pub fn publish(self, session: Session) -> Arc<Session> {
        self.store.publish_inner(&self.key, session)
        // Drop releases the build claim
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.store.release_build(&self.key);
    }
}
