//! Transcript ingestion and memory retrieval.
//!
//! The LLM extraction call and the embedding call are collaborators behind
//! traits, and both fail closed: an error, timeout, or missing credential
//! yields "no result" rather than surfacing to the caller. Retrieval is
//! cosine top-k over stored vectors with a small in-process cache that the
//! store path invalidates through a per-user namespace counter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::database::{Database, MemoryRepository};
use crate::domain::{ExtractedMemory, MemoryKind, MemoryLayer, MemoryRecord, Message};
use crate::events::{MirrorEvent, MirrorSink};
use crate::portfolio::PortfolioService;

/// How long a cached retrieval page stays valid.
pub const RETRIEVAL_CACHE_TTL: Duration = Duration::from_secs(300);

/// Extracts declarative memories from a chat transcript.
///
/// Implementations wrap an LLM JSON call. The contract is fail-closed:
/// `None` on any error, never an `Err` the caller has to handle.
#[async_trait]
pub trait MemoryExtractor: Send + Sync {
    async fn extract(&self, user_id: &str, messages: &[Message]) -> Option<Vec<ExtractedMemory>>;
}

/// Produces an embedding vector for a text, or `None` when unavailable.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Default extractor when no LLM credentials are configured.
#[derive(Debug, Clone, Default)]
pub struct DisabledExtractor;

#[async_trait]
impl MemoryExtractor for DisabledExtractor {
    async fn extract(&self, user_id: &str, _messages: &[Message]) -> Option<Vec<ExtractedMemory>> {
        debug!(user_id, "memory extraction disabled");
        None
    }
}

/// Default embedder when no embedding backend is configured.
#[derive(Debug, Clone, Default)]
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }
}

/// One page of retrieval results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalPage {
    pub memories: Vec<MemoryRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Retrieval request parameters.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub user_id: String,
    pub query: String,
    pub layer: Option<MemoryLayer>,
    pub kind: Option<MemoryKind>,
    pub limit: usize,
    pub offset: usize,
}

struct CacheEntry {
    expires: Instant,
    page: RetrievalPage,
}

/// In-process retrieval cache with per-user invalidation.
///
/// Cache keys embed a per-user namespace counter; the store path bumps the
/// counter so every cached page for that user goes stale at once without
/// scanning for keys.
#[derive(Clone, Default)]
pub struct RetrievalCache {
    entries: Arc<parking_lot::Mutex<HashMap<String, CacheEntry>>>,
    namespaces: Arc<parking_lot::Mutex<HashMap<String, u64>>>,
}

impl std::fmt::Debug for RetrievalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalCache")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl RetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self, user_id: &str) -> u64 {
        *self.namespaces.lock().get(user_id).unwrap_or(&0)
    }

    /// Invalidate every cached page for a user.
    pub fn bump_namespace(&self, user_id: &str) -> u64 {
        let mut namespaces = self.namespaces.lock();
        let counter = namespaces.entry(user_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn get(&self, key: &str) -> Option<RetrievalPage> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.page.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: String, page: RetrievalPage, ttl: Duration) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                expires: Instant::now() + ttl,
                page,
            },
        );
    }
}

/// Ingestion and retrieval over the memory repository.
#[derive(Clone)]
pub struct MemoryService {
    db: Database,
    extractor: Arc<dyn MemoryExtractor>,
    embedder: Arc<dyn Embedder>,
    cache: RetrievalCache,
    mirror: MirrorSink,
    portfolio: PortfolioService,
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryService").field("db", &self.db).finish()
    }
}

impl MemoryService {
    pub fn new(
        db: Database,
        extractor: Arc<dyn MemoryExtractor>,
        embedder: Arc<dyn Embedder>,
        portfolio: PortfolioService,
        mirror: MirrorSink,
    ) -> Self {
        Self {
            db,
            extractor,
            embedder,
            cache: RetrievalCache::new(),
            mirror,
            portfolio,
        }
    }

    /// Extract memories from a transcript and persist them.
    ///
    /// Returns the number of records stored. Extraction failing closed, or
    /// extracting nothing, is a zero, not an error. Embeddings are
    /// best-effort per record.
    pub async fn store_transcript(
        &self,
        user_id: &str,
        messages: &[Message],
    ) -> anyhow::Result<usize> {
        let Some(extracted) = self.extractor.extract(user_id, messages).await else {
            debug!(user_id, "extractor returned nothing, no memories stored");
            return Ok(0);
        };
        if extracted.is_empty() {
            return Ok(0);
        }

        let mut records = Vec::with_capacity(extracted.len());
        for memory in extracted {
            let mut record = MemoryRecord::from_extracted(user_id, memory);
            record.embedding = self.embedder.embed(&record.content).await;
            if record.embedding.is_none() {
                warn!(user_id, memory_id = %record.id, "no embedding available for memory");
            }
            records.push(record);
        }

        let stored = self.db.store_memories(&records).await?;
        self.cache.bump_namespace(user_id);
        info!(user_id, count = stored, "memories stored");

        // Memories that mention owned assets also land in the portfolio.
        for record in &records {
            if let Some(metadata) = &record.metadata {
                self.portfolio
                    .record_from_memory(user_id, metadata, &record.id)
                    .await;
            }
        }

        self.mirror.publish(MirrorEvent::MemoriesStored {
            user_id: user_id.to_string(),
            count: stored,
        });
        Ok(stored)
    }

    /// Similarity-ranked retrieval with layer/type filters and pagination.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> anyhow::Result<RetrievalPage> {
        let key = self.cache_key(request);
        if let Some(page) = self.cache.get(&key) {
            debug!(user_id = %request.user_id, "retrieval cache hit");
            return Ok(page);
        }

        let mut candidates = self.db.memories_for_user(&request.user_id).await?;
        candidates.retain(|m| {
            request.layer.is_none_or(|l| m.layer == l)
                && request.kind.is_none_or(|k| m.kind == k)
        });

        // Rank by similarity when the query embeds; otherwise the recency
        // ordering from storage stands.
        if let Some(query_vector) = self.embedder.embed(&request.query).await {
            let mut scored: Vec<(f32, MemoryRecord)> = candidates
                .into_iter()
                .map(|m| {
                    let score = m
                        .embedding
                        .as_deref()
                        .map(|e| cosine_similarity(&query_vector, e))
                        .unwrap_or(f32::MIN);
                    (score, m)
                })
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            candidates = scored.into_iter().map(|(_, m)| m).collect();
        }

        let total = candidates.len();
        let memories: Vec<MemoryRecord> = candidates
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();

        let page = RetrievalPage {
            memories,
            total,
            limit: request.limit,
            offset: request.offset,
        };
        self.cache.set(key, page.clone(), RETRIEVAL_CACHE_TTL);
        Ok(page)
    }

    fn cache_key(&self, request: &RetrievalRequest) -> String {
        format!(
            "retrieve:{}:{}:{}:{:?}:{:?}:{}:{}",
            request.user_id,
            self.cache.namespace(&request.user_id),
            request.query,
            request.layer,
            request.kind,
            request.limit,
            request.offset
        )
    }
}

/// Cosine similarity of two vectors; zero for mismatched or empty inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
