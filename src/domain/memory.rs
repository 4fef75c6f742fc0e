//! Memory records extracted from conversation transcripts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Retention layer a memory lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryLayer {
    /// Recent, freely expiring context.
    #[serde(rename = "short-term")]
    ShortTerm,
    /// Distilled facts about the user.
    #[serde(rename = "semantic")]
    Semantic,
    /// Durable, high-confidence knowledge.
    #[serde(rename = "long-term")]
    LongTerm,
}

/// Whether the memory was stated outright or inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Stated by the user.
    Explicit,
    /// Inferred from behavior or phrasing.
    Implicit,
}

/// Role of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One message of a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Speaker role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

/// A declarative memory produced by the extractor, not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMemory {
    /// Memory text.
    pub content: String,
    /// Retention layer.
    pub layer: MemoryLayer,
    /// Explicit or implicit.
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// Extractor confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Optional time-to-live in seconds.
    pub ttl: Option<i64>,
    /// Free-form metadata.
    pub metadata: Option<Value>,
}

/// A persisted memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique memory identifier.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Memory text.
    pub content: String,
    /// Retention layer.
    pub layer: MemoryLayer,
    /// Explicit or implicit.
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// Extractor confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Optional time-to-live in seconds.
    pub ttl: Option<i64>,
    /// Embedding vector, when the embedder was available.
    pub embedding: Option<Vec<f32>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Free-form metadata.
    pub metadata: Option<Value>,
}

impl MemoryRecord {
    /// Persist an extracted memory for a user.
    pub fn from_extracted(user_id: impl Into<String>, extracted: ExtractedMemory) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            content: extracted.content,
            layer: extracted.layer,
            kind: extracted.kind,
            confidence: extracted.confidence,
            ttl: extracted.ttl,
            embedding: None,
            created_at: Utc::now(),
            metadata: extracted.metadata,
        }
    }
}
