//! Portfolio holding domain models.
//!
//! A holding is identified by `user_id` plus ticker (or asset name when the
//! asset has no ticker). Only the `hold` intent represents actual ownership;
//! the other intents are speculative interest and are filtered out of
//! extraction-driven storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the user intends for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipIntent {
    /// The user owns this asset.
    #[serde(rename = "hold")]
    Hold,
    /// The user wants to acquire it.
    #[serde(rename = "wants-to-buy")]
    WantsToBuy,
    /// The user plans to dispose of it.
    #[serde(rename = "wants-to-sell")]
    WantsToSell,
    /// The user is monitoring it without ownership or immediate intent.
    #[serde(rename = "watch")]
    Watch,
}

impl OwnershipIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::WantsToBuy => "wants-to-buy",
            Self::WantsToSell => "wants-to-sell",
            Self::Watch => "watch",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().trim() {
            "hold" => Some(Self::Hold),
            "wants-to-buy" => Some(Self::WantsToBuy),
            "wants-to-sell" => Some(Self::WantsToSell),
            "watch" => Some(Self::Watch),
            _ => None,
        }
    }

    /// Speculative intents never enter holdings storage from extraction.
    pub fn is_speculative(self) -> bool {
        !matches!(self, Self::Hold)
    }
}

impl std::fmt::Display for OwnershipIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a ticker to uppercase.
///
/// Returns `None` for empty input or anything that is not 1-10 uppercase
/// alphanumerics and dots (`BRK.B` style).
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_ascii_uppercase();
    if normalized.is_empty() || normalized.len() > 10 {
        return None;
    }
    if !normalized
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'.')
    {
        return None;
    }
    Some(normalized)
}

/// A stored portfolio holding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    /// Unique holding identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Normalized ticker symbol, absent for unlisted assets.
    pub ticker: Option<String>,
    /// Asset display name.
    pub asset_name: Option<String>,
    /// Asset classification label.
    pub asset_type: String,
    /// Share count.
    pub shares: Option<f64>,
    /// Average purchase price.
    pub avg_price: Option<f64>,
    /// Ownership intent.
    pub intent: OwnershipIntent,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Memory record that produced this holding, when extraction-driven.
    pub source_memory_id: Option<String>,
    /// When the holding was first recorded.
    pub first_acquired: DateTime<Utc>,
    /// Last upsert timestamp.
    pub last_updated: DateTime<Utc>,
}

/// Holding upsert request. Absent fields preserve stored values on update.
///
/// `intent` stays a raw string here so the rejection can name the allowed
/// values; the typed [`OwnershipIntent`] is produced during the upsert.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HoldingDraft {
    pub user_id: String,
    pub ticker: Option<String>,
    pub asset_name: Option<String>,
    pub asset_type: Option<String>,
    pub shares: Option<f64>,
    pub avg_price: Option<f64>,
    pub intent: Option<String>,
    pub notes: Option<String>,
    pub source_memory_id: Option<String>,
}
