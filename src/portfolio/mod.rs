//! Portfolio holdings over the portfolio repository.
//!
//! Holdings arrive two ways: explicit API upserts, which accept any
//! ownership intent, and extraction-driven recording from memory metadata,
//! which only stores actual ownership. Upserts merge field-by-field so a
//! partial update never erases what an earlier mention established.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{Database, PortfolioRepository};
use crate::domain::{normalize_ticker, Holding, HoldingDraft, OwnershipIntent};
use crate::error::EngineError;

/// A user's portfolio as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioView {
    pub user_id: String,
    pub holdings: Vec<Holding>,
    pub total_holdings: usize,
    /// Most recent upsert across the portfolio, absent when empty.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Holdings upserts and listing.
#[derive(Clone)]
pub struct PortfolioService {
    db: Database,
}

impl std::fmt::Debug for PortfolioService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioService")
            .field("db", &self.db)
            .finish()
    }
}

impl PortfolioService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or merge a holding. True means a new row was created.
    ///
    /// The merge key is `user_id` + ticker, falling back to the asset name
    /// for unlisted assets. On update, absent draft fields keep the stored
    /// values.
    pub async fn upsert(&self, draft: HoldingDraft) -> Result<(Holding, bool), EngineError> {
        if draft.user_id.trim().is_empty() {
            return Err(EngineError::Validation(vec![
                "user_id is required".to_string()
            ]));
        }

        let ticker = match draft
            .ticker
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(raw) => Some(normalize_ticker(raw).ok_or_else(|| {
                EngineError::Validation(vec![format!("Invalid ticker format: {raw}")])
            })?),
            None => None,
        };
        let asset_name = draft
            .asset_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);
        if ticker.is_none() && asset_name.is_none() {
            return Err(EngineError::Validation(vec![
                "Either ticker or asset_name is required".to_string(),
            ]));
        }

        let intent = match draft.intent.as_deref() {
            Some(raw) => Some(OwnershipIntent::parse(raw).ok_or_else(|| {
                EngineError::Validation(vec![format!(
                    "Invalid intent '{raw}'. Allowed: hold, wants-to-buy, wants-to-sell, watch"
                )])
            })?),
            None => None,
        };

        let now = Utc::now();
        let existing = self
            .db
            .find_holding(&draft.user_id, ticker.as_deref(), asset_name.as_deref())
            .await?;

        match existing {
            Some(mut holding) => {
                if let Some(name) = asset_name {
                    holding.asset_name = Some(name);
                }
                if let Some(asset_type) = draft.asset_type {
                    holding.asset_type = asset_type;
                }
                if let Some(shares) = draft.shares {
                    holding.shares = Some(shares);
                }
                if let Some(avg_price) = draft.avg_price {
                    holding.avg_price = Some(avg_price);
                }
                if let Some(intent) = intent {
                    holding.intent = intent;
                }
                if let Some(notes) = draft.notes {
                    holding.notes = Some(notes);
                }
                if let Some(memory_id) = draft.source_memory_id {
                    holding.source_memory_id = Some(memory_id);
                }
                holding.last_updated = now;

                self.db.put_holding(&holding).await?;
                debug!(
                    user_id = %holding.user_id,
                    ticker = ?holding.ticker,
                    "holding updated"
                );
                Ok((holding, false))
            }
            None => {
                let asset_type = draft.asset_type.unwrap_or_else(|| {
                    if ticker.is_some() {
                        "public_equity".to_string()
                    } else {
                        "other".to_string()
                    }
                });
                let holding = Holding {
                    id: Uuid::new_v4(),
                    user_id: draft.user_id,
                    ticker,
                    asset_name,
                    asset_type,
                    shares: draft.shares,
                    avg_price: draft.avg_price,
                    intent: intent.unwrap_or(OwnershipIntent::Hold),
                    notes: draft.notes,
                    source_memory_id: draft.source_memory_id,
                    first_acquired: now,
                    last_updated: now,
                };

                self.db.put_holding(&holding).await?;
                info!(
                    user_id = %holding.user_id,
                    ticker = ?holding.ticker,
                    intent = %holding.intent,
                    "holding created"
                );
                Ok((holding, true))
            }
        }
    }

    /// A user's holdings, optionally narrowed to one ownership intent.
    pub async fn portfolio(
        &self,
        user_id: &str,
        intent: Option<OwnershipIntent>,
    ) -> Result<PortfolioView, EngineError> {
        let holdings = self.db.holdings_for_user(user_id, intent).await?;
        // Listing is most-recently-updated first.
        let last_updated = holdings.first().map(|h| h.last_updated);
        Ok(PortfolioView {
            user_id: user_id.to_string(),
            total_holdings: holdings.len(),
            last_updated,
            holdings,
        })
    }

    /// Record holdings mentioned in extracted memory metadata.
    ///
    /// Only actual ownership is stored; wanting to buy, wanting to sell, or
    /// watching an asset stays a memory without becoming a holding. The whole
    /// path fails closed: a malformed entry is skipped with a warning, never
    /// an error back to ingestion. Returns the number of holdings recorded.
    pub async fn record_from_memory(
        &self,
        user_id: &str,
        metadata: &Value,
        memory_id: &str,
    ) -> usize {
        let Some(portfolio) = metadata.get("portfolio") else {
            return 0;
        };
        let entries: Vec<&Value> = match portfolio.get("holdings").and_then(Value::as_array) {
            Some(list) => list.iter().collect(),
            None => vec![portfolio],
        };

        let mut recorded = 0;
        for entry in entries {
            let Some(draft) = draft_from_metadata(user_id, entry, memory_id) else {
                debug!(user_id, memory_id, "portfolio metadata entry unusable, skipped");
                continue;
            };
            match draft.intent.as_deref().map(OwnershipIntent::parse) {
                Some(Some(intent)) if intent.is_speculative() => {
                    debug!(user_id, %intent, "speculative intent not stored as holding");
                    continue;
                }
                Some(None) => {
                    debug!(user_id, memory_id, "unknown intent in portfolio metadata, skipped");
                    continue;
                }
                _ => {}
            }
            match self.upsert(draft).await {
                Ok(_) => recorded += 1,
                Err(err) => {
                    warn!(user_id, memory_id, %err, "holding from memory rejected");
                }
            }
        }
        recorded
    }
}

/// Map one portfolio metadata entry to a draft, tolerating the field name
/// variants the extractor produces.
fn draft_from_metadata(user_id: &str, entry: &Value, memory_id: &str) -> Option<HoldingDraft> {
    let ticker = entry.get("ticker").and_then(Value::as_str).map(str::to_string);
    let asset_name = entry
        .get("asset_name")
        .or_else(|| entry.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    if ticker.is_none() && asset_name.is_none() {
        return None;
    }
    Some(HoldingDraft {
        user_id: user_id.to_string(),
        ticker,
        asset_name,
        asset_type: entry
            .get("asset_type")
            .and_then(Value::as_str)
            .map(str::to_string),
        shares: entry
            .get("shares")
            .or_else(|| entry.get("quantity"))
            .and_then(Value::as_f64),
        avg_price: entry
            .get("avg_price")
            .or_else(|| entry.get("price"))
            .and_then(Value::as_f64),
        intent: entry.get("intent").and_then(Value::as_str).map(str::to_string),
        notes: entry.get("notes").and_then(Value::as_str).map(str::to_string),
        source_memory_id: Some(memory_id.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> PortfolioService {
        PortfolioService::new(Database::in_memory())
    }

    fn draft(user_id: &str, ticker: &str) -> HoldingDraft {
        HoldingDraft {
            user_id: user_id.to_string(),
            ticker: Some(ticker.to_string()),
            ..HoldingDraft::default()
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_merges_by_ticker() {
        let service = service();

        let (created, was_created) = service
            .upsert(HoldingDraft {
                shares: Some(100.0),
                avg_price: Some(150.0),
                ..draft("u1", "aapl")
            })
            .await
            .unwrap();
        assert!(was_created);
        assert_eq!(created.ticker.as_deref(), Some("AAPL"));
        assert_eq!(created.intent, OwnershipIntent::Hold);
        assert_eq!(created.asset_type, "public_equity");

        // Second upsert for the same ticker updates shares but keeps the
        // price the draft left out.
        let (updated, was_created) = service
            .upsert(HoldingDraft {
                shares: Some(150.0),
                ..draft("u1", "AAPL")
            })
            .await
            .unwrap();
        assert!(!was_created);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.shares, Some(150.0));
        assert_eq!(updated.avg_price, Some(150.0));

        let view = service.portfolio("u1", None).await.unwrap();
        assert_eq!(view.total_holdings, 1);
        assert_eq!(view.last_updated, Some(updated.last_updated));
    }

    #[tokio::test]
    async fn upsert_rejects_bad_ticker_and_bad_intent() {
        let service = service();

        let err = service
            .upsert(draft("u1", "NOT A TICKER!"))
            .await
            .unwrap_err();
        match err {
            EngineError::Validation(errors) => {
                assert!(errors[0].contains("Invalid ticker format"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let err = service
            .upsert(HoldingDraft {
                intent: Some("buy".to_string()),
                ..draft("u1", "AAPL")
            })
            .await
            .unwrap_err();
        match err {
            EngineError::Validation(errors) => {
                assert!(errors[0].contains("Invalid intent"));
                assert!(errors[0].contains("wants-to-buy"));
                assert!(errors[0].contains("wants-to-sell"));
                assert!(errors[0].contains("watch"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upsert_requires_ticker_or_asset_name() {
        let service = service();
        let err = service
            .upsert(HoldingDraft {
                user_id: "u1".to_string(),
                shares: Some(1.0),
                ..HoldingDraft::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Asset name alone is enough for unlisted assets.
        let (holding, created) = service
            .upsert(HoldingDraft {
                user_id: "u1".to_string(),
                asset_name: Some("Vanguard Target 2050".to_string()),
                ..HoldingDraft::default()
            })
            .await
            .unwrap();
        assert!(created);
        assert!(holding.ticker.is_none());
        assert_eq!(holding.asset_type, "other");
    }

    #[tokio::test]
    async fn portfolio_filters_by_intent_newest_first() {
        let service = service();
        service
            .upsert(HoldingDraft {
                intent: Some("watch".to_string()),
                ..draft("u1", "NVDA")
            })
            .await
            .unwrap();
        service.upsert(draft("u1", "AAPL")).await.unwrap();
        service.upsert(draft("u1", "MSFT")).await.unwrap();

        let all = service.portfolio("u1", None).await.unwrap();
        assert_eq!(all.total_holdings, 3);

        let held = service
            .portfolio("u1", Some(OwnershipIntent::Hold))
            .await
            .unwrap();
        assert_eq!(held.total_holdings, 2);
        assert!(held
            .holdings
            .iter()
            .all(|h| h.intent == OwnershipIntent::Hold));

        let empty = service.portfolio("nobody", None).await.unwrap();
        assert_eq!(empty.total_holdings, 0);
        assert!(empty.last_updated.is_none());
    }

    #[tokio::test]
    async fn memory_metadata_records_owned_assets_only() {
        let service = service();

        let metadata = json!({
            "portfolio": {
                "holdings": [
                    {"ticker": "aapl", "shares": 10.0, "intent": "hold"},
                    {"ticker": "NVDA", "intent": "wants-to-buy"},
                    {"ticker": "TSLA", "intent": "watch"},
                ]
            }
        });
        let recorded = service
            .record_from_memory("u1", &metadata, "mem-1")
            .await;
        assert_eq!(recorded, 1);

        let view = service.portfolio("u1", None).await.unwrap();
        assert_eq!(view.total_holdings, 1);
        assert_eq!(view.holdings[0].ticker.as_deref(), Some("AAPL"));
        assert_eq!(view.holdings[0].source_memory_id.as_deref(), Some("mem-1"));
    }

    #[tokio::test]
    async fn memory_metadata_without_portfolio_is_ignored() {
        let service = service();
        let recorded = service
            .record_from_memory("u1", &json!({"topic": "travel"}), "mem-1")
            .await;
        assert_eq!(recorded, 0);

        // A single holding object also works without the wrapper array.
        let recorded = service
            .record_from_memory(
                "u1",
                &json!({"portfolio": {"name": "gold bars", "quantity": 3.0}}),
                "mem-2",
            )
            .await;
        assert_eq!(recorded, 1);
    }
}
