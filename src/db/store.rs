use anyhow::Result;
use async_trait::async_trait;

use super::repo::{self, Pool};
use crate::model::DecisionRecord;

/// Source of truth for "was this card already handled".
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn has_processed(&self, card_id: &str) -> Result<bool>;

    /// Idempotent upsert keyed by `record.card_id`.
    async fn record(&self, record: &DecisionRecord) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteDecisionStore {
    pool: Pool,
}

impl SqliteDecisionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl DecisionStore for SqliteDecisionStore {
    async fn has_processed(&self, card_id: &str) -> Result<bool> {
        repo::has_processed(&self.pool, card_id).await
    }

    async fn record(&self, record: &DecisionRecord) -> Result<()> {
        repo::upsert_decision(&self.pool, record).await
    }
}
