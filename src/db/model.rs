//! Raw row shape of the `decisions` table.
//!
//! Columns are read as plain strings here; the repository turns them into the
//! typed [`crate::model::DecisionRecord`].

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct DecisionRow {
    pub card_id: String,
    pub decision: String,
    pub outcome: String,
    pub reason: String,
    /// Comma-joined keyword list.
    pub matched_include: String,
    pub matched_exclude: String,
    pub button: Option<String>,
    pub source_bot: String,
    pub text: String,
    pub processed_at: DateTime<Utc>,
}
