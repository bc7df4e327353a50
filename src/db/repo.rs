use super::model::DecisionRow;
use crate::model::{Decision, DecisionRecord, Outcome};
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

const MAX_CONNECTIONS: u32 = 4;

/// Open (creating if needed) the decision database at `db_path`.
///
/// Accepts a plain file path, a `sqlite:` URL, or `:memory:`.
pub async fn init_pool(db_path: &str) -> Result<Pool> {
    let db_path = db_path.trim();
    if db_path == ":memory:" || db_path.starts_with("sqlite::memory") {
        return Ok(SqlitePool::connect("sqlite::memory:").await?);
    }

    let opts = if db_path.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(db_path)
            .with_context(|| format!("invalid sqlite url {}", db_path))?
    } else {
        SqliteConnectOptions::new().filename(prepare_db_path(db_path))
    };
    // WAL with stricter durability: a decision must survive a crash right after the press.
    let opts = opts
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(opts)
        .await
        .with_context(|| format!("failed to open database {}", db_path))?;
    Ok(pool)
}

/// Expand a leading `~/` and make sure the parent directory exists.
fn prepare_db_path(path: &str) -> PathBuf {
    let expanded = match path.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path.to_string(),
        },
        None => path.to_string(),
    };
    let expanded = PathBuf::from(expanded);
    if let Some(parent) = expanded.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    expanded
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn has_processed(pool: &Pool, card_id: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM decisions WHERE card_id = ?")
        .bind(card_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Insert the record or, if the card is already known, refresh its outcome,
/// button and timestamp. The first decision and reason are kept.
#[instrument(skip_all, fields(card_id = %record.card_id))]
pub async fn upsert_decision(pool: &Pool, record: &DecisionRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO decisions \
         (card_id, decision, outcome, reason, matched_include, matched_exclude, button, source_bot, text, processed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(card_id) DO UPDATE SET \
         outcome = excluded.outcome, button = excluded.button, processed_at = excluded.processed_at",
    )
    .bind(&record.card_id)
    .bind(record.decision.as_str())
    .bind(record.outcome.as_str())
    .bind(&record.reason)
    .bind(record.matched_include.join(","))
    .bind(record.matched_exclude.join(","))
    .bind(record.button.as_deref())
    .bind(&record.source_bot)
    .bind(&record.text)
    .bind(record.processed_at)
    .execute(pool)
    .await?;
    Ok(())
}

const SELECT_DECISION: &str = "SELECT card_id, decision, outcome, reason, matched_include, \
     matched_exclude, button, source_bot, text, processed_at FROM decisions";

#[instrument(skip_all)]
pub async fn get_decision(pool: &Pool, card_id: &str) -> Result<Option<DecisionRecord>> {
    let row = sqlx::query(&format!("{} WHERE card_id = ?", SELECT_DECISION))
        .bind(card_id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| map_row(&r)?.into_record()).transpose()
}

/// Most recent decisions first.
#[instrument(skip_all)]
pub async fn recent_decisions(pool: &Pool, limit: i64) -> Result<Vec<DecisionRecord>> {
    let rows = sqlx::query(&format!(
        "{} ORDER BY processed_at DESC, card_id DESC LIMIT ?",
        SELECT_DECISION
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|r| map_row(r)?.into_record())
        .collect()
}

/// Most recent decisions with the given outcome, newest first.
#[instrument(skip_all)]
pub async fn recent_decisions_with_outcome(
    pool: &Pool,
    outcome: Outcome,
    limit: i64,
) -> Result<Vec<DecisionRecord>> {
    let rows = sqlx::query(&format!(
        "{} WHERE outcome = ? ORDER BY processed_at DESC, card_id DESC LIMIT ?",
        SELECT_DECISION
    ))
    .bind(outcome.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|r| map_row(r)?.into_record())
        .collect()
}

#[instrument(skip_all)]
pub async fn count_decisions(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM decisions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn map_row(row: &SqliteRow) -> Result<DecisionRow> {
    Ok(DecisionRow {
        card_id: row.try_get("card_id")?,
        decision: row.try_get("decision")?,
        outcome: row.try_get("outcome")?,
        reason: row.try_get("reason")?,
        matched_include: row.try_get("matched_include")?,
        matched_exclude: row.try_get("matched_exclude")?,
        button: row.try_get("button")?,
        source_bot: row.try_get("source_bot")?,
        text: row.try_get("text")?,
        processed_at: row.try_get("processed_at")?,
    })
}

impl DecisionRow {
    fn into_record(self) -> Result<DecisionRecord> {
        let decision = Decision::parse(&self.decision).ok_or_else(|| {
            anyhow!("card {} has unknown decision {}", self.card_id, self.decision)
        })?;
        let outcome = Outcome::parse(&self.outcome)
            .ok_or_else(|| anyhow!("card {} has unknown outcome {}", self.card_id, self.outcome))?;
        let split = |s: &str| -> Vec<String> {
            s.split(',')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };
        Ok(DecisionRecord {
            decision,
            outcome,
            matched_include: split(&self.matched_include),
            matched_exclude: split(&self.matched_exclude),
            card_id: self.card_id,
            reason: self.reason,
            button: self.button,
            source_bot: self.source_bot,
            text: self.text,
            processed_at: self.processed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn record(card_id: &str, outcome: Outcome) -> DecisionRecord {
        DecisionRecord {
            card_id: card_id.into(),
            decision: Decision::Accept,
            outcome,
            reason: "include_match".into(),
            matched_include: vec!["спорт".into(), "music".into()],
            matched_exclude: vec![],
            button: Some("👍".into()),
            source_bot: "leomatchbot".into(),
            text: "Москва, 25 лет, люблю спорт".into(),
            processed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_card() {
        let pool = setup_pool().await;
        assert!(!has_processed(&pool, "1:1").await.unwrap());

        let first = record("1:1", Outcome::Failure);
        upsert_decision(&pool, &first).await.unwrap();
        let mut second = record("1:1", Outcome::Success);
        second.decision = Decision::Skip;
        second.processed_at = first.processed_at + Duration::seconds(5);
        upsert_decision(&pool, &second).await.unwrap();

        assert!(has_processed(&pool, "1:1").await.unwrap());
        assert_eq!(count_decisions(&pool).await.unwrap(), 1);

        let stored = get_decision(&pool, "1:1").await.unwrap().unwrap();
        assert_eq!(stored.outcome, Outcome::Success);
        assert_eq!(stored.processed_at, second.processed_at);
        // the first computed decision is kept
        assert_eq!(stored.decision, Decision::Accept);
        assert_eq!(stored.matched_include, vec!["спорт", "music"]);
        assert!(stored.matched_exclude.is_empty());
    }

    #[tokio::test]
    async fn recent_decisions_are_newest_first() {
        let pool = setup_pool().await;
        for i in 0..3 {
            let mut r = record(&format!("1:{}", i), Outcome::Success);
            r.processed_at += Duration::minutes(i);
            upsert_decision(&pool, &r).await.unwrap();
        }
        let recent = recent_decisions(&pool, 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.card_id.as_str()).collect();
        assert_eq!(ids, vec!["1:2", "1:1"]);
        assert!(get_decision(&pool, "9:9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn outcome_filter_applies_before_limit() {
        let pool = setup_pool().await;
        let mut failed = record("1:0", Outcome::Failure);
        failed.processed_at -= Duration::hours(1);
        upsert_decision(&pool, &failed).await.unwrap();
        for i in 1..4 {
            let mut r = record(&format!("1:{}", i), Outcome::Success);
            r.processed_at += Duration::minutes(i);
            upsert_decision(&pool, &r).await.unwrap();
        }

        let failures = recent_decisions_with_outcome(&pool, Outcome::Failure, 2)
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].card_id, "1:0");
        let unresolved = recent_decisions_with_outcome(&pool, Outcome::Unresolved, 2)
            .await
            .unwrap();
        assert!(unresolved.is_empty());
    }

    #[tokio::test]
    async fn records_survive_reopening_the_file() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/decisions.db");
        let path = path.to_string_lossy().to_string();
        {
            let pool = init_pool(&path).await.unwrap();
            run_migrations(&pool).await.unwrap();
            upsert_decision(&pool, &record("5:5", Outcome::Unresolved))
                .await
                .unwrap();
            pool.close().await;
        }
        let pool = init_pool(&path).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(has_processed(&pool, "5:5").await.unwrap());
        let stored = get_decision(&pool, "5:5").await.unwrap().unwrap();
        assert_eq!(stored.outcome, Outcome::Unresolved);
        assert_eq!(stored.button.as_deref(), Some("👍"));
    }

    #[tokio::test]
    async fn concurrent_upserts_leave_one_row() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("race.db").to_string_lossy().to_string();
        let pool = init_pool(&path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let mut handles = Vec::new();
        for outcome in [Outcome::Success, Outcome::Failure, Outcome::Success] {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                upsert_decision(&pool, &record("7:7", outcome)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(count_decisions(&pool).await.unwrap(), 1);
    }
}
