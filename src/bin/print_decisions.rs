use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::to_string_pretty;

use tg_cardfilter::db;
use tg_cardfilter::model::{DecisionRecord, Outcome};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print the most recent card decisions for manual review"
)]
struct Args {
    /// Path to the decision database (defaults to $DB_PATH, then cardfilter.db)
    #[arg(long)]
    db: Option<String>,

    /// Number of records to print
    #[arg(long, default_value_t = 20)]
    limit: i64,

    /// Only show records with this outcome (success, failure, unresolved)
    #[arg(long)]
    outcome: Option<String>,

    /// Print JSON instead of one line per record
    #[arg(long)]
    json: bool,
}

fn print_line(r: &DecisionRecord) {
    let preview: String = r.text.chars().take(60).collect();
    println!(
        "{} [{}] {} -> {} ({}) btn={} | {}",
        r.processed_at.format("%Y-%m-%d %H:%M:%S"),
        r.card_id,
        r.decision.as_str(),
        r.outcome.as_str(),
        r.reason,
        r.button.as_deref().unwrap_or("-"),
        preview.replace('\n', " ")
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let db_path = args
        .db
        .or_else(|| std::env::var("DB_PATH").ok())
        .unwrap_or_else(|| "cardfilter.db".into());

    let pool = db::init_pool(&db_path).await?;
    db::run_migrations(&pool).await?;

    let total = db::count_decisions(&pool).await?;
    let records = match args.outcome.as_deref() {
        Some(raw) => {
            let outcome = Outcome::parse(raw.trim())
                .ok_or_else(|| anyhow!("unknown outcome {:?}", raw))?;
            db::recent_decisions_with_outcome(&pool, outcome, args.limit).await?
        }
        None => db::recent_decisions(&pool, args.limit).await?,
    };

    if args.json {
        println!("{}", to_string_pretty(&records)?);
    } else {
        println!("{} decisions logged, showing {}", total, records.len());
        for r in &records {
            print_line(r);
        }
    }
    Ok(())
}
