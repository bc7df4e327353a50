use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tg_cardfilter::assembler::CardAssembler;
use tg_cardfilter::bridge::BridgeClient;
use tg_cardfilter::config;
use tg_cardfilter::db::{self, SqliteDecisionStore};
use tg_cardfilter::logging;
use tg_cardfilter::processor::{no_reply, CardProcessor};
use tg_cardfilter::session::{self, Session};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Optional YAML config file; environment variables override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // no subscriber yet, so config errors go straight to stderr
    let cfg = match config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("invalid configuration: {}", err);
            return Err(err.into());
        }
    };
    logging::init(&cfg.app.log_level);

    let pool = db::init_pool(&cfg.app.db_path).await?;
    db::run_migrations(&pool).await?;
    info!(db_path = %cfg.app.db_path, "decision log ready");

    let bridge = Arc::new(BridgeClient::new(&cfg.bridge.url, &cfg.bridge.token)?);
    let processor = CardProcessor::new(
        cfg.policy(),
        Arc::new(SqliteDecisionStore::new(pool)),
        bridge.clone(),
    )
    // replace with a real generator to enable replies
    .with_dm_reply(no_reply());
    let assembler = CardAssembler::new(cfg.pending_ttl(), cfg.resume_hints());

    info!(target_bot = cfg.target_bot(), "starting card filter");
    session::auto_start(bridge.as_ref(), cfg.target_bot(), &cfg.start_sequence()).await;

    let session = Session::new(
        bridge.clone(),
        bridge,
        processor,
        assembler,
        cfg.target_bot(),
        cfg.poll_timeout(),
    );
    session
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    Ok(())
}
