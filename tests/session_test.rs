use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tg_cardfilter::assembler::CardAssembler;
use tg_cardfilter::db::{self, SqliteDecisionStore};
use tg_cardfilter::keywords::{FilterRules, KeywordSet};
use tg_cardfilter::model::{
    IncomingButton, IncomingMessage, IncomingUpdate, KeyboardKind, Outcome, PressTarget,
};
use tg_cardfilter::processor::{CardProcessor, Disposition, Policy};
use tg_cardfilter::session::{self, Session, StartSequence};
use tg_cardfilter::transport::{Transport, UpdateSource};
use tokio::sync::Mutex;

#[derive(Default)]
struct ScriptedSource {
    batches: Mutex<VecDeque<Result<Vec<IncomingUpdate>>>>,
    offsets: Mutex<Vec<i64>>,
}

impl ScriptedSource {
    fn new(batches: Vec<Result<Vec<IncomingUpdate>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            offsets: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl UpdateSource for ScriptedSource {
    async fn next_updates(&self, offset: i64, _timeout: Duration) -> Result<Vec<IncomingUpdate>> {
        self.offsets.lock().await.push(offset);
        let next = self.batches.lock().await.pop_front();
        match next {
            Some(batch) => batch,
            None => {
                // long-poll with nothing pending
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Default)]
struct RecordingTransport {
    presses: Mutex<Vec<PressTarget>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: bool,
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn press(&self, target: &PressTarget) -> Result<()> {
        self.presses.lock().await.push(target.clone());
        Ok(())
    }

    async fn send_text(&self, peer: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((peer.to_string(), text.to_string()));
        if self.fail_sends {
            return Err(anyhow!("PEER_FLOOD"));
        }
        Ok(())
    }
}

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn message(
    user: &str,
    message_id: i64,
    text: &str,
    buttons: &[&str],
    kind: KeyboardKind,
) -> IncomingMessage {
    IncomingMessage {
        chat_id: 777,
        chat_username: Some(user.to_string()),
        message_id,
        text: text.to_string(),
        buttons: buttons
            .iter()
            .map(|b| IncomingButton {
                label: b.to_string(),
                kind,
            })
            .collect(),
    }
}

fn update(update_id: i64, message: IncomingMessage) -> IncomingUpdate {
    IncomingUpdate {
        update_id,
        edited: false,
        message,
    }
}

fn build_session(
    pool: &sqlx::SqlitePool,
    source: Arc<ScriptedSource>,
    transport: Arc<RecordingTransport>,
    exclude: &[&str],
) -> Session {
    let rules = FilterRules::plain(KeywordSet::new(Vec::<String>::new(), exclude.iter()));
    let processor = CardProcessor::new(
        Policy::new(rules, "leomatchbot"),
        Arc::new(SqliteDecisionStore::new(pool.clone())),
        transport.clone(),
    );
    let assembler = CardAssembler::new(
        Duration::from_secs(60),
        vec!["смотреть анкеты".to_string(), "🚀".to_string()],
    );
    Session::new(
        source,
        transport,
        processor,
        assembler,
        "@LeoMatchBot",
        Duration::from_secs(1),
    )
}

#[tokio::test]
async fn only_target_bot_messages_become_cards() {
    let pool = setup_pool().await;
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![
        update(
            5,
            message("someone_else", 1, "hi there", &["👎", "👍"], KeyboardKind::Inline),
        ),
        update(
            6,
            message("leomatchbot", 2, "Анна, 24", &["👎", "👍"], KeyboardKind::Inline),
        ),
    ])]));
    let transport = Arc::new(RecordingTransport::default());
    let mut s = build_session(&pool, source.clone(), transport.clone(), &[]);

    assert_eq!(s.poll_once().await.unwrap(), 2);
    assert_eq!(s.offset(), 7);

    let presses = transport.presses.lock().await;
    assert_eq!(presses.len(), 1);
    assert_eq!(presses[0].message_id, 2);
    assert_eq!(presses[0].index, 1);
    assert_eq!(db::count_decisions(&pool).await.unwrap(), 1);

    drop(presses);
    s.poll_once().await.unwrap();
    assert_eq!(*source.offsets.lock().await, vec![0, 7]);
}

#[tokio::test]
async fn split_profile_is_stitched_before_pressing() {
    let pool = setup_pool().await;
    let source = Arc::new(ScriptedSource::default());
    let transport = Arc::new(RecordingTransport::default());
    let mut s = build_session(&pool, source, transport.clone(), &["курю"]);

    let text_only = update(
        1,
        message("leomatchbot", 10, "Иван, 30, курю", &[], KeyboardKind::Inline),
    );
    assert!(s.handle_update(&text_only).await.is_none());

    let keyboard = update(
        2,
        message("leomatchbot", 11, "", &["👎", "👍"], KeyboardKind::Inline),
    );
    let report = s.handle_update(&keyboard).await.unwrap();
    assert_eq!(report.card_id, "777:10");
    assert_eq!(report.outcome(), Some(Outcome::Success));

    let presses = transport.presses.lock().await;
    assert_eq!(presses.len(), 1);
    assert_eq!(presses[0].message_id, 11);
    assert_eq!(presses[0].label, "👎");
}

#[tokio::test]
async fn edited_redelivery_is_deduplicated() {
    let pool = setup_pool().await;
    let source = Arc::new(ScriptedSource::default());
    let transport = Arc::new(RecordingTransport::default());
    let mut s = build_session(&pool, source, transport.clone(), &[]);

    let original = update(
        1,
        message("leomatchbot", 3, "Оля", &["👎", "👍"], KeyboardKind::Inline),
    );
    let mut edited = update(2, original.message.clone());
    edited.edited = true;

    s.handle_update(&original).await.unwrap();
    let report = s.handle_update(&edited).await.unwrap();
    assert_eq!(report.disposition, Disposition::SkippedDuplicate);
    assert_eq!(transport.presses.lock().await.len(), 1);
}

#[tokio::test]
async fn resume_prompt_is_pressed_without_logging() {
    let pool = setup_pool().await;
    let source = Arc::new(ScriptedSource::default());
    let transport = Arc::new(RecordingTransport::default());
    let mut s = build_session(&pool, source, transport.clone(), &[]);

    let prompt = update(
        1,
        message(
            "leomatchbot",
            4,
            "Нет новых анкет",
            &["🚀 Смотреть анкеты", "Мой профиль"],
            KeyboardKind::Reply,
        ),
    );
    assert!(s.handle_update(&prompt).await.is_none());

    let presses = transport.presses.lock().await;
    assert_eq!(presses.len(), 1);
    assert_eq!(presses[0].label, "🚀 Смотреть анкеты");
    assert_eq!(presses[0].kind, KeyboardKind::Reply);
    assert_eq!(db::count_decisions(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn poll_errors_surface_from_poll_once() {
    let pool = setup_pool().await;
    let source = Arc::new(ScriptedSource::new(vec![Err(anyhow!("bridge unreachable"))]));
    let transport = Arc::new(RecordingTransport::default());
    let mut s = build_session(&pool, source, transport, &[]);

    assert!(s.poll_once().await.is_err());
    assert_eq!(s.offset(), 0);
}

#[tokio::test]
async fn run_until_stops_on_shutdown() {
    let pool = setup_pool().await;
    let source = Arc::new(ScriptedSource::default());
    let transport = Arc::new(RecordingTransport::default());
    let s = build_session(&pool, source, transport, &[]);

    tokio::time::timeout(
        Duration::from_secs(5),
        s.run_until(tokio::time::sleep(Duration::from_millis(20))),
    )
    .await
    .unwrap();
}

fn start_sequence(enabled: bool) -> StartSequence {
    StartSequence {
        enabled,
        start_text: "/start".into(),
        click_text: "1".into(),
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn auto_start_sends_start_then_click() {
    let transport = RecordingTransport::default();
    session::auto_start(&transport, "leomatchbot", &start_sequence(true)).await;
    assert_eq!(
        *transport.sent.lock().await,
        vec![
            ("leomatchbot".to_string(), "/start".to_string()),
            ("leomatchbot".to_string(), "1".to_string())
        ]
    );
}

#[tokio::test]
async fn auto_start_disabled_or_failing_is_harmless() {
    let transport = RecordingTransport::default();
    session::auto_start(&transport, "leomatchbot", &start_sequence(false)).await;
    assert!(transport.sent.lock().await.is_empty());

    let failing = RecordingTransport {
        fail_sends: true,
        ..Default::default()
    };
    session::auto_start(&failing, "leomatchbot", &start_sequence(true)).await;
    assert_eq!(failing.sent.lock().await.len(), 2);
}
