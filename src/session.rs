//! Intake loop: poll the update source, assemble cards from the target bot's
//! messages and feed them to the processor one at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::assembler::{CardAssembler, Intake};
use crate::model::{IncomingMessage, IncomingUpdate};
use crate::processor::{CardProcessor, CardReport};
use crate::transport::{Transport, UpdateSource};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Messages sent to the target bot right after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct StartSequence {
    pub enabled: bool,
    pub start_text: String,
    pub click_text: String,
    pub delay: Duration,
}

/// Kick the target bot into showing profiles. Send failures are logged only.
pub async fn auto_start(transport: &dyn Transport, target_bot: &str, start: &StartSequence) {
    if !start.enabled {
        return;
    }
    for text in [start.start_text.trim(), start.click_text.trim()] {
        if text.is_empty() {
            continue;
        }
        tokio::time::sleep(start.delay).await;
        info!(target_bot, text, "auto-start");
        if let Err(err) = transport.send_text(target_bot, text).await {
            warn!(?err, text, "auto-start message failed");
        }
    }
}

pub struct Session {
    source: Arc<dyn UpdateSource>,
    transport: Arc<dyn Transport>,
    processor: CardProcessor,
    assembler: CardAssembler,
    target_bot: String,
    poll_timeout: Duration,
    offset: i64,
}

impl Session {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        transport: Arc<dyn Transport>,
        processor: CardProcessor,
        assembler: CardAssembler,
        target_bot: &str,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            transport,
            processor,
            assembler,
            target_bot: target_bot.trim().trim_start_matches('@').to_string(),
            poll_timeout,
            offset: 0,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    fn is_target(&self, msg: &IncomingMessage) -> bool {
        msg.chat_username
            .as_deref()
            .map(|u| u.trim_start_matches('@').eq_ignore_ascii_case(&self.target_bot))
            .unwrap_or(false)
    }

    /// Handle one update; returns the processor report when it produced a card.
    pub async fn handle_update(&mut self, update: &IncomingUpdate) -> Option<CardReport> {
        self.offset = self.offset.max(update.update_id + 1);
        let msg = &update.message;
        if !self.is_target(msg) {
            debug!(chat_id = msg.chat_id, "ignoring message from other chat");
            return None;
        }
        if update.edited {
            // redelivered edits are deduped by card id downstream
            debug!(message_id = msg.message_id, "edited message from target bot");
        }

        match self.assembler.ingest(msg, Instant::now()) {
            Intake::Card(card) => Some(self.processor.process(&card).await),
            Intake::Resume(target) => {
                info!(label = %target.label, "resuming profile browsing");
                let timeout = self.processor.policy().action_timeout;
                match tokio::time::timeout(timeout, self.transport.press(&target)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(?err, "resume press failed"),
                    Err(_) => warn!("resume press timed out"),
                }
                None
            }
            Intake::Pending | Intake::Ignored => None,
        }
    }

    /// Fetch one batch of updates and handle them in arrival order.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let updates = self
            .source
            .next_updates(self.offset, self.poll_timeout)
            .await?;
        let count = updates.len();
        for update in &updates {
            self.handle_update(update).await;
        }
        Ok(count)
    }

    /// Run until `shutdown` resolves. Poll errors back off and retry.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(target_bot = %self.target_bot, "listening for profile cards");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
                res = self.poll_once() => {
                    if let Err(err) = res {
                        error!(?err, "polling updates failed");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
}
