//! Card pipeline: dedupe → classify → resolve button → press → log.
//!
//! Every card ends in exactly one of [`Disposition`]'s variants. Failures of a
//! single card are captured in its [`CardReport`]; nothing propagates out of
//! [`CardProcessor::process`], so the intake loop can keep going.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::buttons::{resolve, ButtonChoice, ButtonIndicators, ButtonLabels, Resolution};
use crate::db::DecisionStore;
use crate::keywords::FilterRules;
use crate::model::{Card, Decision, DecisionRecord, KeyboardKind, Outcome};
use crate::transport::Transport;

/// Composes an optional reply after a profile was accepted.
pub type DmReply = Arc<dyn Fn(&Card) -> anyhow::Result<Option<String>> + Send + Sync>;

pub fn no_reply() -> DmReply {
    Arc::new(|_card: &Card| -> anyhow::Result<Option<String>> { Ok(None) })
}

/// Decision settings, built once at startup.
#[derive(Debug, Clone)]
pub struct Policy {
    pub rules: FilterRules,
    pub labels: ButtonLabels,
    pub indicators: ButtonIndicators,
    pub source_bot: String,
    pub press_delay: Duration,
    pub action_timeout: Duration,
    /// Follow each press with the numeric shortcut ("2" like, "1" skip).
    pub dup_numeric: bool,
    pub dup_delay: Duration,
    pub enable_dm_reply: bool,
}

impl Policy {
    pub fn new(rules: FilterRules, source_bot: impl Into<String>) -> Self {
        Self {
            rules,
            labels: ButtonLabels::default(),
            indicators: ButtonIndicators::default(),
            source_bot: source_bot.into(),
            press_delay: Duration::ZERO,
            action_timeout: Duration::from_secs(10),
            dup_numeric: false,
            dup_delay: Duration::ZERO,
            enable_dm_reply: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport action failed: {0:#}")]
    TransportActionFailed(anyhow::Error),
    #[error("transport action timed out after {0:?}")]
    TransportTimeout(Duration),
    #[error("storage read failed: {0:#}")]
    StorageReadFailed(anyhow::Error),
    #[error("storage write failed: {0:#}")]
    StorageWriteFailed(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    ActionTaken {
        decision: Decision,
        choice: ButtonChoice,
        outcome: Outcome,
    },
    Unresolved {
        decision: Decision,
    },
    SkippedDuplicate,
    /// Dedupe lookup failed; nothing pressed or written so a redelivery retries.
    Deferred,
}

#[derive(Debug)]
pub struct CardReport {
    pub card_id: String,
    pub disposition: Disposition,
    /// Whether the decision record reached the store.
    pub logged: bool,
    pub errors: Vec<PipelineError>,
}

impl CardReport {
    fn new(card_id: &str, disposition: Disposition) -> Self {
        Self {
            card_id: card_id.to_string(),
            disposition,
            logged: false,
            errors: Vec::new(),
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match &self.disposition {
            Disposition::ActionTaken { outcome, .. } => Some(*outcome),
            Disposition::Unresolved { .. } => Some(Outcome::Unresolved),
            Disposition::SkippedDuplicate | Disposition::Deferred => None,
        }
    }
}

pub struct CardProcessor {
    policy: Policy,
    store: Arc<dyn DecisionStore>,
    transport: Arc<dyn Transport>,
    dm_reply: DmReply,
    in_flight: Mutex<HashSet<String>>,
}

impl CardProcessor {
    pub fn new(
        policy: Policy,
        store: Arc<dyn DecisionStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            policy,
            store,
            transport,
            dm_reply: no_reply(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_dm_reply(mut self, dm_reply: DmReply) -> Self {
        self.dm_reply = dm_reply;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[instrument(skip_all, fields(card_id = %card.card_id))]
    pub async fn process(&self, card: &Card) -> CardReport {
        if !self.in_flight.lock().await.insert(card.card_id.clone()) {
            info!("card already in flight; skipping duplicate delivery");
            return CardReport::new(&card.card_id, Disposition::SkippedDuplicate);
        }
        let report = self.process_claimed(card).await;
        self.in_flight.lock().await.remove(&card.card_id);
        report
    }

    async fn process_claimed(&self, card: &Card) -> CardReport {
        match self.store.has_processed(&card.card_id).await {
            Ok(true) => {
                info!("card already processed; skipping duplicate delivery");
                return CardReport::new(&card.card_id, Disposition::SkippedDuplicate);
            }
            Ok(false) => {}
            Err(err) => {
                error!(?err, "dedupe lookup failed; deferring card");
                let mut report = CardReport::new(&card.card_id, Disposition::Deferred);
                report.errors.push(PipelineError::StorageReadFailed(err));
                return report;
            }
        }

        let verdict = self.policy.rules.evaluate(&card.text);
        debug!(
            decision = verdict.decision.as_str(),
            reason = %verdict.reason,
            "card classified"
        );

        let mut errors = Vec::new();
        let resolution = resolve(
            verdict.decision,
            &card.buttons,
            &self.policy.labels,
            &self.policy.indicators,
        );
        let disposition = match resolution {
            Resolution::Resolved(choice) => {
                let outcome = self
                    .press(card, &choice, verdict.decision, &mut errors)
                    .await;
                Disposition::ActionTaken {
                    decision: verdict.decision,
                    choice,
                    outcome,
                }
            }
            Resolution::Unresolved => {
                warn!(
                    decision = verdict.decision.as_str(),
                    buttons = ?card.buttons,
                    "no matching button"
                );
                Disposition::Unresolved {
                    decision: verdict.decision,
                }
            }
        };

        let outcome = match &disposition {
            Disposition::ActionTaken { outcome, .. } => *outcome,
            _ => Outcome::Unresolved,
        };
        let button = match &disposition {
            Disposition::ActionTaken { choice, .. } => Some(choice.label.clone()),
            _ => None,
        };
        let record = DecisionRecord {
            card_id: card.card_id.clone(),
            decision: verdict.decision,
            outcome,
            reason: verdict.reason,
            matched_include: verdict.matched_include,
            matched_exclude: verdict.matched_exclude,
            button,
            source_bot: self.policy.source_bot.clone(),
            text: card.text.clone(),
            processed_at: Utc::now(),
        };
        let logged = match self.store.record(&record).await {
            Ok(()) => true,
            Err(err) => {
                error!(?err, "failed to log decision");
                errors.push(PipelineError::StorageWriteFailed(err));
                false
            }
        };
        info!(
            decision = record.decision.as_str(),
            outcome = outcome.as_str(),
            reason = %record.reason,
            logged,
            "card handled"
        );

        if outcome == Outcome::Success
            && record.decision == Decision::Accept
            && self.policy.enable_dm_reply
        {
            self.spawn_dm_reply(card);
        }

        CardReport {
            card_id: card.card_id.clone(),
            disposition,
            logged,
            errors,
        }
    }

    async fn press(
        &self,
        card: &Card,
        choice: &ButtonChoice,
        decision: Decision,
        errors: &mut Vec<PipelineError>,
    ) -> Outcome {
        let Some(target) = card.press_target(choice.index) else {
            errors.push(PipelineError::TransportActionFailed(anyhow::anyhow!(
                "button index {} out of range",
                choice.index
            )));
            return Outcome::Failure;
        };
        if !self.policy.press_delay.is_zero() {
            tokio::time::sleep(self.policy.press_delay).await;
        }

        let timeout = self.policy.action_timeout;
        match tokio::time::timeout(timeout, self.transport.press(&target)).await {
            Ok(Ok(())) => {
                debug!(index = choice.index, label = %choice.label, "button pressed");
            }
            Ok(Err(err)) if target.kind == KeyboardKind::Inline => {
                warn!(?err, label = %choice.label, "inline click failed; sending label instead");
                if let Err(fallback) = self.send_label(card, &choice.label).await {
                    warn!(err = %fallback, "label fallback failed");
                    errors.push(fallback);
                    return Outcome::Failure;
                }
            }
            Ok(Err(err)) => {
                warn!(?err, label = %choice.label, "button press failed");
                errors.push(PipelineError::TransportActionFailed(err));
                return Outcome::Failure;
            }
            Err(_) => {
                warn!(?timeout, label = %choice.label, "button press timed out");
                errors.push(PipelineError::TransportTimeout(timeout));
                return Outcome::Failure;
            }
        }

        if self.policy.dup_numeric {
            if !self.policy.dup_delay.is_zero() {
                tokio::time::sleep(self.policy.dup_delay).await;
            }
            let digit = match decision {
                Decision::Accept => "2",
                Decision::Skip => "1",
            };
            let peer = card.chat_id.to_string();
            match tokio::time::timeout(timeout, self.transport.send_text(&peer, digit)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(?err, "numeric duplicate failed"),
                Err(_) => warn!("numeric duplicate timed out"),
            }
        }
        Outcome::Success
    }

    async fn send_label(&self, card: &Card, label: &str) -> Result<(), PipelineError> {
        let timeout = self.policy.action_timeout;
        let peer = card.chat_id.to_string();
        match tokio::time::timeout(timeout, self.transport.send_text(&peer, label)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(PipelineError::TransportActionFailed(err)),
            Err(_) => Err(PipelineError::TransportTimeout(timeout)),
        }
    }

    fn spawn_dm_reply(&self, card: &Card) {
        let text = match (self.dm_reply)(card) {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => return,
            Err(err) => {
                warn!(?err, "dm reply generation failed");
                return;
            }
        };
        let transport = Arc::clone(&self.transport);
        let peer = card.chat_id.to_string();
        let timeout = self.policy.action_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, transport.send_text(&peer, &text)).await {
                Ok(Ok(())) => info!(%peer, "dm reply sent"),
                Ok(Err(err)) => warn!(?err, %peer, "dm reply failed"),
                Err(_) => warn!(%peer, "dm reply timed out"),
            }
        });
    }
}
