//! Turns raw chat messages into [`Card`]s.
//!
//! The target bot does not always deliver a profile as one message: the text
//! may arrive first and the keyboard a moment later, or a reply keyboard sent
//! once stays active for every following profile. The assembler keeps just
//! enough state to stitch those back together.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::buttons::resume_button;
use crate::model::{Card, IncomingMessage, KeyboardKind, PressTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intake {
    Card(Card),
    /// Target bot paused browsing; press this to continue.
    Resume(PressTarget),
    /// Text stored while waiting for its keyboard.
    Pending,
    Ignored,
}

#[derive(Debug, Clone)]
struct PendingProfile {
    message_id: i64,
    text: String,
    at: Instant,
}

#[derive(Debug)]
pub struct CardAssembler {
    pending_ttl: Duration,
    resume_hints: Vec<String>,
    pending: Option<PendingProfile>,
    last_keyboard: Option<(KeyboardKind, Vec<String>)>,
}

impl CardAssembler {
    pub fn new(pending_ttl: Duration, resume_hints: Vec<String>) -> Self {
        Self {
            pending_ttl,
            resume_hints,
            pending: None,
            last_keyboard: None,
        }
    }

    pub fn ingest(&mut self, msg: &IncomingMessage, now: Instant) -> Intake {
        let text = msg.text.trim();
        let labels: Vec<String> = msg
            .buttons
            .iter()
            .map(|b| b.label.clone())
            .filter(|l| !l.trim().is_empty())
            .collect();
        let has_text = !text.is_empty();
        let has_keyboard = !labels.is_empty();
        // a mixed keyboard is treated as inline so the transport clicks in place
        let kind = if msg.buttons.iter().any(|b| b.kind == KeyboardKind::Inline) {
            KeyboardKind::Inline
        } else {
            KeyboardKind::Reply
        };
        debug!(
            chat_id = msg.chat_id,
            message_id = msg.message_id,
            has_text,
            has_keyboard,
            "target message"
        );

        if has_keyboard {
            if let Some(index) = resume_button(&labels, &self.resume_hints) {
                return Intake::Resume(PressTarget {
                    chat_id: msg.chat_id,
                    message_id: msg.message_id,
                    index,
                    label: labels[index].clone(),
                    kind,
                });
            }
            self.last_keyboard = Some((kind, labels.clone()));
        }

        match (has_text, has_keyboard) {
            (true, true) => {
                self.pending = None;
                Intake::Card(Card {
                    card_id: Card::card_id_for(msg.chat_id, msg.message_id),
                    chat_id: msg.chat_id,
                    message_id: msg.message_id,
                    text: msg.text.clone(),
                    buttons: labels,
                    keyboard: kind,
                })
            }
            (true, false) => match &self.last_keyboard {
                Some((KeyboardKind::Reply, buttons)) => Intake::Card(Card {
                    card_id: Card::card_id_for(msg.chat_id, msg.message_id),
                    chat_id: msg.chat_id,
                    message_id: msg.message_id,
                    text: msg.text.clone(),
                    buttons: buttons.clone(),
                    keyboard: KeyboardKind::Reply,
                }),
                _ => {
                    self.pending = Some(PendingProfile {
                        message_id: msg.message_id,
                        text: msg.text.clone(),
                        at: now,
                    });
                    Intake::Pending
                }
            },
            (false, true) => match self.take_pending(now) {
                Some(pending) => Intake::Card(Card {
                    card_id: Card::card_id_for(msg.chat_id, pending.message_id),
                    chat_id: msg.chat_id,
                    message_id: msg.message_id,
                    text: pending.text,
                    buttons: labels,
                    keyboard: kind,
                }),
                None => Intake::Ignored,
            },
            (false, false) => Intake::Ignored,
        }
    }

    fn take_pending(&mut self, now: Instant) -> Option<PendingProfile> {
        let pending = self.pending.take()?;
        if now.saturating_duration_since(pending.at) > self.pending_ttl {
            debug!(message_id = pending.message_id, "pending profile expired");
            return None;
        }
        Some(pending)
    }
}
