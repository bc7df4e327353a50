use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accept/skip verdict for a single profile card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Skip,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Skip => "skip",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Decision::Accept => Decision::Skip,
            Decision::Skip => Decision::Accept,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accept" => Some(Decision::Accept),
            "skip" => Some(Decision::Skip),
            _ => None,
        }
    }
}

/// What happened after a decision was made.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Unresolved,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Unresolved => "unresolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Outcome::Success),
            "failure" => Some(Outcome::Failure),
            "unresolved" => Some(Outcome::Unresolved),
            _ => None,
        }
    }
}

/// Inline keyboards are attached to a message and clicked in place; reply
/// keyboards persist in the chat and are "pressed" by sending the label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardKind {
    Inline,
    #[default]
    Reply,
}

impl KeyboardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyboardKind::Inline => "inline",
            KeyboardKind::Reply => "reply",
        }
    }
}

/// A single button as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingButton {
    pub label: String,
    #[serde(default)]
    pub kind: KeyboardKind,
}

/// Raw message from the chat transport, before card assembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    #[serde(default)]
    pub chat_username: Option<String>,
    pub message_id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub buttons: Vec<IncomingButton>,
}

/// Envelope delivered by the update source; `update_id` is monotonic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub edited: bool,
    pub message: IncomingMessage,
}

/// One profile awaiting an accept/skip decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub card_id: String,
    pub chat_id: i64,
    /// Message whose keyboard gets pressed; may differ from the message that
    /// carried the profile text.
    pub message_id: i64,
    pub text: String,
    pub buttons: Vec<String>,
    pub keyboard: KeyboardKind,
}

impl Card {
    pub fn card_id_for(chat_id: i64, message_id: i64) -> String {
        format!("{}:{}", chat_id, message_id)
    }

    pub fn press_target(&self, index: usize) -> Option<PressTarget> {
        let label = self.buttons.get(index)?;
        Some(PressTarget {
            chat_id: self.chat_id,
            message_id: self.message_id,
            index,
            label: label.clone(),
            kind: self.keyboard,
        })
    }
}

/// A concrete button press handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PressTarget {
    pub chat_id: i64,
    pub message_id: i64,
    pub index: usize,
    pub label: String,
    pub kind: KeyboardKind,
}

/// Persisted row of the `decisions` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub card_id: String,
    pub decision: Decision,
    pub outcome: Outcome,
    pub reason: String,
    pub matched_include: Vec<String>,
    pub matched_exclude: Vec<String>,
    pub button: Option<String>,
    pub source_bot: String,
    pub text: String,
    pub processed_at: DateTime<Utc>,
}
