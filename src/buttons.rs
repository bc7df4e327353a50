//! Mapping a decision onto one of the buttons attached to a card.
//!
//! Precedence: configured exact label, then indicator substrings that point
//! at one decision only, then a
//! positional convention for 2- and 3-button layouts (negative action first,
//! positive action last, a middle button is never chosen).

use crate::keywords::normalize;
use crate::model::Decision;

const HEART_EMOJIS: &[&str] = &[
    "❤", "❤️", "♥", "💖", "💘", "💗", "💞", "💓", "💙", "💚", "💛", "🧡", "💜", "🖤", "🤍", "🤎",
];
const LIKE_WORDS: &[&str] = &[
    "like", "invite", "match", "heart", "yes", "👍", "да", "лайк", "приглас", "серд",
];
const SKIP_WORDS: &[&str] = &[
    "skip", "dislike", "next", "no", "pass", "👎", "далее", "пропуск", "нет", "след",
];
pub const DEFAULT_RESUME_HINTS: &[&str] = &["смотреть анкеты", "view profiles", "🚀"];

/// Operator-configured exact labels. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonLabels {
    pub like: String,
    pub skip: String,
}

impl ButtonLabels {
    pub fn for_decision(&self, decision: Decision) -> Option<&str> {
        let label = match decision {
            Decision::Accept => self.like.trim(),
            Decision::Skip => self.skip.trim(),
        };
        (!label.is_empty()).then_some(label)
    }
}

/// Indicator substrings per decision, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonIndicators {
    like: Vec<String>,
    skip: Vec<String>,
}

impl Default for ButtonIndicators {
    fn default() -> Self {
        let like = HEART_EMOJIS.iter().chain(LIKE_WORDS.iter());
        Self::new(like, SKIP_WORDS.iter())
    }
}

impl ButtonIndicators {
    pub fn new<L, S>(like: L, skip: S) -> Self
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let clean = |items: Vec<String>| -> Vec<String> {
            items
                .into_iter()
                .map(|s| normalize(&s))
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            like: clean(like.into_iter().map(|s| s.as_ref().to_string()).collect()),
            skip: clean(skip.into_iter().map(|s| s.as_ref().to_string()).collect()),
        }
    }

    pub fn for_decision(&self, decision: Decision) -> &[String] {
        match decision {
            Decision::Accept => &self.like,
            Decision::Skip => &self.skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonChoice {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ButtonChoice),
    Unresolved,
}

impl Resolution {
    pub fn choice(&self) -> Option<&ButtonChoice> {
        match self {
            Resolution::Resolved(choice) => Some(choice),
            Resolution::Unresolved => None,
        }
    }
}

pub fn resolve(
    decision: Decision,
    buttons: &[String],
    labels: &ButtonLabels,
    indicators: &ButtonIndicators,
) -> Resolution {
    let pick = |index: usize| {
        Resolution::Resolved(ButtonChoice {
            index,
            label: buttons[index].clone(),
        })
    };

    if let Some(wanted) = labels.for_decision(decision) {
        let wanted = wanted.to_lowercase();
        if let Some(i) = buttons
            .iter()
            .position(|b| b.trim().to_lowercase() == wanted)
        {
            return pick(i);
        }
    }

    // a label hinting at both decisions ("Dislike") counts for neither
    let hints = indicators.for_decision(decision);
    let opposing = indicators.for_decision(decision.opposite());
    if !hints.is_empty() {
        if let Some(i) = buttons.iter().position(|b| {
            let lowered = b.to_lowercase();
            mentions_any(&lowered, hints) && !mentions_any(&lowered, opposing)
        }) {
            return pick(i);
        }
    }

    match (buttons.len(), decision) {
        (2 | 3, Decision::Skip) => pick(0),
        (n @ (2 | 3), Decision::Accept) => pick(n - 1),
        _ => Resolution::Unresolved,
    }
}

fn mentions_any(label: &str, hints: &[String]) -> bool {
    hints.iter().any(|h| label.contains(h.as_str()))
}

/// Index of the first button that resumes profile browsing.
pub fn resume_button<S: AsRef<str>>(buttons: &[S], hints: &[String]) -> Option<usize> {
    buttons.iter().position(|b| {
        let lowered = b.as_ref().trim().to_lowercase();
        hints.iter().any(|h| lowered.contains(h.as_str()))
    })
}
