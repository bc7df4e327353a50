//! Keyword classification of profile text.
//!
//! Matching is plain substring containment over lower-cased, whitespace
//! collapsed text, so operator-curated lists work across Latin and Cyrillic
//! without tokenization. Exclusions are checked before inclusions and always
//! win.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::Decision;

static DELIMITERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;\n]+").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-z0-9']+|[а-яё]+").expect("valid regex"));

const NEGATION_WORDS: &[&str] = &[
    "no", "not", "never", "without", "dont", "don't", "doesnt", "doesn't", "wont", "won't", "не",
    "нет", "без", "никогда", "ни",
];
const NEGATION_WINDOW: usize = 3;
const MAX_REASON_KEYWORDS: usize = 5;

/// Lower-case, trim and collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    WHITESPACE
        .replace_all(&text.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Split a comma/semicolon/newline separated list into normalized,
/// de-duplicated keywords, keeping first-seen order.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in DELIMITERS.split(raw) {
        let kw = normalize(part);
        if !kw.is_empty() && !out.contains(&kw) {
            out.push(kw);
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordSet {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            include: normalize_all(include),
            exclude: normalize_all(exclude),
        }
    }

    pub fn from_raw(include: &str, exclude: &str) -> Self {
        Self {
            include: parse_keywords(include),
            exclude: parse_keywords(exclude),
        }
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }
}

fn normalize_all<I>(items: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let kw = normalize(item.as_ref());
        if !kw.is_empty() && !out.contains(&kw) {
            out.push(kw);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncludeMode {
    #[default]
    Any,
    All,
}

impl IncludeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "any" => Some(IncludeMode::Any),
            "all" => Some(IncludeMode::All),
            _ => None,
        }
    }
}

/// Result of evaluating a text against [`FilterRules`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: String,
    pub matched_include: Vec<String>,
    pub matched_exclude: Vec<String>,
}

impl Verdict {
    fn new(decision: Decision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            matched_include: Vec::new(),
            matched_exclude: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.decision == Decision::Accept
    }
}

/// Keyword set plus the knobs that shape how it is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub keywords: KeywordSet,
    pub include_mode: IncludeMode,
    /// Minimum normalized length in characters; 0 disables the check.
    pub min_text_len: usize,
    /// Ignore exclude hits preceded by a nearby negation ("no smoking").
    pub exclude_negation: bool,
}

impl FilterRules {
    pub fn plain(keywords: KeywordSet) -> Self {
        Self {
            keywords,
            ..Default::default()
        }
    }

    pub fn evaluate(&self, text: &str) -> Verdict {
        self.evaluate_with(&self.keywords, text)
    }

    /// Evaluate with these knobs but a different keyword set.
    pub fn evaluate_with(&self, keywords: &KeywordSet, text: &str) -> Verdict {
        let normalized = normalize(text);
        if self.min_text_len > 0 && normalized.chars().count() < self.min_text_len {
            return Verdict::new(Decision::Skip, "too_short");
        }

        let mut matched_exclude = find_matches(&normalized, &keywords.exclude);
        if !matched_exclude.is_empty() {
            let effective: Vec<String> = if self.exclude_negation {
                let tokens = tokenize(&normalized);
                matched_exclude
                    .iter()
                    .filter(|kw| !is_negated(&normalized, kw, &tokens))
                    .cloned()
                    .collect()
            } else {
                matched_exclude.clone()
            };
            if !effective.is_empty() {
                let shown: Vec<&str> = effective
                    .iter()
                    .take(MAX_REASON_KEYWORDS)
                    .map(String::as_str)
                    .collect();
                let mut verdict =
                    Verdict::new(Decision::Skip, format!("exclude:{}", shown.join(",")));
                verdict.matched_exclude = effective;
                return verdict;
            }
        }

        if keywords.include.is_empty() {
            let mut verdict = Verdict::new(Decision::Accept, "no_includes");
            verdict.matched_exclude = std::mem::take(&mut matched_exclude);
            return verdict;
        }

        let matched_include = find_matches(&normalized, &keywords.include);
        let ok = match self.include_mode {
            IncludeMode::Any => !matched_include.is_empty(),
            IncludeMode::All => matched_include.len() == keywords.include.len(),
        };
        let mut verdict = if ok {
            Verdict::new(Decision::Accept, "include_match")
        } else {
            Verdict::new(Decision::Skip, "no_include")
        };
        verdict.matched_include = matched_include;
        verdict.matched_exclude = matched_exclude;
        verdict
    }
}

/// Pass/fail classification with default rules: exclusion first, then
/// at least one include (or no includes at all).
pub fn classify(text: &str, keywords: &KeywordSet) -> bool {
    FilterRules::default().evaluate_with(keywords, text).passed()
}

fn find_matches(text: &str, keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .filter(|kw| text.contains(kw.as_str()))
        .cloned()
        .collect()
}

fn tokenize(text: &str) -> Vec<(&str, usize, usize)> {
    WORD
        .find_iter(text)
        .map(|m| (m.as_str(), m.start(), m.end()))
        .collect()
}

fn is_negated(text: &str, keyword: &str, tokens: &[(&str, usize, usize)]) -> bool {
    if keyword.is_empty() {
        return false;
    }
    for (start, _) in text.match_indices(keyword) {
        // first token overlapping the hit, or the one right after it
        let Some(first) = tokens.iter().position(|&(_, _, tend)| tend > start) else {
            continue;
        };
        let window_start = first.saturating_sub(NEGATION_WINDOW);
        if tokens[window_start..first]
            .iter()
            .any(|(tok, _, _)| NEGATION_WORDS.contains(tok))
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(include: &[&str], exclude: &[&str]) -> KeywordSet {
        KeywordSet::new(include.iter(), exclude.iter())
    }

    #[test]
    fn parse_keywords_splits_on_all_delimiters() {
        let kws = parse_keywords(" Спорт, music;;Travel\n\nспорт ,  ");
        assert_eq!(kws, vec!["спорт", "music", "travel"]);
        assert!(parse_keywords("").is_empty());
        assert!(parse_keywords(" ,;\n").is_empty());
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let k = set(&["sport"], &["nsfw"]);
        assert!(!classify("Sport lover, NSFW inside", &k));
        assert!(classify("sport lover", &k));
    }

    #[test]
    fn empty_include_passes_everything_not_excluded() {
        let k = set(&[], &["nsfw"]);
        assert!(classify("anything at all", &k));
        assert!(classify("", &k));
        assert!(!classify("looking for NSFW content", &k));
        assert!(classify("", &KeywordSet::default()));
    }

    #[test]
    fn empty_text_fails_when_includes_configured() {
        assert!(!classify("", &set(&["спорт"], &[])));
        assert!(!classify("   ", &set(&["спорт"], &[])));
    }

    #[test]
    fn matching_is_case_insensitive_substring_across_scripts() {
        let k = set(&["СПОРТ", "Hiking"], &[]);
        assert!(classify("Москва, 25 лет, люблю спортзал", &k));
        assert!(classify("weekend HIKINGS", &k));
        assert!(!classify("reading books", &k));
    }

    #[test]
    fn keywords_are_normalized_on_construction() {
        let k = set(&["  Big   City ", "", "big city"], &[]);
        assert_eq!(k.include(), &["big city".to_string()]);
        assert!(classify("I love the BIG\n city life", &k));
    }

    #[test]
    fn include_mode_all_requires_every_keyword() {
        let rules = FilterRules {
            keywords: set(&["sport", "music"], &[]),
            include_mode: IncludeMode::All,
            ..Default::default()
        };
        assert_eq!(rules.evaluate("sport and music").decision, Decision::Accept);
        let v = rules.evaluate("sport only");
        assert_eq!(v.decision, Decision::Skip);
        assert_eq!(v.reason, "no_include");
        assert_eq!(v.matched_include, vec!["sport"]);
    }

    #[test]
    fn evaluate_with_uses_given_keywords_and_own_knobs() {
        let rules = FilterRules {
            keywords: set(&["cats"], &[]),
            include_mode: IncludeMode::All,
            ..Default::default()
        };
        let other = set(&["sport", "music"], &["smoke"]);
        let v = rules.evaluate_with(&other, "sport only, no cats");
        assert_eq!(v.decision, Decision::Skip);
        assert_eq!(v.matched_include, vec!["sport"]);
        assert_eq!(
            rules.evaluate_with(&other, "sport and music").decision,
            Decision::Accept
        );
        assert!(!rules.evaluate_with(&other, "sport, music, smoke").passed());
        assert!(classify("i like music", &other));
        assert!(!classify("music and smoke", &other));
    }

    #[test]
    fn min_text_len_counts_characters() {
        let rules = FilterRules {
            min_text_len: 5,
            ..Default::default()
        };
        assert_eq!(rules.evaluate("тест").reason, "too_short");
        assert_eq!(rules.evaluate("тесты").decision, Decision::Accept);
    }

    #[test]
    fn verdict_reports_reasons_and_matches() {
        let rules = FilterRules::plain(set(&["спорт"], &["курю", "smoke"]));
        let v = rules.evaluate("Люблю спорт, курю иногда, smoke");
        assert_eq!(v.decision, Decision::Skip);
        assert_eq!(v.reason, "exclude:курю,smoke");
        assert_eq!(v.matched_exclude, vec!["курю", "smoke"]);

        let v = rules.evaluate("люблю спорт");
        assert_eq!(v.reason, "include_match");
        assert_eq!(v.matched_include, vec!["спорт"]);

        let v = FilterRules::default().evaluate("whatever");
        assert_eq!(v.reason, "no_includes");
    }

    #[test]
    fn negation_only_applies_when_enabled() {
        let keywords = set(&[], &["smoking", "алкоголь"]);
        let strict = FilterRules::plain(keywords.clone());
        assert!(!strict.evaluate("no smoking please").passed());

        let lenient = FilterRules {
            keywords,
            exclude_negation: true,
            ..Default::default()
        };
        assert!(lenient.evaluate("no smoking please").passed());
        assert!(lenient.evaluate("не пью алкоголь").passed());
        assert!(!lenient.evaluate("smoking is fine").passed());
        // negation too far away
        assert!(!lenient
            .evaluate("no pets, cats dogs birds, smoking ok")
            .passed());
    }

    #[test]
    fn negation_checks_every_occurrence() {
        let lenient = FilterRules {
            keywords: set(&[], &["smoking"]),
            exclude_negation: true,
            ..Default::default()
        };
        assert!(lenient.evaluate("smoking? never smoking").passed());
    }

    #[test]
    fn include_mode_parse() {
        assert_eq!(IncludeMode::parse(" ALL "), Some(IncludeMode::All));
        assert_eq!(IncludeMode::parse("any"), Some(IncludeMode::Any));
        assert_eq!(IncludeMode::parse("some"), None);
    }
}
