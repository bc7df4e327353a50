//! Configuration loader and validator.
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables (`INCLUDE_KEYWORDS`, `BTN_LIKE`, `DB_PATH`, ...), so a
//! plain `.env`-style deployment works without any file at all.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::buttons::{ButtonIndicators, ButtonLabels, DEFAULT_RESUME_HINTS};
use crate::keywords::{parse_keywords, FilterRules, IncludeMode, KeywordSet};
use crate::processor::Policy;
use crate::session::StartSequence;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub bridge: Bridge,
    pub telegram: Telegram,
    pub filter: Filter,
    pub buttons: Buttons,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct App {
    pub db_path: String,
    pub log_level: String,
    pub enable_dm_reply: bool,
}

impl Default for App {
    fn default() -> Self {
        Self {
            db_path: "cardfilter.db".into(),
            log_level: "info".into(),
            enable_dm_reply: false,
        }
    }
}

/// Sidecar that owns the chat user session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Bridge {
    pub url: String,
    pub token: String,
    pub poll_timeout_secs: u64,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            poll_timeout_secs: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Telegram {
    pub target_bot: String,
    pub auto_start: bool,
    pub start_text: String,
    pub start_click_text: String,
    pub start_delay_secs: f64,
}

impl Default for Telegram {
    fn default() -> Self {
        Self {
            target_bot: String::new(),
            auto_start: true,
            start_text: "/start".into(),
            start_click_text: "🚀 Смотреть анкеты".into(),
            start_delay_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Filter {
    pub include_keywords: String,
    pub exclude_keywords: String,
    pub include_mode: IncludeMode,
    pub min_text_len: usize,
    pub exclude_negation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Buttons {
    pub like: String,
    pub skip: String,
    /// `None` keeps the built-in indicator lists.
    pub like_hints: Option<String>,
    pub skip_hints: Option<String>,
    pub resume_hints: Option<String>,
    pub press_delay_secs: f64,
    pub dup_numeric: bool,
    pub dup_delay_secs: f64,
    pub action_timeout_secs: f64,
    pub pending_ttl_secs: f64,
}

impl Default for Buttons {
    fn default() -> Self {
        Self {
            like: String::new(),
            skip: String::new(),
            like_hints: None,
            skip_hints: None,
            resume_hints: None,
            press_delay_secs: 0.3,
            dup_numeric: false,
            dup_delay_secs: 0.2,
            action_timeout_secs: 10.0,
            pending_ttl_secs: 30.0,
        }
    }
}

impl Config {
    /// Apply environment-style overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DB_PATH") {
            self.app.db_path = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.app.log_level = v;
        }
        if let Some(v) = lookup("ENABLE_DM_REPLY") {
            self.app.enable_dm_reply = parse_bool("ENABLE_DM_REPLY", &v)?;
        }

        if let Some(v) = lookup("BRIDGE_URL") {
            self.bridge.url = v;
        }
        if let Some(v) = lookup("BRIDGE_TOKEN") {
            self.bridge.token = v;
        }
        if let Some(v) = lookup("POLL_TIMEOUT") {
            self.bridge.poll_timeout_secs = parse_num("POLL_TIMEOUT", &v)?;
        }

        if let Some(v) = lookup("TARGET_BOT") {
            self.telegram.target_bot = v;
        }
        if let Some(v) = lookup("AUTO_START") {
            self.telegram.auto_start = parse_bool("AUTO_START", &v)?;
        }
        if let Some(v) = lookup("START_TEXT") {
            self.telegram.start_text = v;
        }
        if let Some(v) = lookup("START_CLICK_TEXT") {
            self.telegram.start_click_text = v;
        }
        if let Some(v) = lookup("START_DELAY") {
            self.telegram.start_delay_secs = parse_num("START_DELAY", &v)?;
        }

        if let Some(v) = lookup("INCLUDE_KEYWORDS") {
            self.filter.include_keywords = v;
        }
        if let Some(v) = lookup("EXCLUDE_KEYWORDS") {
            self.filter.exclude_keywords = v;
        }
        if let Some(v) = lookup("INCLUDE_MODE") {
            self.filter.include_mode = IncludeMode::parse(&v)
                .ok_or_else(|| invalid("INCLUDE_MODE", "expected `any` or `all`"))?;
        }
        if let Some(v) = lookup("MIN_TEXT_LEN") {
            self.filter.min_text_len = parse_num("MIN_TEXT_LEN", &v)?;
        }
        if let Some(v) = lookup("EXCLUDE_NEGATION") {
            self.filter.exclude_negation = parse_bool("EXCLUDE_NEGATION", &v)?;
        }

        if let Some(v) = lookup("BTN_LIKE") {
            self.buttons.like = v;
        }
        if let Some(v) = lookup("BTN_SKIP") {
            self.buttons.skip = v;
        }
        if let Some(v) = lookup("LIKE_HINTS") {
            self.buttons.like_hints = Some(v);
        }
        if let Some(v) = lookup("SKIP_HINTS") {
            self.buttons.skip_hints = Some(v);
        }
        if let Some(v) = lookup("RESUME_HINTS") {
            self.buttons.resume_hints = Some(v);
        }
        if let Some(v) = lookup("PRESS_DELAY") {
            self.buttons.press_delay_secs = parse_num("PRESS_DELAY", &v)?;
        }
        if let Some(v) = lookup("DUP_NUMERIC") {
            self.buttons.dup_numeric = parse_bool("DUP_NUMERIC", &v)?;
        }
        if let Some(v) = lookup("DUP_DELAY") {
            self.buttons.dup_delay_secs = parse_num("DUP_DELAY", &v)?;
        }
        if let Some(v) = lookup("ACTION_TIMEOUT") {
            self.buttons.action_timeout_secs = parse_num("ACTION_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("PENDING_TTL") {
            self.buttons.pending_ttl_secs = parse_num("PENDING_TTL", &v)?;
        }
        Ok(())
    }

    /// Target bot username without a leading `@`.
    pub fn target_bot(&self) -> &str {
        self.telegram.target_bot.trim().trim_start_matches('@')
    }

    pub fn filter_rules(&self) -> FilterRules {
        FilterRules {
            keywords: KeywordSet::from_raw(
                &self.filter.include_keywords,
                &self.filter.exclude_keywords,
            ),
            include_mode: self.filter.include_mode,
            min_text_len: self.filter.min_text_len,
            exclude_negation: self.filter.exclude_negation,
        }
    }

    pub fn button_indicators(&self) -> ButtonIndicators {
        let defaults = ButtonIndicators::default();
        let pick = |raw: &Option<String>, fallback: &[String]| match raw {
            Some(raw) => parse_keywords(raw),
            None => fallback.to_vec(),
        };
        let like = pick(
            &self.buttons.like_hints,
            defaults.for_decision(crate::model::Decision::Accept),
        );
        let skip = pick(
            &self.buttons.skip_hints,
            defaults.for_decision(crate::model::Decision::Skip),
        );
        ButtonIndicators::new(like, skip)
    }

    pub fn resume_hints(&self) -> Vec<String> {
        match &self.buttons.resume_hints {
            Some(raw) => parse_keywords(raw),
            None => DEFAULT_RESUME_HINTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.buttons.pending_ttl_secs)
    }

    pub fn start_sequence(&self) -> StartSequence {
        StartSequence {
            enabled: self.telegram.auto_start,
            start_text: self.telegram.start_text.clone(),
            click_text: self.telegram.start_click_text.clone(),
            delay: Duration::from_secs_f64(self.telegram.start_delay_secs),
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.poll_timeout_secs)
    }

    /// Immutable decision settings shared by every card.
    pub fn policy(&self) -> Policy {
        Policy {
            rules: self.filter_rules(),
            labels: ButtonLabels {
                like: self.buttons.like.clone(),
                skip: self.buttons.skip.clone(),
            },
            indicators: self.button_indicators(),
            source_bot: self.target_bot().to_string(),
            press_delay: Duration::from_secs_f64(self.buttons.press_delay_secs),
            action_timeout: Duration::from_secs_f64(self.buttons.action_timeout_secs),
            dup_numeric: self.buttons.dup_numeric,
            dup_delay: Duration::from_secs_f64(self.buttons.dup_delay_secs),
            enable_dm_reply: self.app.enable_dm_reply,
        }
    }
}

/// Load configuration from an optional YAML file, apply process environment
/// overrides and validate the result.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with(path, |key| std::env::var(key).ok())
}

pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        }
        None => Config::default(),
    };
    cfg.apply_env(lookup)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.target_bot().is_empty() {
        return Err(invalid("TARGET_BOT", "must be non-empty"));
    }
    if cfg.app.db_path.trim().is_empty() {
        return Err(invalid("DB_PATH", "must be non-empty"));
    }
    if cfg.bridge.url.trim().is_empty() {
        return Err(invalid("BRIDGE_URL", "must be non-empty"));
    }
    if reqwest::Url::parse(cfg.bridge.url.trim()).is_err() {
        return Err(invalid("BRIDGE_URL", "must be an absolute URL"));
    }
    if cfg.bridge.poll_timeout_secs == 0 {
        return Err(invalid("POLL_TIMEOUT", "must be > 0"));
    }

    let non_negative = [
        ("START_DELAY", cfg.telegram.start_delay_secs),
        ("PRESS_DELAY", cfg.buttons.press_delay_secs),
        ("DUP_DELAY", cfg.buttons.dup_delay_secs),
    ];
    for (key, value) in non_negative {
        if Duration::try_from_secs_f64(value).is_err() {
            return Err(invalid(key, "must be a non-negative number of seconds"));
        }
    }
    let positive = [
        ("ACTION_TIMEOUT", cfg.buttons.action_timeout_secs),
        ("PENDING_TTL", cfg.buttons.pending_ttl_secs),
    ];
    for (key, value) in positive {
        match Duration::try_from_secs_f64(value) {
            Ok(d) if !d.is_zero() => {}
            _ => return Err(invalid(key, "must be a positive number of seconds")),
        }
    }
    Ok(())
}

fn invalid(key: &str, msg: &str) -> ConfigError {
    ConfigError::Invalid(format!("{} {}", key, msg))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, "must be a boolean (1/0, true/false, yes/no)")),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(key, "must be a number"))
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  db_path: "./data/leomatch.db"
  log_level: "info"
  enable_dm_reply: false

bridge:
  url: "http://127.0.0.1:8765/"
  token: ""
  poll_timeout_secs: 25

telegram:
  target_bot: "@leomatchbot"
  auto_start: true
  start_text: "/start"
  start_click_text: "🚀 Смотреть анкеты"
  start_delay_secs: 1.0

filter:
  include_keywords: "спорт, hiking; музыка"
  exclude_keywords: "nsfw"
  include_mode: any
  min_text_len: 0
  exclude_negation: false

buttons:
  like: ""
  skip: ""
  press_delay_secs: 0.3
  dup_numeric: false
  dup_delay_secs: 0.2
  action_timeout_secs: 10
  pending_ttl_secs: 30
"#
}
