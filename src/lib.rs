//! Keyword-driven accept/skip automation for profile cards sent by a chat bot.

pub mod assembler;
pub mod bridge;
pub mod buttons;
pub mod config;
pub mod db;
pub mod keywords;
pub mod logging;
pub mod model;
pub mod processor;
pub mod session;
pub mod transport;
