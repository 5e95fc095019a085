//! trener core: deterministic chat commands for a personal-trainer assistant.
//!
//! A message first meets the confirmation gate, then the ordered command
//! recognizers, and only then the generative fallback. Mutating commands are
//! staged per session and run after an explicit "tak".

pub mod chat;
pub mod commands;
pub mod config;
pub mod planner;
pub mod storage;
pub mod types;
