//! Core domain + application logic for the link curator bot.
//!
//! This crate is framework-agnostic. The chat server, HTTP fetching and the
//! language model live behind ports (traits) implemented in adapter crates.

pub mod classifier;
pub mod commands;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod errors;
pub mod event_loop;
pub mod extractor;
pub mod formatting;
pub mod history;
pub mod logging;
pub mod namer;
pub mod organizer;
pub mod pipeline;
pub mod ports;
pub mod reorganizer;
pub mod report;
pub mod resolver;
pub mod security;
pub mod throttled;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
