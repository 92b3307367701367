//! Core deckgen library (pipeline, providers, store, config).

pub mod config;
pub mod core;
pub mod prompts;
pub mod providers;
pub mod store;
