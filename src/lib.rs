//! ShadowMarkets: prediction markets over private events.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod chain;
pub mod config;
pub mod engine;
pub mod llm;
pub mod sources;
pub mod storage;
pub mod types;
