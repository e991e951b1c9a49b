//! Core engine: create → activate → settle.

pub mod creation;
pub mod decision;
pub mod liquidity;
pub mod oracle;
pub mod scheduler;
