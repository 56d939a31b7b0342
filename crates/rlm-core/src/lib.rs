//! Core types for the RLM engine: config, errors, usage accounting, and the
//! structured run event log.

pub mod config;
pub mod error;
pub mod logging;
pub mod usage;
