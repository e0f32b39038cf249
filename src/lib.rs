//! Sentinel Library
//!
//! LSTM crash-risk inference engine with proof-backend crash attestations

pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod logging;
pub mod ml_engine;
pub mod persistence;
pub mod proof;
pub mod risk;
pub mod types;
