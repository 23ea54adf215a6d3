//! Library for the line-delimited JSON regression model bridge
//!
//! This crate provides the core functionality for:
//! - A feed-forward regression network with Adam training and early stopping
//! - Feature standardization fitted at training time
//! - Checksummed on-disk artifacts
//! - The model lifecycle manager and the command dispatch loop

pub mod bridge;
pub mod error;
pub mod manager;
pub mod models;
pub mod network;
pub mod observability;
pub mod persistence;
pub mod protocol;
pub mod scaler;

pub use bridge::{BridgeStats, CommandBridge, RunSummary};
pub use error::{BridgeError, Result};
pub use manager::ModelManager;
pub use models::*;
pub use observability::{init_tracing, LogFormat, StructuredLogger};
pub use protocol::{Command, Payload, Response};
