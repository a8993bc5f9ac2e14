//! Squad - multi-agent coordination runtime.
//!
//! Persistent agents (one director, N specialists) cooperate through a
//! shared MongoDB plane that serves as message bus, task board, checkpoint
//! log, and sandbox registry:
//! - Message bus with notification previews and read-on-demand
//! - Append-only checkpoints driving restart-and-resume
//! - Task lifecycle along a forward-only status DAG
//! - One shared sandbox hosting every agent process
//! - Change-stream watchers that start specialist work reactively
//! - REST + WebSocket control plane

pub mod api;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::Config;
pub use infrastructure::mongo::{MongoConnection, Stores};
