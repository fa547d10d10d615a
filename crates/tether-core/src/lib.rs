//! Tether Core - shared types for the remote session manager.
//!
//! This crate provides the foundational types used across all Tether crates.
//! It has no internal Tether dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`ids`]: Session identifier newtype
//! - [`state`]: Connection state machine and observable handle
//! - [`options`]: Per-session connection options
//! - [`config`]: TOML session configuration
//! - [`server`]: Worker server metadata and version gate

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod ids;
pub mod options;
pub mod server;
pub mod state;

// Re-exports for convenience
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use ids::SessionId;
pub use options::{AuthMethod, KnownHostsPolicy, RemotePlatform, SessionOptions};
pub use server::{ServerInfo, ServerVersion, VersionDecision, VersionGate};
pub use state::{ConnectionEvent, ConnectionHandle, ConnectionState};
