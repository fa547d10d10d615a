//! Tether Client - remote worker session management.
//!
//! # Modules
//!
//! - [`commands`]: per-platform worker server command lines
//! - [`shell`]: the [`RemoteShell`](shell::RemoteShell) and
//!   [`RemoteLink`](shell::RemoteLink) execution/transport seams
//! - [`lifecycle`]: install / probe / info operations over a shell
//! - [`manager`]: the [`SessionManager`](manager::SessionManager)
//! - [`api`]: HTTP client for the worker server's forwarded port
//! - [`files`]: remote file services over SFTP

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod api;
pub mod commands;
pub mod files;
pub mod lifecycle;
pub mod manager;
pub mod shell;

pub use api::{KernelInfo, ServerStatus, WorkerApi};
pub use files::FileServices;
pub use manager::SessionManager;
pub use shell::{Connector, ForwardGuard, RemoteLink, RemoteShell, ServerProcess, SshConnector};
