//! Tether SSH - transport layer for remote sessions.
//!
//! # Modules
//!
//! - [`session`]: connection establishment, authentication, liveness
//! - [`exec`]: one-shot commands and long-lived remote processes
//! - [`forward`]: local port forwarding
//! - [`sftp`]: SFTP subsystem access

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod exec;
pub mod forward;
pub mod session;
pub mod sftp;

pub use exec::{CommandOutput, RemoteProcess};
pub use forward::PortForward;
pub use session::SshSession;
pub use sftp::SftpClient;
