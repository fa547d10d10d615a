//! The remote execution and transport seams.
//!
//! [`RemoteShell`] is the narrow interface the server lifecycle logic needs:
//! run a command, get its output. [`RemoteLink`] widens it to everything the
//! session manager drives on a live transport: long-lived processes, port
//! forwards, liveness. [`Connector`] dials new links. The SSH types implement
//! all three for real hosts; tests drive the manager with scripted
//! implementations instead.

use async_trait::async_trait;
use tokio::sync::watch;

use tether_core::{Result, SessionOptions};
use tether_ssh::{CommandOutput, PortForward, RemoteProcess, SshSession};

/// Something that can run commands on the remote host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command to completion and collect its output.
    ///
    /// Non-zero exit is reported in the output, not as an `Err`.
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// A live transport to one remote host.
///
/// Cheap to clone; clones share the underlying connection.
#[async_trait]
pub trait RemoteLink: RemoteShell + Clone + Send + Sync + 'static {
    /// Handle to a long-lived remote process started over this link.
    type Process: ServerProcess;
    /// Handle to a local-to-remote port forward held over this link.
    type Forward: ForwardGuard;

    /// Whether the underlying connection is still open.
    fn is_connected(&self) -> bool;

    /// Subscribe to liveness changes; the value flips to `false` once when
    /// the link is lost and never recovers for this link.
    fn subscribe_liveness(&self) -> watch::Receiver<bool>;

    /// Start a long-lived remote process.
    async fn spawn_server(&self, command: &str) -> Result<Self::Process>;

    /// Forward a fresh local port to `remote_host:remote_port`.
    async fn open_forward(&self, remote_host: &str, remote_port: u16) -> Result<Self::Forward>;

    /// Gracefully close the link.
    async fn close(&self) -> Result<()>;
}

/// Dials new links from session options.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The link this connector produces.
    type Link: RemoteLink;

    /// Open and authenticate a fresh link.
    async fn connect(&self, options: &SessionOptions) -> Result<Self::Link>;
}

/// A long-lived remote process the manager may have to stop.
#[async_trait]
pub trait ServerProcess: Send + 'static {
    /// Terminate the process and wait for it to settle.
    async fn terminate(self) -> Result<()>;
}

/// A held port forward.
pub trait ForwardGuard: Send + Sync + 'static {
    /// The local port the forward listens on.
    fn local_port(&self) -> u16;

    /// Stop the forward.
    fn close(self);
}

// ============================================================================
// SSH implementations
// ============================================================================

#[async_trait]
impl RemoteShell for SshSession {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        SshSession::run(self, command).await
    }
}

#[async_trait]
impl RemoteLink for SshSession {
    type Process = RemoteProcess;
    type Forward = PortForward;

    fn is_connected(&self) -> bool {
        SshSession::is_connected(self)
    }

    fn subscribe_liveness(&self) -> watch::Receiver<bool> {
        SshSession::subscribe_liveness(self)
    }

    async fn spawn_server(&self, command: &str) -> Result<RemoteProcess> {
        self.spawn(command).await
    }

    async fn open_forward(&self, remote_host: &str, remote_port: u16) -> Result<PortForward> {
        self.forward_port(remote_host, remote_port).await
    }

    async fn close(&self) -> Result<()> {
        SshSession::close(self).await
    }
}

#[async_trait]
impl ServerProcess for RemoteProcess {
    async fn terminate(self) -> Result<()> {
        RemoteProcess::terminate(self).await
    }
}

impl ForwardGuard for PortForward {
    fn local_port(&self) -> u16 {
        PortForward::local_port(self)
    }

    fn close(self) {
        PortForward::close(self);
    }
}

/// Connector that dials real SSH sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    type Link = SshSession;

    async fn connect(&self, options: &SessionOptions) -> Result<SshSession> {
        SshSession::connect(options).await
    }
}
