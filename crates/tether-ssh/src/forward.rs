//! Local port forwarding.
//!
//! Binds an OS-assigned port on 127.0.0.1 and pipes each accepted TCP
//! connection into a direct-tcpip channel to the remote server. The local
//! side never binds a fixed port; asking the OS for one (bind to port 0)
//! avoids races with other local services.

use std::sync::Arc;

use russh::client;
use tokio::net::TcpListener;

use tether_core::{Error, Result};

use crate::session::{ClientHandler, SshSession};

impl SshSession {
    /// Forward a fresh local port to `remote_host:remote_port` on the far side.
    pub async fn forward_port(&self, remote_host: &str, remote_port: u16) -> Result<PortForward> {
        let (listener, local_port) = bind_local().await?;

        tracing::debug!(
            host = %self.host,
            local_port,
            remote_host,
            remote_port,
            "forwarding local port"
        );

        let handle = Arc::clone(&self.handle);
        let remote_host = remote_host.to_string();
        let task = tokio::spawn(accept_loop(
            listener,
            handle,
            remote_host,
            remote_port,
            local_port,
        ));

        Ok(PortForward {
            local_port,
            task: Some(task),
        })
    }
}

/// Bind 127.0.0.1:0 and report the port the OS picked.
async fn bind_local() -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| Error::port_forward(format!("local bind failed: {e}")))?;
    let local_port = listener
        .local_addr()
        .map_err(|e| Error::port_forward(format!("local addr lookup failed: {e}")))?
        .port();
    Ok((listener, local_port))
}

async fn accept_loop(
    listener: TcpListener,
    handle: Arc<client::Handle<ClientHandler>>,
    remote_host: String,
    remote_port: u16,
    local_port: u16,
) {
    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(local_port, error = %e, "forward accept failed");
                break;
            }
        };

        let channel = match handle
            .channel_open_direct_tcpip(
                remote_host.clone(),
                u32::from(remote_port),
                "127.0.0.1",
                u32::from(peer.port()),
            )
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(
                    local_port,
                    remote_port,
                    error = %e,
                    "direct-tcpip channel open failed"
                );
                continue;
            }
        };

        tokio::spawn(async move {
            let mut stream = channel.into_stream();
            if let Err(e) = tokio::io::copy_bidirectional(&mut socket, &mut stream).await {
                tracing::debug!(error = %e, "forwarded connection closed with error");
            }
        });
    }
}

// ============================================================================
// PortForward
// ============================================================================

/// A live local-to-remote port forward.
///
/// Dropping the guard (or calling [`close`](Self::close)) stops the accept
/// loop; in-flight connections drain on their own.
#[derive(Debug)]
pub struct PortForward {
    local_port: u16,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl PortForward {
    /// The local port the forward listens on.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Stop accepting new forwarded connections.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(local_port = self.local_port, "port forward closed");
        }
    }
}

impl Drop for PortForward {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
