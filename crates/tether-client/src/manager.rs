//! The session manager: one remote worker host, end to end.
//!
//! A [`SessionManager`] owns the transport link, the worker server lifecycle
//! on the far side, and the local port forward that makes the server's API
//! reachable. Observers watch the [`ConnectionHandle`] rather than polling.
//!
//! The manager is generic over a [`Connector`] so the whole bring-up can be
//! exercised against a scripted transport; production code uses the
//! [`SshConnector`] default.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::sync::Mutex;

use tether_core::{
    ConnectionHandle, ConnectionState, Error, Result, ServerInfo, SessionId, SessionOptions,
    VersionGate,
};
use tether_ssh::CommandOutput;

use crate::api::WorkerApi;
use crate::commands;
use crate::files::FileServices;
use crate::lifecycle;
use crate::shell::{Connector, ForwardGuard, RemoteLink, RemoteShell, ServerProcess, SshConnector};

/// How many times to poll for server info after spawning the server.
const INFO_POLL_ATTEMPTS: u32 = 5;
/// Delay between server-info polls.
const INFO_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Maximum reconnect attempts before giving up.
const RECONNECT_MAX_ATTEMPTS: usize = 5;

/// Everything that only exists while a session is up.
///
/// Guarded by one async mutex: that is the single-flight mechanism. A second
/// caller entering connect/install/start blocks until the in-flight attempt
/// settles, then observes its outcome instead of starting another.
struct Inner<L: RemoteLink> {
    session: Option<L>,
    server_process: Option<L::Process>,
    forward: Option<L::Forward>,
    server_info: Option<ServerInfo>,
}

impl<L: RemoteLink> Default for Inner<L> {
    fn default() -> Self {
        Self {
            session: None,
            server_process: None,
            forward: None,
            server_info: None,
        }
    }
}

/// Manages one remote worker session: SSH link, server lifecycle, port
/// forward, and recovery when the link drops.
pub struct SessionManager<C: Connector = SshConnector> {
    id: SessionId,
    name: String,
    options: SessionOptions,
    gate: VersionGate,
    handle: ConnectionHandle,
    connector: C,
    inner: Mutex<Inner<C::Link>>,
}

impl SessionManager {
    /// Create a manager for the named session, dialing over SSH.
    pub fn new(name: impl Into<String>, options: SessionOptions) -> Self {
        Self::with_connector(name, options, SshConnector)
    }

    /// Open file services over the session's SFTP subsystem.
    pub async fn files(&self) -> Result<FileServices> {
        let inner = self.inner.lock().await;
        let session = self.session_locked(&inner)?.clone();
        drop(inner);
        Ok(FileServices::new(session.sftp().await?))
    }
}

impl<C: Connector> SessionManager<C> {
    /// Create a manager that dials through the given connector.
    pub fn with_connector(name: impl Into<String>, options: SessionOptions, connector: C) -> Self {
        let name = name.into();
        Self {
            id: SessionId::new(),
            handle: ConnectionHandle::new(&name),
            name,
            options,
            gate: VersionGate::default(),
            connector,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Override the supported-version gate (tests, forward-compat experiments).
    pub fn with_gate(mut self, gate: VersionGate) -> Self {
        self.gate = gate;
        self
    }

    /// The session identifier, unique per manager instance.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The observable connection handle.
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    // ---- Connection and server management -------------------------------

    /// Open a fresh connection, closing any existing session first.
    ///
    /// `Active` is only reached once the worker server is running and
    /// forwarded; see [`ensure_connected_and_serving`](Self::ensure_connected_and_serving).
    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.disconnect_locked(&mut inner).await;
        self.connect_locked(&mut inner).await
    }

    /// The idempotent entry point: connect if needed, ensure a supported
    /// server is installed and running, forward its port.
    pub async fn ensure_connected_and_serving(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        // A previous caller may have finished the whole bring-up while we
        // waited on the lock.
        if self.is_serving_locked(&inner) {
            return Ok(());
        }

        self.connect_locked(&mut inner).await?;

        let session = self.session_locked(&inner)?.clone();
        if let Err(e) = lifecycle::ensure_installed(&session, self.options.platform, &self.gate).await
        {
            self.handle.set_state(
                ConnectionState::Error(e.to_string()),
                "worker server installation failed",
            );
            return Err(e);
        }

        self.start_server_locked(&mut inner).await
    }

    /// Tear down and bring the session back up, retrying transient failures
    /// with exponential backoff.
    pub async fn reconnect(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            self.disconnect_locked(&mut inner).await;
        }

        (|| async { self.ensure_connected_and_serving().await })
            .retry(ExponentialBuilder::default().with_max_times(RECONNECT_MAX_ATTEMPTS))
            .when(Error::is_retryable)
            .notify(|err: &Error, dur: Duration| {
                tracing::warn!(
                    session = %self.name,
                    error = %err,
                    retry_in = ?dur,
                    "reconnect attempt failed"
                );
            })
            .await
    }

    /// Start the worker server (or adopt one that is already running) and
    /// forward its port. Assumes the server is installed; see
    /// [`ensure_connected_and_serving`](Self::ensure_connected_and_serving)
    /// for the full bring-up.
    pub async fn start_server(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.start_server_locked(&mut inner).await
    }

    /// Ask the remote host whether a worker server is running.
    pub async fn server_info(&self) -> Result<Option<ServerInfo>> {
        let inner = self.inner.lock().await;
        let session = self.session_locked(&inner)?.clone();
        drop(inner);
        lifecycle::fetch_server_info(&session).await
    }

    /// Run an ad-hoc command on the remote host over the live session.
    pub async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let inner = self.inner.lock().await;
        let session = self.session_locked(&inner)?.clone();
        drop(inner);
        session.run(command).await
    }

    /// Stop the worker server: polite API shutdown first, then terminate the
    /// process we spawned, if any.
    pub async fn stop_server(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.stop_server_locked(&mut inner).await
    }

    /// Close everything: server, port forward, SSH connection.
    pub async fn close(&self) -> Result<()> {
        self.handle
            .set_state(ConnectionState::Stopping, "closing the connection");

        let mut inner = self.inner.lock().await;
        self.stop_server_locked(&mut inner).await?;

        if let Some(forward) = inner.forward.take() {
            forward.close();
        }
        if let Some(session) = inner.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!(session = %self.name, error = %e, "close reported an error");
            }
        }

        self.handle
            .set_state(ConnectionState::Inactive, "connection closed");
        Ok(())
    }

    // ---- Server API access ----------------------------------------------

    /// URL of the worker server through the forwarded local port.
    pub async fn server_url(&self) -> Result<String> {
        let inner = self.inner.lock().await;
        let forward = inner.forward.as_ref().ok_or(Error::NotConnected)?;
        Ok(format!("http://127.0.0.1:{}", forward.local_port()))
    }

    /// Build an authenticated API client for the running server.
    pub async fn api(&self) -> Result<WorkerApi> {
        let inner = self.inner.lock().await;
        let forward = inner.forward.as_ref().ok_or(Error::NotConnected)?;
        let info = inner.server_info.as_ref().ok_or(Error::NotConnected)?;
        Ok(WorkerApi::new(
            format!("http://127.0.0.1:{}", forward.local_port()),
            &info.token,
        ))
    }

    // ---- Internals -------------------------------------------------------

    fn session_locked<'a>(&self, inner: &'a Inner<C::Link>) -> Result<&'a C::Link> {
        inner
            .session
            .as_ref()
            .filter(|s| s.is_connected())
            .ok_or(Error::NotConnected)
    }

    fn is_serving_locked(&self, inner: &Inner<C::Link>) -> bool {
        self.state().is_active()
            && inner.session.as_ref().is_some_and(|s| s.is_connected())
            && inner.forward.is_some()
    }

    async fn connect_locked(&self, inner: &mut Inner<C::Link>) -> Result<()> {
        if inner.session.as_ref().is_some_and(|s| s.is_connected()) {
            return Ok(());
        }

        // A dead session leaves stale server state behind; drop all of it.
        inner.session = None;
        inner.server_process = None;
        inner.forward = None;
        inner.server_info = None;

        self.handle
            .set_state(ConnectionState::Connecting, "establishing the connection");

        let session = match self.connector.connect(&self.options).await {
            Ok(session) => session,
            Err(e) => {
                self.handle.set_state(
                    ConnectionState::Error(e.to_string()),
                    "could not open a connection to this machine",
                );
                return Err(e);
            }
        };

        tracing::debug!(session = %self.name, id = %self.id, "link established");
        self.watch_liveness(&session);
        inner.session = Some(session);
        Ok(())
    }

    /// Flip the handle to Error when the link drops; the next ensure call
    /// rebuilds the session from scratch.
    fn watch_liveness(&self, session: &C::Link) {
        let mut rx = session.subscribe_liveness();
        let handle = self.handle.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            loop {
                if !*rx.borrow_and_update() {
                    tracing::error!(session = %name, "connection to the remote host was lost");
                    handle.set_state(
                        ConnectionState::Error("connection lost".into()),
                        "the connection was lost",
                    );
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    async fn start_server_locked(&self, inner: &mut Inner<C::Link>) -> Result<()> {
        let session = self.session_locked(inner)?.clone();

        // Adopt a server that is already running rather than racing it.
        if let Some(info) = lifecycle::fetch_server_info(&session).await? {
            tracing::info!(
                session = %self.name,
                port = info.port,
                "worker server already running, adopting it"
            );
            let info_changed = inner.server_info.as_ref() != Some(&info);
            if info_changed || inner.forward.is_none() {
                self.replace_forward(inner, &session, &info).await?;
            }
            inner.server_info = Some(info);
            self.handle.set_state(
                ConnectionState::Active,
                "the connection was established successfully",
            );
            return Ok(());
        }

        tracing::info!(session = %self.name, "starting worker server");
        let process = match session.spawn_server(&commands::start_command()).await {
            Ok(process) => process,
            Err(e) => {
                self.handle.set_state(
                    ConnectionState::Error(e.to_string()),
                    "error starting the worker server",
                );
                return Err(e);
            }
        };
        inner.server_process = Some(process);

        let info = match self.poll_server_info(&session).await {
            Some(info) => info,
            None => {
                let err = Error::server_start(format!(
                    "no server info after {INFO_POLL_ATTEMPTS} attempts"
                ));
                self.handle.set_state(
                    ConnectionState::Error(err.to_string()),
                    "could not get the worker server information",
                );
                return Err(err);
            }
        };

        tracing::info!(
            session = %self.name,
            port = info.port,
            pid = info.pid,
            "worker server started"
        );

        self.replace_forward(inner, &session, &info).await?;
        inner.server_info = Some(info);
        self.handle.set_state(
            ConnectionState::Active,
            "the connection was established successfully",
        );
        Ok(())
    }

    async fn poll_server_info(&self, session: &C::Link) -> Option<ServerInfo> {
        for attempt in 1..=INFO_POLL_ATTEMPTS {
            tokio::time::sleep(INFO_POLL_INTERVAL).await;
            match lifecycle::fetch_server_info(session).await {
                Ok(Some(info)) => return Some(info),
                Ok(None) => {
                    tracing::debug!(attempt, "worker server not up yet");
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "info poll failed");
                }
            }
        }
        None
    }

    /// Replace the port forward, closing any previous one first.
    async fn replace_forward(
        &self,
        inner: &mut Inner<C::Link>,
        session: &C::Link,
        info: &ServerInfo,
    ) -> Result<()> {
        if let Some(old) = inner.forward.take() {
            tracing::debug!(
                session = %self.name,
                local_port = old.local_port(),
                "replacing existing port forward"
            );
            old.close();
        }

        match session.open_forward(&info.hostname, info.port).await {
            Ok(forward) => {
                tracing::debug!(
                    session = %self.name,
                    local_port = forward.local_port(),
                    remote_port = info.port,
                    "port forwarded"
                );
                inner.forward = Some(forward);
                Ok(())
            }
            Err(e) => {
                self.handle.set_state(
                    ConnectionState::Error(e.to_string()),
                    "it was not possible to forward the local port",
                );
                Err(e)
            }
        }
    }

    async fn stop_server_locked(&self, inner: &mut Inner<C::Link>) -> Result<()> {
        if inner.server_info.is_none() && inner.server_process.is_none() {
            tracing::debug!(session = %self.name, "no worker server to stop");
            return Ok(());
        }

        // Polite shutdown through the API; failures only get logged, the
        // process terminate below is the backstop.
        if let (Some(forward), Some(info)) = (&inner.forward, &inner.server_info) {
            let api = WorkerApi::new(
                format!("http://127.0.0.1:{}", forward.local_port()),
                &info.token,
            );
            if let Err(e) = api.shutdown().await {
                tracing::warn!(session = %self.name, error = %e, "API shutdown failed");
            }
        }

        if let Some(process) = inner.server_process.take() {
            process.terminate().await?;
            tracing::info!(session = %self.name, "worker server process terminated");
        }
        inner.server_info = None;
        Ok(())
    }

    /// Quiet teardown used before a redial: no Stopping/Inactive dance.
    async fn disconnect_locked(&self, inner: &mut Inner<C::Link>) {
        if let Some(forward) = inner.forward.take() {
            forward.close();
        }
        if let Some(session) = inner.session.take() {
            let _ = session.close().await;
        }
        inner.server_process = None;
        inner.server_info = None;
    }
}

impl<C: Connector> std::fmt::Debug for SessionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
