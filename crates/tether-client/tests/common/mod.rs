//! Common test utilities for tether-client integration tests.
//!
//! [`MockShell`] scripts command outputs for the lifecycle operations;
//! [`MockLink`] and [`MockConnector`] wrap it into a full scripted transport
//! so the session manager's bring-up can run without a real host.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use tether_client::{Connector, ForwardGuard, RemoteLink, RemoteShell, ServerProcess};
use tether_core::{
    AuthMethod, Error, KnownHostsPolicy, RemotePlatform, Result, SessionOptions,
};
use tether_ssh::CommandOutput;

/// Scripted remote shell: returns queued outputs in order and records every
/// command it was asked to run.
#[derive(Default)]
pub struct MockShell {
    responses: Mutex<VecDeque<Result<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful command with the given stdout.
    pub fn push_ok(self, stdout: &str) -> Self {
        self.push(Ok(output(0, stdout, "")))
    }

    /// Queue a command that exits non-zero with the given stderr.
    pub fn push_fail(self, exit: u32, stderr: &str) -> Self {
        self.push(Ok(output(exit, "", stderr)))
    }

    /// Queue a transport-level failure.
    pub fn push_err(self, err: Error) -> Self {
        self.push(Err(err))
    }

    fn push(self, response: Result<CommandOutput>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(response);
        self
    }

    /// Every command that was run, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(command.to_string());
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::config(format!(
                    "mock shell ran out of responses (command: {command})"
                )))
            })
    }
}

fn output(exit: u32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_status: Some(exit),
    }
}

/// An info JSON line the worker server's `info` command would print.
pub fn info_json(pid: u32, port: u16, token: &str) -> String {
    format!("{{\"pid\":{pid},\"port\":{port},\"token\":\"{token}\",\"hostname\":\"127.0.0.1\"}}")
}

/// Session options pointing nowhere in particular; the mock connector never
/// dials them.
pub fn options() -> SessionOptions {
    SessionOptions {
        host: "127.0.0.1".into(),
        port: 22,
        username: "worker".into(),
        auth: AuthMethod::Password {
            password: "x".into(),
        },
        known_hosts: KnownHostsPolicy::AcceptAny,
        platform: RemotePlatform::Linux,
        connect_timeout_secs: 5,
        keepalive_secs: 0,
    }
}

// ============================================================================
// MockLink / MockConnector
// ============================================================================

/// One port forward the mock link opened, with its lifetime flag.
#[derive(Clone)]
pub struct ForwardRecord {
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub closed: Arc<AtomicBool>,
}

/// Scripted transport link: commands answer from the wrapped [`MockShell`],
/// spawned processes and opened forwards are recorded for assertions.
#[derive(Clone)]
pub struct MockLink {
    shell: Arc<MockShell>,
    alive: Arc<watch::Sender<bool>>,
    spawned: Arc<Mutex<Vec<String>>>,
    processes: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    forwards: Arc<Mutex<Vec<ForwardRecord>>>,
    next_port: Arc<AtomicU16>,
}

impl MockLink {
    pub fn new(shell: MockShell) -> Self {
        let (alive, _) = watch::channel(true);
        Self {
            shell: Arc::new(shell),
            alive: Arc::new(alive),
            spawned: Arc::new(Mutex::new(Vec::new())),
            processes: Arc::new(Mutex::new(Vec::new())),
            forwards: Arc::new(Mutex::new(Vec::new())),
            next_port: Arc::new(AtomicU16::new(40000)),
        }
    }

    /// Simulate the link dropping out from under the manager.
    pub fn drop_link(&self) {
        self.alive.send_replace(false);
    }

    /// Every command that was run, in order.
    pub fn calls(&self) -> Vec<String> {
        self.shell.calls()
    }

    /// Every long-lived process command that was spawned, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Terminated flags of every spawned process, in spawn order.
    pub fn process_flags(&self) -> Vec<Arc<AtomicBool>> {
        self.processes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Every forward that was opened, in order.
    pub fn forwards(&self) -> Vec<ForwardRecord> {
        self.forwards
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl RemoteShell for MockLink {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.shell.run(command).await
    }
}

#[async_trait]
impl RemoteLink for MockLink {
    type Process = MockProcess;
    type Forward = MockForward;

    fn is_connected(&self) -> bool {
        *self.alive.borrow()
    }

    fn subscribe_liveness(&self) -> watch::Receiver<bool> {
        self.alive.subscribe()
    }

    async fn spawn_server(&self, command: &str) -> Result<MockProcess> {
        self.spawned
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(command.to_string());
        let terminated = Arc::new(AtomicBool::new(false));
        self.processes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::clone(&terminated));
        Ok(MockProcess { terminated })
    }

    async fn open_forward(&self, remote_host: &str, remote_port: u16) -> Result<MockForward> {
        let local_port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        self.forwards
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(ForwardRecord {
                local_port,
                remote_host: remote_host.to_string(),
                remote_port,
                closed: Arc::clone(&closed),
            });
        Ok(MockForward { local_port, closed })
    }

    async fn close(&self) -> Result<()> {
        self.alive.send_replace(false);
        Ok(())
    }
}

pub struct MockProcess {
    terminated: Arc<AtomicBool>,
}

#[async_trait]
impl ServerProcess for MockProcess {
    async fn terminate(self) -> Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockForward {
    local_port: u16,
    closed: Arc<AtomicBool>,
}

impl ForwardGuard for MockForward {
    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct ConnectorState {
    links: Mutex<VecDeque<MockLink>>,
    dials: AtomicUsize,
}

/// Hands out pre-built links in order and counts how often it was dialed.
#[derive(Clone)]
pub struct MockConnector(Arc<ConnectorState>);

impl MockConnector {
    pub fn new() -> Self {
        Self(Arc::new(ConnectorState {
            links: Mutex::new(VecDeque::new()),
            dials: AtomicUsize::new(0),
        }))
    }

    /// Queue a link for the next dial.
    pub fn queue(self, link: MockLink) -> Self {
        self.0
            .links
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(link);
        self
    }

    /// How many times the manager dialed.
    pub fn dials(&self) -> usize {
        self.0.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Link = MockLink;

    async fn connect(&self, _options: &SessionOptions) -> Result<MockLink> {
        self.0.dials.fetch_add(1, Ordering::SeqCst);
        self.0
            .links
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .ok_or_else(|| Error::ssh("mock connector ran out of links"))
    }
}
