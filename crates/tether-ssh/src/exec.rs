//! Command execution over an established session.
//!
//! Two shapes: [`SshSession::run`] for one-shot commands whose full output
//! matters (probes, installers), and [`SshSession::spawn`] for long-lived
//! remote processes (the worker server) that outlive the call.

use russh::ChannelMsg;
use tokio::sync::oneshot;

use tether_core::{Error, Result};

use crate::session::SshSession;

// ============================================================================
// CommandOutput
// ============================================================================

/// Collected output of a one-shot remote command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
    /// Remote exit status, if the channel reported one.
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// The last non-empty stdout line, trimmed.
    ///
    /// Probe commands print their answer last, after any activation noise.
    pub fn stdout_last_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
    }
}

// ============================================================================
// One-shot execution
// ============================================================================

impl SshSession {
    /// Run a command to completion and collect its output.
    ///
    /// A non-zero exit status is NOT an error: probe commands use the exit
    /// status to answer "is the server installed". Transport failures are.
    pub async fn run(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(host = %self.host, command, "running remote command");

        let mut channel = self.handle.channel_open_session().await.map_err(|e| {
            self.mark_lost_on(&e);
            Error::ssh(format!("channel open failed: {e}"))
        })?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::ssh(format!("exec failed: {e}")))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    /// Spawn a long-lived remote process.
    ///
    /// The process keeps running on its channel until [`RemoteProcess::terminate`]
    /// is called or the remote side exits. Output is drained in the background
    /// and surfaced through tracing.
    pub async fn spawn(&self, command: &str) -> Result<RemoteProcess> {
        tracing::debug!(host = %self.host, command, "spawning remote process");

        let mut channel = self.handle.channel_open_session().await.map_err(|e| {
            self.mark_lost_on(&e);
            Error::ssh(format!("channel open failed: {e}"))
        })?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::ssh(format!("exec failed: {e}")))?;

        let (exit_tx, exit_rx) = oneshot::channel();
        let (signal_tx, mut signal_rx) = oneshot::channel::<()>();
        let host = self.host.clone();

        tokio::spawn(async move {
            let mut exit_status = None;
            loop {
                tokio::select! {
                    msg = channel.wait() => {
                        match msg {
                            Some(ChannelMsg::Data { ref data }) => {
                                let text = String::from_utf8_lossy(data);
                                for line in text.lines() {
                                    tracing::debug!(host = %host, "server: {line}");
                                }
                            }
                            Some(ChannelMsg::ExtendedData { ref data, ext: 1 }) => {
                                let text = String::from_utf8_lossy(data);
                                for line in text.lines() {
                                    tracing::warn!(host = %host, "server: {line}");
                                }
                            }
                            Some(ChannelMsg::ExitStatus { exit_status: code }) => {
                                exit_status = Some(code);
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                    _ = &mut signal_rx => {
                        if let Err(e) = channel.signal(russh::Sig::TERM).await {
                            tracing::debug!(host = %host, error = %e, "SIGTERM delivery failed");
                        }
                        let _ = channel.close().await;
                        break;
                    }
                }
            }
            let _ = exit_tx.send(exit_status);
        });

        Ok(RemoteProcess {
            signal_tx: Some(signal_tx),
            exit_rx: Some(exit_rx),
        })
    }

    fn mark_lost_on(&self, error: &russh::Error) {
        if matches!(error, russh::Error::Disconnect | russh::Error::SendError) {
            self.mark_lost();
        }
    }
}

// ============================================================================
// RemoteProcess
// ============================================================================

/// Handle to a long-lived process running on the remote host.
#[derive(Debug)]
pub struct RemoteProcess {
    signal_tx: Option<oneshot::Sender<()>>,
    exit_rx: Option<oneshot::Receiver<Option<u32>>>,
}

impl RemoteProcess {
    /// Whether the remote process has already exited (or been terminated).
    pub fn is_closed(&mut self) -> bool {
        match &mut self.exit_rx {
            None => true,
            Some(rx) => match rx.try_recv() {
                Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                    self.exit_rx = None;
                    true
                }
                Err(oneshot::error::TryRecvError::Empty) => false,
            },
        }
    }

    /// Terminate the remote process (SIGTERM, then channel close) and wait
    /// for its channel to drain.
    pub async fn terminate(mut self) -> Result<()> {
        if let Some(tx) = self.signal_tx.take() {
            let _ = tx.send(());
        }
        if let Some(rx) = self.exit_rx.take() {
            let _ = rx.await;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            exit_status: Some(0),
            ..Default::default()
        };
        assert!(ok.success());

        let failed = CommandOutput {
            exit_status: Some(127),
            ..Default::default()
        };
        assert!(!failed.success());

        let unknown = CommandOutput::default();
        assert!(!unknown.success());
    }

    #[test]
    fn test_stdout_last_line_skips_noise() {
        let output = CommandOutput {
            stdout: "activating env...\n1.4.2\n\n  \n".to_string(),
            ..Default::default()
        };
        assert_eq!(output.stdout_last_line(), Some("1.4.2"));
    }

    #[test]
    fn test_stdout_last_line_empty() {
        let output = CommandOutput::default();
        assert_eq!(output.stdout_last_line(), None);
    }
}
