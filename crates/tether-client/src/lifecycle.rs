//! Worker server lifecycle operations over a [`RemoteShell`].
//!
//! These are the probe/install building blocks the manager composes. They
//! are deliberately free of session state so they can be exercised against
//! a scripted shell.

use tether_core::{Error, RemotePlatform, Result, ServerInfo, ServerVersion, VersionDecision, VersionGate};

use crate::commands;
use crate::shell::RemoteShell;

/// Ask the remote host whether a worker server is running.
///
/// Probe failure, timeout, or unparseable output all mean "no running
/// server" (`Ok(None)`). A failed channel open answers the same question
/// as a non-zero exit: nothing usable is serving, so the caller falls
/// through to starting one.
pub async fn fetch_server_info(shell: &dyn RemoteShell) -> Result<Option<ServerInfo>> {
    let output = match shell.run(&commands::info_command()).await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(error = %e, "info probe failed");
            return Ok(None);
        }
    };

    if !output.success() {
        tracing::debug!(stderr = %output.stderr, "info probe exited non-zero");
        return Ok(None);
    }

    match ServerInfo::from_info_output(&output.stdout) {
        Some(info) => Ok(Some(info)),
        None => {
            tracing::debug!(stdout = %output.stdout, "info probe output was not parseable");
            Ok(None)
        }
    }
}

/// Report the installed worker server version, `None` when not installed.
pub async fn probe_version(
    shell: &dyn RemoteShell,
    platform: RemotePlatform,
) -> Result<Option<ServerVersion>> {
    let output = shell.run(&commands::version_command(platform)).await?;
    if !output.success() {
        // Probe commands answer "not installed" through their exit status.
        tracing::debug!(stderr = %output.stderr, "version probe exited non-zero");
        return Ok(None);
    }

    let line = output
        .stdout_last_line()
        .ok_or_else(|| Error::config("version probe printed nothing"))?;
    Ok(Some(line.parse()?))
}

/// Install (or reinstall) the worker server on the remote host.
pub async fn install_server(shell: &dyn RemoteShell, platform: RemotePlatform) -> Result<()> {
    let command = commands::install_command(platform)?;
    tracing::info!(%platform, "installing worker server");

    let output = shell.run(&command).await?;
    if !output.success() {
        return Err(Error::server_install(format!(
            "installer exited with {:?}: {}",
            output.exit_status,
            output.stderr.trim()
        )));
    }

    tracing::info!("worker server installed");
    Ok(())
}

/// Make sure a supported worker server is installed.
///
/// - not installed: install it
/// - version below the gate minimum: reinstall
/// - version at or past the gate maximum: refuse
/// - otherwise: accept as-is
pub async fn ensure_installed(
    shell: &dyn RemoteShell,
    platform: RemotePlatform,
    gate: &VersionGate,
) -> Result<()> {
    let Some(version) = probe_version(shell, platform).await? else {
        tracing::info!("worker server not installed");
        return install_server(shell, platform).await;
    };

    match gate.classify(version) {
        VersionDecision::Accepted => {
            tracing::info!(%version, "worker server version accepted");
            Ok(())
        }
        VersionDecision::Reinstall => {
            tracing::warn!(%version, "worker server too old, reinstalling");
            install_server(shell, platform).await
        }
        VersionDecision::Rejected => Err(Error::VersionRejected {
            version: version.to_string(),
            max: gate.max().to_string(),
        }),
    }
}
