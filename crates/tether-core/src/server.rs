//! Worker server metadata and the supported-version gate.

use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Oldest worker server version this client will talk to.
///
/// Older servers are reinstalled rather than rejected.
pub const MIN_SUPPORTED: ServerVersion = ServerVersion::new(0, 9, 0);

/// First worker server version this client refuses to talk to.
pub const MAX_SUPPORTED: ServerVersion = ServerVersion::new(2, 0, 0);

// ============================================================================
// ServerInfo
// ============================================================================

/// Runtime facts about a worker server, reported by its `info` command.
///
/// The info command prints one JSON object as its last stdout line; anything
/// before it (activation banners, warnings) is ignored.
#[derive(Clone, PartialEq, Deserialize)]
pub struct ServerInfo {
    /// PID of the server process on the remote host.
    pub pid: u32,
    /// Port the server listens on, on the remote host.
    pub port: u16,
    /// API token for the server's HTTP interface. Redacted in Debug output.
    pub token: String,
    /// Hostname or address the server binds to on the remote side.
    pub hostname: String,
}

impl ServerInfo {
    /// Parse server info from the stdout of the `info` command.
    ///
    /// Takes the last non-empty line and parses it as JSON. Returns `None`
    /// when there is no such line or it is not valid info JSON; callers treat
    /// that as "no running server", not as a hard error.
    pub fn from_info_output(stdout: &str) -> Option<Self> {
        let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
        serde_json::from_str(line.trim()).ok()
    }
}

impl fmt::Debug for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInfo")
            .field("pid", &self.pid)
            .field("port", &self.port)
            .field("token", &"***")
            .field("hostname", &self.hostname)
            .finish()
    }
}

// ============================================================================
// ServerVersion
// ============================================================================

/// A `major.minor.patch` worker server version.
///
/// Pre-release suffixes (`1.2.0-rc1`, `1.2.0+build5`) are tolerated and
/// ignored for ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl ServerVersion {
    /// Creates a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for ServerVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('v');
        // Drop pre-release / build-metadata suffixes
        let core = s
            .split_once(['-', '+'])
            .map(|(head, _)| head)
            .unwrap_or(s);

        let mut parts = core.split('.');
        let mut next = |name: &str| -> Result<u32> {
            parts
                .next()
                .ok_or_else(|| Error::config(format!("version '{s}' is missing its {name} part")))?
                .parse()
                .map_err(|_| Error::config(format!("version '{s}' has a non-numeric {name} part")))
        };

        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        if parts.next().is_some() {
            return Err(Error::config(format!("version '{s}' has too many parts")));
        }
        Ok(Self::new(major, minor, patch))
    }
}

// ============================================================================
// VersionGate
// ============================================================================

/// Outcome of checking a reported server version against the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionDecision {
    /// The version is supported; use the server as-is.
    Accepted,
    /// The version is older than the minimum; reinstall a current server.
    Reinstall,
    /// The version is at or past the maximum; refuse to proceed.
    Rejected,
}

/// The supported-version window for remote worker servers.
#[derive(Clone, Copy, Debug)]
pub struct VersionGate {
    min: ServerVersion,
    max: ServerVersion,
}

impl Default for VersionGate {
    fn default() -> Self {
        Self {
            min: MIN_SUPPORTED,
            max: MAX_SUPPORTED,
        }
    }
}

impl VersionGate {
    /// A gate with explicit bounds (tests, forward-compat experiments).
    pub fn new(min: ServerVersion, max: ServerVersion) -> Self {
        Self { min, max }
    }

    /// Classify a reported version. Total over all parseable versions.
    pub fn classify(&self, version: ServerVersion) -> VersionDecision {
        if version >= self.max {
            VersionDecision::Rejected
        } else if version < self.min {
            VersionDecision::Reinstall
        } else {
            VersionDecision::Accepted
        }
    }

    /// The maximum (exclusive) supported version.
    pub fn max(&self) -> ServerVersion {
        self.max
    }
}
