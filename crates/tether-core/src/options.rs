//! Per-session connection options.
//!
//! [`SessionOptions`] is what the manager needs to reach one remote host:
//! address, credentials, host-key policy, and the remote platform. Fields
//! that only concern server lifecycle (the platform) never reach the SSH
//! transport layer.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default SSH port.
const DEFAULT_PORT: u16 = 22;
/// Default connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
/// Default keepalive interval in seconds.
const DEFAULT_KEEPALIVE_SECS: u64 = 30;

// ============================================================================
// AuthMethod
// ============================================================================

/// How to authenticate against the remote host.
///
/// `Debug` redacts secrets; passwords and passphrases must never appear in
/// logs or error messages.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Password authentication.
    Password {
        /// The password. Redacted in Debug output.
        password: String,
    },
    /// Public-key authentication with a private key file.
    KeyFile {
        /// Path to the private key. Tilde-expanded at config load.
        path: PathBuf,
        /// Optional passphrase for the key. Redacted in Debug output.
        #[serde(default)]
        passphrase: Option<String>,
    },
    /// Defer to a running SSH agent.
    Agent,
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { .. } => f.debug_struct("Password").field("password", &"***").finish(),
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "***"))
                .finish(),
            Self::Agent => write!(f, "Agent"),
        }
    }
}

// ============================================================================
// KnownHostsPolicy
// ============================================================================

/// Host-key verification policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnownHostsPolicy {
    /// Verify the host key against the user's known-hosts file.
    #[default]
    Strict,
    /// Accept any host key. Only sane against throwaway test fixtures.
    AcceptAny,
}

// ============================================================================
// RemotePlatform
// ============================================================================

/// Operating system of the remote host.
///
/// Decides which installer and probe command lines are used; automatic
/// server installation is only available on Linux and macOS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemotePlatform {
    /// Linux remote host.
    #[default]
    Linux,
    /// macOS remote host.
    MacOs,
    /// Windows remote host (no automatic installation).
    Windows,
}

impl RemotePlatform {
    /// Lowercase platform name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for RemotePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Options for one remote session.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionOptions {
    /// Remote hostname or address.
    pub host: String,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username on the remote host.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Host-key verification policy.
    #[serde(default)]
    pub known_hosts: KnownHostsPolicy,

    /// Remote operating system.
    #[serde(default)]
    pub platform: RemotePlatform,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Keepalive interval in seconds (0 disables keepalives).
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_keepalive() -> u64 {
    DEFAULT_KEEPALIVE_SECS
}

impl SessionOptions {
    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(Error::config("username must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must not be zero"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::config("connect timeout must not be zero"));
        }
        Ok(())
    }

    /// The `host:port` pair to dial.
    pub fn connect_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Keepalive interval, `None` when disabled.
    pub fn keepalive(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn options() -> SessionOptions {
        SessionOptions {
            host: "10.0.0.5".into(),
            port: 22,
            username: "worker".into(),
            auth: AuthMethod::Password {
                password: "hunter2".into(),
            },
            known_hosts: KnownHostsPolicy::AcceptAny,
            platform: RemotePlatform::Linux,
            connect_timeout_secs: 30,
            keepalive_secs: 30,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(options().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_host() {
        let mut opts = options();
        opts.host = "  ".into();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_empty_username() {
        let mut opts = options();
        opts.username = String::new();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut opts = options();
        opts.port = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_password_debug_redacted() {
        let auth = AuthMethod::Password {
            password: "hunter2".into(),
        };
        let debug = format!("{auth:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_key_passphrase_debug_redacted() {
        let auth = AuthMethod::KeyFile {
            path: PathBuf::from("/home/worker/.ssh/id_ed25519"),
            passphrase: Some("secret".into()),
        };
        let debug = format!("{auth:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("id_ed25519"));
    }

    #[test]
    fn test_session_options_debug_redacts_password() {
        let debug = format!("{:?}", options());
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_keepalive_disabled() {
        let mut opts = options();
        opts.keepalive_secs = 0;
        assert_eq!(opts.keepalive(), None);

        opts.keepalive_secs = 15;
        assert_eq!(opts.keepalive(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_deserialize_defaults() {
        let toml_str = r#"
            host = "worker.example.com"
            username = "ci"
            auth = { method = "agent" }
        "#;
        let opts: SessionOptions = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.port, 22);
        assert_eq!(opts.known_hosts, KnownHostsPolicy::Strict);
        assert_eq!(opts.platform, RemotePlatform::Linux);
        assert_eq!(opts.auth, AuthMethod::Agent);
        assert_eq!(opts.connect_timeout_secs, 30);
    }

    #[test]
    fn test_deserialize_key_file_auth() {
        let toml_str = r#"
            host = "worker.example.com"
            username = "ci"
            platform = "mac-os"
            auth = { method = "key-file", path = "~/.ssh/id_ed25519" }
        "#;
        let opts: SessionOptions = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.platform, RemotePlatform::MacOs);
        let AuthMethod::KeyFile { path, passphrase } = opts.auth else {
            unreachable!("Expected KeyFile auth");
        };
        assert_eq!(path, PathBuf::from("~/.ssh/id_ed25519"));
        assert_eq!(passphrase, None);
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(RemotePlatform::Linux.to_string(), "linux");
        assert_eq!(RemotePlatform::MacOs.to_string(), "macos");
        assert_eq!(RemotePlatform::Windows.to_string(), "windows");
    }
}
