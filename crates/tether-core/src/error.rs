//! Error types for the Tether workspace.

/// Errors that can occur while managing a remote session.
///
/// All error variants are marked with `#[non_exhaustive]` to allow
/// adding new error types without breaking changes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// SSH transport error (connect, channel open, exec plumbing).
    #[error("SSH error: {message}")]
    Ssh {
        /// Human-readable error message
        message: String,
    },

    /// Authentication was refused by the remote host.
    #[error("Authentication failed for {username}@{host}")]
    Auth {
        /// Username offered to the host
        username: String,
        /// Host that refused the credentials
        host: String,
    },

    /// I/O error (sockets, key files, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Worker server HTTP API error.
    #[error("HTTP error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Http {
        /// HTTP status code, if a response was received
        status: Option<u16>,
        /// What went wrong
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// Operation timed out.
    #[error("Timed out after {seconds}s")]
    Timeout {
        /// Timeout duration in seconds
        seconds: u64,
    },

    /// Installing the worker server on the remote host failed.
    #[error("Server installation failed: {message}")]
    ServerInstall {
        /// Installer output or failure description
        message: String,
    },

    /// The worker server did not come up after being started.
    #[error("Server start failed: {message}")]
    ServerStart {
        /// Failure description
        message: String,
    },

    /// The remote server version is newer than this client supports.
    #[error("Server version {version} is not supported (maximum {max})")]
    VersionRejected {
        /// Version reported by the remote host
        version: String,
        /// Maximum version this client accepts
        max: String,
    },

    /// Local port forwarding failed.
    #[error("Port forward error: {message}")]
    PortForward {
        /// Failure description
        message: String,
    },

    /// An operation requiring a live session was called without one.
    #[error("Not connected to the remote host")]
    NotConnected,

    /// Automatic server installation is not available for this platform.
    #[error("Unsupported remote platform: {platform}")]
    UnsupportedPlatform {
        /// Platform name
        platform: String,
    },
}

/// Convenience `Result` type alias for Tether operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns whether this error is retryable.
    ///
    /// Retryable errors are transient transport failures: a reconnect or a
    /// later attempt may succeed. Credential, configuration, and version
    /// errors are permanent until the user changes something.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ssh { .. } => true,
            Error::Io(_) => true,
            Error::Http { .. } => true,
            Error::Timeout { .. } => true,
            Error::PortForward { .. } => true,
            Error::ServerStart { .. } => true,
            Error::Auth { .. } => false,
            Error::Json(_) => false,
            Error::Config { .. } => false,
            Error::ServerInstall { .. } => false,
            Error::VersionRejected { .. } => false,
            Error::NotConnected => false,
            Error::UnsupportedPlatform { .. } => false,
        }
    }

    /// Creates a new SSH transport error.
    pub fn ssh<S: Into<String>>(message: S) -> Self {
        Error::Ssh {
            message: message.into(),
        }
    }

    /// Creates a new authentication error.
    pub fn auth<U, H>(username: U, host: H) -> Self
    where
        U: Into<String>,
        H: Into<String>,
    {
        Error::Auth {
            username: username.into(),
            host: host.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a new HTTP error without a status code.
    pub fn http<S: Into<String>>(message: S) -> Self {
        Error::Http {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a new HTTP error carrying a response status.
    pub fn http_status<S: Into<String>>(status: u16, message: S) -> Self {
        Error::Http {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a new port forwarding error.
    pub fn port_forward<S: Into<String>>(message: S) -> Self {
        Error::PortForward {
            message: message.into(),
        }
    }

    /// Creates a new server installation error.
    pub fn server_install<S: Into<String>>(message: S) -> Self {
        Error::ServerInstall {
            message: message.into(),
        }
    }

    /// Creates a new server start error.
    pub fn server_start<S: Into<String>>(message: S) -> Self {
        Error::ServerStart {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ssh("channel open failed");
        assert_eq!(err.to_string(), "SSH error: channel open failed");
    }

    #[test]
    fn test_auth_error_display() {
        let err = Error::auth("worker", "10.0.0.5");
        assert_eq!(err.to_string(), "Authentication failed for worker@10.0.0.5");
    }

    #[test]
    fn test_http_error_display_with_status() {
        let err = Error::http_status(503, "service unavailable");
        assert_eq!(err.to_string(), "HTTP error (503): service unavailable");
    }

    #[test]
    fn test_http_error_display_without_status() {
        let err = Error::http("connection refused");
        assert_eq!(err.to_string(), "HTTP error: connection refused");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ssh("lost").is_retryable());
        assert!(Error::Timeout { seconds: 30 }.is_retryable());
        assert!(Error::port_forward("bind failed").is_retryable());
        assert!(Error::server_start("no info").is_retryable());

        assert!(!Error::auth("u", "h").is_retryable());
        assert!(!Error::config("bad port").is_retryable());
        assert!(!Error::NotConnected.is_retryable());
        assert!(
            !Error::VersionRejected {
                version: "3.0.0".into(),
                max: "2.0.0".into(),
            }
            .is_retryable()
        );
        assert!(
            !Error::UnsupportedPlatform {
                platform: "windows".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_io_error_is_retryable() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io_error.into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_json_error_not_retryable() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: Error = serde_err.into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_version_rejected_display() {
        let err = Error::VersionRejected {
            version: "3.1.0".into(),
            max: "2.0.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "Server version 3.1.0 is not supported (maximum 2.0.0)"
        );
    }

    #[test]
    fn test_error_implements_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
