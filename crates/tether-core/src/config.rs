//! TOML session configuration.
//!
//! A config file holds one `[sessions.<name>]` table per remote host:
//!
//! ```toml
//! [sessions.gpu-box]
//! host = "gpu-box.internal"
//! username = "worker"
//! auth = { method = "key-file", path = "~/.ssh/id_ed25519" }
//!
//! [sessions.ci-fixture]
//! host = "127.0.0.1"
//! port = 2222
//! username = "ubuntu"
//! known_hosts = "accept-any"
//! auth = { method = "password", password = "fixture" }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::options::{AuthMethod, SessionOptions};

/// Default config file location relative to the user config directory.
const DEFAULT_CONFIG_REL: &str = "tether/config.toml";

/// All configured sessions, keyed by name.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Named session entries.
    #[serde(default)]
    pub sessions: HashMap<String, SessionOptions>,
}

impl SessionConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("invalid config: {e}")))?;

        for (name, options) in &mut config.sessions {
            options
                .validate()
                .map_err(|e| Error::config(format!("session '{name}': {e}")))?;
            expand_key_path(&mut options.auth);
        }
        Ok(config)
    }

    /// The default config file path (`<user config dir>/tether/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(DEFAULT_CONFIG_REL))
    }

    /// Look up a session by name.
    pub fn get(&self, name: &str) -> Result<&SessionOptions> {
        self.sessions
            .get(name)
            .ok_or_else(|| Error::config(format!("no session named '{name}'")))
    }

    /// Names of all configured sessions, sorted.
    pub fn session_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sessions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Tilde-expand the private key path of key-file auth entries.
fn expand_key_path(auth: &mut AuthMethod) {
    if let AuthMethod::KeyFile { path, .. } = auth {
        let expanded = shellexpand::tilde(&path.to_string_lossy().into_owned()).into_owned();
        *path = PathBuf::from(expanded);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
        [sessions.gpu-box]
        host = "gpu-box.internal"
        username = "worker"
        auth = { method = "key-file", path = "~/.ssh/id_ed25519" }

        [sessions.fixture]
        host = "127.0.0.1"
        port = 2222
        username = "ubuntu"
        known_hosts = "accept-any"
        auth = { method = "password", password = "fixture" }
    "#;

    #[test]
    fn test_parse_two_sessions() {
        let config = SessionConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.session_names(), vec!["fixture", "gpu-box"]);

        let fixture = config.get("fixture").unwrap();
        assert_eq!(fixture.port, 2222);
        assert_eq!(fixture.username, "ubuntu");
    }

    #[test]
    fn test_key_path_is_tilde_expanded() {
        let config = SessionConfig::from_toml(CONFIG).unwrap();
        let AuthMethod::KeyFile { path, .. } = &config.get("gpu-box").unwrap().auth else {
            unreachable!("Expected KeyFile auth");
        };
        assert!(
            !path.to_string_lossy().starts_with('~'),
            "tilde should be expanded, got {}",
            path.display()
        );
    }

    #[test]
    fn test_unknown_session_name() {
        let config = SessionConfig::from_toml(CONFIG).unwrap();
        let err = config.get("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_invalid_session_is_rejected_with_name() {
        let bad = r#"
            [sessions.broken]
            host = ""
            username = "worker"
            auth = { method = "agent" }
        "#;
        let err = SessionConfig::from_toml(bad).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(SessionConfig::from_toml("sessions = 42").is_err());
    }

    #[test]
    fn test_empty_config() {
        let config = SessionConfig::from_toml("").unwrap();
        assert!(config.sessions.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.sessions.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionConfig::load(Path::new("/nonexistent/tether.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
