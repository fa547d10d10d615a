//! Command lines for managing the worker server on the remote host.
//!
//! The worker server lives in its own micromamba environment under the
//! remote user's home, so nothing here depends on the remote login shell's
//! configuration beyond `$HOME` itself.

use tether_core::{Error, RemotePlatform, Result};

/// Name of the remote environment the worker server is installed into.
pub const SERVER_ENV: &str = "tether-env";

/// URL of the installer script piped to the remote shell.
const INSTALL_SCRIPT_URL: &str = "https://get.tether-rs.dev/install.sh";

/// Command that starts the worker server in the foreground.
pub fn start_command() -> String {
    format!("${{HOME}}/.local/bin/micromamba run -n {SERVER_ENV} tether-server")
}

/// Command that prints the running server's info JSON as its last line.
pub fn info_command() -> String {
    format!("${{HOME}}/.local/bin/micromamba run -n {SERVER_ENV} tether-server info")
}

/// Command that prints the installed server version as its last line.
///
/// Works on every platform: a preinstalled server can be used even where
/// automatic installation is unavailable.
pub fn version_command(platform: RemotePlatform) -> String {
    match platform {
        RemotePlatform::Linux | RemotePlatform::MacOs => {
            format!("${{HOME}}/.local/bin/micromamba run -n {SERVER_ENV} tether-server --version")
        }
        RemotePlatform::Windows => format!(
            "%USERPROFILE%\\.local\\bin\\micromamba.exe run -n {SERVER_ENV} tether-server --version"
        ),
    }
}

/// Command that installs (or reinstalls) the worker server.
///
/// Automatic installation is only available on Unix-like remotes.
pub fn install_command(platform: RemotePlatform) -> Result<String> {
    match platform {
        RemotePlatform::Linux | RemotePlatform::MacOs => Ok(format!(
            "curl -LsSf {INSTALL_SCRIPT_URL} | sh -s -- --env {SERVER_ENV}"
        )),
        RemotePlatform::Windows => Err(Error::UnsupportedPlatform {
            platform: platform.to_string(),
        }),
    }
}
