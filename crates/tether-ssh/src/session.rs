//! SSH session establishment, authentication, and liveness.

use std::sync::Arc;

use russh::client;
use tokio::sync::watch;

use tether_core::{AuthMethod, Error, KnownHostsPolicy, Result, SessionOptions};

/// How often the background monitor polls the underlying connection.
const LIVENESS_POLL_MILLIS: u64 = 1000;

// ============================================================================
// ClientHandler
// ============================================================================

/// russh client handler carrying the host-key policy.
pub(crate) struct ClientHandler {
    policy: KnownHostsPolicy,
    host: String,
    port: u16,
}

impl ClientHandler {
    fn new(policy: KnownHostsPolicy, host: &str, port: u16) -> Self {
        Self {
            policy,
            host: host.to_string(),
            port,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.policy {
            KnownHostsPolicy::AcceptAny => Ok(true),
            KnownHostsPolicy::Strict => {
                let known = russh::keys::check_known_hosts(&self.host, self.port, server_public_key)
                    .map_err(|e| {
                        tracing::error!(host = %self.host, error = %e, "known-hosts check failed");
                        russh::Error::UnknownKey
                    })?;
                if !known {
                    tracing::error!(
                        host = %self.host,
                        "server key is not in known_hosts, refusing connection"
                    );
                }
                Ok(known)
            }
        }
    }
}

// ============================================================================
// SshSession
// ============================================================================

/// An authenticated SSH session to one remote host.
///
/// Cheap to clone (Arc internals). All channel-based operations
/// ([`run`](crate::exec), [`forward`](crate::forward), [`sftp`](crate::sftp))
/// borrow the shared connection handle.
#[derive(Clone)]
pub struct SshSession {
    pub(crate) handle: Arc<client::Handle<ClientHandler>>,
    pub(crate) host: String,
    username: String,
    alive_tx: Arc<watch::Sender<bool>>,
}

impl SshSession {
    /// Connect and authenticate per the session options.
    ///
    /// Dials with the configured timeout, verifies the host key per the
    /// known-hosts policy, then authenticates. Authentication refusal is
    /// reported as [`Error::Auth`], distinct from transport failures.
    pub async fn connect(options: &SessionOptions) -> Result<Self> {
        options.validate()?;

        let mut config = client::Config::default();
        config.keepalive_interval = options.keepalive();
        let config = Arc::new(config);

        let (host, port) = options.connect_addr();
        let handler = ClientHandler::new(options.known_hosts, &host, port);

        tracing::debug!(host = %host, port, "opening SSH connection");
        let mut handle = tokio::time::timeout(
            options.connect_timeout(),
            client::connect(config, (host.as_str(), port), handler),
        )
        .await
        .map_err(|_| Error::Timeout {
            seconds: options.connect_timeout_secs,
        })?
        .map_err(|e| Error::ssh(format!("connect to {host}:{port} failed: {e}")))?;

        authenticate(&mut handle, &options.username, &options.auth, &host).await?;
        tracing::info!(host = %host, username = %options.username, "SSH connection opened");

        let handle = Arc::new(handle);
        let (alive_tx, _) = watch::channel(true);
        let alive_tx = Arc::new(alive_tx);
        spawn_liveness_monitor(Arc::clone(&handle), Arc::clone(&alive_tx), host.clone());

        Ok(Self {
            handle,
            host,
            username: options.username.clone(),
            alive_tx,
        })
    }

    /// The remote host this session is connected to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The username this session authenticated as.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether the underlying connection is still open.
    pub fn is_connected(&self) -> bool {
        *self.alive_tx.borrow() && !self.handle.is_closed()
    }

    /// Subscribe to liveness changes; the value flips to `false` once when
    /// the link is lost and never recovers for this session object.
    pub fn subscribe_liveness(&self) -> watch::Receiver<bool> {
        self.alive_tx.subscribe()
    }

    /// Mark the session lost after a transport-level failure.
    pub(crate) fn mark_lost(&self) {
        if *self.alive_tx.borrow() {
            tracing::warn!(host = %self.host, "SSH connection lost");
            self.alive_tx.send_replace(false);
        }
    }

    /// Gracefully close the session.
    pub async fn close(&self) -> Result<()> {
        tracing::debug!(host = %self.host, "closing SSH connection");
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| Error::ssh(format!("disconnect failed: {e}")))?;
        self.alive_tx.send_replace(false);
        tracing::info!(host = %self.host, "SSH connection closed");
        Ok(())
    }
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Authenticate the freshly connected handle.
async fn authenticate(
    handle: &mut client::Handle<ClientHandler>,
    username: &str,
    auth: &AuthMethod,
    host: &str,
) -> Result<()> {
    let authed = match auth {
        AuthMethod::Password { password } => handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| Error::ssh(format!("password auth transport error: {e}")))?
            .success(),
        AuthMethod::KeyFile { path, passphrase } => {
            let key = russh::keys::load_secret_key(path, passphrase.as_deref())
                .map_err(|e| Error::ssh(format!("cannot load key {}: {e}", path.display())))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| Error::ssh(format!("publickey auth transport error: {e}")))?
                .flatten();
            handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(|e| Error::ssh(format!("publickey auth transport error: {e}")))?
                .success()
        }
        AuthMethod::Agent => authenticate_with_agent(handle, username).await?,
    };

    if !authed {
        return Err(Error::auth(username, host));
    }
    Ok(())
}

/// Try every identity the SSH agent offers, in order.
async fn authenticate_with_agent(
    handle: &mut client::Handle<ClientHandler>,
    username: &str,
) -> Result<bool> {
    let mut agent = russh::keys::agent::client::AgentClient::connect_env()
        .await
        .map_err(|e| Error::ssh(format!("cannot reach SSH agent: {e}")))?;
    let identities = agent
        .request_identities()
        .await
        .map_err(|e| Error::ssh(format!("agent identity listing failed: {e}")))?;

    if identities.is_empty() {
        return Err(Error::ssh("SSH agent holds no identities"));
    }

    let rsa_hash = handle
        .best_supported_rsa_hash()
        .await
        .map_err(|e| Error::ssh(format!("agent auth transport error: {e}")))?
        .flatten();

    for key in identities {
        let public_key = key.public_key().into_owned();
        let hash_alg = if public_key.algorithm().is_rsa() {
            rsa_hash
        } else {
            None
        };
        let result = handle
            .authenticate_publickey_with(username, public_key, hash_alg, &mut agent)
            .await;
        match result {
            Ok(authed) if authed.success() => return Ok(true),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "agent key refused, trying next");
                continue;
            }
        }
    }
    Ok(false)
}

/// Poll the handle until it closes, then flip the liveness flag.
fn spawn_liveness_monitor(
    handle: Arc<client::Handle<ClientHandler>>,
    alive_tx: Arc<watch::Sender<bool>>,
    host: String,
) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(LIVENESS_POLL_MILLIS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if handle.is_closed() {
                if *alive_tx.borrow() {
                    tracing::warn!(host = %host, "SSH connection closed by peer");
                    alive_tx.send_replace(false);
                }
                break;
            }
            // Stop monitoring once nobody can observe the flag anymore.
            if alive_tx.receiver_count() == 0 && Arc::strong_count(&alive_tx) == 1 {
                break;
            }
        }
    });
}
