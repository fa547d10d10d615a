//! SFTP subsystem access.

use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use tether_core::{Error, Result};

use crate::session::SshSession;

impl SshSession {
    /// Open the SFTP subsystem on this session.
    pub async fn sftp(&self) -> Result<SftpClient> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::ssh(format!("channel open failed: {e}")))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::ssh(format!("sftp subsystem request failed: {e}")))?;

        let inner = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::ssh(format!("sftp handshake failed: {e}")))?;

        tracing::debug!(host = %self.host, "SFTP subsystem opened");
        Ok(SftpClient { inner })
    }
}

/// Typed file operations over one SFTP subsystem channel.
pub struct SftpClient {
    inner: SftpSession,
}

impl SftpClient {
    /// List the names of entries in a remote directory.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let entries = self
            .inner
            .read_dir(path)
            .await
            .map_err(|e| Error::ssh(format!("sftp read_dir {path}: {e}")))?;
        Ok(entries.map(|entry| entry.file_name()).collect())
    }

    /// Read a remote file into memory.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .inner
            .open(path)
            .await
            .map_err(|e| Error::ssh(format!("sftp open {path}: {e}")))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| Error::ssh(format!("sftp read {path}: {e}")))?;
        Ok(buf)
    }

    /// Create or replace a remote file with the given contents.
    pub async fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut file = self
            .inner
            .create(path)
            .await
            .map_err(|e| Error::ssh(format!("sftp create {path}: {e}")))?;
        file.write_all(contents)
            .await
            .map_err(|e| Error::ssh(format!("sftp write {path}: {e}")))?;
        file.shutdown()
            .await
            .map_err(|e| Error::ssh(format!("sftp close {path}: {e}")))?;
        Ok(())
    }

    /// Remove a remote file.
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.inner
            .remove_file(path)
            .await
            .map_err(|e| Error::ssh(format!("sftp remove {path}: {e}")))
    }

    /// Size of a remote file in bytes, if the server reports one.
    pub async fn size(&self, path: &str) -> Result<Option<u64>> {
        let metadata = self
            .inner
            .metadata(path)
            .await
            .map_err(|e| Error::ssh(format!("sftp metadata {path}: {e}")))?;
        Ok(metadata.size)
    }
}

impl std::fmt::Debug for SftpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpClient").finish_non_exhaustive()
    }
}
