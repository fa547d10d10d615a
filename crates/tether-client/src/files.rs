//! Remote file services over the session's SFTP subsystem.

use tether_core::Result;
use tether_ssh::SftpClient;

/// File operations against the remote host, scoped to one SFTP channel.
#[derive(Debug)]
pub struct FileServices {
    sftp: SftpClient,
}

impl FileServices {
    /// Wrap an open SFTP channel.
    pub fn new(sftp: SftpClient) -> Self {
        Self { sftp }
    }

    /// List entry names in a remote directory.
    pub async fn list(&self, path: &str) -> Result<Vec<String>> {
        self.sftp.read_dir(path).await
    }

    /// Download a remote file into memory.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.sftp.read(path).await
    }

    /// Create or replace a remote file.
    pub async fn upload(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.sftp.write(path, contents).await
    }

    /// Remove a remote file.
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.sftp.remove(path).await
    }

    /// Size of a remote file in bytes, if known.
    pub async fn size(&self, path: &str) -> Result<Option<u64>> {
        self.sftp.size(path).await
    }
}
