//! HTTP client for the worker server's API, reached over the forwarded port.

use serde::Deserialize;

use tether_core::{Error, Result};

/// Status report from a running worker server.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerStatus {
    /// Server version string.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Number of live kernels.
    pub kernel_count: usize,
}

/// One compute kernel managed by the worker server.
#[derive(Clone, Debug, Deserialize)]
pub struct KernelInfo {
    /// Kernel identifier.
    pub id: String,
    /// Kernel execution state (`idle`, `busy`, `starting`, `dead`).
    pub state: String,
}

/// Token-authenticated client for one worker server.
#[derive(Clone)]
pub struct WorkerApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl WorkerApi {
    /// Build a client for the server behind `base_url` (the forwarded local
    /// port), authenticating with `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await
            .map_err(|e| Error::http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), message));
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.get(self.endpoint(path))).await?;
        response
            .json()
            .await
            .map_err(|e| Error::http(format!("invalid response body: {e}")))
    }

    /// Fetch the server's status report.
    pub async fn status(&self) -> Result<ServerStatus> {
        self.get_json("status").await
    }

    /// Ask the server to shut itself down.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(self.client.post(self.endpoint("shutdown"))).await?;
        Ok(())
    }

    /// List live kernels.
    pub async fn list_kernels(&self) -> Result<Vec<KernelInfo>> {
        self.get_json("kernels").await
    }

    /// Start a new kernel and return its info.
    pub async fn start_kernel(&self) -> Result<KernelInfo> {
        let response = self.send(self.client.post(self.endpoint("kernels"))).await?;
        response
            .json()
            .await
            .map_err(|e| Error::http(format!("invalid response body: {e}")))
    }

    /// Fetch one kernel's info.
    pub async fn kernel_info(&self, id: &str) -> Result<KernelInfo> {
        self.get_json(&format!("kernels/{id}")).await
    }

    /// Interrupt a running kernel.
    pub async fn interrupt_kernel(&self, id: &str) -> Result<()> {
        self.send(
            self.client
                .post(self.endpoint(&format!("kernels/{id}/interrupt"))),
        )
        .await?;
        Ok(())
    }

    /// Shut a kernel down.
    pub async fn shutdown_kernel(&self, id: &str) -> Result<()> {
        self.send(self.client.delete(self.endpoint(&format!("kernels/{id}"))))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for WorkerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerApi")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let api = WorkerApi::new("http://127.0.0.1:8740", "t");
        assert_eq!(api.endpoint("status"), "http://127.0.0.1:8740/api/status");
        assert_eq!(
            api.endpoint("/kernels/k-1"),
            "http://127.0.0.1:8740/api/kernels/k-1"
        );
    }

    #[test]
    fn test_trailing_slash_normalized() {
        let api = WorkerApi::new("http://127.0.0.1:8740/", "t");
        assert_eq!(api.endpoint("status"), "http://127.0.0.1:8740/api/status");
    }

    #[test]
    fn test_debug_redacts_token() {
        let api = WorkerApi::new("http://127.0.0.1:8740", "topsecret");
        let debug = format!("{api:?}");
        assert!(!debug.contains("topsecret"));
    }

    #[test]
    fn test_kernel_info_deserializes() {
        let json = r#"{"id": "k-7", "state": "idle"}"#;
        let info: KernelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id, "k-7");
        assert_eq!(info.state, "idle");
    }

    #[test]
    fn test_server_status_deserializes() {
        let json = r#"{"version": "1.4.2", "uptime_secs": 120, "kernel_count": 2}"#;
        let status: ServerStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.version, "1.4.2");
        assert_eq!(status.kernel_count, 2);
    }
}
