//! Network fetch of the latest Roblox client version
//!
//! One GET against the client-settings endpoint, time-bounded so a slow
//! upstream cannot stall callers waiting on the cache lock. The fetcher is
//! stateless; staleness and cooldown policy belong to [`crate::cache`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default endpoint for the Windows desktop client version.
pub const WINDOWS_CLIENT_VERSION_ENDPOINT: &str =
    "https://clientsettings.roblox.com/v2/client-version/WindowsPlayer";

/// A version/date pair as reported by the remote source.
///
/// `date` is absent when the endpoint does not report a release date; the
/// rendering layer shows "Unknown" in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub date: Option<String>,
}

/// Wire shape of the client-settings response. Fields other than `version`
/// (`clientVersionUpload`, `bootstrapperVersion`, ...) are ignored.
#[derive(Debug, Deserialize)]
struct ClientVersionResponse {
    version: String,
    #[serde(default)]
    date: Option<String>,
}

/// Abstraction over the remote version source.
///
/// Uses a `Pin<Box<dyn Future>>` return type for dyn-compatibility
/// (`Arc<dyn VersionFetcher>` in the cache).
pub trait VersionFetcher: Send + Sync {
    /// Fetch the latest version. Must be time-bounded; a timeout resolves
    /// to a fetch failure, never a hang.
    fn fetch_latest(&self) -> Pin<Box<dyn Future<Output = Result<VersionInfo>> + Send + '_>>;
}

/// reqwest-backed fetcher against the Roblox client-settings API.
pub struct ClientSettingsFetcher {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ClientSettingsFetcher {
    pub fn new(client: reqwest::Client, endpoint: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }

    async fn fetch(&self) -> Result<VersionInfo> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("version request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Fetch(format!(
                "version endpoint returned {status}: {body}"
            )));
        }

        let parsed = response
            .json::<ClientVersionResponse>()
            .await
            .map_err(|e| Error::Fetch(format!("invalid version response: {e}")))?;

        debug!(version = %parsed.version, "fetched client version");
        Ok(VersionInfo {
            version: parsed.version,
            date: parsed.date,
        })
    }
}

impl VersionFetcher for ClientSettingsFetcher {
    fn fetch_latest(&self) -> Pin<Box<dyn Future<Output = Result<VersionInfo>> + Send + '_>> {
        Box::pin(self.fetch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port, then close.
    async fn one_shot_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the request head before answering
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 || buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}")
    }

    #[test]
    fn response_parses_without_date() {
        let json = r#"{"version":"0.625.0.6250456","clientVersionUpload":"version-abc123"}"#;
        let parsed: ClientVersionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.version, "0.625.0.6250456");
        assert!(parsed.date.is_none());
    }

    #[test]
    fn response_parses_with_date() {
        let json = r#"{"version":"0.625.0.6250456","date":"2024-05-14"}"#;
        let parsed: ClientVersionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.date.as_deref(), Some("2024-05-14"));
    }

    #[test]
    fn default_endpoint_targets_windows_player() {
        assert_eq!(
            WINDOWS_CLIENT_VERSION_ENDPOINT,
            "https://clientsettings.roblox.com/v2/client-version/WindowsPlayer"
        );
    }

    #[tokio::test]
    async fn fetch_latest_parses_success_response() {
        let url = one_shot_server(
            "HTTP/1.1 200 OK",
            r#"{"version":"0.625.0.6250456","clientVersionUpload":"version-abc123"}"#,
        )
        .await;
        let fetcher =
            ClientSettingsFetcher::new(reqwest::Client::new(), url, Duration::from_secs(5));

        let info = fetcher.fetch_latest().await.unwrap();
        assert_eq!(info.version, "0.625.0.6250456");
        assert!(info.date.is_none());
    }

    #[tokio::test]
    async fn fetch_latest_maps_server_error_to_fetch_failure() {
        let url = one_shot_server("HTTP/1.1 500 Internal Server Error", "{}").await;
        let fetcher =
            ClientSettingsFetcher::new(reqwest::Client::new(), url, Duration::from_secs(5));

        let err = fetcher.fetch_latest().await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)), "got: {err:?}");
        assert!(err.to_string().contains("500"), "got: {err}");
    }

    #[tokio::test]
    async fn fetch_latest_times_out_instead_of_hanging() {
        // Accept the connection but never answer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let fetcher = ClientSettingsFetcher::new(
            reqwest::Client::new(),
            format!("http://{addr}"),
            Duration::from_millis(100),
        );
        let err = fetcher.fetch_latest().await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)), "got: {err:?}");
    }
}
