//! # Metrics Client
//!
//! Reads a server's memory limit and current resource usage from the panel's client api.
//!

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::error::FetchError;

/// One point-in-time read of a server's resource usage.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResourceSnapshot {
    pub memory_bytes: u64,
    pub uptime_ms: u64,
}

/// A source of server metrics; implemented by `PanelClient`.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// The configured memory limit of the server.
    async fn memory_ceiling(&self, server_id: &str) -> Result<u64, FetchError>;

    /// The server's current memory usage and uptime.
    async fn resource_snapshot(&self, server_id: &str) -> Result<ResourceSnapshot, FetchError>;
}

/// Credentials sent with every request.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// Sent as `Authorization: Bearer <api_key>`
    pub api_key: String,

    /// The name of the session cookie, e.g. "pterodactyl_session"
    pub cookie_name: String,

    /// The value of the session cookie
    pub session: String,
}

pub struct PanelClient {
    /// The url of the client api, without a trailing slash.
    ///
    /// e.g. https://panel.example.com/api/client
    base_url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl PanelClient {
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Self {
        PanelClient {
            base_url: base_url.trim_end_matches('/').to_owned(),
            credentials,
            timeout,
        }
    }

    pub fn server_url(&self, server_id: &str) -> String {
        format!("{}/servers/{}", self.base_url, server_id)
    }

    pub fn resources_url(&self, server_id: &str) -> String {
        format!("{}/servers/{}/resources", self.base_url, server_id)
    }

    /// Make an authenticated GET request and decode the json response
    async fn get_json<T>(&self, url: &str) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let request = surf::get(url)
            .header(
                "Authorization",
                format!("Bearer {}", self.credentials.api_key),
            )
            .header(
                "Cookie",
                format!(
                    "{}={}",
                    self.credentials.cookie_name, self.credentials.session
                ),
            )
            .header("Accept", "application/json");
        async_std::future::timeout(self.timeout, async {
            let mut response = request.await.map_err(FetchError::Request)?;
            if !response.status().is_success() {
                return Err(FetchError::Status(response.status()));
            }
            response.body_json::<T>().await.map_err(FetchError::Decode)
        })
        .await
        .map_err(|_| FetchError::Timeout)?
    }
}

#[async_trait]
impl MetricsSource for PanelClient {
    async fn memory_ceiling(&self, server_id: &str) -> Result<u64, FetchError> {
        let response: ServerResponse = self.get_json(&self.server_url(server_id)).await?;
        Ok(response.attributes.limits.memory)
    }

    async fn resource_snapshot(&self, server_id: &str) -> Result<ResourceSnapshot, FetchError> {
        let response: ResourcesResponse = self.get_json(&self.resources_url(server_id)).await?;
        let resources = response.attributes.resources;
        Ok(ResourceSnapshot {
            memory_bytes: resources.memory_bytes,
            uptime_ms: resources.uptime,
        })
    }
}

/* Response bodies; unknown fields are ignored */

#[derive(Deserialize)]
struct ServerResponse {
    attributes: ServerAttributes,
}

#[derive(Deserialize)]
struct ServerAttributes {
    limits: ServerLimits,
}

#[derive(Deserialize)]
struct ServerLimits {
    memory: u64,
}

#[derive(Deserialize)]
struct ResourcesResponse {
    attributes: ResourcesAttributes,
}

#[derive(Deserialize)]
struct ResourcesAttributes {
    resources: Resources,
}

#[derive(Deserialize)]
struct Resources {
    memory_bytes: u64,
    uptime: u64,
}

#[cfg(test)]
mod test {
    use super::*;
    use async_std::io::{ReadExt, WriteExt};
    use async_std::net::TcpListener;
    use async_std::task::JoinHandle;

    /// Serve a single http response on a local port.
    ///
    /// Returns the base url and a handle resolving to the raw request that was received.
    async fn respond_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = async_std::task::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{}/api/client", addr), handle)
    }

    fn client(base_url: &str) -> PanelClient {
        let credentials = Credentials {
            api_key: "ptlc_secret".into(),
            cookie_name: "pterodactyl_session".into(),
            session: "abc123".into(),
        };
        PanelClient::new(base_url, credentials, Duration::from_secs(5))
    }

    #[test]
    fn builds_urls() {
        let client = client("https://panel.example.com/api/client/");
        assert_eq!(
            client.server_url("5"),
            "https://panel.example.com/api/client/servers/5"
        );
        assert_eq!(
            client.resources_url("5"),
            "https://panel.example.com/api/client/servers/5/resources"
        );
    }

    #[async_std::test]
    async fn fetches_memory_ceiling() {
        let (url, request) = respond_once(
            "200 OK",
            r#"{"object":"server","attributes":{"identifier":"5","limits":{"memory":536870912,"swap":0,"disk":1024}}}"#,
        )
        .await;
        let ceiling = client(&url).memory_ceiling("5").await.unwrap();
        assert_eq!(ceiling, 536_870_912);

        // It sends the request path and both credentials
        let request = request.await.to_lowercase();
        assert!(request.starts_with("get /api/client/servers/5 "));
        assert!(request.contains("authorization: bearer ptlc_secret"));
        assert!(request.contains("cookie: pterodactyl_session=abc123"));
    }

    #[async_std::test]
    async fn fetches_resource_snapshot() {
        let (url, request) = respond_once(
            "200 OK",
            r#"{"object":"stats","attributes":{"current_state":"running","is_suspended":false,"resources":{"memory_bytes":209715200,"cpu_absolute":1.5,"disk_bytes":0,"network_rx_bytes":0,"network_tx_bytes":0,"uptime":60000}}}"#,
        )
        .await;
        let snapshot = client(&url).resource_snapshot("5").await.unwrap();
        assert_eq!(
            snapshot,
            ResourceSnapshot {
                memory_bytes: 209_715_200,
                uptime_ms: 60_000,
            }
        );
        let request = request.await.to_lowercase();
        assert!(request.starts_with("get /api/client/servers/5/resources "));
    }

    #[async_std::test]
    async fn rejects_error_status() {
        let (url, _request) = respond_once("500 Internal Server Error", r#"{"errors":[]}"#).await;
        match client(&url).resource_snapshot("5").await {
            Err(FetchError::Status(status)) => assert_eq!(status, surf::StatusCode::InternalServerError),
            other => panic!("expected a status error, got {:?}", other),
        }
    }

    #[async_std::test]
    async fn rejects_unexpected_body() {
        let (url, _request) = respond_once("200 OK", r#"{"attributes":{}}"#).await;
        match client(&url).memory_ceiling("5").await {
            Err(FetchError::Decode(_)) => (),
            other => panic!("expected a decode error, got {:?}", other),
        }
    }

    #[async_std::test]
    async fn reports_unreachable_server() {
        // Bind then drop a listener so the port is (very likely) closed
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let url = format!("http://{}/api/client", addr);
        assert!(client(&url).resource_snapshot("5").await.is_err());
    }
}
