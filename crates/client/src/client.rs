//! WebSocket client for the server's job-event endpoint.
//!
//! [`JobSocketClient`] holds the connection configuration. Call
//! [`JobSocketClient::connect`] to open a live [`JobSocket`].

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Path of the job-event endpoint (`/ws/jobs`) relative to the WebSocket
/// base URL.
pub const JOBS_WS_SEGMENTS: &[&str] = &["ws", "jobs"];

/// A live WebSocket connection to the job-event endpoint.
pub type JobSocket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the job-event endpoint.
#[derive(Debug, Clone)]
pub struct JobSocketClient {
    ws_url: String,
    token: Option<String>,
}

impl JobSocketClient {
    /// * `ws_url` - WebSocket base URL, e.g. `wss://api.tellmemo.io`.
    /// * `token`  - access token passed as the `token` query parameter.
    pub fn new(ws_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            token,
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full endpoint URL including the token query parameter, if any.
    /// The token is form-encoded.
    pub fn endpoint_url(&self) -> Result<reqwest::Url, JobSocketError> {
        let invalid = |reason: String| JobSocketError::InvalidUrl(format!("{}: {reason}", self.ws_url));

        let mut url = reqwest::Url::parse(&self.ws_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".into()))?
            .pop_if_empty()
            .extend(JOBS_WS_SEGMENTS);
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    /// Open a WebSocket connection to the job-event endpoint.
    pub async fn connect(&self) -> Result<JobSocket, JobSocketError> {
        let url = self.endpoint_url()?;

        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            JobSocketError::Connection(format!(
                "Failed to connect to job channel at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(ws_url = %self.ws_url, "Connected to job channel");

        Ok(ws_stream)
    }
}

/// Errors that can occur when opening the job socket.
#[derive(Debug, thiserror::Error)]
pub enum JobSocketError {
    /// Failed to establish the WebSocket connection.
    #[error("{0}")]
    Connection(String),

    /// The base URL cannot be turned into an endpoint URL.
    #[error("Invalid job channel URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_without_token() {
        let client = JobSocketClient::new("ws://localhost:8000/", None);
        assert_eq!(client.endpoint_url().unwrap().as_str(), "ws://localhost:8000/ws/jobs");
    }

    #[test]
    fn endpoint_with_token() {
        let client = JobSocketClient::new("wss://api.example.com", Some("abc".into()));
        assert_eq!(
            client.endpoint_url().unwrap().as_str(),
            "wss://api.example.com/ws/jobs?token=abc"
        );
    }

    #[test]
    fn empty_token_is_omitted() {
        let client = JobSocketClient::new("ws://h", Some(String::new()));
        assert_eq!(client.endpoint_url().unwrap().as_str(), "ws://h/ws/jobs");
    }

    #[test]
    fn token_is_query_encoded() {
        let client = JobSocketClient::new("ws://h/base", Some("a b&c=d".into()));
        assert_eq!(
            client.endpoint_url().unwrap().as_str(),
            "ws://h/base/ws/jobs?token=a+b%26c%3Dd"
        );
    }

    #[test]
    fn unparseable_base_url_is_rejected() {
        let client = JobSocketClient::new("localhost:8000", None);
        assert!(matches!(client.endpoint_url(), Err(JobSocketError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = JobSocketClient::new(format!("ws://{addr}"), None);
        match client.connect().await {
            Err(e @ JobSocketError::Connection(_)) => {
                assert!(e.to_string().starts_with("Failed to connect to job channel"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
