// This file contains the implementation of the MetadataClient struct,
// which handles communication with the image stream metadata API,
// building request URLs, attaching credentials and racing every
// request against the caller's cancellation token.

use crate::error::handlers::StatusHandler;
use crate::error::{Result, SourceError};
use crate::logging::Logger;
use crate::metadata::MetadataApi;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const API_PREFIX: [&str; 2] = ["oapi", "v1"];

pub struct MetadataClientBuilder {
    api_url: String,
    bearer_token: Option<String>,
    skip_tls: bool,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    logger: Logger,
}

impl MetadataClientBuilder {
    /// `api_url` is the API server base URL, e.g. `https://api.example.com:8443`
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            bearer_token: None,
            skip_tls: false,
            timeout: None,
            user_agent: None,
            logger: Logger::default(),
        }
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<MetadataClient> {
        let api_url = Url::parse(&self.api_url)?;
        if api_url.cannot_be_a_base() {
            return Err(SourceError::Config(format!(
                "API URL cannot be used as a base: {}",
                self.api_url
            )));
        }

        let mut builder = Client::builder();
        if self.skip_tls {
            self.logger.warning("TLS verification disabled for metadata API");
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        self.logger
            .detail(&format!("Metadata client for {}", api_url));

        Ok(MetadataClient {
            client,
            api_url,
            bearer_token: self.bearer_token,
            logger: self.logger,
        })
    }
}

/// reqwest-backed [`MetadataApi`] implementation
pub struct MetadataClient {
    client: Client,
    api_url: Url,
    bearer_token: Option<String>,
    logger: Logger,
}

impl MetadataClient {
    pub fn builder(api_url: String) -> MetadataClientBuilder {
        MetadataClientBuilder::new(api_url)
    }

    /// Build an API URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Config(format!("Invalid API URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, context: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        self.logger.request("GET", url.path());
        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let exchange = async move {
            let response = request
                .send()
                .await
                .map_err(|e| SourceError::Transport(format!("Failed to read {}: {}", context, e)))?;
            let status = response.status();
            let body = response.bytes().await.map_err(|e| {
                SourceError::Transport(format!("Failed to read {} body: {}", context, e))
            })?;

            self.logger
                .detail(&format!("{} responded {} ({} bytes)", context, status, body.len()));

            if !status.is_success() {
                return Err(StatusHandler::handle_error(status, &body, context));
            }
            Ok(body.to_vec())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SourceError::Cancelled),
            result = exchange => result,
        }
    }
}

#[async_trait]
impl MetadataApi for MetadataClient {
    async fn fetch_image_stream(
        &self,
        namespace: &str,
        stream: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let url = self.endpoint(&["namespaces", namespace, "imagestreams", stream])?;
        let context = format!("imagestream {}/{}", namespace, stream);
        self.get(url, &context, cancel).await
    }

    async fn fetch_image_object(
        &self,
        namespace: &str,
        stream: &str,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let name = format!("{}@{}", stream, image);
        let url = self.endpoint(&["namespaces", namespace, "imagestreamimages", &name])?;
        let context = format!("imagestreamimage {}/{}", namespace, name);
        self.get(url, &context, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one canned HTTP response and hand back the request head.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&buf[..read]).to_string());
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        (format!("http://{}", addr), rx)
    }

    fn client(api_url: String) -> MetadataClient {
        MetadataClient::builder(api_url)
            .with_bearer_token(Some("sekrit".to_string()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_image_stream_success() {
        let (url, request) = serve_once("200 OK", r#"{"status":{"tags":[]}}"#).await;
        let body = client(url)
            .fetch_image_stream("myproject", "app", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body, br#"{"status":{"tags":[]}}"#);

        let head = request.await.unwrap();
        assert!(head.starts_with("GET /oapi/v1/namespaces/myproject/imagestreams/app HTTP/1.1"));
        assert!(head.to_ascii_lowercase().contains("authorization: bearer sekrit"));
    }

    #[tokio::test]
    async fn test_fetch_image_object_path() {
        let (url, request) = serve_once("200 OK", r#"{"signatures":[]}"#).await;
        client(url)
            .fetch_image_object("myproject", "app", "sha256:abc", &CancellationToken::new())
            .await
            .unwrap();
        let head = request.await.unwrap();
        assert!(head.starts_with("GET /oapi/v1/namespaces/myproject/imagestreamimages/app@sha256:abc "));
    }

    #[tokio::test]
    async fn test_not_found() {
        let (url, _request) = serve_once(
            "404 Not Found",
            r#"{"kind":"Status","message":"imagestreams \"app\" not found","code":404}"#,
        )
        .await;
        let err = client(url)
            .fetch_image_stream("myproject", "app", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            SourceError::NotFound(msg) => assert!(msg.contains("imagestreams \"app\" not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_unexpected_status() {
        let (url, _request) = serve_once("500 Internal Server Error", r#"{"kind":"Status","message":"etcd unavailable"}"#).await;
        let err = client(url)
            .fetch_image_stream("myproject", "app", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            SourceError::UnexpectedStatus { status, message } => {
                assert_eq!(status, 500);
                assert!(message.ends_with("etcd unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client("http://127.0.0.1:9".to_string())
            .fetch_image_stream("myproject", "app", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting() {
        // Accept the connection but never answer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client(url)
            .fetch_image_stream("myproject", "app", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_build_rejects_bad_config() {
        assert!(matches!(
            MetadataClient::builder("not a url".to_string()).build(),
            Err(SourceError::Config(_))
        ));
        assert!(matches!(
            MetadataClient::builder("mailto:ops@example.com".to_string()).build(),
            Err(SourceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_endpoint_keeps_base_path() {
        let client = MetadataClient::builder("https://api.example.com:8443/proxy/".to_string())
            .build()
            .unwrap();
        let url = client.endpoint(&["namespaces", "ns", "imagestreams", "app"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com:8443/proxy/oapi/v1/namespaces/ns/imagestreams/app"
        );
    }
}
