//! Minimal HTTP endpoint on a raw TCP listener. Every request to the
//! telemetry path runs a full scrape of all targets.

use crate::collector::Exporter;
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

pub const HEALTH_PATH: &str = "/health";
const MAX_REQUEST_HEAD: usize = 2048;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub targets: usize,
}

#[derive(Debug, PartialEq, Eq)]
struct Response {
    status: &'static str,
    content_type: String,
    body: String,
}

impl Response {
    fn text(status: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: body.to_string(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.content_type,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}

pub struct Server {
    exporter: Arc<Exporter>,
    telemetry_path: String,
    started: Instant,
}

impl Server {
    pub fn new(exporter: Arc<Exporter>, telemetry_path: &str) -> Self {
        Self {
            exporter,
            telemetry_path: telemetry_path.to_string(),
            started: Instant::now(),
        }
    }

    pub async fn bind(addr: &str) -> HttpResult<TcpListener> {
        TcpListener::bind(addr).await.map_err(|source| HttpError::Bind {
            addr: addr.to_string(),
            source,
        })
    }

    /// Accept connections until `shutdown` flips to true
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> HttpResult<()> {
        tracing::info!(
            "Serving metrics on http://{}{}",
            listener.local_addr()?,
            self.telemetry_path
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        let server = Arc::clone(&self);
                        tokio::spawn(async move { server.handle(socket, peer).await });
                    }
                    Err(e) => tracing::warn!("Failed to accept connection: {}", e),
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("HTTP server shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle(&self, mut socket: TcpStream, peer: SocketAddr) {
        let mut buffer = [0u8; MAX_REQUEST_HEAD];
        let mut n = 0;
        // Only the request line is routed on; it may span several reads
        while !buffer[..n].windows(2).any(|w| w == &b"\r\n"[..]) && n < buffer.len() {
            match socket.read(&mut buffer[n..]).await {
                Ok(0) => break,
                Ok(read) => n += read,
                Err(e) => {
                    tracing::debug!("Failed to read request from {}: {}", peer, e);
                    return;
                }
            }
        }
        if n == 0 {
            return;
        }

        let request = String::from_utf8_lossy(&buffer[..n]);
        let response = self.route(&request).await;
        if let Err(e) = socket.write_all(&response.to_bytes()).await {
            tracing::debug!("Failed to write response to {}: {}", peer, e);
        }
        let _ = socket.shutdown().await;
    }

    async fn route(&self, request: &str) -> Response {
        let mut parts = request.lines().next().unwrap_or_default().split_whitespace();
        let method = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default();
        let path = target.split('?').next().unwrap_or_default();

        if method != "GET" {
            return Response::text("405 Method Not Allowed", "Method not allowed");
        }

        if path == self.telemetry_path {
            let batch = self.exporter.scrape().await;
            return match batch.render() {
                Ok(body) => Response {
                    status: "200 OK",
                    content_type: metrics::content_type(),
                    body,
                },
                Err(e) => {
                    tracing::error!("Failed to render metrics: {}", e);
                    Response::text("500 Internal Server Error", "Internal server error")
                }
            };
        }

        if path == HEALTH_PATH {
            let status = HealthStatus {
                status: "healthy".to_string(),
                version: crate::version::current_version().to_string(),
                uptime_seconds: self.started.elapsed().as_secs(),
                targets: self.exporter.targets().len(),
            };
            let json = serde_json::to_string(&status).unwrap_or_else(|_| {
                r#"{"status":"error","message":"Failed to serialize health status"}"#.to_string()
            });
            return Response {
                status: "200 OK",
                content_type: "application/json".to_string(),
                body: json,
            };
        }

        Response::text("404 Not Found", "Not found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Connector;
    use crate::config::{Config, EffectiveConfig};
    use crate::ssh::{CommandRunner, SshError, SshResult};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(
            &self,
            host: &str,
            _port: u16,
            _config: &EffectiveConfig,
        ) -> SshResult<Box<dyn CommandRunner>> {
            Err(SshError::ConnectionFailed(format!("{} unreachable", host)))
        }
    }

    fn server() -> Server {
        let targets = vec!["sw1".to_string()];
        let exporter = Exporter::new(&Config::default(), &targets, Arc::new(Unreachable)).unwrap();
        Server::new(Arc::new(exporter), "/metrics")
    }

    #[tokio::test]
    async fn test_metrics_route_scrapes() {
        let response = server().route("GET /metrics HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert_eq!(response.status, "200 OK");
        assert!(response.content_type.starts_with("text/plain"));
        assert!(response.body.contains("cisco_up{target=\"sw1\"} 0"));
    }

    #[tokio::test]
    async fn test_query_string_is_ignored() {
        let response = server().route("GET /metrics?debug=1 HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status, "200 OK");
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = server().route("GET /health HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status, "200 OK");
        assert_eq!(response.content_type, "application/json");

        let status: HealthStatus = serde_json::from_str(&response.body).unwrap();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.targets, 1);
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let server = server();
        assert_eq!(server.route("GET /other HTTP/1.1\r\n\r\n").await.status, "404 Not Found");
        assert_eq!(
            server.route("POST /metrics HTTP/1.1\r\n\r\n").await.status,
            "405 Method Not Allowed"
        );
        assert_eq!(server.route("").await.status, "405 Method Not Allowed");
    }

    #[test]
    fn test_response_bytes() {
        let bytes = Response::text("404 Not Found", "Not found").to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.ends_with("\r\n\r\nNot found"));
    }

    #[tokio::test]
    async fn test_request_line_split_across_writes() {
        let listener = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::new(server()).serve(listener, rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /hea").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stream.write_all(b"lth HTTP/1.1\r\n\r\n").await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let listener = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::new(server()).serve(listener, rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /health HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("\"status\":\"healthy\""));

        tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
