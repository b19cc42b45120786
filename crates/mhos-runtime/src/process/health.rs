//! HTTP health checks for singleton servers.
//!
//! A pid marker alone cannot tell our server from an unrelated process that
//! reused its pid. The voice and transcription back-ends expose `/health`,
//! which is the stronger liveness signal.

use std::time::Duration;

use tracing::debug;

/// Check `url` once. Healthy means any 2xx response within `timeout`.
pub async fn check_http_health(url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "Failed to build health check client");
            return false;
        }
    };

    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            debug!(%url, status = %response.status(), "Health check returned non-success status");
            false
        }
        Err(e) => {
            debug!(%url, error = %e, "Health check failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn one_shot_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("{status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/health")
    }

    #[tokio::test]
    async fn ok_response_is_healthy() {
        let url = one_shot_server("HTTP/1.1 200 OK").await;
        assert!(check_http_health(&url, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn error_status_is_unhealthy() {
        let url = one_shot_server("HTTP/1.1 503 Service Unavailable").await;
        assert!(!check_http_health(&url, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn closed_port_is_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{addr}/health");
        assert!(!check_http_health(&url, Duration::from_millis(500)).await);
    }
}
