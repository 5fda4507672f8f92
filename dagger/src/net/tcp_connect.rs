//! net.tcp_connect — open and immediately close a TCP connection

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Connect to `host:port` within `limit` and describe the outcome.
///
/// No data is sent or received; the stream is dropped on success.
pub async fn execute(host: &str, port: u16, limit: Duration) -> String {
    match connect(host, port, limit).await {
        Ok(()) => format!("TCP connect success to {host}:{port}"),
        Err(e) => format!("TCP connect failed to {host}:{port} - {e:#}"),
    }
}

async fn connect(host: &str, port: u16, limit: Duration) -> Result<()> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(stream) => {
            let _stream = stream.context("connection failed")?;
            Ok(())
        }
        Err(_) => bail!("timed out after {}s", limit.as_secs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let msg = execute("127.0.0.1", port, Duration::from_secs(5)).await;
        assert_eq!(msg, format!("TCP connect success to 127.0.0.1:{port}"));
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_reported() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let msg = execute("127.0.0.1", port, Duration::from_secs(5)).await;
        assert!(
            msg.starts_with(&format!("TCP connect failed to 127.0.0.1:{port} - ")),
            "{msg}"
        );
    }
}
