//! net.http_get — bounded HTTP GET that keeps only the head of the body

use anyhow::{bail, Context, Result};
use reqwest::redirect::Policy;
use std::time::Duration;

use crate::policy;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct HttpGet {
    timeout: Duration,
    body_limit: usize,
}

/// Status code plus the number of body bytes actually kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: u16,
    pub len: usize,
}

impl HttpGet {
    pub fn new(timeout: Duration, body_limit: usize) -> Self {
        Self {
            timeout,
            body_limit,
        }
    }

    /// Fetch `url` and describe the outcome.
    ///
    /// The caller has already gated the URL's own host. `allow_external` is
    /// passed again so redirects are held to the same gate.
    pub async fn execute(&self, url: &str, allow_external: bool) -> String {
        match self.fetch(url, allow_external).await {
            Ok(out) => format!("HTTP GET {url} status={} len={}", out.status, out.len),
            Err(e) => format!("HTTP GET failed {url} - {e:#}"),
        }
    }

    /// GET `url`, keeping at most `body_limit` bytes of the body.
    ///
    /// 4xx and 5xx responses are failures. Reading stops as soon as the
    /// limit is reached, so at most one transport chunk past it is buffered.
    pub async fn fetch(&self, url: &str, allow_external: bool) -> Result<HttpOutcome> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(redirect_policy(allow_external))
            .build()
            .context("failed to build HTTP client")?;

        let mut response = client.get(url).send().await.context("request failed")?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            bail!(
                "HTTP Error {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            );
        }

        let mut len = 0;
        while len < self.body_limit {
            match response.chunk().await.context("failed reading body")? {
                Some(chunk) => len += chunk.len().min(self.body_limit - len),
                None => break,
            }
        }

        Ok(HttpOutcome {
            status: status.as_u16(),
            len,
        })
    }
}

fn redirect_policy(allow_external: bool) -> Policy {
    if allow_external {
        return Policy::limited(MAX_REDIRECTS);
    }
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let allowed = attempt
            .url()
            .host_str()
            .map(|host| policy::decide(host, false).is_allowed())
            .unwrap_or(false);
        if allowed {
            attempt.follow()
        } else {
            let msg = format!("redirect to external target {} blocked", attempt.url());
            attempt.error(msg)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response on loopback and return the base URL
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    fn ok_response(body_len: usize) -> Vec<u8> {
        let mut resp = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {body_len}\r\nConnection: close\r\n\r\n"
        )
        .into_bytes();
        resp.extend(std::iter::repeat(b'a').take(body_len));
        resp
    }

    #[tokio::test]
    async fn test_body_is_capped() {
        let base = serve_once(ok_response(4096)).await;
        let getter = HttpGet::new(Duration::from_secs(8), 512);

        let out = getter.fetch(&format!("{base}/"), false).await.unwrap();
        assert_eq!(
            out,
            HttpOutcome {
                status: 200,
                len: 512
            }
        );
    }

    #[tokio::test]
    async fn test_short_body_reported_in_full() {
        let base = serve_once(ok_response(42)).await;
        let getter = HttpGet::new(Duration::from_secs(8), 512);

        let url = format!("{base}/index.html");
        let msg = getter.execute(&url, false).await;
        assert_eq!(msg, format!("HTTP GET {url} status=200 len=42"));
    }

    #[tokio::test]
    async fn test_tiny_limit_counts_only_kept_bytes() {
        let base = serve_once(ok_response(4096)).await;
        let getter = HttpGet::new(Duration::from_secs(8), 3);

        let out = getter.fetch(&format!("{base}/"), false).await.unwrap();
        assert_eq!(
            out,
            HttpOutcome {
                status: 200,
                len: 3
            }
        );
    }

    #[tokio::test]
    async fn test_not_found_is_a_failure() {
        let resp = b"HTTP/1.1 404 Not Found\r\n\
            Content-Length: 9\r\nConnection: close\r\n\r\nnot found"
            .to_vec();
        let base = serve_once(resp).await;
        let getter = HttpGet::new(Duration::from_secs(8), 512);

        let url = format!("{base}/x");
        let msg = getter.execute(&url, false).await;
        assert_eq!(msg, format!("HTTP GET failed {url} - HTTP Error 404: Not Found"));
    }

    #[tokio::test]
    async fn test_server_error_is_a_failure() {
        let resp = b"HTTP/1.1 503 Service Unavailable\r\n\
            Content-Length: 0\r\nConnection: close\r\n\r\n"
            .to_vec();
        let base = serve_once(resp).await;
        let getter = HttpGet::new(Duration::from_secs(8), 512);

        let err = getter.fetch(&format!("{base}/"), false).await.unwrap_err();
        assert_eq!(format!("{err:#}"), "HTTP Error 503: Service Unavailable");
    }

    #[tokio::test]
    async fn test_redirect_to_external_blocked() {
        let resp = b"HTTP/1.1 302 Found\r\nLocation: http://example.com/\r\n\
            Content-Length: 0\r\nConnection: close\r\n\r\n"
            .to_vec();
        let base = serve_once(resp).await;
        let getter = HttpGet::new(Duration::from_secs(8), 512);

        let url = format!("{base}/");
        let msg = getter.execute(&url, false).await;
        assert!(msg.starts_with(&format!("HTTP GET failed {url} - ")), "{msg}");
        assert!(msg.contains("blocked"), "{msg}");
    }

    #[tokio::test]
    async fn test_connection_refused_is_reported() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let getter = HttpGet::new(Duration::from_secs(8), 512);

        let url = format!("http://127.0.0.1:{port}/");
        let msg = getter.execute(&url, false).await;
        assert!(msg.starts_with(&format!("HTTP GET failed {url} - ")), "{msg}");
    }
}
