//! net.dns — forward lookup of one host name

use anyhow::{anyhow, Context, Result};
use std::net::IpAddr;
use tokio::net::lookup_host;

/// Resolve `host` and describe the outcome.
///
/// Resolution is passive, so it is never gated. No explicit timeout: the
/// platform resolver's own limits apply.
pub async fn execute(host: &str) -> String {
    match resolve(host).await {
        Ok(ip) => format!("DNS resolved {host} -> {ip}"),
        Err(e) => format!("DNS resolve error for {host}: {e:#}"),
    }
}

/// First address for `host`, preferring IPv4 the way `gethostbyname` does
pub async fn resolve(host: &str) -> Result<IpAddr> {
    let addrs: Vec<IpAddr> = lookup_host((host, 0))
        .await
        .with_context(|| format!("lookup failed for {host}"))?
        .map(|addr| addr.ip())
        .collect();

    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| anyhow!("no addresses returned for {host}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let ip = resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::from([127, 0, 0, 1]));
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let ip = resolve("localhost").await.unwrap();
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn test_execute_success_message() {
        let msg = execute("127.0.0.1").await;
        assert_eq!(msg, "DNS resolved 127.0.0.1 -> 127.0.0.1");
    }

    #[tokio::test]
    async fn test_execute_failure_is_reported() {
        // .invalid never resolves
        let msg = execute("dagger-test.invalid").await;
        assert!(
            msg.starts_with("DNS resolve error for dagger-test.invalid: "),
            "{msg}"
        );
    }
}
