//! Network policy gate
//!
//! Decides whether an outbound action may run. The check is purely lexical
//! on the host string the operator typed: nothing is resolved first, so a
//! name that happens to resolve to loopback is still external.

use tracing::{debug, warn};
use url::Url;

use crate::error::InputError;

/// Outcome of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Warning shown when a TCP connect is refused by the gate
pub const TCP_BLOCKED: &str =
    "External network connections are blocked. Check the allow external option to enable.";
/// Warning shown when an HTTP GET is refused by the gate
pub const HTTP_BLOCKED: &str = "External HTTP requests are blocked by default.";

/// `true` for `localhost` and any literal starting with `127.`
pub fn is_loopback_literal(target: &str) -> bool {
    target == "localhost" || target.starts_with("127.")
}

/// Pure gate: a function of the target and the operator's flag only.
pub fn decide(target: &str, allow_external: bool) -> Decision {
    let decision = if allow_external || is_loopback_literal(target) {
        Decision::Allow
    } else {
        Decision::Block
    };

    match decision {
        Decision::Allow => debug!("Policy allow: target={target} allow_external={allow_external}"),
        Decision::Block => warn!("Policy block: target={target} (external network disabled)"),
    }
    decision
}

/// Host portion of an HTTP target, as the gate should see it.
///
/// Returns `Ok(None)` for URLs that parse but carry no host; the caller
/// treats those as external.
pub fn url_host(raw: &str) -> Result<Option<String>, InputError> {
    let url = Url::parse(raw).map_err(|e| InputError::InvalidUrl(format!("{raw} ({e})")))?;
    Ok(url.host_str().map(str::to_string))
}

/// Gate for an HTTP URL: decides on the parsed hostname.
pub fn decide_url(raw: &str, allow_external: bool) -> Result<Decision, InputError> {
    let host = url_host(raw)?;
    Ok(match host {
        Some(host) => decide(&host, allow_external),
        None if allow_external => Decision::Allow,
        None => {
            warn!("Policy block: URL without host {raw}");
            Decision::Block
        }
    })
}
