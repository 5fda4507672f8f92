//! Network actions — dns, tcp_connect, and http_get.
//!
//! Each action produces exactly one human-readable result line; failures
//! are folded into that line instead of being returned to the caller.

pub mod dns;
pub mod http_get;
pub mod tcp_connect;
