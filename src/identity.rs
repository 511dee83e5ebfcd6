//! Pseudonymous sender identity.
//!
//! The origin address of a request is resolved from proxy headers (falling
//! back to the socket peer), tagged when it is a loopback or private-range
//! address, and hashed into a stable `anon_…` id. The raw address never
//! leaves this module except through `/api/get-ip`.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Literal used when no address can be determined.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Identity of an anonymous sender, derived from their origin address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonIdentity {
    /// `anon_` + hashed address; keys platform-wide bans.
    pub anon_id: String,
    /// Bare hashed address; keys per-inbox blocks.
    pub anon_ip: String,
}

impl AnonIdentity {
    pub fn derive(address: &str) -> Self {
        let hashed = hash_address(address);
        Self {
            anon_id: format!("anon_{}", hashed),
            anon_ip: hashed,
        }
    }
}

/// Resolve the client address: `cf-connecting-ip`, then `x-real-ip`, then the
/// first `x-forwarded-for` entry, then the socket peer. Loopback and private
/// addresses come back tagged with `dev_`.
pub fn resolve_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let forwarded_for = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let raw = header("cf-connecting-ip")
        .or_else(|| header("x-real-ip"))
        .or_else(forwarded_for)
        .or_else(|| peer.map(|addr| addr.ip().to_string()));

    match raw {
        Some(address) => tag_address(&address),
        None => UNKNOWN_ADDRESS.to_string(),
    }
}

/// Prefix loopback and private-range addresses with `dev_`.
pub fn tag_address(address: &str) -> String {
    match address.parse::<IpAddr>() {
        Ok(ip) if is_local_or_private(&ip) => format!("dev_{}", address),
        _ => address.to_string(),
    }
}

/// Loopback, RFC 1918, IPv6 ULA and link-local addresses.
pub fn is_local_or_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            if addr.is_loopback() {
                return true;
            }
            let octets = addr.octets();
            // 10.0.0.0/8
            if octets[0] == 10 {
                return true;
            }
            // 172.16.0.0/12
            if octets[0] == 172 && (16..=31).contains(&octets[1]) {
                return true;
            }
            // 192.168.0.0/16
            octets[0] == 192 && octets[1] == 168
        }
        IpAddr::V6(addr) => {
            if addr.is_loopback() {
                return true;
            }
            if let Some(ipv4) = addr.to_ipv4_mapped() {
                return is_local_or_private(&IpAddr::V4(ipv4));
            }
            let segments = addr.segments();
            // fc00::/7
            if (0xfc00..=0xfdff).contains(&segments[0]) {
                return true;
            }
            // fe80::/10
            (0xfe80..=0xfebf).contains(&segments[0])
        }
    }
}

/// 32-bit rolling hash over UTF-16 code units, rendered as the lower-case hex
/// of its absolute value.
pub fn hash_address(address: &str) -> String {
    let hash = address.encode_utf16().fold(0i32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    });
    format!("{:x}", i64::from(hash).abs())
}
