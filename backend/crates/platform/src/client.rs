//! Client identification utilities
//!
//! Resolves the client address and User-Agent from request headers set by
//! reverse proxies and CDNs.

use axum::http::{HeaderMap, header};
use std::net::{IpAddr, Ipv4Addr};

/// Connecting-IP header set by the CDN in front of the service
pub const CONNECTING_IP_HEADER: &str = "cf-connecting-ip";

/// Used when no header carries a parsable address
pub const DEFAULT_CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Extract client IP address from headers
///
/// Precedence: first hop of `X-Forwarded-For`, then `X-Real-IP`, then the
/// CDN connecting-IP header, else loopback. Values that do not parse as an
/// address are skipped.
pub fn extract_client_ip(headers: &HeaderMap) -> IpAddr {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .and_then(parse_ip);

    forwarded
        .or_else(|| header_str(headers, "x-real-ip").and_then(parse_ip))
        .or_else(|| header_str(headers, CONNECTING_IP_HEADER).and_then(parse_ip))
        .unwrap_or(DEFAULT_CLIENT_IP)
}

/// User-Agent header, empty when absent or not valid UTF-8
pub fn extract_user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.trim().parse::<IpAddr>().ok()
}
