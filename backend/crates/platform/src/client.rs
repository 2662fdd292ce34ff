//! Client identification utilities

use axum::http::HeaderMap;
use std::net::IpAddr;

/// Extract client IP address.
///
/// `trusted_hops` is the number of reverse proxies in front of the server
/// that append to `X-Forwarded-For`. Each one appends the peer it saw, so
/// the client is the entry `trusted_hops` from the right; anything further
/// left was supplied by the client. With no trusted proxies the header is
/// ignored and the socket peer is used.
pub fn extract_client_ip(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    trusted_hops: usize,
) -> Option<IpAddr> {
    if trusted_hops == 0 {
        return direct_ip;
    }

    let forwarded: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    forwarded
        .len()
        .checked_sub(trusted_hops)
        .and_then(|idx| forwarded[idx].parse::<IpAddr>().ok())
        .or(direct_ip)
}

/// Rate-limit subject for a client address. Unknown peers share one bucket.
pub fn client_key(ip: Option<IpAddr>) -> String {
    match ip {
        Some(ip) => format!("ip:{}", ip),
        None => "ip:unknown".to_string(),
    }
}
