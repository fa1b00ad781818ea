//! Client identity used to key rate-limit buckets.

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Derive the client identity for a request.
///
/// Precedence: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer
/// address (port stripped) when the server was started with connect info.
/// Falls back to the empty string so every request still maps to a bucket.
pub fn client_identity(req: &Request) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    identity_from_parts(req.headers(), peer)
}

/// Header/peer resolution behind [`client_identity`].
pub fn identity_from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(str::trim))
        .filter(|v| !v.is_empty())
        .or_else(|| header_value(headers, "x-real-ip").map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
