//! Client IP extraction behind trusted reverse proxies (SPEC_FULL ambient
//! feature, §4.7 surface notes).
//!
//! `X-Forwarded-For` is attacker-controlled unless the immediate peer is a
//! trusted proxy, so we only trust it when [`TrustedProxiesConfig`] says so,
//! and then walk the chain right-to-left skipping entries inside trusted
//! CIDRs to find the first untrusted (client) hop.

use std::net::IpAddr;

use axum::{body::Body, extract::ConnectInfo, extract::State, http::Request, middleware::Next, response::Response};

use crate::{AppState, config::TrustedProxiesConfig};

/// The resolved client IP for this request, inserted as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

pub async fn client_ip_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<std::net::SocketAddr>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let config = &state.config.server.trusted_proxies;

    let resolved = resolve_client_ip(config, peer, |name| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    if let Some(ip) = resolved {
        request.extensions_mut().insert(ClientIp(ip));
    }

    next.run(request).await
}

/// Pure resolution logic, separated from the header map for testability.
fn resolve_client_ip(
    config: &TrustedProxiesConfig,
    peer: Option<IpAddr>,
    header: impl Fn(&str) -> Option<String>,
) -> Option<IpAddr> {
    if !config.is_configured() {
        return peer;
    }

    let parsed_cidrs = config.parsed_cidrs();
    let Some(peer) = peer else {
        return header(&config.real_ip_header).and_then(|v| first_untrusted(&v, config, &parsed_cidrs));
    };

    if !config.is_trusted_ip(peer, &parsed_cidrs) {
        // Direct peer isn't a trusted proxy; don't trust its headers.
        return Some(peer);
    }

    match header(&config.real_ip_header) {
        Some(value) => first_untrusted(&value, config, &parsed_cidrs).or(Some(peer)),
        None => Some(peer),
    }
}

/// Walks a comma-separated forwarded-for chain from the right, returning the
/// first entry that isn't inside a trusted CIDR.
fn first_untrusted(
    chain: &str,
    config: &TrustedProxiesConfig,
    parsed_cidrs: &[ipnet::IpNet],
) -> Option<IpAddr> {
    chain
        .split(',')
        .rev()
        .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
        .find(|ip| !config.is_trusted_ip(*ip, parsed_cidrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cidrs: &[&str]) -> TrustedProxiesConfig {
        TrustedProxiesConfig {
            dangerously_trust_all: false,
            cidrs: cidrs.iter().map(|s| s.to_string()).collect(),
            real_ip_header: "X-Forwarded-For".to_string(),
        }
    }

    #[test]
    fn untrusted_config_returns_peer_unconditionally() {
        let config = TrustedProxiesConfig::default();
        let peer: IpAddr = "203.0.113.5".parse().unwrap();
        let resolved = resolve_client_ip(&config, Some(peer), |_| Some("10.0.0.1".to_string()));
        assert_eq!(resolved, Some(peer));
    }

    #[test]
    fn trusted_peer_yields_first_untrusted_hop_in_chain() {
        let config = config(&["10.0.0.0/8"]);
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let resolved = resolve_client_ip(&config, Some(peer), |_| {
            Some("203.0.113.5, 10.0.0.2, 10.0.0.1".to_string())
        });
        assert_eq!(resolved, Some("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn untrusted_peer_is_not_overridden_by_headers() {
        let config = config(&["10.0.0.0/8"]);
        let peer: IpAddr = "203.0.113.5".parse().unwrap();
        let resolved = resolve_client_ip(&config, Some(peer), |_| Some("198.51.100.1".to_string()));
        assert_eq!(resolved, Some(peer));
    }
}
