//! HTTP server configuration: bind address, body limits, CORS, trusted
//! proxies, security headers, and the outbound HTTP client used by the
//! [`crate::checkers::judge`] variant and the inference proxy.

use std::{net::IpAddr, time::Duration};

use http::{HeaderName, Method};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body size limit in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Request timeout in seconds, applied at the server layer independent
    /// of a request's own `total_budget_ms`.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Trusted proxy configuration for extracting the real client IP used
    /// by the rate limiter's geo/IP rules (§4.4).
    #[serde(default)]
    pub trusted_proxies: TrustedProxiesConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,

    /// HTTP client configuration for the upstream model call and any
    /// `all_in_one_judge`/`http_v1` checker endpoints.
    #[serde(default)]
    pub http_client: HttpClientConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            timeout_secs: default_timeout(),
            trusted_proxies: TrustedProxiesConfig::default(),
            cors: CorsConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            http_client: HttpClientConfig::default(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

fn default_timeout() -> u64 {
    30
}

/// Configuration for trusted reverse proxies, mirroring the reference
/// gateway's CIDR-based trust model.
///
/// When proxy headers are trusted, `X-Forwarded-For` is parsed right-to-left,
/// skipping IPs within trusted CIDRs, to find the first untrusted (client) IP.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TrustedProxiesConfig {
    /// Trust all proxies. Only safe behind a load balancer that is the sole
    /// entry point and always overwrites `X-Forwarded-For`.
    #[serde(default)]
    pub dangerously_trust_all: bool,

    #[serde(default)]
    pub cidrs: Vec<String>,

    #[serde(default = "default_real_ip_header")]
    pub real_ip_header: String,
}

impl TrustedProxiesConfig {
    pub fn parsed_cidrs(&self) -> Vec<IpNet> {
        self.cidrs
            .iter()
            .filter_map(|cidr_str| {
                cidr_str.parse::<IpNet>().ok().or_else(|| {
                    tracing::warn!(cidr = %cidr_str, "invalid CIDR in trusted_proxies config, skipping");
                    None
                })
            })
            .collect()
    }

    pub fn is_trusted_ip(&self, ip: IpAddr, parsed_cidrs: &[IpNet]) -> bool {
        if self.dangerously_trust_all {
            return true;
        }
        parsed_cidrs.iter().any(|cidr| cidr.contains(&ip))
    }

    pub fn is_configured(&self) -> bool {
        self.dangerously_trust_all || !self.cidrs.is_empty()
    }
}

fn default_real_ip_header() -> String {
    "X-Forwarded-For".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    #[serde(default = "default_cors_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,

    #[serde(default)]
    pub allow_credentials: bool,

    #[serde(default = "default_cors_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_cors_enabled(),
            allowed_origins: vec![],
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
            allow_credentials: false,
            max_age_secs: default_cors_max_age(),
        }
    }
}

impl CorsConfig {
    /// Builds a [`CorsLayer`], or `None` if CORS is disabled. An empty
    /// `allowed_origins` is the restrictive default: no cross-origin
    /// requests allowed.
    pub fn into_layer(self) -> Option<CorsLayer> {
        if !self.enabled {
            return None;
        }

        let allow_origin = if self.allowed_origins.is_empty() {
            AllowOrigin::list(std::iter::empty::<http::HeaderValue>())
        } else if self.allowed_origins.len() == 1 && self.allowed_origins[0] == "*" {
            tracing::warn!("CORS allowed_origins = [\"*\"]: allowing any origin");
            AllowOrigin::any()
        } else {
            let origins: Vec<http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            AllowOrigin::list(origins)
        };

        let methods: Vec<Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();

        let headers: Vec<HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        let mut layer = CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(AllowHeaders::list(headers))
            .max_age(Duration::from_secs(self.max_age_secs));

        if self.allow_credentials {
            layer = layer.allow_credentials(true);
        }

        Some(layer)
    }
}

fn default_cors_enabled() -> bool {
    true
}

fn default_cors_methods() -> Vec<String> {
    vec!["GET", "POST", "PUT", "OPTIONS"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cors_headers() -> Vec<String> {
    vec!["Content-Type", "X-Request-Id"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cors_max_age() -> u64 {
    86400
}

/// Security response headers applied to every response regardless of config
/// (ambient hardening, not a guardrail feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityHeadersConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_content_type_options")]
    pub content_type_options: String,

    #[serde(default = "default_frame_options")]
    pub frame_options: String,

    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            content_type_options: default_content_type_options(),
            frame_options: default_frame_options(),
            referrer_policy: default_referrer_policy(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type_options() -> String {
    "nosniff".to_string()
}

fn default_frame_options() -> String {
    "DENY".to_string()
}

fn default_referrer_policy() -> String {
    "strict-origin-when-cross-origin".to_string()
}

/// Outbound HTTP client configuration, shared by the inference proxy and the
/// `all_in_one_judge`/`http_v1` checker variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpClientConfig {
    #[serde(default = "default_http_client_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_http_client_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_client_timeout(),
            connect_timeout_secs: default_http_client_connect_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpClientConfig {
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .user_agent(&self.user_agent)
            .build()
    }
}

fn default_http_client_timeout() -> u64 {
    30
}

fn default_http_client_connect_timeout() -> u64 {
    10
}

fn default_pool_max_idle_per_host() -> usize {
    32
}

fn default_user_agent() -> String {
    format!("guardrail-gate/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_a_working_client() {
        let config = HttpClientConfig::default();
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn trust_all_overrides_cidr_check() {
        let config = TrustedProxiesConfig {
            dangerously_trust_all: true,
            cidrs: vec![],
            real_ip_header: default_real_ip_header(),
        };
        assert!(config.is_trusted_ip("203.0.113.5".parse().unwrap(), &[]));
    }

    #[test]
    fn cidr_membership_is_checked_when_not_trusting_all() {
        let config = TrustedProxiesConfig {
            dangerously_trust_all: false,
            cidrs: vec!["10.0.0.0/8".to_string()],
            real_ip_header: default_real_ip_header(),
        };
        let parsed = config.parsed_cidrs();
        assert!(config.is_trusted_ip("10.1.2.3".parse().unwrap(), &parsed));
        assert!(!config.is_trusted_ip("203.0.113.5".parse().unwrap(), &parsed));
    }
}
