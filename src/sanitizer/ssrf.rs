//! Server-side request forgery sanitizer
//!
//! Validates outbound URLs before the runtime fetches them. Checks run in a
//! fixed order (parse, scheme, host, address class, port) and the first
//! failure is returned. Hosts are classified after URL normalization, so
//! numeric forms such as `http://2130706433/` resolve to the address they
//! denote.

use super::patterns::PatternSet;
use super::{require_text, Detection, Payload, SanitizeOptions, Sanitizer};
use crate::config::SanitizerConfig;
use crate::error::SanitizeError;
use crate::taint::{SanitizerKind, Taint};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::LazyLock;
use url::{Host, Url};

static PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::compile(&[
        ("localhost", r"(?i)\blocalhost\b"),
        (
            "loopback_ip",
            r"\b127\.\d{1,3}\.\d{1,3}\.\d{1,3}\b|\[::1\]|\b0\.0\.0\.0\b",
        ),
        ("private_ip_10", r"\b10\.\d{1,3}\.\d{1,3}\.\d{1,3}\b"),
        (
            "private_ip_172",
            r"\b172\.(1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}\b",
        ),
        ("private_ip_192", r"\b192\.168\.\d{1,3}\.\d{1,3}\b"),
        ("link_local_ip", r"\b169\.254\.\d{1,3}\.\d{1,3}\b"),
        ("aws_metadata", r"\b169\.254\.169\.254\b"),
        ("gcp_metadata", r"(?i)\bmetadata\.google\.internal\b"),
        (
            "unusual_scheme",
            r"(?i)^\s*(file|gopher|dict|ftp|sftp|ldap|tftp|jar|netdoc|php|data):",
        ),
        ("credentials_in_url", r"(?i)^\s*[a-z][a-z0-9+.\-]*://[^/\s@]+@"),
    ])
});

/// Cloud instance metadata services.
const METADATA_HOSTS: &[&str] = &[
    "169.254.169.254",
    "metadata.google.internal",
    "100.100.100.200",
    "fd00:ec2::254",
];

const LOOPBACK_CIDRS: &[&str] = &["127.0.0.0/8", "::1/128"];

const PRIVATE_CIDRS: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "100.64.0.0/10",
    "fc00::/7",
];

const LINK_LOCAL_CIDRS: &[&str] = &["169.254.0.0/16", "fe80::/10"];

const UNSPECIFIED_CIDRS: &[&str] = &["0.0.0.0/8", "::/128"];

fn ip_in_any_cidr(ip: IpAddr, cidrs: &[IpNet]) -> bool {
    cidrs.iter().any(|net| net.contains(&ip))
}

fn parse_cidr_list(cidrs: &[&str]) -> Vec<IpNet> {
    cidrs
        .iter()
        .filter_map(|s| s.parse::<IpNet>().ok())
        .collect()
}

/// Whether `ip` is loopback, private, link-local or unspecified.
///
/// IPv4-mapped IPv6 addresses are classified by their IPv4 address.
pub fn is_internal_address(ip: IpAddr) -> bool {
    static INTERNAL_NETS: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
        [LOOPBACK_CIDRS, PRIVATE_CIDRS, LINK_LOCAL_CIDRS, UNSPECIFIED_CIDRS]
            .into_iter()
            .flat_map(parse_cidr_list)
            .collect()
    });

    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    };
    ip_in_any_cidr(ip, &INTERNAL_NETS)
}

fn is_metadata_host(host: &str) -> bool {
    METADATA_HOSTS.contains(&host)
}

/// Reject internal destinations unless the host is public.
fn check_destination(host: &Host<&str>) -> Result<(), SanitizeError> {
    let (name, ip) = match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.');
            if is_metadata_host(domain) {
                return Err(SanitizeError::MetadataEndpoint(domain.to_string()));
            }
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(SanitizeError::PrivateIp(domain.to_string()));
            }
            return Ok(());
        }
        Host::Ipv4(v4) => (v4.to_string(), IpAddr::V4(*v4)),
        Host::Ipv6(v6) => (v6.to_string(), IpAddr::V6(*v6)),
    };

    if is_metadata_host(&name) {
        Err(SanitizeError::MetadataEndpoint(name))
    } else if is_internal_address(ip) {
        Err(SanitizeError::PrivateIp(name))
    } else {
        Ok(())
    }
}

/// Sanitizer for URLs the runtime will request.
#[derive(Debug, Clone)]
pub struct SsrfSanitizer {
    allowed_schemes: Vec<String>,
    allowed_ports: Vec<u16>,
}

impl SsrfSanitizer {
    /// Create a sanitizer from configuration
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            allowed_schemes: config.ssrf_allowed_schemes.clone(),
            allowed_ports: config.ssrf_allowed_ports.clone(),
        }
    }

    /// Validate `input` and return the normalized URL.
    pub fn validate(&self, input: &str, opts: &SanitizeOptions) -> Result<Url, SanitizeError> {
        let url = Url::parse(input.trim()).map_err(|e| SanitizeError::InvalidUrl(e.to_string()))?;

        let schemes = opts.allowed_schemes.as_ref().unwrap_or(&self.allowed_schemes);
        if !schemes.iter().any(|s| s.eq_ignore_ascii_case(url.scheme())) {
            return Err(SanitizeError::BlockedScheme(url.scheme().to_string()));
        }

        let host = url.host().ok_or(SanitizeError::MissingHost)?;
        if let Host::Domain("") = host {
            return Err(SanitizeError::MissingHost);
        }

        if !opts.allow_private {
            check_destination(&host)?;
        }

        let ports = opts.allowed_ports.as_ref().unwrap_or(&self.allowed_ports);
        if let Some(port) = url.port_or_known_default() {
            if !ports.contains(&port) {
                return Err(SanitizeError::BlockedPort(port));
            }
        }

        Ok(url)
    }
}

impl Default for SsrfSanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

impl Sanitizer for SsrfSanitizer {
    fn kind(&self) -> SanitizerKind {
        SanitizerKind::Ssrf
    }

    fn sanitize(
        &self,
        value: &Payload,
        taint: &Taint,
        opts: &SanitizeOptions,
    ) -> Result<(Payload, Taint), SanitizeError> {
        let text = require_text(self.kind(), value)?;
        let url = self.validate(text, opts).inspect_err(|e| {
            tracing::warn!(sanitizer = self.name(), error = %e, "Outbound URL rejected");
        })?;

        Ok((
            Payload::Text(url.as_str().to_string()),
            taint.mark_sanitized(self.kind()),
        ))
    }

    fn detect(&self, value: &Payload) -> Detection {
        match value.as_text() {
            Some(text) => Detection::from_matches(PATTERNS.matches(text)),
            None => Detection::Safe(1.0),
        }
    }
}
