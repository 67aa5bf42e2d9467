use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Reasons a subscription endpoint is refused at registration time.
///
/// Both the feed URL and the callback URL of a subscription are requested by
/// the sync job itself, so they must not point back into the host's network.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a feed or callback URL before it is stored on a subscription.
///
/// Rejects non-HTTP(S) schemes, `localhost`, loopback addresses, and
/// private/link-local ranges. Hostnames are not resolved.
///
/// ```
/// use feedsync::util::validate_endpoint;
///
/// assert!(validate_endpoint("https://example.com/feed.atom").is_ok());
/// assert!(validate_endpoint("http://localhost/hook").is_err());
/// assert!(validate_endpoint("file:///etc/passwd").is_err());
/// ```
pub fn validate_endpoint(raw: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let ip = match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(UrlValidationError::Localhost);
            }
            return Ok(url);
        }
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
    };

    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if is_private_ip(&ip) {
        return Err(UrlValidationError::PrivateIp(ip));
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_endpoints_accepted() {
        assert!(validate_endpoint("https://example.com/feed.atom").is_ok());
        assert!(validate_endpoint("https://hooks.example.net:8443/incoming?token=abc").is_ok());
        assert!(validate_endpoint("http://93.184.216.34/feed").is_ok());
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        assert!(matches!(
            validate_endpoint("ftp://example.com/feed"),
            Err(UrlValidationError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(validate_endpoint("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_loopback_rejected() {
        for raw in ["http://localhost/hook", "http://LOCALHOST/hook", "http://127.0.0.1/hook", "http://[::1]/hook"] {
            assert!(
                matches!(validate_endpoint(raw), Err(UrlValidationError::Localhost)),
                "{raw} should be rejected as localhost"
            );
        }
    }

    #[test]
    fn test_private_ranges_rejected() {
        for raw in [
            "http://10.0.0.1/feed",
            "http://172.16.0.1:3000/feed",
            "http://192.168.1.1:8080/feed",
            "http://169.254.1.1/feed",
            "http://0.0.0.0/feed",
            "http://[fe80::1]/feed",
            "http://[fd00::1]/feed",
        ] {
            assert!(
                matches!(validate_endpoint(raw), Err(UrlValidationError::PrivateIp(_))),
                "{raw} should be rejected as private"
            );
        }
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            validate_endpoint("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
