use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Reasons a URL is refused as a feed source.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("URLs with embedded credentials are not allowed")]
    Credentials,

    #[error("Localhost not allowed")]
    Localhost,

    #[error("Private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
}

/// Validate a URL before it is stored as a feed.
///
/// The aggregator fetches every stored feed unattended, so anything that
/// would point it at the local machine or a private network is rejected:
/// non-http(s) schemes, `localhost` (and `*.localhost`), loopback, private,
/// link-local, unspecified and IPv4-mapped forms of those addresses.
/// Hostnames are not resolved.
///
/// Returns the parsed URL; its string form is what gets stored.
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("https://blog.boot.dev/index.xml").unwrap();
/// assert_eq!(url.host_str(), Some("blog.boot.dev"));
///
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(input: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(input.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::Credentials);
    }

    match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(UrlValidationError::Localhost);
            }
        }
        Some(Host::Ipv4(v4)) => check_ip(IpAddr::V4(v4))?,
        Some(Host::Ipv6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => check_ip(IpAddr::V4(v4))?,
            None => check_ip(IpAddr::V6(v6))?,
        },
    }

    Ok(url)
}

fn check_ip(ip: IpAddr) -> Result<(), UrlValidationError> {
    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    let private = match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    };
    if private {
        return Err(UrlValidationError::PrivateIp(ip));
    }
    Ok(())
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    // 100.64.0.0/10 is carrier-grade NAT space
    let shared = ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64;
    ip.is_private() || ip.is_link_local() || ip.is_unspecified() || shared
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    ip.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
