//! Domain and address validation.

use std::net::Ipv4Addr;

use crate::error::{Result, VigilError};

/// Normalize and validate a domain name or URL down to its host.
///
/// This function:
/// - Removes http:// and https:// prefixes
/// - Removes paths, query strings and ports
/// - Converts to lowercase
/// - Validates format (must contain dots, only alphanumeric/hyphens/dots)
///
/// Unlike a display helper it keeps `www.`: a probed host is exactly the
/// host that was published.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().to_lowercase();

    let domain = domain
        .strip_prefix("http://")
        .or_else(|| domain.strip_prefix("https://"))
        .unwrap_or(&domain);

    let domain = domain
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(domain);
    let domain = domain.split(':').next().unwrap_or(domain);

    if domain.is_empty() || !domain.contains('.') {
        return Err(VigilError::InvalidDomain(domain.to_string()));
    }

    let valid = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(VigilError::InvalidDomain(domain.to_string()));
    }

    if domain.contains("..") || domain.starts_with('.') || domain.ends_with('.') {
        return Err(VigilError::InvalidDomain(domain.to_string()));
    }

    for label in domain.split('.') {
        if label.is_empty() || label.starts_with('-') || label.ends_with('-') || label.len() > 63 {
            return Err(VigilError::InvalidDomain(domain.to_string()));
        }
    }

    Ok(domain.to_string())
}

/// Turn a bare host into the `https://` URL published in the panels document.
pub fn to_https_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Parse the address a replacement A record will point at.
///
/// Any IPv4 address is accepted, including private and CGNAT ranges used by
/// proxies on internal networks.
pub fn parse_record_address(ip: &str) -> Result<Ipv4Addr> {
    ip.trim()
        .parse()
        .map_err(|_| VigilError::InvalidIpAddress(ip.to_string()))
}
