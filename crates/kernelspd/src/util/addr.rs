//! Address parsing and conversion utilities.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Error type for address parsing.
#[derive(Debug, thiserror::Error)]
pub enum AddrError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid prefix length: {0}")]
    InvalidPrefix(String),

    #[error("invalid address range: {0}")]
    InvalidRange(String),
}

pub type Result<T> = std::result::Result<T, AddrError>;

/// Parse an IP address from string.
pub fn parse_addr(s: &str) -> Result<IpAddr> {
    s.trim()
        .parse()
        .map_err(|_| AddrError::InvalidAddress(s.to_string()))
}

/// Parse an IP address with prefix length (CIDR notation).
/// Returns (address, prefix_length).
pub fn parse_prefix(s: &str) -> Result<(IpAddr, u8)> {
    if let Some((addr_str, prefix_str)) = s.split_once('/') {
        let addr = parse_addr(addr_str)?;
        let prefix: u8 = prefix_str
            .trim()
            .parse()
            .map_err(|_| AddrError::InvalidPrefix(prefix_str.to_string()))?;

        let max_prefix = max_prefix_len(&addr);
        if prefix > max_prefix {
            return Err(AddrError::InvalidPrefix(format!(
                "{} exceeds maximum {} for address family",
                prefix, max_prefix
            )));
        }

        Ok((addr, prefix))
    } else {
        let addr = parse_addr(s)?;
        Ok((addr, max_prefix_len(&addr)))
    }
}

/// Maximum prefix length for the address family of `addr`.
pub fn max_prefix_len(addr: &IpAddr) -> u8 {
    if addr.is_ipv4() { 32 } else { 128 }
}

/// Expand a prefix into the inclusive range of addresses it covers.
pub fn prefix_bounds(addr: IpAddr, prefix: u8) -> (IpAddr, IpAddr) {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = if prefix == 0 {
                0
            } else {
                u32::MAX << (32 - u32::from(prefix.min(32)))
            };
            (
                IpAddr::V4(Ipv4Addr::from(bits & mask)),
                IpAddr::V4(Ipv4Addr::from(bits | !mask)),
            )
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = if prefix == 0 {
                0
            } else {
                u128::MAX << (128 - u32::from(prefix.min(128)))
            };
            (
                IpAddr::V6(Ipv6Addr::from(bits & mask)),
                IpAddr::V6(Ipv6Addr::from(bits | !mask)),
            )
        }
    }
}

/// Parse an inclusive address range.
///
/// Accepts `start-end`, a CIDR prefix, or a single address.
pub fn parse_range(s: &str) -> Result<(IpAddr, IpAddr)> {
    if let Some((start, end)) = s.split_once('-') {
        let start = parse_addr(start)?;
        let end = parse_addr(end)?;
        if start.is_ipv4() != end.is_ipv4() {
            return Err(AddrError::InvalidRange(format!(
                "{}: mixed address families",
                s
            )));
        }
        if compare(&start, &end) == std::cmp::Ordering::Greater {
            return Err(AddrError::InvalidRange(format!("{}: start after end", s)));
        }
        return Ok((start, end));
    }

    let (addr, prefix) = parse_prefix(s)?;
    Ok(prefix_bounds(addr, prefix))
}

/// Compare two addresses of the same family numerically.
///
/// IPv4 sorts before IPv6 when families differ.
pub fn compare(a: &IpAddr, b: &IpAddr) -> std::cmp::Ordering {
    match (a, b) {
        (IpAddr::V4(a), IpAddr::V4(b)) => u32::from(*a).cmp(&u32::from(*b)),
        (IpAddr::V6(a), IpAddr::V6(b)) => u128::from(*a).cmp(&u128::from(*b)),
        (IpAddr::V4(_), IpAddr::V6(_)) => std::cmp::Ordering::Less,
        (IpAddr::V6(_), IpAddr::V4(_)) => std::cmp::Ordering::Greater,
    }
}

/// Store an address in a 16-byte wire slot (IPv4 uses the first 4 bytes).
pub fn to_octets(addr: &IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => {
            let mut bytes = [0u8; 16];
            bytes[..4].copy_from_slice(&v4.octets());
            bytes
        }
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// Read an address from a 16-byte wire slot given the IP version.
pub fn from_octets(version: u8, bytes: &[u8; 16]) -> Option<IpAddr> {
    match version {
        4 => Some(IpAddr::V4(Ipv4Addr::new(
            bytes[0], bytes[1], bytes[2], bytes[3],
        ))),
        6 => Some(IpAddr::V6(Ipv6Addr::from(*bytes))),
        _ => None,
    }
}

/// IP version number of an address.
pub fn version(addr: &IpAddr) -> u8 {
    if addr.is_ipv4() { 4 } else { 6 }
}
