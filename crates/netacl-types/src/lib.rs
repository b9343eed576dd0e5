//! Network primitives used by ACL rule subjects and match fields.
//!
//! This crate provides type-safe representations of the literal values an
//! ACL rule may carry:
//!
//! - [`IpAddress`]: IPv4 and IPv6 addresses, with [`IpFamily`] derivation
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`IpRange`]: inclusive address ranges (`start-end`)
//! - [`PortSpec`]: a single L4 port or an inclusive port range
//! - [`IcmpValue`]: an ICMP type or code

mod ip;
mod l4;
mod range;

pub use ip::{IpAddress, IpFamily, IpPrefix, Ipv4Address, Ipv6Address};
pub use l4::{IcmpValue, PortSpec};
pub use range::IpRange;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid IP range: {0}")]
    InvalidIpRange(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("invalid unsigned 8-bit value: {0}")]
    InvalidUint8(String),
}

/// Parses an unsigned decimal integer, accepting ASCII digits only.
///
/// `str::parse` tolerates a leading `+`; rule values must not.
pub(crate) fn parse_decimal<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
