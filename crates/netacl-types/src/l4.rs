//! L4 match values: ports, port ranges and ICMP type/code.
//!
//! Port ranges use the same `min-max` notation as switch ACL range
//! objects and are bounded to the 16-bit port space.

use crate::{parse_decimal, ParseError};
use std::fmt;
use std::str::FromStr;

/// A single L4 port or an inclusive `start-end` port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortSpec {
    Single(u16),
    Range { start: u16, end: u16 },
}

impl PortSpec {
    /// Parses a single port number.
    pub fn parse_single(s: &str) -> Result<Self, ParseError> {
        parse_decimal::<u16>(s)
            .map(PortSpec::Single)
            .ok_or_else(|| ParseError::InvalidPort(s.to_string()))
    }

    /// Parses a `start-end` port range.
    pub fn parse_range(s: &str) -> Result<Self, ParseError> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ParseError::InvalidPortRange(s.to_string()))?;

        let start = parse_decimal::<u16>(start)
            .ok_or_else(|| ParseError::InvalidPortRange(format!("invalid start in {}", s)))?;
        let end = parse_decimal::<u16>(end)
            .ok_or_else(|| ParseError::InvalidPortRange(format!("invalid end in {}", s)))?;

        if start > end {
            return Err(ParseError::InvalidPortRange(format!(
                "start ({}) > end ({})",
                start, end
            )));
        }

        Ok(PortSpec::Range { start, end })
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(port) => write!(f, "{}", port),
            Self::Range { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

impl FromStr for PortSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_single(s).or_else(|_| Self::parse_range(s))
    }
}

/// An ICMP type or code value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IcmpValue(u8);

impl IcmpValue {
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl FromStr for IcmpValue {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_decimal::<u8>(s)
            .map(IcmpValue)
            .ok_or_else(|| ParseError::InvalidUint8(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_port() {
        assert_eq!("80".parse::<PortSpec>().unwrap(), PortSpec::Single(80));
        assert_eq!("65535".parse::<PortSpec>().unwrap(), PortSpec::Single(65535));
        assert!("65536".parse::<PortSpec>().is_err());
    }

    #[test]
    fn test_port_range() {
        assert_eq!(
            "1000-2000".parse::<PortSpec>().unwrap(),
            PortSpec::Range {
                start: 1000,
                end: 2000
            }
        );
        assert!("2000-1000".parse::<PortSpec>().is_err());
        assert!("1000-70000".parse::<PortSpec>().is_err());
        assert!("1000-".parse::<PortSpec>().is_err());
    }

    #[test]
    fn test_non_numeric_port() {
        assert!("http".parse::<PortSpec>().is_err());
        assert!("+80".parse::<PortSpec>().is_err());
        assert!("".parse::<PortSpec>().is_err());
    }

    #[test]
    fn test_icmp_value() {
        assert_eq!("8".parse::<IcmpValue>().unwrap().value(), 8);
        assert_eq!("255".parse::<IcmpValue>().unwrap().value(), 255);
        assert!("256".parse::<IcmpValue>().is_err());
        assert!("-1".parse::<IcmpValue>().is_err());
    }
}
