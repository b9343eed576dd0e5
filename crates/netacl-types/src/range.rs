//! Inclusive IP address ranges.

use crate::ip::{IpAddress, IpFamily};
use crate::ParseError;
use std::fmt;
use std::str::FromStr;

/// An inclusive address range written as `start-end`.
///
/// Both ends share a family and `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    start: IpAddress,
    end: IpAddress,
}

impl IpRange {
    /// Creates a range, checking family agreement and ordering.
    pub fn new(start: IpAddress, end: IpAddress) -> Result<Self, ParseError> {
        if start.family() != end.family() {
            return Err(ParseError::InvalidIpRange(format!(
                "start {} and end {} are not in the same family",
                start, end
            )));
        }

        if start.to_v6_octets() > end.to_v6_octets() {
            return Err(ParseError::InvalidIpRange(format!(
                "start {} must be before or equal to end {}",
                start, end
            )));
        }

        Ok(Self { start, end })
    }

    pub const fn start(&self) -> &IpAddress {
        &self.start
    }

    pub const fn end(&self) -> &IpAddress {
        &self.end
    }

    pub fn family(&self) -> IpFamily {
        self.start.family()
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for IpRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ParseError::InvalidIpRange(format!("{} has no start and end", s)))?;

        let start: IpAddress = start.parse()?;
        let end: IpAddress = end.parse()?;

        IpRange::new(start, end)
    }
}
