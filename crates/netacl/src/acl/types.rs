//! ACL rule enums.
//!
//! Rule fields arrive as free-form strings; these enums are the closed sets
//! the validator checks them against.

use std::fmt;
use std::str::FromStr;

/// Rule direction (which rule sequence a rule belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Traffic arriving at the protected endpoint.
    Ingress,
    /// Traffic leaving the protected endpoint.
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "ingress"),
            Self::Egress => write!(f, "egress"),
        }
    }
}

/// Rule action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleAction {
    Allow,
    Drop,
    Reject,
}

impl RuleAction {
    pub const VALID: &'static str = "allow, drop, reject";
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Drop => write!(f, "drop"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "drop" => Ok(Self::Drop),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Unknown rule action: {}", s)),
        }
    }
}

/// Rule state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleState {
    Enabled,
    Disabled,
    /// Enabled, with matches logged by the control plane.
    Logged,
}

impl RuleState {
    pub const VALID: &'static str = "enabled, disabled, logged";
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Logged => write!(f, "logged"),
        }
    }
}

impl FromStr for RuleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            "logged" => Ok(Self::Logged),
            _ => Err(format!("Unknown rule state: {}", s)),
        }
    }
}

/// Rule protocol. An empty protocol string means "any" and has no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp4,
    Icmp6,
}

impl Protocol {
    pub const VALID: &'static str = "icmp4, icmp6, tcp, udp";

    /// Returns true for protocols that carry L4 ports.
    pub const fn has_ports(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Icmp4 => write!(f, "icmp4"),
            Self::Icmp6 => write!(f, "icmp6"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp4" => Ok(Self::Icmp4),
            "icmp6" => Ok(Self::Icmp6),
            _ => Err(format!("Unknown protocol: {}", s)),
        }
    }
}

/// Rule field names, used to tag validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleField {
    Action,
    State,
    Source,
    Destination,
    Protocol,
    SourcePort,
    DestinationPort,
    IcmpType,
    IcmpCode,
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "Action"),
            Self::State => write!(f, "State"),
            Self::Source => write!(f, "Source"),
            Self::Destination => write!(f, "Destination"),
            Self::Protocol => write!(f, "Protocol"),
            Self::SourcePort => write!(f, "Source port"),
            Self::DestinationPort => write!(f, "Destination port"),
            Self::IcmpType => write!(f, "ICMP type"),
            Self::IcmpCode => write!(f, "ICMP code"),
        }
    }
}
