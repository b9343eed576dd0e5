//! Error types for ACL operations.
//!
//! - [`RuleError`]: one problem with one rule, tagged with the field
//! - [`ValidationError`]: rejected input, tagged with direction and rule index
//! - [`AclError`]: everything an ACL operation can return
//!
//! Validation errors are raised before any side effect. Dependency errors
//! raised mid-update are returned only after the revert plan has run.

use netacl_types::IpFamily;
use thiserror::Error;

use crate::acl::{Direction, Protocol, RuleField};
use crate::sdn::SdnError;
use crate::store::StoreError;

/// Result type alias for ACL operations.
pub type Result<T> = std::result::Result<T, AclError>;

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// A closed-set field holds a value outside its set.
    #[error("{field} must be one of: {allowed}")]
    InvalidField {
        field: RuleField,
        value: String,
        allowed: &'static str,
    },

    /// A subject is neither an address form nor a known name.
    #[error("Invalid {field}: Invalid subject {subject:?}")]
    InvalidSubject { field: RuleField, subject: String },

    /// A reserved classifier or ACL name used in a field/direction that
    /// does not accept names.
    #[error("Invalid {field}: Named subjects not allowed in \"{field}\" for \"{direction}\" rules")]
    NamedSubjectNotAllowed {
        field: RuleField,
        direction: Direction,
        subject: String,
    },

    #[error("Conflicting IP family types used for Source and Destination")]
    ConflictingFamilies,

    /// ICMP type or code on a tcp/udp rule.
    #[error("{field} cannot be used with non-ICMP protocol")]
    IcmpWithNonIcmpProtocol { field: RuleField },

    /// A port on an icmp4/icmp6 rule.
    #[error("{field} cannot be used with \"{protocol}\" protocol")]
    PortWithIcmpProtocol { field: RuleField, protocol: Protocol },

    /// An address literal of the wrong family for the ICMP version.
    #[error("Cannot use {family} addresses in {field} with \"{protocol}\" protocol")]
    FamilyNotAllowedForProtocol {
        field: RuleField,
        family: IpFamily,
        protocol: Protocol,
    },

    #[error("{field} cannot be used without specifying protocol")]
    RequiresProtocol { field: RuleField },

    #[error("Invalid {field}: Invalid port {port:?}")]
    InvalidPort { field: RuleField, port: String },

    #[error("Invalid {field}: {value:?} is not an unsigned 8-bit integer")]
    InvalidIcmpValue { field: RuleField, value: String },
}

impl RuleError {
    /// Returns the rule field this error refers to, if any.
    pub fn field(&self) -> Option<RuleField> {
        match self {
            Self::InvalidField { field, .. }
            | Self::InvalidSubject { field, .. }
            | Self::NamedSubjectNotAllowed { field, .. }
            | Self::IcmpWithNonIcmpProtocol { field }
            | Self::PortWithIcmpProtocol { field, .. }
            | Self::FamilyNotAllowedForProtocol { field, .. }
            | Self::RequiresProtocol { field }
            | Self::InvalidPort { field, .. }
            | Self::InvalidIcmpValue { field, .. } => Some(*field),
            Self::ConflictingFamilies => None,
        }
    }
}

/// Rejected caller input. Never accompanied by a state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid {direction} rule {index}: {source}")]
    Rule {
        direction: Direction,
        index: usize,
        #[source]
        source: RuleError,
    },

    /// `index` is the first rule that has an identical twin.
    #[error("Duplicate of {direction} rule {index}")]
    DuplicateRule { direction: Direction, index: usize },

    #[error("Invalid value for config option {key:?}: {message}")]
    ConfigValue { key: String, message: String },

    #[error("Invalid config option {key:?}")]
    UnknownConfigKey { key: String },

    #[error("Invalid name {name:?}: {reason}")]
    Name { name: String, reason: String },
}

impl ValidationError {
    /// Returns the offending rule's direction and index, if any.
    pub fn rule_position(&self) -> Option<(Direction, usize)> {
        match self {
            Self::Rule {
                direction, index, ..
            }
            | Self::DuplicateRule { direction, index } => Some((*direction, *index)),
            _ => None,
        }
    }

    /// Returns the rule-level cause, if any.
    pub fn rule_error(&self) -> Option<&RuleError> {
        match self {
            Self::Rule { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A failure inside a collaborator.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sdn(#[from] SdnError),
}

/// Coarse error class, for callers that map errors to API status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Dependency,
    NotFound,
}

/// Error type for ACL operations.
#[derive(Debug, Error)]
pub enum AclError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("An ACL by the name {name:?} exists already")]
    NameExists { name: String },

    #[error("Cannot {operation} an ACL that is in use")]
    InUse {
        name: String,
        operation: &'static str,
    },

    #[error("{context}: {source}")]
    Dependency {
        context: String,
        #[source]
        source: DependencyError,
    },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },
}

impl AclError {
    /// Wraps a store failure, keeping not-found as its own class.
    pub fn store(context: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, name } => Self::NotFound { kind, name },
            other => Self::Dependency {
                context: context.into(),
                source: other.into(),
            },
        }
    }

    /// Wraps an SDN client failure.
    pub fn sdn(context: impl Into<String>, err: SdnError) -> Self {
        Self::Dependency {
            context: context.into(),
            source: err.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NameExists { .. } | Self::InUse { .. } => ErrorKind::Conflict,
            Self::Dependency { .. } => ErrorKind::Dependency,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Returns the validation cause, if this is a validation error.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}
