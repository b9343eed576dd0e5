//! Rule subject classification.
//!
//! A subject token is tried as an address, then a CIDR prefix, then an
//! address range. Only when all three fail is it looked up among the valid
//! subject names (reserved classifiers plus the project's ACL names).

use std::collections::BTreeSet;

use netacl_types::{IpAddress, IpFamily, IpPrefix, IpRange};

use super::types::{Direction, RuleField};
use crate::error::RuleError;

/// Canonical and deprecated aliases of the internal classifier.
pub const INTERNAL_SUBJECTS: [&str; 2] = ["@internal", "#internal"];

/// Canonical and deprecated aliases of the external classifier.
pub const EXTERNAL_SUBJECTS: [&str; 2] = ["@external", "#external"];

/// Classification of a single subject token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    /// Address, prefix or range of the given family.
    Address(IpFamily),
    /// Reserved classifier or ACL name.
    Name,
}

/// Names a subject token may resolve to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectNames {
    names: BTreeSet<String>,
}

impl SubjectNames {
    /// Creates the set from the reserved classifiers plus `acl_names`.
    pub fn new<I, S>(acl_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: BTreeSet<String> = INTERNAL_SUBJECTS
            .iter()
            .chain(EXTERNAL_SUBJECTS.iter())
            .map(|s| s.to_string())
            .collect();
        names.extend(acl_names.into_iter().map(Into::into));
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Returns the family of `token` if it is an address, prefix or range.
pub fn address_family(token: &str) -> Option<IpFamily> {
    if let Ok(addr) = token.parse::<IpAddress>() {
        return Some(addr.family());
    }
    if let Ok(prefix) = token.parse::<IpPrefix>() {
        return Some(prefix.family());
    }
    if let Ok(range) = token.parse::<IpRange>() {
        return Some(range.family());
    }
    None
}

/// Returns true if named subjects are accepted in `field` for `direction`.
///
/// Names describe where traffic comes from on ingress and where it goes on
/// egress.
pub fn names_allowed(field: RuleField, direction: Direction) -> bool {
    matches!(
        (field, direction),
        (RuleField::Source, Direction::Ingress) | (RuleField::Destination, Direction::Egress)
    )
}

/// Classifies one subject token.
pub fn classify(
    token: &str,
    field: RuleField,
    direction: Direction,
    names: &SubjectNames,
) -> Result<SubjectKind, RuleError> {
    if let Some(family) = address_family(token) {
        return Ok(SubjectKind::Address(family));
    }

    if names.contains(token) {
        if names_allowed(field, direction) {
            return Ok(SubjectKind::Name);
        }
        return Err(RuleError::NamedSubjectNotAllowed {
            field,
            direction,
            subject: token.to_string(),
        });
    }

    Err(RuleError::InvalidSubject {
        field,
        subject: token.to_string(),
    })
}

/// What a subject list contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubjectSummary {
    pub has_name: bool,
    pub has_ipv4: bool,
    pub has_ipv6: bool,
}

impl SubjectSummary {
    /// Classifies every token, stopping at the first invalid one.
    pub fn classify_all(
        tokens: &[&str],
        field: RuleField,
        direction: Direction,
        names: &SubjectNames,
    ) -> Result<Self, RuleError> {
        let mut summary = Self::default();
        for token in tokens {
            match classify(token, field, direction, names)? {
                SubjectKind::Name => summary.has_name = true,
                SubjectKind::Address(IpFamily::V4) => summary.has_ipv4 = true,
                SubjectKind::Address(IpFamily::V6) => summary.has_ipv6 = true,
            }
        }
        Ok(summary)
    }

    pub fn has_family(&self, family: IpFamily) -> bool {
        match family {
            IpFamily::V4 => self.has_ipv4,
            IpFamily::V6 => self.has_ipv6,
        }
    }

    /// Returns true if `self` and `other` can describe the same traffic.
    ///
    /// A family present on one side must be present on the other, unless the
    /// other side carries a name.
    pub fn compatible_with(&self, other: &Self) -> bool {
        let covers = |a: &Self, b: &Self, family| {
            !a.has_family(family) || b.has_family(family) || b.has_name
        };

        [IpFamily::V4, IpFamily::V6]
            .into_iter()
            .all(|family| covers(self, other, family) && covers(other, self, family))
    }
}
