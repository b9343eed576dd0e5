//! Rule, rule-set and name validation.
//!
//! Validation never touches a collaborator: the caller resolves the set of
//! valid subject names first and passes it in.

use netacl_types::{IcmpValue, IpFamily, PortSpec};
use once_cell::sync::Lazy;
use regex::Regex;

use super::config_rules::ConfigRules;
use super::rule::{split_trim, AclPut, AclRule};
use super::subject::{SubjectNames, SubjectSummary};
use super::types::{Direction, Protocol, RuleAction, RuleField, RuleState};
use crate::error::{RuleError, ValidationError};

/// Leading characters reserved for built-in selectors.
pub const RESERVED_NAME_PREFIXES: [char; 3] = ['@', '%', '#'];

static HOSTNAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9]*$").expect("Invalid regex pattern"));

/// Validates a single rule for `direction`.
///
/// The rule is expected to be normalised already.
pub fn validate_rule(
    rule: &AclRule,
    direction: Direction,
    names: &SubjectNames,
) -> Result<(), RuleError> {
    rule.action
        .parse::<RuleAction>()
        .map_err(|_| RuleError::InvalidField {
            field: RuleField::Action,
            value: rule.action.clone(),
            allowed: RuleAction::VALID,
        })?;

    rule.state
        .parse::<RuleState>()
        .map_err(|_| RuleError::InvalidField {
            field: RuleField::State,
            value: rule.state.clone(),
            allowed: RuleState::VALID,
        })?;

    let source = if rule.source.is_empty() {
        SubjectSummary::default()
    } else {
        SubjectSummary::classify_all(&rule.sources(), RuleField::Source, direction, names)?
    };

    let destination = if rule.destination.is_empty() {
        SubjectSummary::default()
    } else {
        SubjectSummary::classify_all(
            &rule.destinations(),
            RuleField::Destination,
            direction,
            names,
        )?
    };

    if !rule.source.is_empty()
        && !rule.destination.is_empty()
        && !source.compatible_with(&destination)
    {
        return Err(RuleError::ConflictingFamilies);
    }

    let protocol = if rule.protocol.is_empty() {
        None
    } else {
        let protocol = rule
            .protocol
            .parse::<Protocol>()
            .map_err(|_| RuleError::InvalidField {
                field: RuleField::Protocol,
                value: rule.protocol.clone(),
                allowed: Protocol::VALID,
            })?;
        Some(protocol)
    };

    match protocol {
        Some(protocol) if protocol.has_ports() => {
            reject_if_set(&rule.icmp_type, RuleField::IcmpType, |field| {
                RuleError::IcmpWithNonIcmpProtocol { field }
            })?;
            reject_if_set(&rule.icmp_code, RuleField::IcmpCode, |field| {
                RuleError::IcmpWithNonIcmpProtocol { field }
            })?;
            validate_ports(&rule.source_port, RuleField::SourcePort)?;
            validate_ports(&rule.destination_port, RuleField::DestinationPort)?;
        }
        Some(protocol) => {
            reject_if_set(&rule.source_port, RuleField::SourcePort, |field| {
                RuleError::PortWithIcmpProtocol { field, protocol }
            })?;
            reject_if_set(&rule.destination_port, RuleField::DestinationPort, |field| {
                RuleError::PortWithIcmpProtocol { field, protocol }
            })?;

            let forbidden = match protocol {
                Protocol::Icmp6 => IpFamily::V4,
                _ => IpFamily::V6,
            };
            for (field, summary) in [
                (RuleField::Source, &source),
                (RuleField::Destination, &destination),
            ] {
                if summary.has_family(forbidden) {
                    return Err(RuleError::FamilyNotAllowedForProtocol {
                        field,
                        family: forbidden,
                        protocol,
                    });
                }
            }

            validate_icmp(&rule.icmp_type, RuleField::IcmpType)?;
            validate_icmp(&rule.icmp_code, RuleField::IcmpCode)?;
        }
        None => {
            for (value, field) in [
                (&rule.icmp_type, RuleField::IcmpType),
                (&rule.icmp_code, RuleField::IcmpCode),
                (&rule.source_port, RuleField::SourcePort),
                (&rule.destination_port, RuleField::DestinationPort),
            ] {
                reject_if_set(value, field, |field| RuleError::RequiresProtocol { field })?;
            }
        }
    }

    Ok(())
}

fn reject_if_set(
    value: &str,
    field: RuleField,
    err: impl FnOnce(RuleField) -> RuleError,
) -> Result<(), RuleError> {
    if value.is_empty() {
        Ok(())
    } else {
        Err(err(field))
    }
}

fn validate_ports(list: &str, field: RuleField) -> Result<(), RuleError> {
    if list.is_empty() {
        return Ok(());
    }

    for port in split_trim(list) {
        port.parse::<PortSpec>()
            .map_err(|_| RuleError::InvalidPort {
                field,
                port: port.to_string(),
            })?;
    }
    Ok(())
}

fn validate_icmp(value: &str, field: RuleField) -> Result<(), RuleError> {
    if value.is_empty() {
        return Ok(());
    }

    value
        .parse::<IcmpValue>()
        .map(|_| ())
        .map_err(|_| RuleError::InvalidIcmpValue {
            field,
            value: value.to_string(),
        })
}

/// Normalises and validates one direction's rule sequence.
///
/// Each rule is validated and then compared against every other rule, so
/// the reported duplicate index is the first rule that has a twin.
pub fn validate_rule_set(
    rules: &mut [AclRule],
    direction: Direction,
    names: &SubjectNames,
) -> Result<(), ValidationError> {
    for rule in rules.iter_mut() {
        rule.normalise();
    }

    for (index, rule) in rules.iter().enumerate() {
        validate_rule(rule, direction, names).map_err(|source| ValidationError::Rule {
            direction,
            index,
            source,
        })?;

        let duplicated = rules
            .iter()
            .enumerate()
            .any(|(other, r)| other != index && r == rule);
        if duplicated {
            return Err(ValidationError::DuplicateRule { direction, index });
        }
    }

    Ok(())
}

/// Validates a full ACL body: config first, then ingress, then egress.
///
/// Rules are normalised in place.
pub fn validate_put(
    put: &mut AclPut,
    names: &SubjectNames,
    rules: &ConfigRules,
    user_prefix: &str,
) -> Result<(), ValidationError> {
    rules.validate(&put.config, user_prefix)?;
    validate_rule_set(&mut put.ingress, Direction::Ingress, names)?;
    validate_rule_set(&mut put.egress, Direction::Egress, names)?;
    Ok(())
}

/// Validates an ACL name.
///
/// Names must be distinguishable from addresses and reserved selectors when
/// they appear as rule subjects.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::Name {
        name: name.to_string(),
        reason,
    };

    let first = match name.chars().next() {
        Some(c) => c,
        None => return Err(invalid("Name is required".to_string())),
    };

    if RESERVED_NAME_PREFIXES.contains(&first) {
        return Err(invalid(format!(
            "Name cannot start with reserved character {:?}",
            first
        )));
    }

    if name.len() > 63 {
        return Err(invalid("Name must be 1-63 characters long".to_string()));
    }
    if first == '-' {
        return Err(invalid("Name must not start with a dash".to_string()));
    }
    if first.is_ascii_digit() {
        return Err(invalid("Name must not start with a digit".to_string()));
    }
    if name.ends_with('-') {
        return Err(invalid("Name must not end with a dash".to_string()));
    }
    if !HOSTNAME_CHARS.is_match(name) {
        return Err(invalid(
            "Name can only contain alphanumeric and hyphen characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names() -> SubjectNames {
        SubjectNames::new(["web", "db"])
    }

    fn web_rule() -> AclRule {
        AclRule::new("allow", "enabled")
            .with_source("10.0.0.0/24")
            .with_protocol("tcp")
            .with_destination_port("80,443")
    }

    fn check(rule: &AclRule, direction: Direction) -> Result<(), RuleError> {
        validate_rule(rule, direction, &names())
    }

    #[test]
    fn test_web_rule_is_valid() {
        assert_eq!(check(&web_rule(), Direction::Ingress), Ok(()));
        assert_eq!(
            check(&web_rule().with_source("@internal"), Direction::Ingress),
            Ok(())
        );
    }

    #[test]
    fn test_action_and_state_required() {
        let err = check(&AclRule::new("", "enabled"), Direction::Ingress).unwrap_err();
        assert_eq!(err.field(), Some(RuleField::Action));
        assert_eq!(err.to_string(), "Action must be one of: allow, drop, reject");

        let err = check(&AclRule::new("drop", "on"), Direction::Ingress).unwrap_err();
        assert_eq!(err.field(), Some(RuleField::State));
    }

    #[test]
    fn test_tcp_rejects_icmp_fields() {
        let rule = web_rule().with_icmp("8", "");
        assert_eq!(
            check(&rule, Direction::Ingress),
            Err(RuleError::IcmpWithNonIcmpProtocol {
                field: RuleField::IcmpType
            })
        );

        let rule = web_rule().with_protocol("udp").with_icmp("", "0");
        assert_eq!(
            check(&rule, Direction::Ingress),
            Err(RuleError::IcmpWithNonIcmpProtocol {
                field: RuleField::IcmpCode
            })
        );
    }

    #[test]
    fn test_ports() {
        let rule = web_rule().with_source_port("1024-65535");
        assert_eq!(check(&rule, Direction::Ingress), Ok(()));

        let rule = web_rule().with_destination_port("80,90-80");
        assert_eq!(
            check(&rule, Direction::Ingress),
            Err(RuleError::InvalidPort {
                field: RuleField::DestinationPort,
                port: "90-80".to_string(),
            })
        );

        let rule = web_rule().with_destination_port("65536");
        assert!(matches!(
            check(&rule, Direction::Ingress),
            Err(RuleError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_icmp_rejects_ports() {
        let rule = web_rule().with_protocol("icmp4");
        assert_eq!(
            check(&rule, Direction::Ingress),
            Err(RuleError::PortWithIcmpProtocol {
                field: RuleField::DestinationPort,
                protocol: Protocol::Icmp4,
            })
        );
    }

    #[test]
    fn test_icmp_values() {
        let base = AclRule::new("allow", "enabled").with_protocol("icmp4");
        assert_eq!(check(&base.clone().with_icmp("8", "0"), Direction::Egress), Ok(()));

        let err = check(&base.with_icmp("256", ""), Direction::Egress).unwrap_err();
        assert_eq!(err.field(), Some(RuleField::IcmpType));
    }

    #[test]
    fn test_icmp_family_mismatch() {
        let rule = AclRule::new("allow", "enabled")
            .with_protocol("icmp6")
            .with_source("192.0.2.1");
        assert_eq!(
            check(&rule, Direction::Ingress),
            Err(RuleError::FamilyNotAllowedForProtocol {
                field: RuleField::Source,
                family: IpFamily::V4,
                protocol: Protocol::Icmp6,
            })
        );

        let rule = AclRule::new("allow", "enabled")
            .with_protocol("icmp4")
            .with_destination("2001:db8::1");
        assert!(matches!(
            check(&rule, Direction::Ingress),
            Err(RuleError::FamilyNotAllowedForProtocol {
                field: RuleField::Destination,
                family: IpFamily::V6,
                ..
            })
        ));
    }

    #[test]
    fn test_fields_require_protocol() {
        let base = AclRule::new("allow", "enabled");
        for (rule, field) in [
            (base.clone().with_icmp("8", ""), RuleField::IcmpType),
            (base.clone().with_icmp("", "1"), RuleField::IcmpCode),
            (base.clone().with_source_port("22"), RuleField::SourcePort),
            (base.clone().with_destination_port("22"), RuleField::DestinationPort),
        ] {
            assert_eq!(
                check(&rule, Direction::Ingress),
                Err(RuleError::RequiresProtocol { field })
            );
        }
    }

    #[test]
    fn test_unknown_protocol() {
        let rule = AclRule::new("allow", "enabled").with_protocol("sctp");
        let err = check(&rule, Direction::Ingress).unwrap_err();
        assert_eq!(err.field(), Some(RuleField::Protocol));
    }

    #[test]
    fn test_family_conflict() {
        let rule = AclRule::new("drop", "enabled")
            .with_source("192.0.2.0/24")
            .with_destination("2001:db8::/32");
        assert_eq!(
            check(&rule, Direction::Egress),
            Err(RuleError::ConflictingFamilies)
        );

        let rule = rule.with_destination("@external");
        assert_eq!(check(&rule, Direction::Egress), Ok(()));
    }

    #[test]
    fn test_named_subject_direction() {
        let rule = AclRule::new("allow", "enabled").with_destination("@internal");
        assert!(matches!(
            check(&rule, Direction::Ingress),
            Err(RuleError::NamedSubjectNotAllowed { .. })
        ));

        let rule = AclRule::new("allow", "enabled").with_source("@internal");
        assert_eq!(check(&rule, Direction::Ingress), Ok(()));
    }

    #[test]
    fn test_duplicates_detected_after_normalisation() {
        let mut rules = vec![
            AclRule::new("drop", "enabled").with_source("10.0.0.1"),
            web_rule(),
            AclRule::new("drop", "enabled").with_source(" 10.0.0.1 "),
        ];

        let err = validate_rule_set(&mut rules, Direction::Ingress, &names()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateRule {
                direction: Direction::Ingress,
                index: 0
            }
        );
        assert_eq!(err.to_string(), "Duplicate of ingress rule 0");
    }

    #[test]
    fn test_cross_direction_duplicates_allowed() {
        let mut put = AclPut {
            ingress: vec![AclRule::new("drop", "enabled").with_destination("10.0.0.1")],
            egress: vec![AclRule::new("drop", "enabled").with_destination("10.0.0.1")],
            ..Default::default()
        };
        assert_eq!(
            validate_put(&mut put, &names(), &ConfigRules::new(), "user."),
            Ok(())
        );
    }

    #[test]
    fn test_rule_error_position() {
        let mut rules = vec![web_rule(), AclRule::new("allow", "enabled").with_source("cache")];
        let err = validate_rule_set(&mut rules, Direction::Ingress, &names()).unwrap_err();
        assert_eq!(err.rule_position(), Some((Direction::Ingress, 1)));
        assert_eq!(
            err.to_string(),
            r#"Invalid ingress rule 1: Invalid Source: Invalid subject "cache""#
        );
    }

    #[test]
    fn test_config_checked_before_rules() {
        let mut put = AclPut {
            ingress: vec![AclRule::new("bogus", "enabled")],
            config: [("mtu".to_string(), "1500".to_string())].into(),
            ..Default::default()
        };
        let err = validate_put(&mut put, &names(), &ConfigRules::new(), "user.").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownConfigKey { .. }));
    }

    #[test]
    fn test_names() {
        assert!(validate_name("web").is_ok());
        assert!(validate_name("web-tier-2").is_ok());

        for bad in ["", "@web", "%web", "#web", "-web", "web-", "1web", "web_1", "web.a"] {
            assert!(validate_name(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_name(&"a".repeat(64)).is_err());
        assert!(validate_name(&"a".repeat(63)).is_ok());
    }
}
