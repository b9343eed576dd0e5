//! ACL rule and ACL body types.
//!
//! Rules are kept in their API shape: every field is a string, and list
//! fields (subjects and ports) are comma-joined. Normalisation trims scalar
//! fields and every list token so that two rules that mean the same thing
//! compare equal.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A single ingress or egress rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AclRule {
    pub action: String,
    pub source: String,
    pub destination: String,
    pub protocol: String,
    pub source_port: String,
    pub destination_port: String,
    pub icmp_type: String,
    pub icmp_code: String,
    pub description: String,
    pub state: String,
}

impl AclRule {
    /// Creates a rule with the given action and state and no match fields.
    pub fn new(action: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            state: state.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_source_port(mut self, port: impl Into<String>) -> Self {
        self.source_port = port.into();
        self
    }

    pub fn with_destination_port(mut self, port: impl Into<String>) -> Self {
        self.destination_port = port.into();
        self
    }

    pub fn with_icmp(mut self, icmp_type: impl Into<String>, icmp_code: impl Into<String>) -> Self {
        self.icmp_type = icmp_type.into();
        self.icmp_code = icmp_code.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Normalises the rule in place. Idempotent.
    pub fn normalise(&mut self) {
        trim_in_place(&mut self.action);
        trim_in_place(&mut self.protocol);
        trim_in_place(&mut self.icmp_type);
        trim_in_place(&mut self.icmp_code);
        trim_in_place(&mut self.description);
        trim_in_place(&mut self.state);

        self.source = join_trimmed(&self.source);
        self.destination = join_trimmed(&self.destination);
        self.source_port = join_trimmed(&self.source_port);
        self.destination_port = join_trimmed(&self.destination_port);
    }

    /// Source subjects as trimmed tokens.
    pub fn sources(&self) -> Vec<&str> {
        split_trim(&self.source)
    }

    /// Destination subjects as trimmed tokens.
    pub fn destinations(&self) -> Vec<&str> {
        split_trim(&self.destination)
    }
}

/// Splits a comma-separated list and trims every token.
///
/// Empty tokens are kept so that `"a,,b"` fails validation rather than
/// silently collapsing.
pub fn split_trim(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).collect()
}

fn join_trimmed(list: &str) -> String {
    split_trim(list).join(",")
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The replaceable body of an ACL (everything except its name).
///
/// Rule sequences and config are never absent: a missing or `null` value
/// deserializes as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclPut {
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ingress: Vec<AclRule>,
    #[serde(deserialize_with = "null_as_default")]
    pub egress: Vec<AclRule>,
    #[serde(deserialize_with = "null_as_default")]
    pub config: BTreeMap<String, String>,
}

impl AclPut {
    /// Normalises every ingress and egress rule.
    pub fn normalise(&mut self) {
        for rule in self.ingress.iter_mut().chain(self.egress.iter_mut()) {
            rule.normalise();
        }
    }
}

/// A named ACL as exposed to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclInfo {
    pub name: String,
    #[serde(flatten)]
    pub put: AclPut,
    /// Referencing endpoints. `None` means "not populated".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<Vec<String>>,
}

impl AclInfo {
    pub fn new(name: impl Into<String>, put: AclPut) -> Self {
        Self {
            name: name.into(),
            put,
            used_by: None,
        }
    }
}
