//! Script value marshaling.
//!
//! Converts ACL types into the read-only value tree exposed to embedded
//! scripts. Every exposed type lists its fields by hand, using the same
//! names as its JSON form; nothing is derived from struct layout.
//!
//! Only the top-level value is an object with a type name. Nested structs
//! become plain dicts.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::acl::{AclInfo, AclPut, AclRule};

/// Script value error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Invalid field {0:?}")]
    InvalidField(String),
}

/// A value as seen by scripts.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    None,
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<ScriptValue>),
    /// Keys are kept sorted.
    Dict(BTreeMap<String, ScriptValue>),
    Object(ScriptObject),
}

impl ScriptValue {
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Object(o) => o.type_name(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

fn write_dict(f: &mut fmt::Formatter<'_>, fields: &BTreeMap<String, ScriptValue>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (k, v)) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{:?}: {}", k, v)?;
    }
    write!(f, "}}")
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{}", i),
            Self::String(s) => write!(f, "{:?}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Dict(fields) => write_dict(f, fields),
            Self::Object(o) => write_dict(f, &o.fields),
        }
    }
}

/// A typed, read-only record with named attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptObject {
    type_name: &'static str,
    fields: BTreeMap<String, ScriptValue>,
}

impl ScriptObject {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Attribute names in sorted order.
    pub fn attr_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn attr(&self, name: &str) -> Result<&ScriptValue, ScriptError> {
        self.fields
            .get(name)
            .ok_or_else(|| ScriptError::InvalidField(name.to_string()))
    }
}

/// Conversion into a script value.
pub trait ToScriptValue {
    fn to_script_value(&self) -> ScriptValue;
}

/// A struct exposed to scripts.
pub trait ScriptStruct {
    const TYPE_NAME: &'static str;

    /// Adds this struct's fields to `fields`.
    fn script_fields(&self, fields: &mut BTreeMap<String, ScriptValue>);
}

/// Converts a struct into a top-level script object.
pub fn to_script_object<T: ScriptStruct>(value: &T) -> ScriptObject {
    let mut fields = BTreeMap::new();
    value.script_fields(&mut fields);
    ScriptObject {
        type_name: T::TYPE_NAME,
        fields,
    }
}

impl From<ScriptObject> for ScriptValue {
    fn from(object: ScriptObject) -> Self {
        ScriptValue::Object(object)
    }
}

impl ToScriptValue for str {
    fn to_script_value(&self) -> ScriptValue {
        ScriptValue::String(self.to_string())
    }
}

impl ToScriptValue for String {
    fn to_script_value(&self) -> ScriptValue {
        ScriptValue::String(self.clone())
    }
}

impl ToScriptValue for bool {
    fn to_script_value(&self) -> ScriptValue {
        ScriptValue::Bool(*self)
    }
}

impl ToScriptValue for i64 {
    fn to_script_value(&self) -> ScriptValue {
        ScriptValue::Int(*self)
    }
}

impl<T: ToScriptValue> ToScriptValue for Option<T> {
    fn to_script_value(&self) -> ScriptValue {
        match self {
            Some(v) => v.to_script_value(),
            None => ScriptValue::None,
        }
    }
}

impl<T: ToScriptValue> ToScriptValue for Vec<T> {
    fn to_script_value(&self) -> ScriptValue {
        ScriptValue::List(self.iter().map(ToScriptValue::to_script_value).collect())
    }
}

impl<T: ToScriptValue> ToScriptValue for BTreeMap<String, T> {
    fn to_script_value(&self) -> ScriptValue {
        ScriptValue::Dict(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_script_value()))
                .collect(),
        )
    }
}

fn set(fields: &mut BTreeMap<String, ScriptValue>, key: &str, value: &impl ToScriptValue) {
    fields.insert(key.to_string(), value.to_script_value());
}

impl ScriptStruct for AclRule {
    const TYPE_NAME: &'static str = "NetworkACLRule";

    fn script_fields(&self, fields: &mut BTreeMap<String, ScriptValue>) {
        set(fields, "action", &self.action);
        set(fields, "source", &self.source);
        set(fields, "destination", &self.destination);
        set(fields, "protocol", &self.protocol);
        set(fields, "source_port", &self.source_port);
        set(fields, "destination_port", &self.destination_port);
        set(fields, "icmp_type", &self.icmp_type);
        set(fields, "icmp_code", &self.icmp_code);
        set(fields, "description", &self.description);
        set(fields, "state", &self.state);
    }
}

impl ScriptStruct for AclPut {
    const TYPE_NAME: &'static str = "NetworkACLPut";

    fn script_fields(&self, fields: &mut BTreeMap<String, ScriptValue>) {
        set(fields, "description", &self.description);
        set(fields, "ingress", &self.ingress);
        set(fields, "egress", &self.egress);
        set(fields, "config", &self.config);
    }
}

impl ScriptStruct for AclInfo {
    const TYPE_NAME: &'static str = "NetworkACL";

    fn script_fields(&self, fields: &mut BTreeMap<String, ScriptValue>) {
        set(fields, "name", &self.name);
        self.put.script_fields(fields);
        // Unpopulated usage is shown as an empty list.
        set(fields, "used_by", self.used_by.as_ref().unwrap_or(&Vec::new()));
    }
}

macro_rules! struct_as_dict {
    ($($ty:ty),*) => {
        $(
            impl ToScriptValue for $ty {
                fn to_script_value(&self) -> ScriptValue {
                    let mut fields = BTreeMap::new();
                    self.script_fields(&mut fields);
                    ScriptValue::Dict(fields)
                }
            }
        )*
    };
}

struct_as_dict!(AclRule, AclPut, AclInfo);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info() -> AclInfo {
        AclInfo::new(
            "web",
            AclPut {
                description: "Web servers".to_string(),
                ingress: vec![AclRule::new("allow", "enabled").with_destination_port("80")],
                egress: Vec::new(),
                config: [("user.owner".to_string(), "ops".to_string())].into(),
            },
        )
    }

    #[test]
    fn test_top_level_object() {
        let obj = to_script_object(&info());
        assert_eq!(obj.type_name(), "NetworkACL");
        assert_eq!(
            obj.attr_names(),
            vec!["config", "description", "egress", "ingress", "name", "used_by"]
        );
        assert_eq!(obj.attr("name").unwrap().as_str(), Some("web"));
        assert_eq!(obj.attr("used_by").unwrap(), &ScriptValue::List(Vec::new()));
    }

    #[test]
    fn test_unknown_attr() {
        let obj = to_script_object(&info());
        assert_eq!(
            obj.attr("ports").unwrap_err(),
            ScriptError::InvalidField("ports".to_string())
        );
    }

    #[test]
    fn test_nested_structs_are_dicts() {
        let obj = to_script_object(&info());
        let ingress = match obj.attr("ingress").unwrap() {
            ScriptValue::List(items) => items.clone(),
            other => panic!("unexpected {}", other.type_name()),
        };
        assert_eq!(ingress.len(), 1);
        assert_eq!(ingress[0].type_name(), "dict");

        match &ingress[0] {
            ScriptValue::Dict(rule) => {
                assert_eq!(rule["destination_port"].as_str(), Some("80"));
                assert_eq!(rule.len(), 10);
            }
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[test]
    fn test_object_as_value() {
        let value = ScriptValue::from(to_script_object(&AclRule::new("drop", "logged")));
        assert_eq!(value.type_name(), "NetworkACLRule");

        let listed = ScriptValue::List(vec![value]);
        let text = listed.to_string();
        assert!(text.starts_with(r#"[{"action": "drop", "#));
        assert!(text.ends_with(r#""state": "logged"}]"#));
    }

    #[test]
    fn test_display() {
        let mut config = BTreeMap::new();
        config.insert("b".to_string(), Some(1_i64));
        config.insert("a".to_string(), None);
        assert_eq!(config.to_script_value().to_string(), r#"{"a": None, "b": 1}"#);
        assert_eq!(vec![true, false].to_script_value().to_string(), "[True, False]");
    }
}
