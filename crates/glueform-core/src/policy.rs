//! IAM policy documents
//!
//! Minimal model of the IAM JSON policy grammar: enough to express trust
//! policies and allow-lists, and to compare a desired document with the one
//! IAM hands back. Documents are immutable once built.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Statement")]
    statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    sid: Option<String>,
    #[serde(rename = "Effect")]
    effect: Effect,
    #[serde(
        rename = "Principal",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    principal: Option<BTreeMap<String, StringList>>,
    #[serde(rename = "Action")]
    action: StringList,
    #[serde(rename = "Resource", default, skip_serializing_if = "Option::is_none")]
    resource: Option<StringList>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// IAM accepts either a bare string or a list wherever a list is allowed.
/// Single values serialize back as a bare string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringList(Vec<String>);

impl StringList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for StringList {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl Serialize for StringList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            many => many.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StringListVisitor;

        impl<'de> Visitor<'de> for StringListVisitor {
            type Value = StringList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StringList, E> {
                Ok(StringList(vec![v.to_string()]))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<StringList, A::Error> {
                let mut values = Vec::new();
                while let Some(v) = seq.next_element::<String>()? {
                    values.push(v);
                }
                Ok(StringList(values))
            }
        }

        deserializer.deserialize_any(StringListVisitor)
    }
}

impl PolicyDocument {
    /// Trust policy letting an AWS service principal assume the role.
    pub fn assume_role(service_principal: &str) -> Self {
        let mut principal = BTreeMap::new();
        principal.insert(
            "Service".to_string(),
            StringList(vec![service_principal.to_string()]),
        );
        Self {
            version: POLICY_VERSION.to_string(),
            statements: vec![Statement {
                sid: None,
                effect: Effect::Allow,
                principal: Some(principal),
                action: StringList(vec!["sts:AssumeRole".to_string()]),
                resource: None,
            }],
        }
    }

    /// Single-statement allow policy over one resource pattern.
    pub fn allow<I, S>(actions: I, resource: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: POLICY_VERSION.to_string(),
            statements: vec![Statement {
                sid: None,
                effect: Effect::Allow,
                principal: None,
                action: StringList(actions.into_iter().map(Into::into).collect()),
                resource: Some(StringList(vec![resource.to_string()])),
            }],
        }
    }

    /// Parse a policy from IAM JSON, tolerating either string or list forms.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Stable JSON encoding used for diffing against observed state.
    pub fn to_canonical_json(&self) -> String {
        // Struct field order is fixed and maps are BTreeMaps, so plain
        // serialization is already canonical.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Statement {
    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn actions(&self) -> &[String] {
        self.action.as_slice()
    }

    pub fn resources(&self) -> &[String] {
        self.resource.as_ref().map(StringList::as_slice).unwrap_or(&[])
    }

    pub fn principal(&self, kind: &str) -> &[String] {
        self.principal
            .as_ref()
            .and_then(|p| p.get(kind))
            .map(StringList::as_slice)
            .unwrap_or(&[])
    }
}

/// Re-encode an observed policy document in canonical form.
///
/// Falls back to the raw text when IAM returns something this model does
/// not understand, which then simply shows up as a difference.
pub fn canonicalize(raw: &str) -> String {
    match PolicyDocument::from_json(raw) {
        Ok(doc) => doc.to_canonical_json(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_role_shape() {
        let doc = PolicyDocument::assume_role("glue.amazonaws.com");
        let json: serde_json::Value = serde_json::from_str(&doc.to_canonical_json()).unwrap();

        assert_eq!(json["Version"], "2012-10-17");
        assert_eq!(json["Statement"][0]["Effect"], "Allow");
        assert_eq!(
            json["Statement"][0]["Principal"]["Service"],
            "glue.amazonaws.com"
        );
        assert_eq!(json["Statement"][0]["Action"], "sts:AssumeRole");
        assert!(json["Statement"][0].get("Resource").is_none());
    }

    #[test]
    fn test_allow_lists_actions() {
        let doc = PolicyDocument::allow(["s3:*", "glue:*"], "*");
        let stmt = &doc.statements()[0];
        assert_eq!(stmt.effect(), Effect::Allow);
        assert_eq!(stmt.actions(), ["s3:*", "glue:*"]);
        assert_eq!(stmt.resources(), ["*"]);
    }

    #[test]
    fn test_canonicalize_normalizes_list_forms() {
        let observed = r#"{
            "Statement": [{
                "Action": ["sts:AssumeRole"],
                "Principal": {"Service": ["glue.amazonaws.com"]},
                "Effect": "Allow"
            }],
            "Version": "2012-10-17"
        }"#;
        let desired = PolicyDocument::assume_role("glue.amazonaws.com");
        assert_eq!(canonicalize(observed), desired.to_canonical_json());
    }

    #[test]
    fn test_canonicalize_keeps_unknown_text() {
        assert_eq!(canonicalize("not json"), "not json");
    }
}
