//! Audit capabilities and provenance message model
//!
//! A task opts into observation per category. Provenance messages are
//! JSON-LD objects; the `@context` they carry is chosen once, when the
//! task is built, through [`ProvenanceContext`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::BitOr;

/// Public location of the provenance vocabulary
pub const REMOTE_CONTEXT_URL: &str = "https://cairn-rs.github.io/schema/context.jsonld";

/// Vocabulary bundled into the binary
const EMBEDDED_CONTEXT: &str = r#"{
  "@context": {
    "prov": "http://www.w3.org/ns/prov#",
    "uid": "https://cairn-rs.github.io/ids/",
    "task": "prov:Activity",
    "monitor": "prov:Activity",
    "runtime": "prov:Entity",
    "startedAtTime": {"@id": "prov:startedAtTime", "@type": "xsd:dateTime"},
    "endedAtTime": {"@id": "prov:endedAtTime", "@type": "xsd:dateTime"},
    "wasStartedBy": {"@id": "prov:wasStartedBy", "@type": "@id"},
    "wasEndedBy": {"@id": "prov:wasEndedBy", "@type": "@id"},
    "entity_generated": {"@id": "prov:entity", "@type": "@id"},
    "hadActivity": {"@id": "prov:hadActivity", "@type": "@id"}
  }
}"#;

/// One observable category of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCapability {
    /// Resource usage sampling
    Resource,
    /// Provenance messages
    Provenance,
}

impl fmt::Display for AuditCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCapability::Resource => write!(f, "resource"),
            AuditCapability::Provenance => write!(f, "provenance"),
        }
    }
}

/// Set of enabled audit capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditFlags(BTreeSet<AuditCapability>);

impl AuditFlags {
    /// Nothing is audited
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Resource sampling only
    #[must_use]
    pub fn resource() -> Self {
        Self::from_iter([AuditCapability::Resource])
    }

    /// Provenance messages only
    #[must_use]
    pub fn prov() -> Self {
        Self::from_iter([AuditCapability::Provenance])
    }

    /// Every capability
    #[must_use]
    pub fn all() -> Self {
        Self::resource() | Self::prov()
    }

    /// Check whether a capability is enabled
    #[must_use]
    pub fn contains(&self, capability: AuditCapability) -> bool {
        self.0.contains(&capability)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AuditCapability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<AuditCapability> for AuditFlags {
    fn from_iter<I: IntoIterator<Item = AuditCapability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl BitOr for AuditFlags {
    type Output = AuditFlags;

    fn bitor(mut self, rhs: Self) -> Self::Output {
        self.0.extend(rhs.0);
        self
    }
}

impl BitOr<AuditCapability> for AuditFlags {
    type Output = AuditFlags;

    fn bitor(mut self, rhs: AuditCapability) -> Self::Output {
        self.0.insert(rhs);
        self
    }
}

/// Where the JSON-LD `@context` of provenance messages comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceContext {
    /// The vocabulary bundled with this crate, inlined into every message
    #[default]
    Embedded,
    /// A reference to a published vocabulary
    Remote(String),
}

impl ProvenanceContext {
    /// The value placed under `@context`
    pub fn resolve(&self) -> Value {
        match self {
            ProvenanceContext::Embedded => serde_json::from_str::<Value>(EMBEDDED_CONTEXT)
                .ok()
                .and_then(|mut doc| doc.get_mut("@context").map(Value::take))
                .unwrap_or(Value::Null),
            ProvenanceContext::Remote(url) => Value::String(url.clone()),
        }
    }
}

/// A JSON-LD provenance message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditMessage(Map<String, Value>);

impl AuditMessage {
    /// Start a message with an `@id`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("@id".to_string(), Value::String(id.into()));
        Self(fields)
    }

    /// Start a message that carries only a `@type`
    #[must_use]
    pub fn typed(kind: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("@type".to_string(), Value::String(kind.into()));
        Self(fields)
    }

    /// Builder-style field insertion
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Merge every key of a JSON object into the message
    #[must_use]
    pub fn merge(mut self, other: Map<String, Value>) -> Self {
        self.0.extend(other);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("@id").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("@type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Attach `@context` to a message
pub fn make_message(message: &AuditMessage, context: &ProvenanceContext) -> AuditMessage {
    message.clone().with("@context", context.resolve())
}

/// Fresh identifier in the `uid:` namespace
pub fn gen_uid() -> String {
    format!("uid:{}", uuid::Uuid::new_v4())
}

/// Timestamp in the format provenance messages use
pub fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_union_and_membership() {
        let flags = AuditFlags::resource() | AuditFlags::prov();
        assert_eq!(flags, AuditFlags::all());
        assert!(flags.contains(AuditCapability::Resource));
        assert!(flags.contains(AuditCapability::Provenance));
        assert!(!AuditFlags::none().contains(AuditCapability::Resource));
        assert!(AuditFlags::none().is_empty());
    }

    #[test]
    fn test_flags_serialize_as_list() {
        let json = serde_json::to_string(&AuditFlags::all()).unwrap();
        assert_eq!(json, r#"["resource","provenance"]"#);
    }

    #[test]
    fn test_make_message_embeds_context() {
        let message = AuditMessage::new("uid:1").with("@type", "task");
        let full = make_message(&message, &ProvenanceContext::Embedded);
        assert!(full.get("@context").is_some_and(Value::is_object));
        assert_eq!(full.kind(), Some("task"));

        let remote = make_message(
            &message,
            &ProvenanceContext::Remote(REMOTE_CONTEXT_URL.to_string()),
        );
        assert_eq!(
            remote.get("@context"),
            Some(&Value::String(REMOTE_CONTEXT_URL.to_string()))
        );
    }

    #[test]
    fn test_gen_uid_prefix() {
        let uid = gen_uid();
        assert!(uid.starts_with("uid:"));
        assert_ne!(uid, gen_uid());
    }
}
