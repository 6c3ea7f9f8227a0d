//! Per-invocation inputs handed to the executor by the serialization framework.

use std::collections::HashMap;
use std::fmt;

/// Context under which a rule runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleMode {
    Upgrade,
    Downgrade,
    UpDown,
    /// Producing: plaintext in, ciphertext out.
    Write,
    /// Consuming: ciphertext in, plaintext out.
    Read,
    WriteRead,
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleMode::Upgrade => "UPGRADE",
            RuleMode::Downgrade => "DOWNGRADE",
            RuleMode::UpDown => "UPDOWN",
            RuleMode::Write => "WRITE",
            RuleMode::Read => "READ",
            RuleMode::WriteRead => "WRITEREAD",
        })
    }
}

/// Logical type of the field being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Record,
    Enum,
    Array,
    Map,
    Combined,
    Fixed,
    String,
    Bytes,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Null,
}

/// A field value as seen by the transform.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Boolean(bool),
}

/// Rule invocation context: target subject, mode, and rule parameters.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub subject: String,
    pub rule_mode: RuleMode,
    /// Parameters declared on the rule itself.
    pub params: HashMap<String, String>,
    /// Metadata properties of the target schema.
    pub metadata: HashMap<String, String>,
}

impl RuleContext {
    pub fn new(subject: impl Into<String>, rule_mode: RuleMode) -> Self {
        Self {
            subject: subject.into(),
            rule_mode,
            params: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Builder-style helper that sets a rule parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Builder-style helper that sets a schema metadata property.
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Look up a parameter: rule params first, then schema metadata.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .or_else(|| self.metadata.get(name))
            .map(String::as_str)
    }
}
