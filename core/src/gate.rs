use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

/// Why an allow-list input was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllowListError {
    #[error("allow-list is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("allow-list must be a JSON array of strings, got {0}")]
    NotStringArray(&'static str),
}

/// Operation names enabled for one configuration.
///
/// An empty set is an open allow-list (every operation admitted); a
/// non-empty set admits exactly its members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledOperations {
    names: BTreeSet<String>,
}

impl EnabledOperations {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a JSON-encoded array of operation names, e.g. `["read_record"]`.
    pub fn parse(raw: &str) -> Result<Self, AllowListError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| AllowListError::InvalidJson(e.to_string()))?;
        let Value::Array(items) = value else {
            return Err(AllowListError::NotStringArray(json_kind(&value)));
        };
        let mut names = BTreeSet::new();
        for item in items {
            match item {
                Value::String(name) => {
                    names.insert(name);
                }
                other => return Err(AllowListError::NotStringArray(json_kind(&other))),
            }
        }
        Ok(Self { names })
    }

    /// Parse an optional allow-list; malformed input degrades to the open
    /// allow-list and is reported to the operator log only.
    pub fn parse_or_open(raw: Option<&str>, source: &'static str) -> Self {
        let Some(raw) = raw else {
            return Self::open();
        };
        match Self::parse(raw) {
            Ok(enabled) => enabled,
            Err(err) => {
                tracing::warn!(
                    event = "allow_list_rejected",
                    source = source,
                    error = %err,
                    "Ignoring malformed allow-list; all operations stay enabled"
                );
                Self::open()
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.names.is_empty()
    }

    /// Capability gate: should `name` be registered at all?
    pub fn admits(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.contains(name)
    }

    /// Keep only the candidates the gate admits, preserving their order.
    pub fn admitted<T>(
        &self,
        candidates: impl IntoIterator<Item = T>,
        name_of: impl Fn(&T) -> &str,
    ) -> Vec<T> {
        candidates
            .into_iter()
            .filter(|candidate| self.admits(name_of(candidate)))
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
