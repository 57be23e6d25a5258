//! Error types for the layout engine.

use std::fmt;

/// A single configuration problem, reported per field.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConfigIssue {
    /// Name of the offending `LayoutConfig` field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl ConfigIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid layout configuration: {}", join_issues(.0))]
    InvalidConfig(Vec<ConfigIssue>),
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("unknown task: {0}")]
    UnknownTask(u32),
    #[error("layout engine has been disposed")]
    Disposed,
    #[error("failed to decode input: {0}")]
    Deserialize(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message_lists_fields() {
        let err = Error::InvalidConfig(vec![
            ConfigIssue::new("alpha_decay", "must be in (0, 1]"),
            ConfigIssue::new("link_distance", "must not be negative"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("alpha_decay: must be in (0, 1]"));
        assert!(msg.contains("link_distance: must not be negative"));
    }
}
