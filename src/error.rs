//! Error types for netplan-rs

use thiserror::Error;

/// Main error type for netplan-rs operations
#[derive(Error, Debug)]
pub enum NetplanError {
    /// YAML is not well-formed (raw parser problem, bad indentation, aliases)
    #[error("{0}")]
    Syntax(String),

    /// Well-formed YAML with unexpected structure (wrong node kind, unknown
    /// key, out-of-range value)
    #[error("{0}")]
    Schema(String),

    /// A semantic invariant is violated (missing required field, duplicate
    /// default route, mutually exclusive options)
    #[error("{0}")]
    Validation(String),

    /// A definition references an id that nothing provides
    #[error("{netdef_id}: unknown id '{reference}'")]
    Reference { netdef_id: String, reference: String },

    /// Feature recognized but not supported by the chosen backend
    #[error("{0}")]
    UnsupportedBackend(String),

    /// The YAML emitter rejected an event
    #[error("YAML emitter error: {0}")]
    Emitter(String),

    /// Filesystem or descriptor error during read/write
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raw serde_yaml failure while reading a document
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl NetplanError {
    /// Create a syntax error with `path:line:column: message` plus a source
    /// excerpt and a caret under the offending column.
    pub fn syntax_at(
        path: &std::path::Path,
        line: usize,
        column: usize,
        message: impl std::fmt::Display,
        source_line: Option<&str>,
    ) -> Self {
        let mut text = format!("{}:{}:{}: {}", path.display(), line, column, message);
        if let Some(src) = source_line {
            text.push('\n');
            text.push_str(src.trim_end());
            text.push('\n');
            text.push_str(&" ".repeat(column.saturating_sub(1)));
            text.push('^');
        }
        Self::Syntax(text)
    }

    /// Create a schema error scoped to a file and key path
    pub fn schema(
        path: &std::path::Path,
        key_path: impl std::fmt::Display,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Schema(format!("{}: {}: {}", path.display(), key_path, message))
    }

    /// Create a validation error scoped to a definition
    pub fn validation(netdef_id: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self::Validation(format!("{}: {}", netdef_id, message))
    }

    /// Create an unsupported-backend error scoped to a definition
    pub fn unsupported(netdef_id: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self::UnsupportedBackend(format!("{}: {}", netdef_id, message))
    }

    /// True for errors that the IGNORE_ERRORS flag may demote to warnings
    /// (the offending definition is dropped, import continues).
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Reference { .. } | Self::UnsupportedBackend(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_syntax_error_caret() {
        let err = NetplanError::syntax_at(
            Path::new("etc/netplan/01.yaml"),
            3,
            5,
            "tabs are not allowed for indent",
            Some("\tdhcp4: true"),
        );
        let text = err.to_string();
        assert!(text.starts_with("etc/netplan/01.yaml:3:5:"));
        assert!(text.ends_with("    ^"));
    }

    #[test]
    fn test_ignorable_kinds() {
        assert!(NetplanError::validation("eth0", "bad").is_ignorable());
        assert!(
            NetplanError::Reference {
                netdef_id: "vlan10".into(),
                reference: "eth9".into()
            }
            .is_ignorable()
        );
        assert!(!NetplanError::Syntax("x".into()).is_ignorable());
    }
}
