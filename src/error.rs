//! Error type shared by every stage of the compiler.
//!
//! Each variant carries a stable code so callers (and tests) can match on
//! the failure class without parsing messages.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_SYNTAX: &str = "RPL-ERR-SYNTAX-001";
pub const ERR_UNKNOWN_FILTER: &str = "RPL-ERR-FILTER-001";
pub const ERR_TEMPLATE: &str = "RPL-ERR-TEMPLATE-001";
pub const ERR_MULTIPLE_ROOTS: &str = "RPL-ERR-TEMPLATE-002";
pub const ERR_INVALID_OPTIONS: &str = "RPL-ERR-CONFIG-001";
pub const ERR_ALREADY_BOUND: &str = "RPL-ERR-LIFECYCLE-001";
pub const ERR_NEVER_BOUND: &str = "RPL-ERR-LIFECYCLE-002";
pub const ERR_NOT_COMPILED: &str = "RPL-ERR-LIFECYCLE-003";
pub const ERR_ALREADY_MOUNTED: &str = "RPL-ERR-LIFECYCLE-004";
pub const ERR_DESTROYED: &str = "RPL-ERR-LIFECYCLE-005";
pub const ERR_UNKNOWN_METHOD: &str = "RPL-ERR-EVENT-001";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("invalid expression `{expression}`: {message}")]
    Syntax { expression: String, message: String },

    #[error("unresolved filter `{name}`")]
    UnknownFilter { name: String },

    #[error("invalid template: {message}")]
    Template { message: String },

    #[error("component `{component}` content must have exactly one root element")]
    MultipleRoots { component: String },

    #[error("invalid compiler options: {message}")]
    InvalidOptions { message: String },

    #[error("view is already bound")]
    AlreadyBound,

    #[error("view was never bound")]
    NeverBound,

    #[error("view must be bound once before it can be mounted")]
    NotCompiled,

    #[error("view is already mounted")]
    AlreadyMounted,

    #[error("view has been destroyed")]
    Destroyed,

    #[error("event `{event}` is bound to unknown method `{method}`")]
    UnknownMethod { event: String, method: String },
}

impl Error {
    pub fn syntax(expression: &str, message: impl Into<String>) -> Self {
        Self::Syntax {
            expression: expression.to_string(),
            message: message.into(),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Stable code identifying the failure class.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => ERR_SYNTAX,
            Self::UnknownFilter { .. } => ERR_UNKNOWN_FILTER,
            Self::Template { .. } => ERR_TEMPLATE,
            Self::MultipleRoots { .. } => ERR_MULTIPLE_ROOTS,
            Self::InvalidOptions { .. } => ERR_INVALID_OPTIONS,
            Self::AlreadyBound => ERR_ALREADY_BOUND,
            Self::NeverBound => ERR_NEVER_BOUND,
            Self::NotCompiled => ERR_NOT_COMPILED,
            Self::AlreadyMounted => ERR_ALREADY_MOUNTED,
            Self::Destroyed => ERR_DESTROYED,
            Self::UnknownMethod { .. } => ERR_UNKNOWN_METHOD,
        }
    }

    /// Lifecycle misuse, as opposed to template or expression problems.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::AlreadyBound
                | Self::NeverBound
                | Self::NotCompiled
                | Self::AlreadyMounted
                | Self::Destroyed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::syntax("a +", "bad").code(), "RPL-ERR-SYNTAX-001");
        assert_eq!(
            Error::UnknownFilter { name: "x".into() }.code(),
            "RPL-ERR-FILTER-001"
        );
        assert_eq!(Error::Destroyed.code(), "RPL-ERR-LIFECYCLE-005");
    }

    #[test]
    fn test_messages() {
        let err = Error::UnknownMethod {
            event: "add".into(),
            method: "handleAdd".into(),
        };
        assert_eq!(
            err.to_string(),
            "event `add` is bound to unknown method `handleAdd`"
        );
        assert!(!err.is_lifecycle());
        assert!(Error::NeverBound.is_lifecycle());
    }
}
