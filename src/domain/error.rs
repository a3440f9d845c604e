//! Domain-level errors (no external dependencies)

use itertools::Itertools;
use thiserror::Error;

use crate::domain::node::{quote, Location};

/// Configuration errors raised while expanding a template.
///
/// Every variant names the template it was raised for. Each one aborts the
/// instantiation point being processed; whether the run continues is up to
/// the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{reason}: {}", quote(.template))]
    MalformedTemplate { template: String, reason: String },

    #[error("invalid format spec {} in {}: {reason}", quote(.spec), quote(.template))]
    InvalidFormatSpec {
        template: String,
        spec: String,
        reason: String,
    },

    #[error("cannot access {} in {}: {reason}", quote(.field), quote(.template))]
    InvalidFieldAccess {
        template: String,
        field: String,
        reason: String,
    },

    #[error("undefined variable {} in {}", quote(.name), quote(.template))]
    UndefinedVariable { template: String, name: String },

    #[error(
        "invalid parameter {} definition for template {}: expected a value or a dict with single element, but got: {value}",
        quote(.axis),
        quote(.template)
    )]
    MalformedAxis {
        template: String,
        axis: String,
        value: String,
    },

    #[error("template {}: unknown axis {} for exclude element: {exclude}", quote(.template), quote(.axis))]
    UnknownAxis {
        template: String,
        axis: String,
        exclude: String,
    },

    #[error("template {}: exclude element should be a non-empty dict", quote(.template))]
    EmptyExclude { template: String },

    #[error("template {}: exclude element should be a dict, but is: {element}", quote(.template))]
    InvalidExclude { template: String, element: String },

    #[error(
        "while expanding {} for template {}: recursive parameters usage: {}",
        quote(.name),
        quote(.template),
        .chain.join(" <- ")
    )]
    RecursiveParameter {
        template: String,
        name: String,
        /// Outermost dependent first, ending with the repeated name.
        chain: Vec<String>,
    },

    #[error("{}", formatting_failure(.name, .used_by, .template, .cause))]
    FormattingFailure {
        template: String,
        name: String,
        /// Enclosing dependents, innermost first.
        used_by: Vec<String>,
        cause: Box<DomainError>,
    },

    #[error("{context}: {reason}")]
    InvalidSpec { context: String, reason: String },

    #[error("{context}: failed to find a template or group named {}", quote(.name))]
    UnknownSpec { context: String, name: String },

    #[error(
        "template {} wants defaults {} but it was never defined",
        quote(.template),
        quote(.defaults)
    )]
    UndefinedDefaults { template: String, defaults: String },

    #[error("{context}: recursive group usage: {}", .chain.join(" -> "))]
    RecursiveGroup {
        context: String,
        /// Outermost group first, ending with the repeated name.
        chain: Vec<String>,
    },

    #[error("{location}: {cause}")]
    Located {
        location: Location,
        cause: Box<DomainError>,
    },
}

fn formatting_failure(
    name: &str,
    used_by: &[String],
    template: &str,
    cause: &DomainError,
) -> String {
    let used_by = used_by
        .iter()
        .map(|dependent| format!(", used by {}", quote(dependent)))
        .join("");
    format!(
        "while expanding {}{used_by}, used by template {}: {cause}",
        quote(name),
        quote(template)
    )
}

impl DomainError {
    pub(crate) fn malformed(template: &str, reason: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach a source location when one is known; otherwise unchanged.
    pub fn with_location(self, location: Option<&Location>) -> Self {
        match location {
            Some(location) if !matches!(self, Self::Located { .. }) => Self::Located {
                location: location.clone(),
                cause: Box::new(self),
            },
            _ => self,
        }
    }

    /// The innermost error, with formatting and location wrappers removed.
    pub fn root_cause(&self) -> &DomainError {
        match self {
            Self::FormattingFailure { cause, .. } | Self::Located { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
