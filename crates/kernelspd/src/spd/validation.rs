//! Checks run on limits before an SPD is built.
//!
//! A check collects every issue instead of stopping at the first one, so
//! a caller can report them together.
//!
//! ```rust
//! use kernelspd::spd::{SpdConfig, Validatable};
//!
//! let result = SpdConfig::new().boundary_length_max(0).validate();
//! for issue in result.errors() {
//!     eprintln!("{}", issue);
//! }
//! assert!(!result.is_valid());
//! ```

use std::fmt;

use super::error::{Error, ValidationErrorInfo};

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The limit cannot be used.
    Error,
    /// The limit works but is probably a mistake.
    Warning,
}

/// One problem with one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub field: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} in '{}': {}", kind, self.field, self.message)
    }
}

/// Issues found by a check.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    issues: Vec<Issue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue that makes the limits unusable.
    pub fn error(&mut self, field: &'static str, message: impl Into<String>) {
        self.push(field, message.into(), Severity::Error);
    }

    /// Record an issue worth reporting.
    pub fn warning(&mut self, field: &'static str, message: impl Into<String>) {
        self.push(field, message.into(), Severity::Warning);
    }

    fn push(&mut self, field: &'static str, message: String, severity: Severity) {
        self.issues.push(Issue {
            field,
            message,
            severity,
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// Fail with [`Error::Validation`] if any error was recorded.
    pub fn into_result(self) -> Result<(), Error> {
        let errors: Vec<ValidationErrorInfo> = self
            .errors()
            .map(|i| ValidationErrorInfo::new(i.field, i.message.clone()))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }
}

/// Types checked before use.
pub trait Validatable {
    fn validate(&self) -> ValidationResult;

    fn is_valid(&self) -> bool {
        self.validate().is_valid()
    }
}
