//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Covers deterministic business failures (state-machine guards, validation,
/// configuration invariants). Transport failures are absorbed inside the
/// notification layer and never surface here; callback failures are recorded
/// as warnings on the instance rather than returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A non-terminal instance already exists for (workflow code, entity).
    #[error("duplicate submission: {0}")]
    DuplicateSubmission(String),

    /// The workflow template is not in active status.
    #[error("inactive template: {0}")]
    InactiveTemplate(String),

    /// The entity's model tag is not in the template's applicable models.
    #[error("workflow not applicable to entity: {0}")]
    NotApplicable(String),

    /// A required node resolved to an empty approver set.
    #[error("no approver resolvable: {0}")]
    NoApproverResolvable(String),

    /// The caller is not a pending approver / not the applicant.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The action is not allowed in the current state.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    /// A scheme / plan / template failed invariant validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The directory service timed out or errored; the mutation was aborted.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// A requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A value failed validation (malformed input).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::DuplicateSubmission(msg.into())
    }

    pub fn inactive_template(msg: impl Into<String>) -> Self {
        Self::InactiveTemplate(msg.into())
    }

    pub fn not_applicable(msg: impl Into<String>) -> Self {
        Self::NotApplicable(msg.into())
    }

    pub fn no_approver(msg: impl Into<String>) -> Self {
        Self::NoApproverResolvable(msg.into())
    }

    pub fn not_authorized(msg: impl Into<String>) -> Self {
        Self::NotAuthorized(msg.into())
    }

    pub fn illegal_transition(msg: impl Into<String>) -> Self {
        Self::IllegalTransition(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn directory_unavailable(msg: impl Into<String>) -> Self {
        Self::DirectoryUnavailable(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
