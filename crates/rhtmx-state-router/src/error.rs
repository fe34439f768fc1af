//! Typed errors for registration, lookup, URL compilation, resolves and targets.
//!
//! Transition outcomes are not errors in this sense; they are reported as
//! [`Rejection`](crate::transition::Rejection) values.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the state registry, matcher, params and URL layers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    /// A state with the same name is already registered (or queued)
    #[error("State '{0}' is already defined")]
    DuplicateState(String),

    /// State names must be non-empty and must not contain empty segments
    #[error("State name '{0}' is not valid")]
    InvalidStateName(String),

    /// The declared parent does not match the dotted name prefix
    #[error("State '{name}' has parent '{parent}' but its name implies parent '{implied}'")]
    ParentMismatch {
        name: String,
        parent: String,
        implied: String,
    },

    /// Flushing the queue made no progress for two consecutive passes
    #[error("Cannot register orphaned state '{0}'")]
    OrphanedState(String),

    /// Absolute lookup failed
    #[error("No such state '{0}'")]
    UnknownState(String),

    /// A relative identifier (`.child`, `^.sibling`) was used without a base state
    #[error("No such state '{0}' relative to an unspecified base")]
    MissingBase(String),

    /// A relative identifier climbs above the root
    #[error("Path '{path}' not valid for state '{base}'")]
    InvalidRelativePath { path: String, base: String },

    /// The implicit root state cannot be removed
    #[error("Cannot deregister the root state")]
    RootDeregistration,

    /// A param declaration references an unregistered type
    #[error("Unknown parameter type '{0}'")]
    UnknownParamType(String),

    /// A param id appears twice in one state's own declarations
    #[error("Duplicate parameter '{param}' in state '{state}'")]
    DuplicateParam { state: String, param: String },

    /// The URL fragment could not be compiled
    #[error("Invalid url pattern '{pattern}': {reason}")]
    InvalidUrl { pattern: String, reason: String },
}

/// Failures while resolving a [`Resolvable`](crate::resolve::Resolvable)
///
/// Cloneable so one memoized failure can be handed to every dependent.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The producer (or a dependency's producer) returned an error
    #[error("Resolvable '{token}' failed: {error}")]
    Failed {
        token: String,
        error: Arc<anyhow::Error>,
    },

    /// A declared dependency is not visible from the resolvable's node
    #[error("Resolvable '{token}' depends on unknown token '{dependency}'")]
    MissingDependency { token: String, dependency: String },

    /// The dependency graph loops back onto a resolvable still being built
    #[error("Resolvable '{0}' depends on itself")]
    Cyclic(String),
}

impl ResolveError {
    /// Token of the resolvable that failed first
    pub fn token(&self) -> &str {
        match self {
            ResolveError::Failed { token, .. }
            | ResolveError::MissingDependency { token, .. }
            | ResolveError::Cyclic(token) => token,
        }
    }
}

/// Why a [`TargetState`](crate::target::TargetState) cannot be transitioned to
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("No such state '{0}'")]
    NotFound(String),

    #[error("Could not resolve '{identifier}': {reason}")]
    Unresolvable { identifier: String, reason: String },

    #[error("Cannot transition to abstract state '{0}'")]
    Abstract(String),

    #[error("Param values not valid for state '{state}'. Invalid params: [ {} ]", .keys.join(", "))]
    InvalidParams { state: String, keys: Vec<String> },
}
