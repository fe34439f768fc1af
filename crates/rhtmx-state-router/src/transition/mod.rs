//! The transition engine
//!
//! A [`Transition`] diffs the current path against a target path
//! ([`TreeChanges`]) and runs the hook pipeline over the result. Hooks are
//! registered globally on the [`TransitionService`] or locally on one
//! transition through [`HookRegistration`]; they return a [`HookResult`].
//! Every failed transition settles with a [`Rejection`].

mod builtin;
pub mod deferred;
pub mod hook;
pub mod options;
pub mod registry;
pub mod reject;
pub mod service;
#[allow(clippy::module_inception)]
pub mod transition;
pub mod tree;

pub use deferred::{Deferred, TransitionOutcome};
pub use hook::{HookArgs, HookFn, HookResult, Injectable};
pub use options::{Reload, TransitionOptions, TransitionSource, UrlUpdate};
pub use registry::{HookCriteria, HookEvent, HookOptions, HookRegistration, HookRegistry, RegisteredHook, StateCriterion};
pub use reject::{RejectDetail, RejectType, Rejection};
pub use service::TransitionService;
pub use transition::{ActiveTransition, Transition, DEFAULT_MAX_REDIRECTS};
pub use tree::TreeChanges;
