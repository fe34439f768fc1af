//! Async data resolution along a path
//!
//! [`Resolvable`]s are declared on states and copied onto each
//! [`PathNode`](crate::path::PathNode); a [`ResolveContext`] looks them up
//! along the path and resolves them by policy.

pub mod context;
pub mod resolvable;

pub use context::ResolveContext;
pub use resolvable::{
    Locals, MemoryLoader, ResolveArgs, ResolveFn, ResolvePolicy, Resolvable, SharedResolve, ValueLoader,
    STATE_PARAMS,
};
