//! The state tree
//!
//! Declarations go through the [`StateRegistry`]: they are queued until their
//! parent exists, built by the [`StateBuilder`] into shared [`State`] handles
//! and indexed by name and URL.

pub mod builder;
pub mod declaration;
pub mod hierarchy;
pub mod matcher;
pub mod object;
pub mod queue;
pub mod registry;

pub use builder::{BuildContext, BuilderFn, StateBuilder};
pub use declaration::{LazyLoadFn, RedirectFn, RedirectTo, StateConfig, StateDeclaration};
pub use hierarchy::{implied_parent, NameHierarchy};
pub use object::{LazyLoad, State, StateObject};
pub use queue::StateQueue;
pub use registry::StateRegistry;
