//! # RHTMX State Router
//!
//! A hierarchical state router: a tree of named, nested states, each with
//! an optional URL pattern, typed parameters, views and async resolves. The
//! router computes what has to change when the active state changes and
//! runs that change through an async, multi-phase hook pipeline.
//!
//! - Nested states (`contacts`, `contacts.detail`) with inherited params
//! - Typed URL params (`/users/{id:int}`, `/files/*path`, `?sort&page`)
//! - Lazily resolved, memoized data per state (`Resolvable`)
//! - Transition hooks (`on_before`, `on_start`, `on_enter`, ...) matched by
//!   glob criteria (`admin.**`)
//! - Redirects, supersession and single-settle outcomes
//! - Future states (`mail.**`) loaded on demand
//!
//! ## Transition Pipeline
//!
//! 1. Invalid targets run `on_invalid` hooks and are rejected
//! 2. `on_before`, then targets equal to the current path are ignored
//! 3. `on_start` and `on`
//! 4. Eager resolves, then exit (child first), retain and enter (parent first)
//! 5. `on_success` / `on_error`
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use rhtmx_state_router::{MemoryLocation, RawParams, RouterConfig, StateDeclaration, StateService, ViewService};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let router = StateService::new(
//!     Arc::new(MemoryLocation::default()),
//!     Arc::new(ViewService::new()),
//!     &RouterConfig::default(),
//! );
//! router.register(StateDeclaration::new("contacts").with_url("/contacts")).unwrap();
//! router.register(StateDeclaration::new("contacts.detail").with_url("/{id:int}")).unwrap();
//!
//! let params: RawParams = [("id".to_string(), json!(42))].into_iter().collect();
//! let state = router.go("contacts.detail", params, None).await.unwrap();
//! assert_eq!(state.name(), "contacts.detail");
//! assert!(router.includes("contacts", None, None));
//! # }
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod config;
pub mod error;
pub mod glob;
pub mod location;
pub mod params;
pub mod path;
pub mod resolve;
pub mod state;
pub mod state_service;
pub mod target;
pub mod transition;
pub mod url;
pub mod view;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{RegistryConfig, RouterConfig, TransitionConfig, UrlConfig};
pub use error::{ResolveError, RouterError, TargetError};
pub use glob::Glob;
pub use location::{LocationListener, LocationService, MemoryLocation, ParsedUrl};
pub use params::{Param, ParamDeclaration, ParamLocation, ParamSet, ParamType, ParamTypes, RawParams, SquashPolicy};
pub use path::PathNode;
pub use resolve::{Locals, MemoryLoader, ResolveArgs, ResolveContext, ResolvePolicy, Resolvable, ValueLoader};
pub use state::{RedirectTo, State, StateConfig, StateDeclaration, StateRegistry};
pub use state_service::{ErrorHandler, Globals, HrefOptions, StateService};
pub use target::{StateRef, TargetState};
pub use transition::{
    HookArgs, HookCriteria, HookEvent, HookOptions, HookRegistration, HookRegistry, HookResult, Injectable, Reload,
    RejectDetail, RejectType, Rejection, StateCriterion, Transition, TransitionOptions, TransitionOutcome,
    TransitionService, TransitionSource, TreeChanges, UrlUpdate,
};
pub use url::{normalize_path, SearchParams, UrlMatcher, UrlRouter};
pub use view::{SlotListener, ViewConfig, ViewService, ViewSink};
