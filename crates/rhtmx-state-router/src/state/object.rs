/// Built states
///
/// [`StateObject`] is what the [`StateBuilder`](super::StateBuilder) produces
/// from a declaration. [`State`] is the shared handle to it used everywhere
/// else; two handles are equal only when they point at the same object, so a
/// state re-registered under the same name is a different state.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::declaration::{LazyLoadFn, RedirectTo, StateDeclaration};
use crate::params::ParamSet;
use crate::resolve::Resolvable;
use crate::transition::{Injectable, Transition};
use crate::url::UrlMatcher;
use crate::view::ViewConfig;

pub type LazyLoadResult = Result<Arc<Vec<StateDeclaration>>, Arc<anyhow::Error>>;

/// Memoized `lazy_load` of one state
///
/// Concurrent transitions share one load. A failed load is forgotten so the
/// next transition retries it; a successful one marks the state as loaded.
pub struct LazyLoad {
    load: LazyLoadFn,
    pending: Mutex<Option<Shared<BoxFuture<'static, LazyLoadResult>>>>,
    loaded: AtomicBool,
}

impl fmt::Debug for LazyLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLoad")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl LazyLoad {
    pub fn new(load: LazyLoadFn) -> Self {
        Self {
            load,
            pending: Mutex::new(None),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Starts the load or joins the one in flight
    pub fn load(self: &Arc<Self>, transition: Transition) -> Shared<BoxFuture<'static, LazyLoadResult>> {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.as_ref() {
            return existing.clone();
        }

        let weak: Weak<LazyLoad> = Arc::downgrade(self);
        let load = (self.load)(transition);
        let shared = async move {
            let result = load.await.map(Arc::new).map_err(Arc::new);
            if let Some(this) = weak.upgrade() {
                match &result {
                    Ok(declarations) => {
                        debug!(count = declarations.len(), "lazy load finished");
                        this.loaded.store(true, Ordering::SeqCst);
                    }
                    Err(_) => *this.pending.lock() = None,
                }
            }
            result
        }
        .boxed()
        .shared();

        *pending = Some(shared.clone());
        shared
    }
}

/// A built state
#[derive(Debug, Default)]
pub struct StateObject {
    pub(crate) name: String,
    pub(crate) parent: Option<State>,
    pub(crate) declaration: StateDeclaration,
    pub(crate) is_abstract: bool,
    pub(crate) own_url: Option<UrlMatcher>,
    pub(crate) url: Option<UrlMatcher>,
    pub(crate) navigable: bool,
    pub(crate) params: Arc<ParamSet>,
    pub(crate) views: Vec<ViewConfig>,
    pub(crate) resolvables: Vec<Resolvable>,
    pub(crate) data: BTreeMap<String, Value>,
    pub(crate) includes: BTreeSet<String>,
    pub(crate) on_enter: Option<Injectable>,
    pub(crate) on_exit: Option<Injectable>,
    pub(crate) on_retain: Option<Injectable>,
    pub(crate) redirect_to: Option<RedirectTo>,
    pub(crate) lazy_load: Option<Arc<LazyLoad>>,
}

impl StateObject {
    /// Fully qualified, dot-joined name (`""` for the root)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&State> {
        self.parent.as_ref()
    }

    pub fn declaration(&self) -> &StateDeclaration {
        &self.declaration
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// The state's own URL fragment, compiled
    pub fn own_url(&self) -> Option<&UrlMatcher> {
        self.own_url.as_ref()
    }

    /// The full URL: own fragment appended to the nearest ancestor URL
    pub fn url(&self) -> Option<&UrlMatcher> {
        self.url.as_ref()
    }

    /// Whether this state has a URL of its own to navigate to
    pub fn is_navigable(&self) -> bool {
        self.navigable
    }

    /// Own params chained to every ancestor's
    pub fn params(&self) -> &Arc<ParamSet> {
        &self.params
    }

    pub fn views(&self) -> &[ViewConfig] {
        &self.views
    }

    /// Resolvable templates; each path node takes fresh copies
    pub fn resolvables(&self) -> &[Resolvable] {
        &self.resolvables
    }

    /// Ancestor data merged with this state's own (own keys win)
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    /// True for this state's own name and every ancestor's
    pub fn includes(&self, name: &str) -> bool {
        self.includes.contains(name)
    }

    pub fn on_enter(&self) -> Option<&Injectable> {
        self.on_enter.as_ref()
    }

    pub fn on_exit(&self) -> Option<&Injectable> {
        self.on_exit.as_ref()
    }

    pub fn on_retain(&self) -> Option<&Injectable> {
        self.on_retain.as_ref()
    }

    pub fn redirect_to(&self) -> Option<&RedirectTo> {
        self.redirect_to.as_ref()
    }

    pub fn lazy_load(&self) -> Option<&Arc<LazyLoad>> {
        self.lazy_load.as_ref()
    }

    /// Placeholder for states loaded on demand (`name.**`)
    pub fn is_future(&self) -> bool {
        self.name.ends_with(".**")
    }

    /// Number of ancestors (the root has depth 0)
    pub fn depth(&self) -> usize {
        self.includes.len().saturating_sub(1)
    }
}

/// Shared handle to a [`StateObject`]
#[derive(Clone)]
pub struct State(Arc<StateObject>);

impl State {
    pub(crate) fn new(object: StateObject) -> Self {
        State(Arc::new(object))
    }

    /// Root → self
    pub fn path(&self) -> Vec<State> {
        let mut path = vec![self.clone()];
        let mut current = self.parent.clone();
        while let Some(state) = current {
            current = state.parent.clone();
            path.push(state);
        }
        path.reverse();
        path
    }

    /// Nearest state (self or ancestor) that owns a URL
    pub fn navigable(&self) -> Option<State> {
        self.path().into_iter().rev().find(|s| s.is_navigable())
    }

    pub fn ptr_eq(&self, other: &State) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for State {
    type Target = StateObject;

    fn deref(&self) -> &StateObject {
        &self.0
    }
}

impl PartialEq for State {
    fn eq(&self, other: &State) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for State {}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("State").field(&self.0.name).finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.name.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0.name)
        }
    }
}
