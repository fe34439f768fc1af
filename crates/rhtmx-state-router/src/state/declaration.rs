/// State declarations: the raw, user-facing description of a state
///
/// A [`StateDeclaration`] is built with `with_*` methods (or converted from a
/// serde [`StateConfig`]) and handed to the registry, which queues and builds
/// it into a [`State`](super::State).
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::{ParamDeclaration, RawParams};
use crate::resolve::Resolvable;
use crate::transition::{HookArgs, HookResult, Injectable, Transition};

/// Loads the real declarations behind a future state
pub type LazyLoadFn =
    Arc<dyn Fn(Transition) -> BoxFuture<'static, anyhow::Result<Vec<StateDeclaration>>> + Send + Sync>;

/// Computes a redirect when the state is about to be entered
pub type RedirectFn = Arc<dyn Fn(&Transition) -> anyhow::Result<HookResult> + Send + Sync>;

/// Where to go instead of a state
#[derive(Clone)]
pub enum RedirectTo {
    /// Redirect to a state by name, keeping the transition's params
    State(String),
    /// Redirect to a state with explicit params
    Target { state: String, params: RawParams },
    /// Decide at transition time
    Func(RedirectFn),
}

impl fmt::Debug for RedirectTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectTo::State(name) => f.debug_tuple("State").field(name).finish(),
            RedirectTo::Target { state, params } => f
                .debug_struct("Target")
                .field("state", state)
                .field("params", params)
                .finish(),
            RedirectTo::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// A state declaration
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::{HookResult, ParamDeclaration, StateDeclaration};
/// use serde_json::json;
///
/// let contacts = StateDeclaration::new("contacts")
///     .with_url("/contacts?sort")
///     .with_param("sort", ParamDeclaration::new().with_default(json!("name")))
///     .with_view("$default", json!({ "component": "ContactList" }))
///     .with_data("title", json!("Contacts"))
///     .on_enter(&[], |_args| Ok(HookResult::Continue));
/// assert_eq!(contacts.name, "contacts");
/// assert!(contacts.on_enter.is_some());
/// ```
#[derive(Clone, Default)]
pub struct StateDeclaration {
    pub name: String,
    pub parent: Option<String>,
    pub url: Option<String>,
    pub is_abstract: bool,
    pub params: BTreeMap<String, ParamDeclaration>,
    pub views: BTreeMap<String, Value>,
    pub component: Option<String>,
    pub data: BTreeMap<String, Value>,
    pub resolve: Vec<Resolvable>,
    pub on_enter: Option<Injectable>,
    pub on_exit: Option<Injectable>,
    pub on_retain: Option<Injectable>,
    pub redirect_to: Option<RedirectTo>,
    pub lazy_load: Option<LazyLoadFn>,
}

impl fmt::Debug for StateDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDeclaration")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("url", &self.url)
            .field("is_abstract", &self.is_abstract)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("resolve", &self.resolve.iter().map(Resolvable::token).collect::<Vec<_>>())
            .field("redirect_to", &self.redirect_to)
            .field("lazy_load", &self.lazy_load.is_some())
            .finish()
    }
}

impl StateDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets an explicit parent (the name must then be a single segment or
    /// agree with the parent)
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// URL fragment appended to the parent's URL; prefix with `^` for an
    /// absolute URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Marks the state as a non-navigable container
    pub fn abstract_state(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_param(mut self, id: impl Into<String>, declaration: ParamDeclaration) -> Self {
        self.params.insert(id.into(), declaration);
        self
    }

    /// Adds a view keyed `name`, `name@state`, `@state` or `name@`
    pub fn with_view(mut self, key: impl Into<String>, config: Value) -> Self {
        self.views.insert(key.into(), config);
        self
    }

    /// Shorthand for a single `$default` view rendering `component`
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_resolve(mut self, resolvable: Resolvable) -> Self {
        self.resolve.push(resolvable);
        self
    }

    pub fn on_enter<F>(mut self, deps: &[&str], callback: F) -> Self
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.on_enter = Some(Injectable::new(deps, callback));
        self
    }

    pub fn on_exit<F>(mut self, deps: &[&str], callback: F) -> Self
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.on_exit = Some(Injectable::new(deps, callback));
        self
    }

    pub fn on_retain<F>(mut self, deps: &[&str], callback: F) -> Self
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.on_retain = Some(Injectable::new(deps, callback));
        self
    }

    pub fn with_redirect_to(mut self, redirect: RedirectTo) -> Self {
        self.redirect_to = Some(redirect);
        self
    }

    /// Makes this a lazily loaded state; usually combined with a `name.**`
    /// future-state name
    pub fn with_lazy_load<F, Fut>(mut self, load: F) -> Self
    where
        F: Fn(Transition) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<StateDeclaration>>> + Send + 'static,
    {
        self.lazy_load = Some(Arc::new(move |transition| load(transition).boxed()));
        self
    }

    /// Future-state placeholders end in `.**`
    pub fn is_future(&self) -> bool {
        self.name.ends_with(".**")
    }
}

/// Serializable state definition used by `[[states]]` in router.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    pub name: String,

    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,

    #[serde(default)]
    pub params: BTreeMap<String, ParamDeclaration>,

    #[serde(default)]
    pub views: BTreeMap<String, Value>,

    #[serde(default)]
    pub component: Option<String>,

    #[serde(default)]
    pub data: BTreeMap<String, Value>,

    /// Name of the state to redirect to
    #[serde(default)]
    pub redirect_to: Option<String>,
}

impl From<StateConfig> for StateDeclaration {
    fn from(config: StateConfig) -> Self {
        StateDeclaration {
            name: config.name,
            parent: config.parent,
            url: config.url,
            is_abstract: config.is_abstract,
            params: config.params,
            views: config.views,
            component: config.component,
            data: config.data,
            redirect_to: config.redirect_to.map(RedirectTo::State),
            ..StateDeclaration::default()
        }
    }
}
