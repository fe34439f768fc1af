/// The router façade
///
/// [`StateService`] ties the pieces together: it owns the [`StateRegistry`],
/// the [`TransitionService`] and the router globals (current state, params,
/// path and last successful transition). Successful transitions commit the
/// globals, (de)activate views through the [`ViewSink`] and write the URL
/// through the [`LocationService`].
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::{RouterConfig, TransitionConfig, UrlConfig};
use crate::error::RouterError;
use crate::glob::Glob;
use crate::location::{parse_url, LocationService};
use crate::params::RawParams;
use crate::path::{self, PathNode};
use crate::state::{State, StateDeclaration, StateRegistry};
use crate::target::{StateRef, TargetState};
use crate::transition::{
    HookArgs, HookCriteria, HookEvent, HookOptions, HookResult, Injectable, Reload, RejectType, Rejection, Transition,
    TransitionOptions, TransitionOutcome, TransitionService, TransitionSource, UrlUpdate,
};
use crate::view::ViewSink;

/// Receives every rejection except `Ignored`
pub type ErrorHandler = Arc<dyn Fn(&Rejection) + Send + Sync>;

/// Priority of the built-in success hooks; they run before user hooks
const COMMIT_PRIORITY: i32 = 10_000;

/// Snapshot of where the router is
#[derive(Debug, Clone)]
pub struct Globals {
    pub current: State,
    pub params: RawParams,
    pub path: Vec<PathNode>,
    /// The last successful transition
    pub transition: Option<Transition>,
}

/// Options for [`StateService::href`]
#[derive(Debug, Clone)]
pub struct HrefOptions {
    /// Base for relative identifiers (the current state when `None`)
    pub relative: Option<State>,
    /// Fill missing params from the current ones
    pub inherit: bool,
}

impl Default for HrefOptions {
    fn default() -> Self {
        Self {
            relative: None,
            inherit: true,
        }
    }
}

struct ServiceInner {
    registry: StateRegistry,
    transitions: TransitionService,
    globals: RwLock<Globals>,
    location: Arc<dyn LocationService>,
    views: Arc<dyn ViewSink>,
    url_config: UrlConfig,
    config: TransitionConfig,
    error_handler: RwLock<ErrorHandler>,
}

/// Shared handle to the router
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use rhtmx_state_router::{LocationService, MemoryLocation, RawParams, RouterConfig, StateDeclaration, StateService, ViewService};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let location = Arc::new(MemoryLocation::default());
/// let router = StateService::new(location.clone(), Arc::new(ViewService::new()), &RouterConfig::default());
/// router.register(StateDeclaration::new("home").with_url("/home")).unwrap();
///
/// let state = router.go("home", RawParams::new(), None).await.unwrap();
/// assert_eq!(state.name(), "home");
/// assert_eq!(location.url(), "/home");
/// assert_eq!(router.href("home", RawParams::new(), Default::default()), Some("/home".to_string()));
/// # }
/// ```
#[derive(Clone)]
pub struct StateService {
    inner: Arc<ServiceInner>,
}

impl fmt::Debug for StateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateService")
            .field("current", &self.current())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl StateService {
    pub fn new(location: Arc<dyn LocationService>, views: Arc<dyn ViewSink>, config: &RouterConfig) -> Self {
        let registry = StateRegistry::new(config.urls.clone(), &config.registry);
        let transitions = TransitionService::new(registry.clone());
        let root = registry.root();
        let globals = Globals {
            current: root.clone(),
            params: RawParams::new(),
            path: path::build_path(&root, &RawParams::new()),
            transition: None,
        };

        let log_rejections = config.transitions.log_rejections;
        let error_handler: ErrorHandler = Arc::new(move |rejection: &Rejection| {
            if log_rejections {
                warn!(%rejection, "transition rejected");
            }
        });

        let service = Self {
            inner: Arc::new(ServiceInner {
                registry,
                transitions,
                globals: RwLock::new(globals),
                location,
                views,
                url_config: config.urls.clone(),
                config: config.transitions.clone(),
                error_handler: RwLock::new(error_handler),
            }),
        };
        service.register_success_hooks();
        service
    }

    /// Builds the router and registers the configured states in order
    pub fn from_config(
        config: &RouterConfig,
        location: Arc<dyn LocationService>,
        views: Arc<dyn ViewSink>,
    ) -> Result<Self, RouterError> {
        let service = Self::new(location, views, config);
        for state in &config.states {
            service.register(StateDeclaration::from(state.clone()))?;
        }
        if !config.registry.auto_flush {
            service.inner.registry.flush()?;
        }
        Ok(service)
    }

    fn register_success_hooks(&self) {
        type Step = fn(&StateService, &Transition);
        let steps: [Step; 3] = [commit_globals, update_views, update_url];
        for step in steps {
            let weak: Weak<ServiceInner> = Arc::downgrade(&self.inner);
            let callback = Injectable::new(&[], move |args: HookArgs| {
                if let Some(inner) = weak.upgrade() {
                    step(&StateService { inner }, &args.transition);
                }
                Ok(HookResult::Continue)
            });
            self.inner.transitions.hooks().register(
                HookEvent::Success,
                HookCriteria::new(),
                callback,
                HookOptions {
                    priority: COMMIT_PRIORITY,
                    invoke_limit: None,
                },
            );
        }
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.inner.registry
    }

    pub fn transitions(&self) -> &TransitionService {
        &self.inner.transitions
    }

    pub fn location(&self) -> &Arc<dyn LocationService> {
        &self.inner.location
    }

    pub fn globals(&self) -> Globals {
        self.inner.globals.read().clone()
    }

    pub fn current(&self) -> State {
        self.inner.globals.read().current.clone()
    }

    pub fn params(&self) -> RawParams {
        self.inner.globals.read().params.clone()
    }

    /// The transition running right now
    pub fn transition(&self) -> Option<Transition> {
        self.inner.transitions.active().get()
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&Rejection) + Send + Sync + 'static,
    {
        *self.inner.error_handler.write() = Arc::new(handler);
    }

    pub fn register(&self, declaration: StateDeclaration) -> Result<Option<State>, RouterError> {
        self.inner.registry.register(declaration)
    }

    pub fn deregister(&self, name: &str) -> Result<Vec<String>, RouterError> {
        self.inner.registry.deregister(name)
    }

    pub fn get(&self, name: &str) -> Option<State> {
        self.inner.registry.get(name)
    }

    pub fn get_all(&self) -> Vec<State> {
        self.inner.registry.get_all()
    }

    pub fn target(
        &self,
        identifier: impl Into<StateRef>,
        params: RawParams,
        options: Option<TransitionOptions>,
    ) -> TargetState {
        self.inner.registry.target(identifier, params, options)
    }

    /// Navigates relative to the current state
    ///
    /// Missing params are inherited from the current ones unless the options
    /// opt out with `inherit(false)`.
    pub async fn go(
        &self,
        identifier: impl Into<StateRef>,
        params: RawParams,
        options: Option<TransitionOptions>,
    ) -> TransitionOutcome {
        let mut options = options.unwrap_or_default();
        options.inherit.get_or_insert(true);
        let options = match options.relative {
            Some(_) => options,
            None => options.with_relative(self.current()),
        };
        self.transition_to(identifier, params, options).await
    }

    /// Runs a transition to the target and every redirect it produces
    pub async fn transition_to(
        &self,
        identifier: impl Into<StateRef>,
        params: RawParams,
        options: TransitionOptions,
    ) -> TransitionOutcome {
        let inherit = options.inherits(false);
        let target = self.inner.registry.target(identifier, params, Some(options));
        let from_path = self.inner.globals.read().path.clone();

        let target = match (inherit, target.state()) {
            (true, Some(state)) => {
                let params = path::inherit_params(&from_path, state, target.params());
                target.with_params(params, true)
            }
            _ => target,
        };

        let transition = self.inner.transitions.create(from_path, target);
        let (last, outcome) = transition.follow(self.inner.config.max_redirects).await;
        if let Err(rejection) = &outcome {
            self.handle_rejection(&last, rejection);
        }
        outcome
    }

    fn handle_rejection(&self, transition: &Transition, rejection: &Rejection) {
        match rejection.kind() {
            RejectType::Ignored => {
                let changes = transition.tree_changes();
                {
                    let mut globals = self.inner.globals.write();
                    globals.params = path::param_values(&changes.to);
                    globals.path = changes.to.clone();
                }
                debug!(id = transition.id(), "applied dynamic params of ignored transition");
                if transition.options().location != UrlUpdate::Skip {
                    self.update_location(transition.options().location == UrlUpdate::Replace);
                }
                return;
            }
            RejectType::Aborted if self.transition().is_none() => {
                self.update_location(true);
            }
            _ => {}
        }
        let handler = self.inner.error_handler.read().clone();
        handler(rejection);
    }

    /// Re-enters `state` (every state when `None`) and everything below it
    pub async fn reload(&self, state: Option<&str>) -> TransitionOutcome {
        let reload = match state {
            Some(name) => Reload::State(name.to_string()),
            None => Reload::All,
        };
        let options = TransitionOptions::default()
            .with_reload(reload)
            .with_location(UrlUpdate::Replace)
            .with_relative(self.current());
        let globals = self.globals();
        self.transition_to(globals.current, globals.params, options).await
    }

    /// True when `identifier` is the current state and `params` (if any)
    /// equal the current values
    pub fn is(&self, identifier: &str, params: Option<&RawParams>, relative: Option<&State>) -> bool {
        let Some(state) = self.find(identifier, relative) else {
            return false;
        };
        let globals = self.inner.globals.read();
        globals.current == state && params.map_or(true, |params| params_match(&state, &globals.params, params))
    }

    /// True when the current state is `identifier` or a descendant of it
    ///
    /// A glob must match the current state's name.
    pub fn includes(&self, identifier: &str, params: Option<&RawParams>, relative: Option<&State>) -> bool {
        let current = self.current();
        let state = if identifier.contains('*') {
            if !Glob::new(identifier).matches(current.name()) {
                return false;
            }
            current.clone()
        } else {
            match self.find(identifier, relative) {
                Some(state) => state,
                None => return false,
            }
        };
        if !current.includes(state.name()) {
            return false;
        }
        let globals = self.inner.globals.read();
        params.map_or(true, |params| params_match(&state, &globals.params, params))
    }

    fn find(&self, identifier: &str, relative: Option<&State>) -> Option<State> {
        let base = relative.cloned().unwrap_or_else(|| self.current());
        self.inner.registry.find(identifier, Some(&base)).ok().flatten()
    }

    /// The URL of `identifier` with `params`, through its nearest navigable
    /// state
    pub fn href(&self, identifier: &str, params: RawParams, options: HrefOptions) -> Option<String> {
        let state = self.find(identifier, options.relative.as_ref())?;
        let params = if options.inherit {
            let from = self.inner.globals.read().path.clone();
            path::inherit_params(&from, &state, &params)
        } else {
            params
        };
        self.format_url(&state, &params)
    }

    fn format_url(&self, state: &State, params: &RawParams) -> Option<String> {
        let navigable = state.navigable()?;
        let mut url = navigable.url()?.format(params)?;
        if let Some(Value::String(hash)) = params.get("#") {
            if !hash.is_empty() {
                url.push('#');
                url.push_str(hash);
            }
        }
        if self.inner.url_config.html5_mode {
            Some(url)
        } else {
            Some(format!("#{}{}", self.inner.url_config.hash_prefix, url))
        }
    }

    fn update_location(&self, replace: bool) {
        let (current, params) = {
            let globals = self.inner.globals.read();
            (globals.current.clone(), globals.params.clone())
        };
        if let Some(url) = self.format_url(&current, &params) {
            if url != self.inner.location.url() {
                trace!(url = %url, replace, "writing location");
                self.inner.location.set_url(&url, replace);
            }
        }
    }

    /// Transitions to the state matching the current location
    ///
    /// Falls back to the `otherwise` URL when no rule matches. `Ok(None)`
    /// means nothing matched at all.
    pub async fn sync_url(&self) -> Result<Option<State>, Rejection> {
        let mut parsed = parse_url(&self.inner.location.url());
        let mut matched = self.inner.registry.match_url(&parsed.path, &parsed.search);
        if matched.is_none() {
            if let Some(otherwise) = self.inner.registry.otherwise() {
                debug!(url = %otherwise, "no url rule matched, using otherwise");
                self.inner.location.set_url(&otherwise, true);
                parsed = parse_url(&otherwise);
                matched = self.inner.registry.match_url(&parsed.path, &parsed.search);
            }
        }
        let Some((state, mut params)) = matched else {
            return Ok(None);
        };
        if !parsed.hash.is_empty() {
            params.insert("#".to_string(), Value::String(parsed.hash.clone()));
        }

        let options = TransitionOptions::default()
            .with_location(UrlUpdate::Replace)
            .with_source(TransitionSource::Url);
        match self.transition_to(state, params, options).await {
            Ok(state) => Ok(Some(state)),
            Err(rejection) if rejection.kind() == RejectType::Ignored => Ok(Some(self.current())),
            Err(rejection) => Err(rejection),
        }
    }

    /// Syncs with every location change until the router is dropped
    pub fn listen(&self) -> JoinHandle<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        self.inner.location.on_change(Arc::new(move |url: &str| {
            // A closed channel means the listener task is gone.
            let _ = sender.send(url.to_string());
        }));

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(url) = receiver.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let service = StateService { inner };
                trace!(url = %url, "location changed");
                if let Err(rejection) = service.sync_url().await {
                    debug!(%rejection, "location sync rejected");
                }
            }
        })
    }
}

fn params_match(state: &State, current: &RawParams, expected: &RawParams) -> bool {
    let keys: Vec<&str> = expected
        .keys()
        .map(String::as_str)
        .filter(|key| state.params().get(key).is_some())
        .collect();
    state.params().equals(current, expected, Some(&keys))
}

fn commit_globals(service: &StateService, transition: &Transition) {
    let changes = transition.tree_changes();
    let Some(current) = changes.to_state().cloned() else {
        return;
    };
    let mut globals = service.inner.globals.write();
    globals.current = current;
    globals.params = path::param_values(&changes.to);
    globals.path = changes.to.clone();
    globals.transition = Some(transition.clone());
}

fn update_views(service: &StateService, transition: &Transition) {
    let changes = transition.tree_changes();
    for node in &changes.exiting {
        for view in node.state().views() {
            service.inner.views.deactivate(view);
        }
    }
    for node in &changes.entering {
        for view in node.state().views() {
            service.inner.views.activate(view);
        }
    }
}

fn update_url(service: &StateService, transition: &Transition) {
    let location = transition.options().location;
    if location != UrlUpdate::Skip {
        service.update_location(location == UrlUpdate::Replace);
    }
}
