/// The state registry
///
/// Owns every built state, the queue of declarations waiting for a parent,
/// the builder, the param type table and the URL rules. [`StateRegistry`] is a
/// cheap `Clone` handle; all clones see the same states.
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::builder::{BuildContext, StateBuilder};
use super::declaration::StateDeclaration;
use super::matcher;
use super::object::{State, StateObject};
use super::queue::StateQueue;
use crate::config::{RegistryConfig, UrlConfig};
use crate::error::RouterError;
use crate::params::{ParamType, ParamTypes, RawParams};
use crate::target::{StateRef, TargetState};
use crate::transition::TransitionOptions;
use crate::url::{SearchParams, UrlRouter};

struct RegistryInner {
    states: BTreeMap<String, State>,
    order: Vec<String>,
    queue: StateQueue,
    builder: StateBuilder,
    url_router: UrlRouter,
    types: ParamTypes,
    url_config: UrlConfig,
    auto_flush: bool,
    root: State,
}

impl RegistryInner {
    fn try_build(&mut self, declaration: &StateDeclaration) -> Result<Option<State>, RouterError> {
        let states = &self.states;
        let built = self.builder.build(
            declaration,
            |name| states.get(name).cloned(),
            &self.types,
            &self.url_config,
        )?;
        let Some(state) = built else {
            return Ok(None);
        };

        let future = format!("{}.**", state.name());
        if !state.is_future() && self.states.contains_key(&future) {
            debug!(state = %state, "replacing future state");
            self.remove(&future);
        }
        self.install(state.clone());
        Ok(Some(state))
    }

    fn install(&mut self, state: State) {
        let name = state.name().to_string();
        if state.is_navigable() && !state.is_abstract() {
            if let Some(url) = state.url() {
                self.url_router.add(name.clone(), url.clone());
            }
        }
        info!(state = %name, url = ?state.url().map(|u| u.pattern()), "registered state");
        self.order.push(name.clone());
        self.states.insert(name, state);
    }

    fn flush(&mut self) -> Result<Vec<State>, RouterError> {
        let mut queue = std::mem::take(&mut self.queue);
        let result = queue.flush(|declaration| self.try_build(declaration));
        self.queue = queue;
        result
    }

    /// Removes `name` and its descendants, deepest first
    fn remove(&mut self, name: &str) -> Vec<String> {
        let mut doomed: Vec<State> = self
            .states
            .values()
            .filter(|s| s.includes(name))
            .cloned()
            .collect();
        doomed.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.name().cmp(b.name())));

        doomed
            .into_iter()
            .map(|state| {
                let name = state.name().to_string();
                self.states.remove(&name);
                self.order.retain(|n| *n != name);
                self.url_router.remove(&name);
                info!(state = %name, "deregistered state");
                name
            })
            .collect()
    }
}

/// Shared handle to the state tree
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::{StateDeclaration, StateRegistry};
///
/// let registry = StateRegistry::default();
/// // children may be registered before their parent
/// assert!(registry.register(StateDeclaration::new("users.list").with_url("/list")).unwrap().is_none());
/// registry.register(StateDeclaration::new("users").with_url("/users")).unwrap();
///
/// let list = registry.get("users.list").unwrap();
/// assert_eq!(list.url().unwrap().pattern(), "/users/list");
/// ```
#[derive(Clone)]
pub struct StateRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("StateRegistry")
            .field("states", &inner.order)
            .field("queued", &inner.queue.names())
            .finish()
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new(UrlConfig::default(), &RegistryConfig::default())
    }
}

impl StateRegistry {
    pub fn new(url_config: UrlConfig, config: &RegistryConfig) -> Self {
        let builder = StateBuilder::new();
        let types = ParamTypes::default();
        let root = match builder.build(
            &StateDeclaration::new("").abstract_state(),
            |_| None,
            &types,
            &url_config,
        ) {
            Ok(Some(root)) => root,
            _ => unreachable!("the root declaration always builds"),
        };

        let mut url_router = UrlRouter::new();
        if let Some(otherwise) = &url_config.otherwise {
            url_router.set_otherwise(otherwise.clone());
        }

        let mut states = BTreeMap::new();
        states.insert(String::new(), root.clone());

        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                states,
                order: Vec::new(),
                queue: StateQueue::new(),
                builder,
                url_router,
                types,
                url_config,
                auto_flush: config.auto_flush,
                root,
            })),
        }
    }

    /// Queues a declaration and, with auto-flush on, builds everything ready
    ///
    /// Returns the built state, or `None` while it waits for its parent.
    pub fn register(&self, declaration: StateDeclaration) -> Result<Option<State>, RouterError> {
        validate_name(&declaration.name)?;
        let name = declaration.name.clone();

        let mut inner = self.inner.write();
        if inner.states.contains_key(&name) || inner.queue.contains(&name) {
            return Err(RouterError::DuplicateState(name));
        }
        inner.queue.register(declaration, false);

        if inner.auto_flush {
            match inner.flush() {
                Ok(_) | Err(RouterError::OrphanedState(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(inner.states.get(&name).cloned())
    }

    /// Builds one declaration right away, bypassing the queue
    #[cfg(test)]
    pub(crate) fn register_now(&self, declaration: &StateDeclaration) -> Result<Option<State>, RouterError> {
        validate_name(&declaration.name)?;
        self.inner.write().try_build(declaration)
    }

    /// Builds every queued declaration whose parent is available
    ///
    /// Fails with [`RouterError::OrphanedState`] when some declarations can
    /// never be built.
    pub fn flush(&self) -> Result<Vec<State>, RouterError> {
        self.inner.write().flush()
    }

    /// Names still waiting for a parent
    pub fn queued(&self) -> Vec<String> {
        self.inner.read().queue.names().into_iter().map(str::to_string).collect()
    }

    /// Removes a state, its descendants and their URL rules
    ///
    /// Returns the removed names, deepest first.
    pub fn deregister(&self, name: &str) -> Result<Vec<String>, RouterError> {
        if name.is_empty() {
            return Err(RouterError::RootDeregistration);
        }
        let mut inner = self.inner.write();
        if !inner.states.contains_key(name) {
            return Err(RouterError::UnknownState(name.to_string()));
        }
        Ok(inner.remove(name))
    }

    /// Exact lookup by absolute name
    pub fn get(&self, name: &str) -> Option<State> {
        self.inner.read().states.get(name).cloned()
    }

    /// Every registered state except the root, in registration order
    pub fn get_all(&self) -> Vec<State> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.states.get(name).cloned())
            .collect()
    }

    /// Absolute or relative lookup, falling back to a covering future state
    pub fn find(&self, identifier: &str, base: Option<&State>) -> Result<Option<State>, RouterError> {
        matcher::find(&self.inner.read().states, identifier, base)
    }

    pub fn root(&self) -> State {
        self.inner.read().root.clone()
    }

    /// Builds a target against this registry
    pub fn target(
        &self,
        identifier: impl Into<StateRef>,
        params: RawParams,
        options: Option<TransitionOptions>,
    ) -> TargetState {
        TargetState::new(self, identifier.into(), params, options)
    }

    /// The first URL rule matching `path` and `search`
    pub fn match_url(&self, path: &str, search: &SearchParams) -> Option<(State, RawParams)> {
        let inner = self.inner.read();
        let matched = inner.url_router.match_url(path, search)?;
        let state = inner.states.get(&matched.state)?.clone();
        Some((state, matched.params))
    }

    pub fn set_otherwise(&self, url: impl Into<String>) {
        self.inner.write().url_router.set_otherwise(url);
    }

    pub fn otherwise(&self) -> Option<String> {
        self.inner.read().url_router.otherwise().map(str::to_string)
    }

    /// Names of the states with a URL rule, in match order
    pub fn url_rules(&self) -> Vec<String> {
        self.inner
            .read()
            .url_router
            .rules()
            .iter()
            .map(|rule| rule.state().to_string())
            .collect()
    }

    pub fn url_config(&self) -> UrlConfig {
        self.inner.read().url_config.clone()
    }

    /// Adds a custom param type for states registered from now on
    pub fn register_type(&self, param_type: ParamType) {
        self.inner.write().types.register(param_type);
    }

    /// Appends a builder step (or a decorator for an existing key)
    pub fn add_builder<F>(&self, key: &str, step: F)
    where
        F: Fn(&BuildContext<'_>, &mut StateObject) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.inner.write().builder.builder(key, step);
    }
}

/// Dotted names with non-empty segments; a trailing `.**` marks a future state
fn validate_name(name: &str) -> Result<(), RouterError> {
    let base = name.strip_suffix(".**").unwrap_or(name);
    let valid = !base.is_empty()
        && base
            .split('.')
            .all(|segment| !segment.is_empty() && !segment.contains(['*', '^', '@']));
    if valid {
        Ok(())
    } else {
        Err(RouterError::InvalidStateName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamDeclaration;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn names(states: &[State]) -> Vec<&str> {
        states.iter().map(|s| s.name()).collect()
    }

    #[rstest]
    #[case("")]
    #[case("a..b")]
    #[case(".a")]
    #[case("a.")]
    #[case("a.*")]
    #[case("**")]
    fn test_invalid_names(#[case] name: &str) {
        let registry = StateRegistry::default();
        assert_eq!(
            registry.register(StateDeclaration::new(name)).unwrap_err(),
            RouterError::InvalidStateName(name.to_string())
        );
    }

    #[test]
    fn test_duplicate_registered_or_queued() {
        let registry = StateRegistry::default();
        registry.register(StateDeclaration::new("a")).unwrap();
        registry.register(StateDeclaration::new("x.y")).unwrap();

        assert_eq!(
            registry.register(StateDeclaration::new("a")).unwrap_err(),
            RouterError::DuplicateState("a".to_string())
        );
        assert_eq!(
            registry.register(StateDeclaration::new("x.y")).unwrap_err(),
            RouterError::DuplicateState("x.y".to_string())
        );
    }

    #[test]
    fn test_orphans_wait_and_explicit_flush_reports() {
        let registry = StateRegistry::default();
        assert!(registry.register(StateDeclaration::new("ghost.child")).unwrap().is_none());
        assert_eq!(registry.queued(), vec!["ghost.child"]);
        assert_eq!(
            registry.flush().unwrap_err(),
            RouterError::OrphanedState("ghost.child".to_string())
        );

        registry.register(StateDeclaration::new("ghost")).unwrap();
        assert!(registry.get("ghost.child").is_some());
        assert!(registry.queued().is_empty());
    }

    #[test]
    fn test_manual_flush() {
        let registry = StateRegistry::new(UrlConfig::default(), &RegistryConfig { auto_flush: false });
        assert!(registry.register(StateDeclaration::new("a")).unwrap().is_none());
        assert!(registry.register(StateDeclaration::new("a.b")).unwrap().is_none());

        let built = registry.flush().unwrap();
        assert_eq!(names(&built), vec!["a", "a.b"]);
    }

    #[test]
    fn test_deregister_cascades() {
        let registry = StateRegistry::default();
        for declaration in [
            StateDeclaration::new("a").with_url("/a"),
            StateDeclaration::new("a.b").with_url("/b"),
            StateDeclaration::new("a.b.c").with_url("/c"),
            StateDeclaration::new("other").with_url("/other"),
        ] {
            registry.register(declaration).unwrap();
        }
        assert_eq!(registry.url_rules().len(), 4);

        let removed = registry.deregister("a").unwrap();
        assert_eq!(removed, vec!["a.b.c", "a.b", "a"]);
        assert_eq!(names(&registry.get_all()), vec!["other"]);
        assert_eq!(registry.url_rules(), vec!["other"]);
        assert!(registry.match_url("/a/b", &SearchParams::new()).is_none());
    }

    #[test]
    fn test_deregister_errors() {
        let registry = StateRegistry::default();
        assert_eq!(registry.deregister("").unwrap_err(), RouterError::RootDeregistration);
        assert_eq!(
            registry.deregister("nope").unwrap_err(),
            RouterError::UnknownState("nope".to_string())
        );
    }

    #[test]
    fn test_abstract_states_get_no_url_rule() {
        let registry = StateRegistry::default();
        registry.register(StateDeclaration::new("app").with_url("/app").abstract_state()).unwrap();
        registry.register(StateDeclaration::new("app.home").with_url("/home")).unwrap();

        assert_eq!(registry.url_rules(), vec!["app.home"]);
        let (state, _) = registry.match_url("/app/home", &SearchParams::new()).unwrap();
        assert_eq!(state.name(), "app.home");
    }

    #[test]
    fn test_match_url_decodes_params() {
        let registry = StateRegistry::default();
        registry
            .register(
                StateDeclaration::new("user")
                    .with_url("/users/{id:int}?tab")
                    .with_param("tab", ParamDeclaration::new().with_default(json!("info"))),
            )
            .unwrap();

        let search: SearchParams = [("tab".to_string(), "posts".to_string())].into_iter().collect();
        let (state, params) = registry.match_url("/users/7", &search).unwrap();
        assert_eq!(state.name(), "user");
        assert_eq!(params["id"], json!(7));
        assert_eq!(params["tab"], json!("posts"));
    }

    #[test]
    fn test_real_state_replaces_future_state() {
        let registry = StateRegistry::default();
        registry.register(StateDeclaration::new("admin.**").with_url("/admin")).unwrap();
        assert_eq!(registry.find("admin.users", None).unwrap().unwrap().name(), "admin.**");

        registry.register(StateDeclaration::new("admin").with_url("/admin")).unwrap();
        assert!(registry.get("admin.**").is_none());
        assert_eq!(registry.url_rules(), vec!["admin"]);
    }

    #[test]
    fn test_get_all_in_registration_order() {
        let registry = StateRegistry::default();
        for name in ["b", "a", "b.c"] {
            registry.register(StateDeclaration::new(name)).unwrap();
        }
        assert_eq!(names(&registry.get_all()), vec!["b", "a", "b.c"]);
        assert_eq!(registry.root().name(), "");
    }
}
