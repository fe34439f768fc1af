/// Lazily evaluated, memoized async values scoped to a state
///
/// A [`Resolvable`] names a token, the tokens it depends on and a producer.
/// Its first [`get`](Resolvable::get) builds a shared future that resolves the
/// dependencies (fan-out / fan-in) and then runs the producer; every later
/// call returns that same future. A failure poisons the memo for good.
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::{self, join_all, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::context::ResolveContext;
use crate::error::ResolveError;
use crate::state::State;

/// Named values handed to producers and hooks
pub type Locals = BTreeMap<String, Value>;

/// Token under which the path's merged param values can be injected
pub const STATE_PARAMS: &str = "$stateParams";

pub type ResolveFuture = BoxFuture<'static, anyhow::Result<Value>>;
pub type ResolveFn = Arc<dyn Fn(ResolveArgs) -> ResolveFuture + Send + Sync>;
pub type SharedResolve = Shared<BoxFuture<'static, Result<Value, ResolveError>>>;

/// When a resolvable is resolved during a transition
///
/// Ordered `Jit < Lazy < Eager`: resolving "at or above" a policy includes
/// every stricter policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvePolicy {
    /// Only when first injected
    Jit,
    /// Right before the owning state is entered
    #[default]
    Lazy,
    /// Before any exit/enter hook runs
    Eager,
}

/// Inputs for a producer: the owning state and its resolved dependencies
#[derive(Debug, Clone)]
pub struct ResolveArgs {
    pub state: Option<State>,
    pub locals: Locals,
}

impl ResolveArgs {
    pub fn get(&self, token: &str) -> Option<&Value> {
        self.locals.get(token)
    }
}

/// Async port for values produced outside the router (templates, remote data)
#[async_trait]
pub trait ValueLoader: Send + Sync {
    /// Produces the value for `descriptor`
    async fn load(&self, descriptor: &Value, args: &ResolveArgs) -> anyhow::Result<Value>;
}

/// In-memory loader keyed by the descriptor's string form
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    values: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.values.lock().insert(key.into(), value);
    }
}

#[async_trait]
impl ValueLoader for MemoryLoader {
    async fn load(&self, descriptor: &Value, _args: &ResolveArgs) -> anyhow::Result<Value> {
        let key = match descriptor {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let found = self.values.lock().get(&key).cloned();
        found.ok_or_else(|| anyhow::anyhow!("Nothing to load for '{key}'"))
    }
}

struct ResolvableInner {
    token: String,
    deps: Vec<String>,
    policy: ResolvePolicy,
    resolve_fn: ResolveFn,
    promise: Mutex<Option<SharedResolve>>,
    data: Mutex<Option<Value>>,
}

#[derive(Clone)]
pub struct Resolvable {
    inner: Arc<ResolvableInner>,
}

impl fmt::Debug for Resolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvable")
            .field("token", &self.inner.token)
            .field("deps", &self.inner.deps)
            .field("policy", &self.inner.policy)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Resolvable {
    /// Creates a resolvable from an async producer
    ///
    /// # Examples
    ///
    /// ```
    /// use rhtmx_state_router::Resolvable;
    /// use serde_json::json;
    ///
    /// let user = Resolvable::new("user", &["userId"], |args| async move {
    ///     let id = args.get("userId").cloned().unwrap_or_default();
    ///     Ok(json!({ "id": id }))
    /// });
    /// assert_eq!(user.token(), "user");
    /// assert_eq!(user.deps(), &["userId".to_string()]);
    /// ```
    pub fn new<F, Fut>(token: impl Into<String>, deps: &[&str], producer: F) -> Self
    where
        F: Fn(ResolveArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::from_parts(
            token.into(),
            deps.iter().map(|d| d.to_string()).collect(),
            ResolvePolicy::default(),
            Arc::new(move |args| producer(args).boxed()),
        )
    }

    /// A resolvable whose value is already known
    pub fn value(token: impl Into<String>, value: Value) -> Self {
        let resolved = Self::from_parts(
            token.into(),
            Vec::new(),
            ResolvePolicy::default(),
            Arc::new({
                let value = value.clone();
                move |_| future::ready(Ok(value.clone())).boxed()
            }),
        );
        *resolved.inner.data.lock() = Some(value.clone());
        *resolved.inner.promise.lock() = Some(future::ready(Ok(value)).boxed().shared());
        resolved
    }

    /// A resolvable produced by a [`ValueLoader`]
    pub fn from_loader(
        token: impl Into<String>,
        deps: &[&str],
        loader: Arc<dyn ValueLoader>,
        descriptor: Value,
    ) -> Self {
        Self::new(token, deps, move |args| {
            let loader = loader.clone();
            let descriptor = descriptor.clone();
            async move { loader.load(&descriptor, &args).await }
        })
    }

    fn from_parts(token: String, deps: Vec<String>, policy: ResolvePolicy, resolve_fn: ResolveFn) -> Self {
        Self {
            inner: Arc::new(ResolvableInner {
                token,
                deps,
                policy,
                resolve_fn,
                promise: Mutex::new(None),
                data: Mutex::new(None),
            }),
        }
    }

    pub fn with_policy(self, policy: ResolvePolicy) -> Self {
        let copy = Self::from_parts(
            self.inner.token.clone(),
            self.inner.deps.clone(),
            policy,
            self.inner.resolve_fn.clone(),
        );
        copy.adopt_settled(&self);
        copy
    }

    /// An unresolved copy sharing the producer; pre-resolved values stay resolved
    pub fn fresh(&self) -> Self {
        let copy = Self::from_parts(
            self.inner.token.clone(),
            self.inner.deps.clone(),
            self.inner.policy,
            self.inner.resolve_fn.clone(),
        );
        copy.adopt_settled(self);
        copy
    }

    fn adopt_settled(&self, other: &Resolvable) {
        if let Some(data) = other.data() {
            *self.inner.data.lock() = Some(data.clone());
            *self.inner.promise.lock() = Some(future::ready(Ok(data)).boxed().shared());
        }
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn deps(&self) -> &[String] {
        &self.inner.deps
    }

    pub fn policy(&self) -> ResolvePolicy {
        self.inner.policy
    }

    /// The unwrapped value once resolution succeeded
    pub fn data(&self) -> Option<Value> {
        self.inner.data.lock().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.data.lock().is_some()
    }

    /// True when both handles point at the same memo
    pub fn ptr_eq(&self, other: &Resolvable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the memoized promise, building it on first use
    ///
    /// `node` is this resolvable's index in `context`; dependencies are looked
    /// up at that node and above, nearer tokens shadowing farther ones.
    pub fn get(&self, context: &ResolveContext, node: usize) -> SharedResolve {
        self.get_visiting(context, node, &mut Vec::new())
    }

    /// `visiting` holds the resolvables being built on this call chain only
    fn get_visiting(&self, context: &ResolveContext, node: usize, visiting: &mut Vec<Resolvable>) -> SharedResolve {
        if let Some(existing) = self.inner.promise.lock().clone() {
            return existing;
        }

        if visiting.iter().any(|r| r.ptr_eq(self)) {
            let err = ResolveError::Cyclic(self.inner.token.clone());
            return future::ready(Err(err)).boxed().shared();
        }
        visiting.push(self.clone());
        let built = self.build(context, node, visiting);
        visiting.pop();

        self.inner
            .promise
            .lock()
            .get_or_insert_with(|| built)
            .clone()
    }

    fn build(&self, context: &ResolveContext, node: usize, visiting: &mut Vec<Resolvable>) -> SharedResolve {
        let visible = context.visible(node, Some(self));
        let token = self.inner.token.clone();

        let mut names = Vec::with_capacity(self.inner.deps.len());
        let mut pending: Vec<BoxFuture<'static, Result<Value, ResolveError>>> = Vec::new();
        for dep in &self.inner.deps {
            names.push(dep.clone());
            if dep == STATE_PARAMS {
                let params = serde_json::to_value(context.param_values()).unwrap_or_default();
                pending.push(future::ready(Ok(params)).boxed());
                continue;
            }
            match visible.get(dep.as_str()) {
                Some((resolvable, index)) => pending.push(resolvable.get_visiting(context, *index, visiting).boxed()),
                None => {
                    let err = ResolveError::MissingDependency {
                        token: token.clone(),
                        dependency: dep.clone(),
                    };
                    pending.push(future::ready(Err(err)).boxed());
                }
            }
        }

        let state = context.path().get(node).map(|n| n.state().clone());
        let resolve_fn = self.inner.resolve_fn.clone();
        let inner: Weak<ResolvableInner> = Arc::downgrade(&self.inner);

        async move {
            let results = join_all(pending).await;
            let mut locals = Locals::new();
            for (name, result) in names.into_iter().zip(results) {
                locals.insert(name, result?);
            }

            trace!(token = %token, "invoking resolvable");
            let value = resolve_fn(ResolveArgs { state, locals })
                .await
                .map_err(|error| ResolveError::Failed {
                    token: token.clone(),
                    error: Arc::new(error),
                })?;

            if let Some(inner) = inner.upgrade() {
                *inner.data.lock() = Some(value.clone());
            }
            Ok(value)
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathNode;
    use crate::state::StateRegistry;
    use crate::StateDeclaration;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_with(resolvables: Vec<Resolvable>) -> ResolveContext {
        let registry = StateRegistry::default();
        let mut declaration = StateDeclaration::new("home").with_url("/home");
        for resolvable in resolvables {
            declaration = declaration.with_resolve(resolvable);
        }
        let state = registry.register(declaration).unwrap().unwrap();
        let path = state
            .path()
            .iter()
            .map(|s| PathNode::new(s, &Default::default()))
            .collect();
        ResolveContext::new(path)
    }

    #[tokio::test]
    async fn test_get_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let context = context_with(vec![Resolvable::new("n", &[], move |_| {
            let counter = counter.clone();
            async move { Ok(json!(counter.fetch_add(1, Ordering::SeqCst))) }
        })]);

        let node = context.path().len() - 1;
        let resolvable = context.resolvable("n").unwrap();
        let first = resolvable.get(&context, node);
        let second = resolvable.get(&context, node);
        assert!(first.ptr_eq(&second));

        assert_eq!(first.await.unwrap(), json!(0));
        assert_eq!(second.await.unwrap(), json!(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolvable.data(), Some(json!(0)));
    }

    #[tokio::test]
    async fn test_dependencies_are_injected() {
        let context = context_with(vec![
            Resolvable::value("a", json!(2)),
            Resolvable::new("b", &["a"], |args| async move {
                let a = args.get("a").and_then(Value::as_i64).unwrap_or_default();
                Ok(json!(a * 10))
            }),
        ]);

        let node = context.path().len() - 1;
        let b = context.resolvable("b").unwrap();
        assert_eq!(b.get(&context, node).await.unwrap(), json!(20));
    }

    #[tokio::test]
    async fn test_failure_poisons_dependents() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let context = context_with(vec![
            Resolvable::new("broken", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow::anyhow!("boom")) }
            }),
            Resolvable::new("dependent", &["broken"], |_| async { Ok(json!(1)) }),
        ]);
        let node = context.path().len() - 1;
        let dependent = context.resolvable("dependent").unwrap();
        let broken = context.resolvable("broken").unwrap();

        let err = dependent.get(&context, node).await.unwrap_err();
        assert_eq!(err.token(), "broken");
        assert!(broken.get(&context, node).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dependent.is_resolved());
    }

    #[tokio::test]
    async fn test_missing_dependency() {
        let context = context_with(vec![Resolvable::new("x", &["nope"], |_| async { Ok(json!(1)) })]);
        let node = context.path().len() - 1;
        let err = context.resolvable("x").unwrap().get(&context, node).await.unwrap_err();
        assert!(matches!(err, ResolveError::MissingDependency { ref dependency, .. } if dependency == "nope"));
    }

    #[tokio::test]
    async fn test_cycle_is_reported() {
        let context = context_with(vec![
            Resolvable::new("a", &["b"], |_| async { Ok(json!("a")) }),
            Resolvable::new("b", &["a"], |_| async { Ok(json!("b")) }),
        ]);
        let node = context.path().len() - 1;
        let err = context.resolvable("a").unwrap().get(&context, node).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cyclic(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_is_not_a_cycle() {
        let deps: Vec<String> = (0..30).map(|i| format!("dep{i}")).collect();
        let dep_names: Vec<&str> = deps.iter().map(String::as_str).collect();

        for _ in 0..200 {
            let mut resolvables: Vec<Resolvable> = deps
                .iter()
                .map(|dep| Resolvable::new(dep.clone(), &[], |_| async { Ok(json!(1)) }))
                .collect();
            resolvables.push(Resolvable::new("top", &dep_names, |_| async { Ok(json!("top")) }));
            let context = context_with(resolvables);
            let node = context.path().len() - 1;
            let top = context.resolvable("top").unwrap();

            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let context = context.clone();
                    let top = top.clone();
                    tokio::spawn(async move { top.get(&context, node).await })
                })
                .collect();
            for task in tasks {
                assert_eq!(task.await.unwrap().unwrap(), json!("top"));
            }
        }
    }

    #[tokio::test]
    async fn test_state_params_token() {
        let context = context_with(vec![Resolvable::new("p", &[STATE_PARAMS], |args| async move {
            Ok(args.get(STATE_PARAMS).cloned().unwrap_or_default())
        })]);
        let node = context.path().len() - 1;
        let value = context.resolvable("p").unwrap().get(&context, node).await.unwrap();
        assert_eq!(value, json!({}));
    }

    #[tokio::test]
    async fn test_loader_port() {
        let loader = MemoryLoader::new();
        loader.insert("greeting", json!("hello"));
        let context = context_with(vec![Resolvable::from_loader(
            "greeting",
            &[],
            Arc::new(loader),
            json!("greeting"),
        )]);
        let node = context.path().len() - 1;
        let value = context.resolvable("greeting").unwrap().get(&context, node).await.unwrap();
        assert_eq!(value, json!("hello"));
    }

    #[test]
    fn test_fresh_copy_resets_memo_but_keeps_values() {
        let fixed = Resolvable::value("v", json!(1));
        assert!(fixed.fresh().is_resolved());

        let lazy = Resolvable::new("l", &[], |_| async { Ok(json!(1)) });
        let copy = lazy.fresh();
        assert!(!copy.ptr_eq(&lazy));
        assert!(!copy.is_resolved());
    }

    #[test]
    fn test_policy_order() {
        assert!(ResolvePolicy::Jit < ResolvePolicy::Lazy);
        assert!(ResolvePolicy::Lazy < ResolvePolicy::Eager);
    }
}
