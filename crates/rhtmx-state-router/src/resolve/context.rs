/// Resolve context: the resolvables visible along a path
///
/// Wraps a root→leaf path. Lookups at a node see that node's resolvables and
/// every ancestor's, nearer tokens hiding farther ones.
use std::collections::BTreeMap;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tracing::trace;

use super::resolvable::{Locals, ResolvePolicy, Resolvable, STATE_PARAMS};
use crate::error::ResolveError;
use crate::params::RawParams;
use crate::path::{self, PathNode};
use crate::state::State;

#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    path: Vec<PathNode>,
}

impl ResolveContext {
    pub fn new(path: Vec<PathNode>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &[PathNode] {
        &self.path
    }

    pub fn node_index(&self, state: &State) -> Option<usize> {
        self.path.iter().position(|node| node.state() == state)
    }

    /// The context truncated after `state` (whole path if `state` is absent)
    pub fn subcontext(&self, state: &State) -> ResolveContext {
        match self.node_index(state) {
            Some(index) => ResolveContext::new(self.path[..=index].to_vec()),
            None => self.clone(),
        }
    }

    /// Merged param values of the whole path
    pub fn param_values(&self) -> RawParams {
        path::param_values(&self.path)
    }

    /// Token → (resolvable, node index) visible from `node`
    ///
    /// `exclude` hides one resolvable so a token can depend on the same token
    /// declared higher up.
    pub fn visible(&self, node: usize, exclude: Option<&Resolvable>) -> BTreeMap<String, (Resolvable, usize)> {
        let mut visible = BTreeMap::new();
        for (index, path_node) in self.path.iter().enumerate().take(node + 1) {
            for resolvable in path_node.resolvables() {
                if exclude.is_some_and(|ex| ex.ptr_eq(&resolvable)) {
                    continue;
                }
                visible.insert(resolvable.token().to_string(), (resolvable, index));
            }
        }
        visible
    }

    /// All tokens visible from the leaf
    pub fn tokens(&self) -> Vec<String> {
        match self.path.len() {
            0 => Vec::new(),
            len => self.visible(len - 1, None).into_keys().collect(),
        }
    }

    /// The nearest resolvable for `token`, seen from the leaf
    pub fn resolvable(&self, token: &str) -> Option<Resolvable> {
        let len = self.path.len();
        if len == 0 {
            return None;
        }
        self.visible(len - 1, None).remove(token).map(|(resolvable, _)| resolvable)
    }

    /// Adds resolvables to the node for `state`; returns false when the state
    /// is not on this path
    pub fn add_resolvables(&self, state: &State, resolvables: Vec<Resolvable>) -> bool {
        match self.node_index(state) {
            Some(index) => {
                self.path[index].add_resolvables(resolvables);
                true
            }
            None => false,
        }
    }

    /// Resolves every resolvable on the path whose policy is at or above
    /// `policy`, in parallel
    ///
    /// Waits for all of them; the first failure in path order is reported.
    pub async fn resolve_path(&self, policy: ResolvePolicy) -> Result<(), ResolveError> {
        self.resolve_nodes(0..self.path.len(), policy).await
    }

    /// Resolves one node's own resolvables at or above `policy`
    pub async fn resolve_node(&self, state: &State, policy: ResolvePolicy) -> Result<(), ResolveError> {
        match self.node_index(state) {
            Some(index) => self.resolve_nodes(index..index + 1, policy).await,
            None => Ok(()),
        }
    }

    async fn resolve_nodes(&self, range: std::ops::Range<usize>, policy: ResolvePolicy) -> Result<(), ResolveError> {
        let pending: Vec<_> = range
            .flat_map(|index| {
                self.path[index]
                    .resolvables()
                    .into_iter()
                    .filter(|r| r.policy() >= policy)
                    .map(move |r| (index, r))
            })
            .map(|(index, resolvable)| {
                trace!(token = resolvable.token(), ?policy, "resolving");
                resolvable.get(self, index)
            })
            .collect();

        for result in join_all(pending).await {
            result?;
        }
        Ok(())
    }

    /// Resolves `deps` as seen from `state` (the leaf when `None`)
    ///
    /// Used to inject values into hooks; JIT resolvables are resolved here on
    /// first use.
    pub async fn locals(&self, state: Option<&State>, deps: &[String]) -> Result<Locals, ResolveError> {
        if deps.is_empty() || self.path.is_empty() {
            return Ok(Locals::new());
        }
        let node = state
            .and_then(|s| self.node_index(s))
            .unwrap_or(self.path.len() - 1);
        let visible = self.visible(node, None);

        let mut names = Vec::with_capacity(deps.len());
        let mut pending: Vec<BoxFuture<'static, Result<Value, ResolveError>>> = Vec::with_capacity(deps.len());
        for dep in deps {
            names.push(dep.clone());
            if dep == STATE_PARAMS {
                let params = serde_json::to_value(self.param_values()).unwrap_or(Value::Null);
                pending.push(futures::future::ready(Ok(params)).boxed());
                continue;
            }
            match visible.get(dep.as_str()) {
                Some((resolvable, index)) => pending.push(resolvable.get(self, *index).boxed()),
                None => {
                    let err = ResolveError::MissingDependency {
                        token: "<hook>".to_string(),
                        dependency: dep.clone(),
                    };
                    pending.push(futures::future::ready(Err(err)).boxed());
                }
            }
        }

        let mut locals = Locals::new();
        for (name, result) in names.into_iter().zip(join_all(pending).await) {
            locals.insert(name, result?);
        }
        Ok(locals)
    }

    /// Values of every resolvable already resolved on the path
    pub fn resolved_values(&self) -> Locals {
        match self.path.len() {
            0 => Locals::new(),
            len => self
                .visible(len - 1, None)
                .into_iter()
                .filter_map(|(token, (resolvable, _))| resolvable.data().map(|v| (token, v)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateRegistry;
    use crate::StateDeclaration;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(token: &str, calls: &Arc<AtomicUsize>, policy: ResolvePolicy) -> Resolvable {
        let calls = calls.clone();
        let value = json!(token);
        Resolvable::new(token, &[], move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            async move { Ok(value) }
        })
        .with_policy(policy)
    }

    fn two_level(calls: &Arc<AtomicUsize>) -> ResolveContext {
        let registry = StateRegistry::default();
        registry
            .register(
                StateDeclaration::new("a")
                    .with_url("/a")
                    .with_resolve(Resolvable::value("shadowed", json!("parent")))
                    .with_resolve(counting("eager", calls, ResolvePolicy::Eager)),
            )
            .unwrap();
        let leaf = registry
            .register(
                StateDeclaration::new("a.b")
                    .with_url("/b")
                    .with_resolve(Resolvable::value("shadowed", json!("child")))
                    .with_resolve(counting("lazy", calls, ResolvePolicy::Lazy))
                    .with_resolve(counting("jit", calls, ResolvePolicy::Jit)),
            )
            .unwrap()
            .unwrap();
        ResolveContext::new(path::build_path(&leaf, &RawParams::new()))
    }

    #[test]
    fn test_nearer_token_shadows_farther() {
        let calls = Arc::new(AtomicUsize::new(0));
        let context = two_level(&calls);

        assert_eq!(context.resolvable("shadowed").unwrap().data(), Some(json!("child")));
        let a_index = context.path().len() - 2;
        let (parent_value, _) = &context.visible(a_index, None)["shadowed"];
        assert_eq!(parent_value.data(), Some(json!("parent")));
    }

    #[tokio::test]
    async fn test_resolve_path_respects_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let context = two_level(&calls);

        context.resolve_path(ResolvePolicy::Eager).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(context.resolvable("eager").unwrap().is_resolved());
        assert!(!context.resolvable("lazy").unwrap().is_resolved());

        context.resolve_path(ResolvePolicy::Lazy).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!context.resolvable("jit").unwrap().is_resolved());
    }

    #[tokio::test]
    async fn test_locals_resolve_jit_on_demand() {
        let calls = Arc::new(AtomicUsize::new(0));
        let context = two_level(&calls);

        let locals = context
            .locals(None, &["jit".to_string(), "shadowed".to_string()])
            .await
            .unwrap();
        assert_eq!(locals["jit"], json!("jit"));
        assert_eq!(locals["shadowed"], json!("child"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_added_resolvables_are_visible() {
        let calls = Arc::new(AtomicUsize::new(0));
        let context = two_level(&calls);
        let leaf = context.path().last().unwrap().state().clone();

        assert!(context.add_resolvables(&leaf, vec![Resolvable::value("extra", json!(5))]));
        let clone = context.clone();
        assert_eq!(clone.resolvable("extra").unwrap().data(), Some(json!(5)));
        assert!(context.tokens().contains(&"extra".to_string()));
    }

    #[test]
    fn test_subcontext() {
        let calls = Arc::new(AtomicUsize::new(0));
        let context = two_level(&calls);
        let parent = context.path()[1].state().clone();

        let sub = context.subcontext(&parent);
        assert_eq!(sub.path().len(), 2);
        assert_eq!(sub.resolvable("shadowed").unwrap().data(), Some(json!("parent")));
    }
}
