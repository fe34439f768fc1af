/// Tree diff between the current path and a target path
use crate::path::PathNode;
use crate::state::State;

/// Which nodes a transition exits, keeps and enters
///
/// `retained` is the longest common prefix of `from` and the target path
/// (same states, same non-dynamic param values, not reloading). `exiting` is
/// the rest of `from`, child first; `entering` the rest of the target path,
/// parent first. `to` is `retained_with_to_params` followed by `entering`.
#[derive(Debug, Clone, Default)]
pub struct TreeChanges {
    pub from: Vec<PathNode>,
    pub to: Vec<PathNode>,
    pub retained: Vec<PathNode>,
    /// Retained nodes carrying the target's param values
    pub retained_with_to_params: Vec<PathNode>,
    pub exiting: Vec<PathNode>,
    pub entering: Vec<PathNode>,
}

impl TreeChanges {
    /// Diffs `from` against `to`
    ///
    /// `reload_state` and everything below it is never retained. Entering
    /// nodes that line up with `reuse` (same states, same non-dynamic params)
    /// take over its resolvables, so a redirect does not resolve them again.
    pub fn compute(from: &[PathNode], to: &[PathNode], reload_state: Option<&State>, reuse: &[PathNode]) -> Self {
        let keep = from
            .iter()
            .zip(to)
            .take_while(|(a, b)| Some(a.state()) != reload_state && a.non_dynamic_equals(b))
            .count();

        let retained = from[..keep].to_vec();
        let retained_with_to_params: Vec<PathNode> = retained
            .iter()
            .zip(to)
            .map(|(node, target)| node.with_params(target.param_values()))
            .collect();
        let exiting: Vec<PathNode> = from[keep..].iter().rev().cloned().collect();

        let reloading = |node: &PathNode| reload_state.is_some_and(|reload| node.state().includes(reload.name()));
        let mut entering = to[keep..].to_vec();
        let reusable = entering
            .iter()
            .zip(reuse)
            .take_while(|(node, original)| node.non_dynamic_equals(original))
            .count();
        for (node, original) in entering.iter_mut().zip(reuse).take(reusable) {
            if !reloading(node) {
                *node = node.with_resolvables_of(original);
            }
        }

        let to = retained_with_to_params.iter().chain(&entering).cloned().collect();
        Self {
            from: from.to_vec(),
            to,
            retained,
            retained_with_to_params,
            exiting,
            entering,
        }
    }

    /// Same leaf and equal non-dynamic params on every node
    pub fn is_same_path(&self) -> bool {
        self.from.len() == self.to.len() && self.from.iter().zip(&self.to).all(|(a, b)| a.non_dynamic_equals(b))
    }

    pub fn from_state(&self) -> Option<&State> {
        self.from.last().map(PathNode::state)
    }

    pub fn to_state(&self) -> Option<&State> {
        self.to.last().map(PathNode::state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamDeclaration, RawParams};
    use crate::path::build_path;
    use crate::resolve::Resolvable;
    use crate::state::StateRegistry;
    use crate::StateDeclaration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> StateRegistry {
        let registry = StateRegistry::default();
        for declaration in [
            StateDeclaration::new("a").with_url("/a"),
            StateDeclaration::new("a.b").with_url("/b/:id"),
            StateDeclaration::new("a.b.c")
                .with_url("/c?q")
                .with_param("q", ParamDeclaration::new().dynamic().optional()),
            StateDeclaration::new("a.b.c.d").with_url("/d"),
            StateDeclaration::new("x").with_url("/x"),
        ] {
            registry.register(declaration).unwrap();
        }
        registry
    }

    fn path(registry: &StateRegistry, name: &str, params: &[(&str, serde_json::Value)]) -> Vec<PathNode> {
        let params: RawParams = params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        build_path(&registry.get(name).unwrap(), &params)
    }

    fn names(nodes: &[PathNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.state().name()).collect()
    }

    #[test]
    fn test_exit_child_first_enter_parent_first() {
        let registry = registry();
        let from = path(&registry, "a.b.c.d", &[("id", json!("1"))]);
        let to = path(&registry, "a.b.c.d", &[("id", json!("2"))]);

        let changes = TreeChanges::compute(&from, &to, None, &[]);
        assert_eq!(names(&changes.retained), vec!["", "a"]);
        assert_eq!(names(&changes.exiting), vec!["a.b.c.d", "a.b.c", "a.b"]);
        assert_eq!(names(&changes.entering), vec!["a.b", "a.b.c", "a.b.c.d"]);
        assert_eq!(changes.retained.len() + changes.entering.len(), changes.to.len());
    }

    #[test]
    fn test_dynamic_param_change_is_retained() {
        let registry = registry();
        let from = path(&registry, "a.b.c", &[("id", json!("1")), ("q", json!("old"))]);
        let to = path(&registry, "a.b.c", &[("id", json!("1")), ("q", json!("new"))]);

        let changes = TreeChanges::compute(&from, &to, None, &[]);
        assert!(changes.entering.is_empty());
        assert!(changes.is_same_path());
        assert_eq!(changes.retained_with_to_params[3].param_values()["q"], json!("new"));
        assert_eq!(changes.retained[3].param_values()["q"], json!("old"));
    }

    #[test]
    fn test_reload_state_is_not_retained() {
        let registry = registry();
        let from = path(&registry, "a.b", &[("id", json!("1"))]);
        let reload = registry.get("a").unwrap();

        let changes = TreeChanges::compute(&from, &from, Some(&reload), &[]);
        assert_eq!(names(&changes.retained), vec![""]);
        assert_eq!(names(&changes.entering), vec!["a", "a.b"]);
        assert!(!changes.exiting.is_empty());
    }

    #[test]
    fn test_disjoint_branches_share_only_root() {
        let registry = registry();
        let from = path(&registry, "x", &[]);
        let to = path(&registry, "a.b", &[("id", json!("1"))]);

        let changes = TreeChanges::compute(&from, &to, None, &[]);
        assert_eq!(names(&changes.retained), vec![""]);
        assert_eq!(names(&changes.exiting), vec!["x"]);
        assert_eq!(changes.from_state().unwrap().name(), "x");
        assert_eq!(changes.to_state().unwrap().name(), "a.b");
    }

    #[test]
    fn test_reuse_shares_entering_resolvables() {
        let registry = registry();
        let from = path(&registry, "x", &[]);
        let original = path(&registry, "a.b", &[("id", json!("1"))]);
        let first = TreeChanges::compute(&from, &original, None, &[]);
        first.entering[0].add_resolvables(vec![Resolvable::value("loaded", json!(true))]);

        let redirected = path(&registry, "a.b", &[("id", json!("2"))]);
        let second = TreeChanges::compute(&from, &redirected, None, &first.entering);
        let tokens: Vec<String> = second.entering[0].resolvables().iter().map(|r| r.token().to_string()).collect();
        assert!(tokens.contains(&"loaded".to_string()));
        assert!(second.entering[1].resolvables().is_empty());
    }
}
