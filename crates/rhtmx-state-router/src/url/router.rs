/// URL rules: location → state lookup
///
/// One rule per URL-addressable state. Rules are checked in priority order
/// (static > dynamic > catch-all), ties resolved by registration order.
use super::matcher::{SearchParams, UrlMatcher};
use crate::params::RawParams;

/// A registered rule
#[derive(Debug, Clone)]
pub struct UrlRule {
    state: String,
    matcher: UrlMatcher,
    priority: usize,
    sequence: u64,
}

impl UrlRule {
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }

    pub fn priority(&self) -> usize {
        self.priority
    }
}

/// Result of matching a location
#[derive(Debug, Clone, PartialEq)]
pub struct UrlMatch {
    pub state: String,
    pub params: RawParams,
}

#[derive(Debug, Clone, Default)]
pub struct UrlRouter {
    rules: Vec<UrlRule>,
    otherwise: Option<String>,
    next_sequence: u64,
}

impl UrlRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the rule for a state
    pub fn add(&mut self, state: impl Into<String>, matcher: UrlMatcher) {
        let state = state.into();
        self.remove(&state);

        let rule = UrlRule {
            priority: matcher.priority(),
            sequence: self.next_sequence,
            state,
            matcher,
        };
        self.next_sequence += 1;
        self.rules.push(rule);
        self.rules.sort_by_key(|r| (r.priority, r.sequence));
    }

    pub fn remove(&mut self, state: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.state != state);
        self.rules.len() != before
    }

    /// Sets the URL visited when no rule matches
    pub fn set_otherwise(&mut self, url: impl Into<String>) {
        self.otherwise = Some(url.into());
    }

    pub fn otherwise(&self) -> Option<&str> {
        self.otherwise.as_deref()
    }

    pub fn rules(&self) -> &[UrlRule] {
        &self.rules
    }

    pub fn rule(&self, state: &str) -> Option<&UrlRule> {
        self.rules.iter().find(|r| r.state == state)
    }

    /// Finds the first rule matching the path and query
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use rhtmx_state_router::{ParamTypes, UrlConfig, UrlMatcher, UrlRouter};
    ///
    /// let types = ParamTypes::default();
    /// let config = UrlConfig::default();
    /// let compile = |url: &str| UrlMatcher::compile(url, &BTreeMap::new(), &types, &config).unwrap();
    ///
    /// let mut router = UrlRouter::new();
    /// router.add("users.detail", compile("/users/:id"));
    /// router.add("users.new", compile("/users/new"));
    ///
    /// let found = router.match_url("/users/new", &BTreeMap::new()).unwrap();
    /// assert_eq!(found.state, "users.new");
    /// ```
    pub fn match_url(&self, path: &str, search: &SearchParams) -> Option<UrlMatch> {
        self.rules.iter().find_map(|rule| {
            rule.matcher.exec(path, search).map(|params| UrlMatch {
                state: rule.state.clone(),
                params,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UrlConfig;
    use crate::params::ParamTypes;
    use std::collections::BTreeMap;

    fn compile(url: &str) -> UrlMatcher {
        UrlMatcher::compile(url, &BTreeMap::new(), &ParamTypes::default(), &UrlConfig::default()).unwrap()
    }

    #[test]
    fn test_static_rule_wins_regardless_of_order() {
        let mut router = UrlRouter::new();
        router.add("docs.page", compile("/docs/*path"));
        router.add("docs.item", compile("/docs/:id"));
        router.add("docs.index", compile("/docs/index"));

        let order: Vec<&str> = router.rules().iter().map(UrlRule::state).collect();
        assert_eq!(order, vec!["docs.index", "docs.item", "docs.page"]);
        assert_eq!(router.match_url("/docs/index", &BTreeMap::new()).unwrap().state, "docs.index");
        assert_eq!(router.match_url("/docs/42", &BTreeMap::new()).unwrap().state, "docs.item");
        assert_eq!(router.match_url("/docs/a/b", &BTreeMap::new()).unwrap().state, "docs.page");
    }

    #[test]
    fn test_equal_priority_uses_registration_order() {
        let mut router = UrlRouter::new();
        router.add("first", compile("/:a"));
        router.add("second", compile("/:b"));
        assert_eq!(router.match_url("/x", &BTreeMap::new()).unwrap().state, "first");
    }

    #[test]
    fn test_remove_and_replace() {
        let mut router = UrlRouter::new();
        router.add("home", compile("/"));
        router.add("home", compile("/home"));
        assert_eq!(router.rules().len(), 1);
        assert!(router.match_url("/", &BTreeMap::new()).is_none());

        assert!(router.remove("home"));
        assert!(!router.remove("home"));
        assert!(router.match_url("/home", &BTreeMap::new()).is_none());
    }

    #[test]
    fn test_otherwise() {
        let mut router = UrlRouter::new();
        assert_eq!(router.otherwise(), None);
        router.set_otherwise("/home");
        assert_eq!(router.otherwise(), Some("/home"));
    }
}
