/// Parent-chained parameter collections
///
/// Each state owns a [`ParamSet`] holding its own params plus a pointer to
/// its parent's set. Lookups walk the chain; a state's own param shadows an
/// inherited param with the same id.
use std::collections::HashSet;
use std::sync::Arc;

use super::param::Param;
use super::RawParams;

#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    own: Vec<Param>,
    parent: Option<Arc<ParamSet>>,
}

impl ParamSet {
    /// A root set with no parent
    pub fn new(own: Vec<Param>) -> Self {
        Self { own, parent: None }
    }

    /// A set that inherits every param of `parent`
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use rhtmx_state_router::{Param, ParamDeclaration, ParamLocation, ParamSet, ParamTypes};
    ///
    /// let types = ParamTypes::default();
    /// let decl = ParamDeclaration::new();
    /// let x = Param::new("x", ParamLocation::Path, &decl, None, &types).unwrap();
    /// let y = Param::new("y", ParamLocation::Path, &decl, None, &types).unwrap();
    ///
    /// let parent = Arc::new(ParamSet::new(vec![x]));
    /// let child = ParamSet::child(parent, vec![y]);
    /// assert_eq!(child.keys(), vec!["x", "y"]);
    /// assert_eq!(child.own_keys(), vec!["y"]);
    /// ```
    pub fn child(parent: Arc<ParamSet>, own: Vec<Param>) -> Self {
        Self {
            own,
            parent: Some(parent),
        }
    }

    pub fn parent(&self) -> Option<&Arc<ParamSet>> {
        self.parent.as_ref()
    }

    pub fn own(&self) -> &[Param] {
        &self.own
    }

    pub fn own_keys(&self) -> Vec<&str> {
        self.own.iter().map(Param::id).collect()
    }

    /// Finds a param by id, own params first, then up the parent chain
    pub fn get(&self, id: &str) -> Option<&Param> {
        self.own
            .iter()
            .find(|p| p.id() == id)
            .or_else(|| self.parent.as_deref().and_then(|parent| parent.get(id)))
    }

    /// All param ids visible from this set, ancestors first, each id once
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.chain()
            .into_iter()
            .rev()
            .flat_map(|set| set.own.iter().map(Param::id))
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// All visible params (shadowing applied), in key order
    pub fn all(&self) -> Vec<&Param> {
        self.keys().into_iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn filter(&self, predicate: impl Fn(&Param) -> bool) -> Vec<&Param> {
        self.all().into_iter().filter(|p| predicate(p)).collect()
    }

    pub fn dynamic(&self) -> Vec<&Param> {
        self.filter(Param::is_dynamic)
    }

    pub fn non_dynamic(&self) -> Vec<&Param> {
        self.filter(|p| !p.is_dynamic())
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Applies defaults and normalization to a raw value bag
    ///
    /// Keys not declared in the set are dropped; absent keys without a default
    /// stay absent.
    pub fn values(&self, raw: &RawParams) -> RawParams {
        self.all()
            .into_iter()
            .filter_map(|param| {
                param
                    .value(raw.get(param.id()))
                    .map(|value| (param.id().to_string(), value))
            })
            .collect()
    }

    /// Ids whose raw value fails validation
    pub fn invalid_keys(&self, raw: &RawParams) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|param| !param.validates(raw.get(param.id())))
            .map(|param| param.id().to_string())
            .collect()
    }

    pub fn validates(&self, raw: &RawParams) -> bool {
        self.invalid_keys(raw).is_empty()
    }

    /// Compares two value bags param by param
    ///
    /// With `keys = None` every visible param is compared; otherwise only the
    /// listed ids (ids unknown to this set compare as unequal unless both
    /// sides lack them).
    pub fn equals(&self, a: &RawParams, b: &RawParams, keys: Option<&[&str]>) -> bool {
        let keys = match keys {
            Some(keys) => keys.to_vec(),
            None => self.keys(),
        };
        keys.into_iter().all(|id| match self.get(id) {
            Some(param) => param.equals(a.get(id), b.get(id)),
            None => a.get(id) == b.get(id),
        })
    }

    /// This set followed by its ancestors
    fn chain(&self) -> Vec<&ParamSet> {
        let mut chain = vec![self];
        let mut current = self.parent.as_deref();
        while let Some(set) = current {
            chain.push(set);
            current = set.parent.as_deref();
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamDeclaration, ParamLocation, ParamTypes};
    use serde_json::json;

    fn param(id: &str, declaration: ParamDeclaration) -> Param {
        Param::new(id, ParamLocation::Path, &declaration, None, &ParamTypes::default()).unwrap()
    }

    fn bag(pairs: &[(&str, serde_json::Value)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn chain() -> ParamSet {
        let parent = Arc::new(ParamSet::new(vec![
            param("x", ParamDeclaration::new()),
            param("shared", ParamDeclaration::new()),
        ]));
        ParamSet::child(
            parent,
            vec![
                param("shared", ParamDeclaration::new().with_type("int")),
                param("q", ParamDeclaration::new().dynamic().optional()),
            ],
        )
    }

    #[test]
    fn test_own_param_shadows_parent() {
        let set = chain();
        assert_eq!(set.keys(), vec!["x", "shared", "q"]);
        assert_eq!(set.get("shared").unwrap().param_type().name(), "int");
        assert_eq!(set.parent().unwrap().get("shared").unwrap().param_type().name(), "string");
    }

    #[test]
    fn test_child_keys_are_superset_of_parent() {
        let set = chain();
        let parent_keys = set.parent().unwrap().keys();
        let keys = set.keys();
        assert!(parent_keys.iter().all(|k| keys.contains(k)));
    }

    #[test]
    fn test_validates_and_invalid_keys() {
        let set = chain();
        assert!(set.validates(&bag(&[("x", json!("a")), ("shared", json!(3))])));
        assert_eq!(
            set.invalid_keys(&bag(&[("x", json!("a")), ("shared", json!("three"))])),
            vec!["shared".to_string()]
        );
        assert_eq!(set.invalid_keys(&bag(&[])), vec!["x".to_string(), "shared".to_string()]);
    }

    #[test]
    fn test_equals_over_subset() {
        let set = chain();
        let a = bag(&[("x", json!("a")), ("shared", json!(1)), ("q", json!("one"))]);
        let b = bag(&[("x", json!("a")), ("shared", json!("1")), ("q", json!("two"))]);

        assert!(!set.equals(&a, &b, None));
        assert!(set.equals(&a, &b, Some(&["x", "shared"])));
    }

    #[test]
    fn test_dynamic_filter() {
        let set = chain();
        let dynamic: Vec<&str> = set.dynamic().into_iter().map(Param::id).collect();
        let fixed: Vec<&str> = set.non_dynamic().into_iter().map(Param::id).collect();
        assert_eq!(dynamic, vec!["q"]);
        assert_eq!(fixed, vec!["x", "shared"]);
    }

    #[test]
    fn test_values_apply_defaults_and_drop_unknown() {
        let set = ParamSet::new(vec![
            param("page", ParamDeclaration::new().with_type("int").with_default(json!(1))),
            param("sort", ParamDeclaration::new().optional()),
        ]);
        let values = set.values(&bag(&[("stray", json!(true))]));
        assert_eq!(values, bag(&[("page", json!(1))]));
    }
}
