//! Paths: root→leaf slices of the state tree with per-node param values
//!
//! A [`PathNode`] pairs a [`State`] with the values of the params that state
//! declares itself, plus its own copies of the state's resolvables. Cloning a
//! node shares those resolvables, so values resolved through one clone are
//! seen by every other.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::params::RawParams;
use crate::resolve::Resolvable;
use crate::state::State;

#[derive(Clone)]
pub struct PathNode {
    state: State,
    param_values: RawParams,
    resolvables: Arc<RwLock<Vec<Resolvable>>>,
}

impl fmt::Debug for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathNode")
            .field("state", &self.state.name())
            .field("param_values", &self.param_values)
            .finish()
    }
}

impl PathNode {
    /// Builds a node for `state`, keeping only its own param keys (defaults
    /// applied) and taking fresh copies of its resolvables
    pub fn new(state: &State, params: &RawParams) -> Self {
        let resolvables = state.resolvables().iter().map(Resolvable::fresh).collect();
        Self {
            state: state.clone(),
            param_values: own_values(state, params),
            resolvables: Arc::new(RwLock::new(resolvables)),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn param_values(&self) -> &RawParams {
        &self.param_values
    }

    /// Snapshot of this node's resolvables
    pub fn resolvables(&self) -> Vec<Resolvable> {
        self.resolvables.read().clone()
    }

    /// Adds resolvables, replacing any with the same token
    pub fn add_resolvables(&self, added: Vec<Resolvable>) {
        let mut resolvables = self.resolvables.write();
        for resolvable in added {
            resolvables.retain(|r| r.token() != resolvable.token());
            resolvables.push(resolvable);
        }
    }

    /// Same state and resolvables, new param values
    pub fn with_params(&self, params: &RawParams) -> PathNode {
        PathNode {
            state: self.state.clone(),
            param_values: own_values(&self.state, params),
            resolvables: self.resolvables.clone(),
        }
    }

    /// Same state and resolvables as `other`, this node's param values
    pub fn with_resolvables_of(&self, other: &PathNode) -> PathNode {
        PathNode {
            state: self.state.clone(),
            param_values: self.param_values.clone(),
            resolvables: other.resolvables.clone(),
        }
    }

    /// Same state and equal values for every own param
    pub fn equals(&self, other: &PathNode) -> bool {
        self.state == other.state
            && self
                .state
                .params()
                .own()
                .iter()
                .all(|p| p.equals(self.param_values.get(p.id()), other.param_values.get(p.id())))
    }

    /// Same state and equal values for every own non-dynamic param
    pub fn non_dynamic_equals(&self, other: &PathNode) -> bool {
        self.state == other.state
            && self
                .state
                .params()
                .own()
                .iter()
                .filter(|p| !p.is_dynamic())
                .all(|p| p.equals(self.param_values.get(p.id()), other.param_values.get(p.id())))
    }
}

fn own_values(state: &State, params: &RawParams) -> RawParams {
    state
        .params()
        .own()
        .iter()
        .filter_map(|p| p.value(params.get(p.id())).map(|v| (p.id().to_string(), v)))
        .collect()
}

/// Builds the root→`target` path
pub fn build_path(target: &State, params: &RawParams) -> Vec<PathNode> {
    target.path().iter().map(|s| PathNode::new(s, params)).collect()
}

/// The prefix of `a` whose states match `b` position by position
pub fn matching(a: &[PathNode], b: &[PathNode]) -> Vec<PathNode> {
    a.iter()
        .zip(b)
        .take_while(|(x, y)| x.state() == y.state())
        .map(|(x, _)| x.clone())
        .collect()
}

/// Nodes up to and including `state`
pub fn sub_path(path: &[PathNode], state: &State) -> Vec<PathNode> {
    match path.iter().position(|n| n.state() == state) {
        Some(index) => path[..=index].to_vec(),
        None => path.to_vec(),
    }
}

/// Merged param values; deeper nodes override shallower ones
pub fn param_values(path: &[PathNode]) -> RawParams {
    let mut values = RawParams::new();
    for node in path {
        values.extend(node.param_values().iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    values
}

pub fn states(path: &[PathNode]) -> Vec<State> {
    path.iter().map(|n| n.state().clone()).collect()
}

/// Ancestor-param inheritance
///
/// Walks the states `from` and `to`'s path have in common and, from the
/// deepest common state upwards, fills every own param id (unless it opts out
/// of inheritance) missing from `params` with the value in `from`.
pub fn inherit_params(from: &[PathNode], to: &State, params: &RawParams) -> RawParams {
    let to_path = to.path();
    let common: Vec<&PathNode> = from
        .iter()
        .zip(&to_path)
        .take_while(|(node, state)| node.state() == *state)
        .map(|(node, _)| node)
        .collect();

    let mut merged = params.clone();
    for node in common.into_iter().rev() {
        for param in node.state().params().own() {
            if !param.inherit() || merged.contains_key(param.id()) {
                continue;
            }
            if let Some(value) = node.param_values().get(param.id()) {
                merged.insert(param.id().to_string(), value.clone());
            }
        }
    }
    merged
}
