/// Target states: where a transition wants to go
///
/// A [`TargetState`] pairs an identifier (a name, possibly relative, or a
/// state handle) with raw params and optional transition options. It is
/// looked up once, against the registry, when it is created.
use std::fmt;

use crate::error::{RouterError, TargetError};
use crate::params::RawParams;
use crate::state::{State, StateRegistry};
use crate::transition::TransitionOptions;

/// How a target names its state
#[derive(Debug, Clone, PartialEq)]
pub enum StateRef {
    Name(String),
    State(State),
}

impl StateRef {
    pub fn name(&self) -> &str {
        match self {
            StateRef::Name(name) => name,
            StateRef::State(state) => state.name(),
        }
    }
}

impl From<&str> for StateRef {
    fn from(name: &str) -> Self {
        StateRef::Name(name.to_string())
    }
}

impl From<String> for StateRef {
    fn from(name: String) -> Self {
        StateRef::Name(name)
    }
}

impl From<State> for StateRef {
    fn from(state: State) -> Self {
        StateRef::State(state)
    }
}

impl From<&State> for StateRef {
    fn from(state: &State) -> Self {
        StateRef::State(state.clone())
    }
}

#[derive(Clone)]
pub struct TargetState {
    identifier: StateRef,
    state: Option<State>,
    params: RawParams,
    options: Option<TransitionOptions>,
    lookup_error: Option<RouterError>,
}

impl fmt::Debug for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetState")
            .field("identifier", &self.identifier.name())
            .field("state", &self.state)
            .field("params", &self.params)
            .finish()
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = serde_json::to_string(&self.params).unwrap_or_default();
        write!(f, "'{}'{}", self.identifier.name(), params)
    }
}

impl TargetState {
    /// Looks the identifier up in `registry`
    ///
    /// Relative names resolve against `options.relative`.
    pub fn new(
        registry: &StateRegistry,
        identifier: StateRef,
        params: RawParams,
        options: Option<TransitionOptions>,
    ) -> Self {
        let base = options.as_ref().and_then(|o| o.relative.clone());
        let (state, lookup_error) = match &identifier {
            StateRef::State(state) => (Some(state.clone()), None),
            StateRef::Name(name) => match registry.find(name, base.as_ref()) {
                Ok(state) => (state, None),
                Err(err) => (None, Some(err)),
            },
        };

        Self {
            identifier,
            state,
            params,
            options,
            lookup_error,
        }
    }

    pub fn identifier(&self) -> &StateRef {
        &self.identifier
    }

    /// The matched state (a covering future state when the name is not
    /// registered yet)
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// Name of the matched state, or the identifier when nothing matched
    pub fn name(&self) -> &str {
        match &self.state {
            Some(state) => state.name(),
            None => self.identifier.name(),
        }
    }

    pub fn params(&self) -> &RawParams {
        &self.params
    }

    /// Options, when the target carries its own
    pub fn options(&self) -> Option<&TransitionOptions> {
        self.options.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.state.is_some()
    }

    pub fn valid(&self) -> bool {
        self.error().is_none()
    }

    /// Why this target cannot be transitioned to
    pub fn error(&self) -> Option<TargetError> {
        if let Some(err) = &self.lookup_error {
            return Some(TargetError::Unresolvable {
                identifier: self.identifier.name().to_string(),
                reason: err.to_string(),
            });
        }
        let Some(state) = &self.state else {
            return Some(TargetError::NotFound(self.identifier.name().to_string()));
        };
        if state.is_abstract() {
            return Some(TargetError::Abstract(state.name().to_string()));
        }
        let keys = state.params().invalid_keys(&self.params);
        if !keys.is_empty() {
            return Some(TargetError::InvalidParams {
                state: state.name().to_string(),
                keys,
            });
        }
        None
    }

    /// Same state and options, new params (merged into the current ones
    /// unless `replace`)
    pub fn with_params(&self, params: RawParams, replace: bool) -> TargetState {
        let params = if replace {
            params
        } else {
            let mut merged = self.params.clone();
            merged.extend(params);
            merged
        };
        TargetState {
            params,
            ..self.clone()
        }
    }

    pub fn with_options(&self, options: TransitionOptions) -> TargetState {
        TargetState {
            options: Some(options),
            ..self.clone()
        }
    }
}
