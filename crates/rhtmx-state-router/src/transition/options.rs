use serde_json::Value;

use crate::state::State;

/// How the location is updated once a transition succeeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UrlUpdate {
    /// Push a new history entry
    #[default]
    Push,
    /// Replace the current history entry
    Replace,
    /// Leave the location untouched
    Skip,
}

/// Which states are exited and re-entered even when unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Reload {
    #[default]
    No,
    /// Every state on the path, root included
    All,
    /// The named state and its descendants
    State(String),
}

/// What started a transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionSource {
    /// A location change
    Url,
    /// A link (`href`) activation
    Sref,
    #[default]
    Unknown,
}

/// Per-transition options
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::{Reload, TransitionOptions, UrlUpdate};
///
/// let options = TransitionOptions::default()
///     .with_location(UrlUpdate::Replace)
///     .with_reload(Reload::State("contacts".to_string()))
///     .inherit(false);
/// assert!(!options.inherits(true));
/// assert!(TransitionOptions::default().inherits(true));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    pub location: UrlUpdate,
    /// Base for relative identifiers (`^.sibling`, `.child`)
    pub relative: Option<State>,
    /// Fill missing params from the current params of shared ancestors;
    /// `None` leaves the choice to the caller (`go` inherits,
    /// `transition_to` does not)
    pub inherit: Option<bool>,
    pub reload: Reload,
    /// Free-form data for hooks
    pub custom: Value,
    pub source: TransitionSource,
}

impl TransitionOptions {
    pub fn with_location(mut self, location: UrlUpdate) -> Self {
        self.location = location;
        self
    }

    pub fn with_relative(mut self, state: State) -> Self {
        self.relative = Some(state);
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = Some(inherit);
        self
    }

    /// The explicit `inherit` setting, or `default` when unset
    pub fn inherits(&self, default: bool) -> bool {
        self.inherit.unwrap_or(default)
    }

    pub fn with_reload(mut self, reload: Reload) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_custom(mut self, custom: Value) -> Self {
        self.custom = custom;
        self
    }

    pub fn with_source(mut self, source: TransitionSource) -> Self {
        self.source = source;
        self
    }
}
