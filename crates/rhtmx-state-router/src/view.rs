/// Views: which component fills which named slot
///
/// A state declares views keyed by slot:
///
/// - `name` → slot `name` in the parent state's view
/// - `name@state` → slot `name` in `state`'s view
/// - `@state` → the default slot in `state`'s view
/// - `name@` → slot `name` at the root
///
/// After a successful transition the router deactivates the exiting states'
/// views and activates the entering states' views through a [`ViewSink`].
/// [`ViewService`] is the in-process sink: slots register under
/// `(name, context)` and are told whenever their content changes.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

/// One view a state contributes
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    name: String,
    context: String,
    state: String,
    depth: usize,
    config: Value,
}

impl ViewConfig {
    /// Slot name used when a key omits it
    pub const DEFAULT: &'static str = "$default";

    /// Parses a view key declared by `state` (child of `parent`, at `depth`)
    pub fn new(state: &str, depth: usize, parent: &str, key: &str, config: Value) -> Self {
        let (name, context) = match key.split_once('@') {
            Some((name, context)) => (name, context),
            None => (key, parent),
        };
        let name = if name.is_empty() { Self::DEFAULT } else { name };

        Self {
            name: name.to_string(),
            context: context.to_string(),
            state: state.to_string(),
            depth,
            config,
        }
    }

    /// Slot name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the state whose view holds the slot (`""` for the root)
    pub fn context(&self) -> &str {
        &self.context
    }

    /// The declaring state
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn component(&self) -> Option<&str> {
        self.config.get("component").and_then(Value::as_str)
    }

    /// `name@context`
    pub fn target(&self) -> String {
        format!("{}@{}", self.name, self.context)
    }
}

/// Receives view (de)activations after each successful transition
pub trait ViewSink: Send + Sync {
    fn activate(&self, view: &ViewConfig);
    fn deactivate(&self, view: &ViewConfig);
}

pub type SlotListener = Arc<dyn Fn(Option<&ViewConfig>) + Send + Sync>;

struct Slot {
    id: u64,
    name: String,
    context: String,
    current: Option<ViewConfig>,
    listener: SlotListener,
}

#[derive(Default)]
struct ViewServiceInner {
    active: Vec<ViewConfig>,
    slots: Vec<Slot>,
}

/// Matches active view configs to registered slots
#[derive(Clone, Default)]
pub struct ViewService {
    inner: Arc<Mutex<ViewServiceInner>>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for ViewService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ViewService")
            .field("active", &inner.active.iter().map(ViewConfig::target).collect::<Vec<_>>())
            .field("slots", &inner.slots.len())
            .finish()
    }
}

impl ViewService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers slot `name` inside `context`'s view; the listener is called
    /// right away with the current content and again on every change
    pub fn register_slot<F>(&self, name: &str, context: &str, listener: F) -> u64
    where
        F: Fn(Option<&ViewConfig>) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let listener: SlotListener = Arc::new(listener);
        let current = {
            let mut inner = self.inner.lock();
            let current = best_match(&inner.active, name, context);
            inner.slots.push(Slot {
                id,
                name: name.to_string(),
                context: context.to_string(),
                current: current.clone(),
                listener: listener.clone(),
            });
            current
        };
        listener(current.as_ref());
        id
    }

    pub fn deregister_slot(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.slots.len();
        inner.slots.retain(|slot| slot.id != id);
        inner.slots.len() != before
    }

    /// Active configs in activation order
    pub fn active(&self) -> Vec<ViewConfig> {
        self.inner.lock().active.clone()
    }

    /// What slot `id` currently shows
    pub fn content(&self, id: u64) -> Option<ViewConfig> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .find(|slot| slot.id == id)
            .and_then(|slot| slot.current.clone())
    }

    /// Recomputes every slot and notifies those whose content changed
    fn sync(&self) {
        let notifications: Vec<(SlotListener, Option<ViewConfig>)> = {
            let mut inner = self.inner.lock();
            let ViewServiceInner { active, slots } = &mut *inner;
            slots
                .iter_mut()
                .filter_map(|slot| {
                    let next = best_match(active, &slot.name, &slot.context);
                    if next == slot.current {
                        return None;
                    }
                    slot.current = next.clone();
                    Some((slot.listener.clone(), next))
                })
                .collect()
        };

        for (listener, content) in notifications {
            listener(content.as_ref());
        }
    }
}

/// The deepest active config targeting `(name, context)`
fn best_match(active: &[ViewConfig], name: &str, context: &str) -> Option<ViewConfig> {
    active
        .iter()
        .filter(|view| view.name == name && view.context == context)
        .max_by_key(|view| view.depth)
        .cloned()
}

impl ViewSink for ViewService {
    fn activate(&self, view: &ViewConfig) {
        trace!(view = %view.target(), state = view.state(), "activating view");
        {
            let mut inner = self.inner.lock();
            inner.active.retain(|v| !(v.state == view.state && v.name == view.name && v.context == view.context));
            inner.active.push(view.clone());
        }
        self.sync();
    }

    fn deactivate(&self, view: &ViewConfig) {
        trace!(view = %view.target(), state = view.state(), "deactivating view");
        {
            let mut inner = self.inner.lock();
            inner.active.retain(|v| !(v.state == view.state && v.name == view.name && v.context == view.context));
        }
        self.sync();
    }
}
