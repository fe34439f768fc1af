/// Hook registration and matching
///
/// Hooks are registered for an event with criteria on the transition's tree
/// changes. When a transition reaches an event, the matching hooks run by
/// priority (highest first); equal priorities run in registration order.
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::hook::{HookArgs, HookResult, Injectable};
use super::tree::TreeChanges;
use crate::glob::Glob;
use crate::path::PathNode;
use crate::state::State;

/// Registration order across every registry (global and per-transition)
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Transition lifecycle events, in the order they fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookEvent {
    Invalid,
    Before,
    Start,
    /// The generic `on` event, right before resolves and exit/enter
    Run,
    Exit,
    Retain,
    Enter,
    Success,
    Error,
}

impl HookEvent {
    /// Exit/retain/enter hooks run once per matching node
    pub fn is_state_scoped(self) -> bool {
        matches!(self, HookEvent::Exit | HookEvent::Retain | HookEvent::Enter)
    }
}

/// Matches one state of the tree changes
#[derive(Clone, Default)]
pub enum StateCriterion {
    #[default]
    Any,
    Glob(Glob),
    Predicate(Arc<dyn Fn(&State) -> bool + Send + Sync>),
}

impl StateCriterion {
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&State) -> bool + Send + Sync + 'static,
    {
        StateCriterion::Predicate(Arc::new(predicate))
    }

    pub fn matches(&self, state: &State) -> bool {
        match self {
            StateCriterion::Any => true,
            StateCriterion::Glob(glob) => glob.matches(state.name()),
            StateCriterion::Predicate(predicate) => predicate(state),
        }
    }

    /// `Any` matches even an empty node list; other criteria need a match
    fn matching<'a>(&self, nodes: &'a [PathNode]) -> Option<Vec<&'a PathNode>> {
        let matched: Vec<&PathNode> = nodes.iter().filter(|n| self.matches(n.state())).collect();
        match self {
            StateCriterion::Any => Some(matched),
            _ if matched.is_empty() => None,
            _ => Some(matched),
        }
    }
}

impl fmt::Debug for StateCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateCriterion::Any => f.write_str("Any"),
            StateCriterion::Glob(glob) => write!(f, "Glob({glob})"),
            StateCriterion::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for StateCriterion {
    fn from(text: &str) -> Self {
        StateCriterion::Glob(Glob::new(text))
    }
}

impl From<Glob> for StateCriterion {
    fn from(glob: Glob) -> Self {
        StateCriterion::Glob(glob)
    }
}

/// Which transitions a hook applies to
///
/// `to` and `from` test the destination and origin states; `entering`,
/// `exiting` and `retained` test the nodes of those parts of the path.
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::{HookCriteria, StateCriterion};
///
/// let criteria = HookCriteria::new()
///     .to("admin.**")
///     .from(StateCriterion::predicate(|state| !state.name().starts_with("admin")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct HookCriteria {
    pub to: StateCriterion,
    pub from: StateCriterion,
    pub entering: StateCriterion,
    pub exiting: StateCriterion,
    pub retained: StateCriterion,
}

impl HookCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, criterion: impl Into<StateCriterion>) -> Self {
        self.to = criterion.into();
        self
    }

    pub fn from(mut self, criterion: impl Into<StateCriterion>) -> Self {
        self.from = criterion.into();
        self
    }

    pub fn entering(mut self, criterion: impl Into<StateCriterion>) -> Self {
        self.entering = criterion.into();
        self
    }

    pub fn exiting(mut self, criterion: impl Into<StateCriterion>) -> Self {
        self.exiting = criterion.into();
        self
    }

    pub fn retained(mut self, criterion: impl Into<StateCriterion>) -> Self {
        self.retained = criterion.into();
        self
    }

    /// True when every criterion matches `changes`
    pub fn matches(&self, changes: &TreeChanges) -> bool {
        let to = changes.to.last().map(std::slice::from_ref).unwrap_or_default();
        let from = changes.from.last().map(std::slice::from_ref).unwrap_or_default();
        self.to.matching(to).is_some()
            && self.from.matching(from).is_some()
            && self.entering.matching(&changes.entering).is_some()
            && self.exiting.matching(&changes.exiting).is_some()
            && self.retained.matching(&changes.retained).is_some()
    }

    /// The criterion a state-scoped event filters its nodes with
    pub fn for_event(&self, event: HookEvent) -> &StateCriterion {
        match event {
            HookEvent::Exit => &self.exiting,
            HookEvent::Retain => &self.retained,
            HookEvent::Enter => &self.entering,
            _ => &self.to,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookOptions {
    /// Higher runs first
    pub priority: i32,
    /// Deregister after this many invocations
    pub invoke_limit: Option<usize>,
}

/// A hook in a registry
pub struct RegisteredHook {
    id: u64,
    event: HookEvent,
    criteria: HookCriteria,
    callback: Injectable,
    priority: i32,
    invoke_limit: Option<usize>,
    invoked: AtomicUsize,
}

impl fmt::Debug for RegisteredHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHook")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("priority", &self.priority)
            .field("criteria", &self.criteria)
            .finish()
    }
}

impl RegisteredHook {
    /// Also the registration sequence
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event(&self) -> HookEvent {
        self.event
    }

    pub fn criteria(&self) -> &HookCriteria {
        &self.criteria
    }

    pub fn callback(&self) -> &Injectable {
        &self.callback
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_exhausted(&self) -> bool {
        self.invoke_limit
            .is_some_and(|limit| self.invoked.load(Ordering::SeqCst) >= limit)
    }

    /// Counts an invocation; false once the invoke limit is used up
    pub(crate) fn record_invocation(&self) -> bool {
        let before = self.invoked.fetch_add(1, Ordering::SeqCst);
        self.invoke_limit.map_or(true, |limit| before < limit)
    }
}

/// Sorts hooks: priority descending, then registration order
pub fn sort_hooks(hooks: &mut [Arc<RegisteredHook>]) {
    hooks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
}

/// A set of registered hooks; clones share the set
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<RwLock<Vec<Arc<RegisteredHook>>>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.hooks.read().len()).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook and returns its id
    pub fn register(&self, event: HookEvent, criteria: HookCriteria, callback: Injectable, options: HookOptions) -> u64 {
        let id = NEXT_SEQUENCE.fetch_add(1, Ordering::SeqCst);
        let mut hooks = self.hooks.write();
        hooks.retain(|hook| !hook.is_exhausted());
        hooks.push(Arc::new(RegisteredHook {
            id,
            event,
            criteria,
            callback,
            priority: options.priority,
            invoke_limit: options.invoke_limit,
            invoked: AtomicUsize::new(0),
        }));
        id
    }

    pub fn deregister(&self, id: u64) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|hook| hook.id != id);
        hooks.len() != before
    }

    /// Live hooks for `event`, in registration order
    pub fn hooks(&self, event: HookEvent) -> Vec<Arc<RegisteredHook>> {
        self.hooks
            .read()
            .iter()
            .filter(|hook| hook.event == event && !hook.is_exhausted())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }
}

/// The `on_*` registration shorthands
///
/// Implemented by the global [`HookRegistry`] owners and by each
/// [`Transition`](super::Transition) (hooks that only apply to it).
pub trait HookRegistration {
    fn hook_registry(&self) -> &HookRegistry;

    fn register_hook(&self, event: HookEvent, criteria: HookCriteria, callback: Injectable, options: HookOptions) -> u64 {
        self.hook_registry().register(event, criteria, callback, options)
    }

    fn deregister_hook(&self, id: u64) -> bool {
        self.hook_registry().deregister(id)
    }

    fn on_invalid<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Invalid, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on_before<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Before, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on_start<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Start, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Run, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on_exit<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Exit, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on_retain<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Retain, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on_enter<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Enter, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on_success<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Success, criteria, Injectable::new(&[], callback), HookOptions::default())
    }

    fn on_error<F>(&self, criteria: HookCriteria, callback: F) -> u64
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        self.register_hook(HookEvent::Error, criteria, Injectable::new(&[], callback), HookOptions::default())
    }
}

impl HookRegistration for HookRegistry {
    fn hook_registry(&self) -> &HookRegistry {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Injectable {
        Injectable::new(&[], |_| Ok(HookResult::Continue))
    }

    #[test]
    fn test_sort_by_priority_then_registration() {
        let registry = HookRegistry::new();
        let low = registry.register(HookEvent::Start, HookCriteria::new(), noop(), HookOptions::default());
        let high = registry.register(
            HookEvent::Start,
            HookCriteria::new(),
            noop(),
            HookOptions {
                priority: 10,
                ..HookOptions::default()
            },
        );
        let low_again = registry.register(HookEvent::Start, HookCriteria::new(), noop(), HookOptions::default());

        let mut hooks = registry.hooks(HookEvent::Start);
        sort_hooks(&mut hooks);
        let ids: Vec<u64> = hooks.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![high, low, low_again]);
    }

    #[test]
    fn test_deregister_and_event_filter() {
        let registry = HookRegistry::new();
        let id = registry.on_enter(HookCriteria::new().entering("a.*"), |_| Ok(HookResult::Continue));
        registry.on_exit(HookCriteria::new(), |_| Ok(HookResult::Continue));

        assert_eq!(registry.hooks(HookEvent::Enter).len(), 1);
        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        assert!(registry.hooks(HookEvent::Enter).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invoke_limit() {
        let registry = HookRegistry::new();
        registry.register(
            HookEvent::Success,
            HookCriteria::new(),
            noop(),
            HookOptions {
                invoke_limit: Some(1),
                ..HookOptions::default()
            },
        );
        let hook = registry.hooks(HookEvent::Success).remove(0);
        assert!(hook.record_invocation());
        assert!(hook.is_exhausted());
        assert!(!hook.record_invocation());
        assert!(registry.hooks(HookEvent::Success).is_empty());
    }
}
