/// Creates transitions and owns the global hooks
use super::builtin;
use super::registry::{HookRegistration, HookRegistry};
use super::transition::{ActiveTransition, Transition};
use crate::path::PathNode;
use crate::state::StateRegistry;
use crate::target::TargetState;

/// Factory for [`Transition`]s sharing one hook registry and one active slot
///
/// # Examples
///
/// ```
/// use rhtmx_state_router::{HookCriteria, HookRegistration, HookResult, StateRegistry, TransitionService};
///
/// let service = TransitionService::new(StateRegistry::default());
/// let id = service.on_start(HookCriteria::new().to("admin.**"), |_| Ok(HookResult::Abort));
/// assert!(service.deregister_hook(id));
/// ```
#[derive(Debug, Clone)]
pub struct TransitionService {
    registry: StateRegistry,
    hooks: HookRegistry,
    active: ActiveTransition,
}

impl TransitionService {
    /// Creates the service with the built-in `lazy_load` and `redirect_to`
    /// hooks registered
    pub fn new(registry: StateRegistry) -> Self {
        let service = Self {
            registry,
            hooks: HookRegistry::new(),
            active: ActiveTransition::default(),
        };
        builtin::register(&service.hooks);
        service
    }

    /// A transition from `from_path` (the root when empty) to `target`
    pub fn create(&self, from_path: Vec<PathNode>, target: TargetState) -> Transition {
        Transition::new(self, from_path, target, None, Vec::new())
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn active(&self) -> &ActiveTransition {
        &self.active
    }
}

impl HookRegistration for TransitionService {
    fn hook_registry(&self) -> &HookRegistry {
        &self.hooks
    }
}
