/// A single attempt to move from one path to another
///
/// A [`Transition`] is created from the current path and a [`TargetState`].
/// Its tree diff is computed once, on first use. [`run`](Transition::run)
/// drives the hook pipeline:
///
/// 1. invalid targets: `on_invalid` hooks, then reject `Invalid`
/// 2. `on_before`
/// 3. same path as the current one: take over the active slot (if another
///    transition holds it), then reject `Ignored`; otherwise become the
///    active transition
/// 4. `on_start`, then `on`
/// 5. eager resolvables of the whole target path
/// 6. exiting nodes (child first): `on_exit` hooks, then the state's own
/// 7. retained nodes (parent first): `on_retain` hooks, then the state's own
/// 8. entering nodes (parent first): lazy resolvables, `on_enter` hooks, then
///    the state's own
/// 9. settle `prepromise`, run `on_success` / `on_error`, settle `promise`
///
/// Before every hook from step 4 on, a transition that is no longer the
/// active one rejects `Superseded`.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::deferred::{Deferred, TransitionOutcome};
use super::hook::{HookArgs, HookResult, Injectable};
use super::options::{Reload, TransitionOptions};
use super::registry::{sort_hooks, HookEvent, HookRegistration, HookRegistry, RegisteredHook};
use super::reject::{RejectType, Rejection};
use super::service::TransitionService;
use super::tree::TreeChanges;
use crate::error::TargetError;
use crate::params::RawParams;
use crate::path::{self, PathNode};
use crate::resolve::{ResolveContext, ResolvePolicy, Resolvable};
use crate::state::{State, StateRegistry};
use crate::target::TargetState;

/// Consecutive redirects followed before giving up
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// The slot naming the transition currently running
///
/// Shared by every transition a [`TransitionService`] creates. Only a weak
/// reference is kept, so a dropped transition frees the slot.
#[derive(Clone, Default)]
pub struct ActiveTransition {
    slot: Arc<Mutex<Option<Weak<TransitionInner>>>>,
}

impl fmt::Debug for ActiveTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveTransition")
            .field("id", &self.get().map(|t| t.id()))
            .finish()
    }
}

impl ActiveTransition {
    pub fn get(&self) -> Option<Transition> {
        self.slot.lock().as_ref().and_then(Weak::upgrade).map(Transition)
    }

    pub fn is(&self, transition: &Transition) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&transition.0)))
    }

    pub(crate) fn set(&self, transition: &Transition) {
        *self.slot.lock() = Some(Arc::downgrade(&transition.0));
    }

    pub(crate) fn clear_if(&self, transition: &Transition) {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&transition.0)))
        {
            *slot = None;
        }
    }
}

pub(crate) struct TransitionInner {
    id: u64,
    from_path: Vec<PathNode>,
    target: TargetState,
    options: TransitionOptions,
    service: TransitionService,
    hooks: HookRegistry,
    changes: OnceCell<TreeChanges>,
    /// Entering nodes of the transition this one redirects
    reuse: Vec<PathNode>,
    previous: Option<Weak<TransitionInner>>,
    run: Mutex<Option<Shared<BoxFuture<'static, TransitionOutcome>>>>,
    prepromise: Deferred,
    promise: Deferred,
}

/// Shared handle to one transition
#[derive(Clone)]
pub struct Transition(Arc<TransitionInner>);

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.0.id)
            .field("from", &self.from().name())
            .field("to", &self.0.target.name())
            .finish()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from_params = serde_json::to_string(&path::param_values(&self.0.from_path)).unwrap_or_default();
        let to_params = serde_json::to_string(self.0.target.params()).unwrap_or_default();
        write!(
            f,
            "Transition#{}( '{}'{} -> {}{} )",
            self.0.id,
            self.from().name(),
            from_params,
            self.0.target.identifier().name(),
            to_params
        )
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl HookRegistration for Transition {
    fn hook_registry(&self) -> &HookRegistry {
        &self.0.hooks
    }
}

impl Transition {
    pub(crate) fn new(
        service: &TransitionService,
        from_path: Vec<PathNode>,
        target: TargetState,
        previous: Option<&Transition>,
        reuse: Vec<PathNode>,
    ) -> Self {
        let from_path = if from_path.is_empty() {
            path::build_path(&service.registry().root(), &RawParams::new())
        } else {
            from_path
        };
        let options = target.options().cloned().unwrap_or_default();

        Transition(Arc::new(TransitionInner {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            from_path,
            target,
            options,
            service: service.clone(),
            hooks: HookRegistry::new(),
            changes: OnceCell::new(),
            reuse,
            previous: previous.map(|t| Arc::downgrade(&t.0)),
            run: Mutex::new(None),
            prepromise: Deferred::new(),
            promise: Deferred::new(),
        }))
    }

    /// Unique, increasing per process
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// The state the transition leaves
    pub fn from(&self) -> State {
        match self.0.from_path.last() {
            Some(node) => node.state().clone(),
            None => self.registry().root(),
        }
    }

    /// The target's state, when it exists
    pub fn to(&self) -> Option<State> {
        self.0.target.state().cloned()
    }

    pub fn target(&self) -> &TargetState {
        &self.0.target
    }

    pub fn options(&self) -> &TransitionOptions {
        &self.0.options
    }

    pub fn registry(&self) -> &StateRegistry {
        self.0.service.registry()
    }

    /// Param values of the target path
    pub fn params(&self) -> RawParams {
        path::param_values(&self.tree_changes().to)
    }

    pub fn tree_changes(&self) -> &TreeChanges {
        self.0.changes.get_or_init(|| {
            let to_path = match (self.0.target.valid(), self.0.target.state()) {
                (true, Some(state)) => path::build_path(state, self.0.target.params()),
                _ => self.0.from_path.clone(),
            };
            let reload_state = self.reload_state();
            TreeChanges::compute(&self.0.from_path, &to_path, reload_state.as_ref(), &self.0.reuse)
        })
    }

    fn reload_state(&self) -> Option<State> {
        match &self.0.options.reload {
            Reload::No => None,
            Reload::All => Some(self.registry().root()),
            Reload::State(name) => {
                let found = self
                    .registry()
                    .find(name, self.0.options.relative.as_ref())
                    .ok()
                    .flatten();
                if found.is_none() {
                    warn!(state = %name, "reload state not found, reloading from the root");
                }
                Some(found.unwrap_or_else(|| self.registry().root()))
            }
        }
    }

    pub fn entering(&self) -> Vec<State> {
        path::states(&self.tree_changes().entering)
    }

    pub fn exiting(&self) -> Vec<State> {
        path::states(&self.tree_changes().exiting)
    }

    pub fn retained(&self) -> Vec<State> {
        path::states(&self.tree_changes().retained)
    }

    /// The transition this one redirects, while it is still alive
    pub fn previous(&self) -> Option<Transition> {
        self.0.previous.as_ref().and_then(Weak::upgrade).map(Transition)
    }

    /// First transition of the redirect chain
    pub fn original(&self) -> Transition {
        let mut current = self.clone();
        while let Some(previous) = current.previous() {
            current = previous;
        }
        current
    }

    /// Number of redirects leading to this transition
    pub fn redirect_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.previous();
        while let Some(previous) = current {
            count += 1;
            current = previous.previous();
        }
        count
    }

    /// Why the target cannot be reached
    pub fn error(&self) -> Option<TargetError> {
        self.0.target.error()
    }

    pub fn valid(&self) -> bool {
        self.error().is_none()
    }

    /// The target path equals the current one and nothing is reloaded
    pub fn ignored(&self) -> bool {
        self.0.options.reload == Reload::No && self.valid() && self.tree_changes().is_same_path()
    }

    pub fn is_active(&self) -> bool {
        self.0.service.active().is(self)
    }

    /// Runs the pipeline once; later calls return the same outcome
    pub fn run(&self) -> Shared<BoxFuture<'static, TransitionOutcome>> {
        let mut run = self.0.run.lock();
        run.get_or_insert_with(|| {
            let transition = self.clone();
            async move { transition.execute().await }.boxed().shared()
        })
        .clone()
    }

    /// Settles when the pipeline is done, before success/error hooks run
    pub fn prepromise(&self) -> Shared<BoxFuture<'static, TransitionOutcome>> {
        self.0.prepromise.wait()
    }

    /// Settles after the success/error hooks ran
    pub fn promise(&self) -> Shared<BoxFuture<'static, TransitionOutcome>> {
        self.0.promise.wait()
    }

    /// The outcome once settled
    pub fn outcome(&self) -> Option<TransitionOutcome> {
        self.0.promise.value()
    }

    /// A new transition from the same path to `target`
    ///
    /// The target's options are used when it has any, this transition's
    /// otherwise. Entering resolvables already resolved here are reused.
    pub fn redirect(&self, target: TargetState) -> Transition {
        let target = match target.options() {
            Some(_) => target,
            None => target.with_options(self.0.options.clone()),
        };
        let reuse = self.tree_changes().entering.clone();
        Transition::new(&self.0.service, self.0.from_path.clone(), target, Some(self), reuse)
    }

    /// Runs this transition and every redirect after it
    pub async fn redirects(&self) -> TransitionOutcome {
        self.follow(DEFAULT_MAX_REDIRECTS).await.1
    }

    /// Like [`redirects`](Transition::redirects), returning the last
    /// transition of the chain with its outcome
    pub(crate) async fn follow(&self, max_redirects: usize) -> (Transition, TransitionOutcome) {
        // Holds the chain so `previous()` stays available to hooks.
        let mut chain = vec![self.clone()];
        loop {
            let current = chain[chain.len() - 1].clone();
            let outcome = current.run().await;
            let next = match &outcome {
                Err(rejection) if rejection.is_redirected() => rejection.redirect().cloned(),
                _ => None,
            };
            let Some(next) = next else {
                return (current, outcome);
            };
            if chain.len() > max_redirects {
                let err = anyhow::anyhow!("Too many consecutive Transition redirects ({max_redirects}+)");
                return (current, Err(Rejection::error(err)));
            }
            chain.push(next);
        }
    }

    /// The resolve context of the target path
    pub fn resolve_context(&self) -> ResolveContext {
        ResolveContext::new(self.tree_changes().to.clone())
    }

    /// Resolves `token` on the target path
    pub async fn resolve(&self, token: &str) -> Result<Value, Rejection> {
        let mut locals = self.resolve_context().locals(None, &[token.to_string()]).await?;
        Ok(locals.remove(token).unwrap_or(Value::Null))
    }

    /// Adds a resolvable to `state` (the root when `None`) on the target path
    pub fn add_resolvable(&self, resolvable: Resolvable, state: Option<&State>) -> bool {
        let state = state.cloned().unwrap_or_else(|| self.registry().root());
        self.resolve_context().add_resolvables(&state, vec![resolvable])
    }

    async fn execute(self) -> TransitionOutcome {
        debug!(
            id = self.id(),
            from = %self.from(),
            to = %self.0.target.identifier().name(),
            "transition started"
        );
        let result = self.pipeline().await;
        self.settle(result).await
    }

    async fn pipeline(&self) -> Result<(), Rejection> {
        let changes = self.tree_changes();

        if let Some(err) = self.error() {
            self.run_transition_hooks(HookEvent::Invalid, false).await?;
            return Err(Rejection::invalid(err.to_string()));
        }

        self.run_transition_hooks(HookEvent::Before, false).await?;

        if self.ignored() {
            // Going back to the current path still cancels a pending transition.
            if self.0.service.active().get().is_some() {
                debug!(id = self.id(), "ignored transition supersedes the pending one");
                self.0.service.active().set(self);
            }
            return Err(Rejection::ignored());
        }
        self.0.service.active().set(self);

        self.run_transition_hooks(HookEvent::Start, true).await?;
        self.run_transition_hooks(HookEvent::Run, true).await?;

        let to_context = self.resolve_context();
        self.check_superseded()?;
        to_context.resolve_path(ResolvePolicy::Eager).await?;

        let from_context = ResolveContext::new(changes.from.clone());
        for node in changes.exiting.iter().filter(|n| !n.state().is_root()) {
            let state = node.state();
            self.run_state_hooks(HookEvent::Exit, state, &from_context).await?;
            if let Some(callback) = state.on_exit() {
                self.check_superseded()?;
                self.invoke(callback, Some(state), &from_context).await?;
            }
        }

        for node in changes.retained_with_to_params.iter().filter(|n| !n.state().is_root()) {
            let state = node.state();
            self.run_state_hooks(HookEvent::Retain, state, &to_context).await?;
            if let Some(callback) = state.on_retain() {
                self.check_superseded()?;
                self.invoke(callback, Some(state), &to_context).await?;
            }
        }

        for node in &changes.entering {
            let state = node.state();
            self.check_superseded()?;
            to_context.resolve_node(state, ResolvePolicy::Lazy).await?;
            if state.is_root() {
                continue;
            }
            self.run_state_hooks(HookEvent::Enter, state, &to_context).await?;
            if let Some(callback) = state.on_enter() {
                self.check_superseded()?;
                self.invoke(callback, Some(state), &to_context).await?;
            }
        }

        self.check_superseded()
    }

    async fn settle(&self, result: Result<(), Rejection>) -> TransitionOutcome {
        let outcome = result.map(|()| match self.tree_changes().to_state() {
            Some(state) => state.clone(),
            None => self.registry().root(),
        });
        self.0.prepromise.settle(outcome.clone());

        match &outcome {
            Ok(state) => {
                debug!(id = self.id(), to = %state, "transition succeeded");
                self.run_isolated(HookEvent::Success, None).await;
            }
            Err(rejection) if rejection.is_redirected() => {
                debug!(id = self.id(), %rejection, "transition redirected");
                self.run_isolated(HookEvent::Error, Some(rejection.clone())).await;
            }
            Err(rejection) if rejection.kind() == RejectType::Ignored => {
                debug!(id = self.id(), "transition ignored");
            }
            Err(rejection) => {
                debug!(id = self.id(), %rejection, "transition rejected");
                self.run_isolated(HookEvent::Error, Some(rejection.clone())).await;
            }
        }

        self.0.service.active().clear_if(self);
        self.0.promise.settle(outcome.clone());
        outcome
    }

    fn check_superseded(&self) -> Result<(), Rejection> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Rejection::superseded())
        }
    }

    /// Global and local hooks for `event` matching the tree changes, in run order
    fn matching_hooks(&self, event: HookEvent) -> Vec<Arc<RegisteredHook>> {
        let changes = self.tree_changes();
        let mut hooks: Vec<Arc<RegisteredHook>> = self
            .0
            .service
            .hooks()
            .hooks(event)
            .into_iter()
            .chain(self.0.hooks.hooks(event))
            .filter(|hook| hook.criteria().matches(changes))
            .collect();
        sort_hooks(&mut hooks);
        hooks
    }

    async fn run_transition_hooks(&self, event: HookEvent, check_superseded: bool) -> Result<(), Rejection> {
        let hooks = self.matching_hooks(event);
        if hooks.is_empty() {
            return Ok(());
        }
        let context = self.resolve_context();
        for hook in hooks {
            if check_superseded {
                self.check_superseded()?;
            }
            self.invoke_hook(&hook, None, &context).await?;
        }
        Ok(())
    }

    async fn run_state_hooks(&self, event: HookEvent, state: &State, context: &ResolveContext) -> Result<(), Rejection> {
        let hooks: Vec<Arc<RegisteredHook>> = self
            .matching_hooks(event)
            .into_iter()
            .filter(|hook| hook.criteria().for_event(event).matches(state))
            .collect();
        for hook in hooks {
            self.check_superseded()?;
            self.invoke_hook(&hook, Some(state), context).await?;
        }
        Ok(())
    }

    async fn invoke_hook(&self, hook: &RegisteredHook, state: Option<&State>, context: &ResolveContext) -> Result<(), Rejection> {
        if !hook.record_invocation() {
            return Ok(());
        }
        trace!(
            id = self.id(),
            hook = hook.id(),
            event = ?hook.event(),
            state = ?state.map(|s| s.name()),
            "invoking hook"
        );
        self.invoke(hook.callback(), state, context).await
    }

    async fn invoke(&self, callback: &Injectable, state: Option<&State>, context: &ResolveContext) -> Result<(), Rejection> {
        let locals = context.locals(state, callback.deps()).await?;
        let args = HookArgs {
            transition: self.clone(),
            state: state.cloned(),
            locals,
            error: None,
        };
        let result = callback
            .invoke(args)
            .map_err(|err| Rejection::aborted(format!("{err:#}")))?;
        self.handle_result(result, state, context).await
    }

    fn handle_result<'a>(
        &'a self,
        result: HookResult,
        state: Option<&'a State>,
        context: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<(), Rejection>> {
        async move {
            match result {
                HookResult::Continue => Ok(()),
                HookResult::Abort => Err(Rejection::aborted("Hook aborted transition")),
                HookResult::Redirect(target) => {
                    let next = self.redirect(target);
                    debug!(id = self.id(), redirect = next.id(), to = %next.target(), "hook redirected transition");
                    Err(Rejection::redirected(next))
                }
                HookResult::Pending(future) => {
                    let next = future.await.map_err(Rejection::error)?;
                    self.handle_result(next, state, context).await
                }
                HookResult::Resolves(resolvables) => {
                    let owner = state.cloned().unwrap_or_else(|| self.registry().root());
                    context.add_resolvables(&owner, resolvables);
                    Ok(())
                }
            }
        }
        .boxed()
    }

    /// Runs success/error hooks; failures are logged and dropped
    async fn run_isolated(&self, event: HookEvent, error: Option<Rejection>) {
        let hooks = self.matching_hooks(event);
        if hooks.is_empty() {
            return;
        }
        let context = self.resolve_context();
        for hook in hooks {
            if !hook.record_invocation() {
                continue;
            }
            trace!(id = self.id(), hook = hook.id(), event = ?event, "invoking hook");
            let result = self.invoke_isolated(hook.callback(), &context, error.clone()).await;
            if let Err(err) = result {
                warn!(id = self.id(), hook = hook.id(), event = ?event, error = %format!("{err:#}"), "hook failed");
            }
        }
    }

    async fn invoke_isolated(
        &self,
        callback: &Injectable,
        context: &ResolveContext,
        error: Option<Rejection>,
    ) -> anyhow::Result<()> {
        let locals = context.locals(None, callback.deps()).await?;
        let args = HookArgs {
            transition: self.clone(),
            state: None,
            locals,
            error,
        };
        if let HookResult::Pending(future) = callback.invoke(args)? {
            future.await?;
        }
        Ok(())
    }
}
