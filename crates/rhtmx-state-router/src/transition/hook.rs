/// Hook callbacks and what they may return
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::reject::Rejection;
use super::Transition;
use crate::resolve::{Locals, Resolvable};
use crate::state::State;
use crate::target::TargetState;

/// What a hook tells the transition to do next
pub enum HookResult {
    /// Carry on
    Continue,
    /// Reject the transition as `Aborted`
    Abort,
    /// Reject as `Superseded` and start a transition to the target instead
    Redirect(TargetState),
    /// Wait for the future, then act on its result; a failure rejects the
    /// transition as `Error`
    Pending(BoxFuture<'static, anyhow::Result<HookResult>>),
    /// Add resolvables to the hook's state (the root for transition hooks)
    Resolves(Vec<Resolvable>),
}

impl HookResult {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<HookResult>> + Send + 'static,
    {
        HookResult::Pending(future.boxed())
    }
}

impl From<TargetState> for HookResult {
    fn from(target: TargetState) -> Self {
        HookResult::Redirect(target)
    }
}

impl fmt::Debug for HookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookResult::Continue => f.write_str("Continue"),
            HookResult::Abort => f.write_str("Abort"),
            HookResult::Redirect(target) => f.debug_tuple("Redirect").field(target).finish(),
            HookResult::Pending(_) => f.write_str("Pending(..)"),
            HookResult::Resolves(resolvables) => f.debug_tuple("Resolves").field(resolvables).finish(),
        }
    }
}

/// What a hook is called with
#[derive(Debug, Clone)]
pub struct HookArgs {
    pub transition: Transition,
    /// The node's state for exit/retain/enter hooks
    pub state: Option<State>,
    /// The hook's declared dependencies, resolved
    pub locals: Locals,
    /// The rejection, for `on_error` hooks
    pub error: Option<Rejection>,
}

impl HookArgs {
    pub fn get(&self, token: &str) -> Option<&Value> {
        self.locals.get(token)
    }
}

pub type HookFn = Arc<dyn Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync>;

/// A callback with named dependencies, injected from the resolve context
#[derive(Clone)]
pub struct Injectable {
    deps: Vec<String>,
    callback: HookFn,
}

impl fmt::Debug for Injectable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injectable").field("deps", &self.deps).finish()
    }
}

impl Injectable {
    pub fn new<F>(deps: &[&str], callback: F) -> Self
    where
        F: Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static,
    {
        Self {
            deps: deps.iter().map(|d| d.to_string()).collect(),
            callback: Arc::new(callback),
        }
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn invoke(&self, args: HookArgs) -> anyhow::Result<HookResult> {
        (self.callback)(args)
    }
}
