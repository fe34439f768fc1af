/// Hooks every [`TransitionService`](super::TransitionService) starts with
///
/// - `on_before`: load pending `lazy_load`s of entering states, then retarget
/// - `on_start`: follow the target state's `redirect_to`
use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use super::hook::{HookArgs, HookResult};
use super::options::TransitionSource;
use super::registry::{HookCriteria, HookRegistration, HookRegistry, StateCriterion};
use super::Transition;
use crate::error::RouterError;
use crate::location::parse_url;
use crate::state::{LazyLoad, RedirectTo, State};
use crate::target::{StateRef, TargetState};

pub(crate) fn register(hooks: &HookRegistry) {
    hooks.on_before(
        HookCriteria::new().entering(StateCriterion::predicate(has_pending_load)),
        lazy_load_hook,
    );
    hooks.on_start(
        HookCriteria::new().to(StateCriterion::predicate(|state| state.redirect_to().is_some())),
        redirect_to_hook,
    );
}

fn has_pending_load(state: &State) -> bool {
    state.lazy_load().is_some_and(|lazy| !lazy.is_loaded())
}

fn lazy_load_hook(args: HookArgs) -> anyhow::Result<HookResult> {
    let transition = args.transition;
    let pending: Vec<(State, Arc<LazyLoad>)> = transition
        .entering()
        .into_iter()
        .filter(has_pending_load)
        .filter_map(|state| state.lazy_load().cloned().map(|lazy| (state, lazy)))
        .collect();
    if pending.is_empty() {
        return Ok(HookResult::Continue);
    }

    Ok(HookResult::pending(async move {
        for (state, lazy) in pending {
            let declarations = lazy
                .load(transition.clone())
                .await
                .map_err(|err| anyhow!("Lazy load of '{}' failed: {err:#}", state.name()))?;
            debug!(state = %state, count = declarations.len(), "registering lazy loaded states");
            for declaration in declarations.iter() {
                match transition.registry().register(declaration.clone()) {
                    Ok(_) | Err(RouterError::DuplicateState(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(retarget(&transition))
    }))
}

/// Points the original target at the states that now exist
fn retarget(transition: &Transition) -> HookResult {
    let target = transition.target();
    let registry = transition.registry();
    let options = Some(transition.options().clone());

    let via_url = match target.identifier() {
        StateRef::State(state) if state.is_future() => true,
        _ => transition.options().source == TransitionSource::Url,
    };
    if via_url {
        let matched = target
            .state()
            .and_then(|state| state.url())
            .and_then(|url| url.format(target.params()))
            .and_then(|url| {
                let parsed = parse_url(&url);
                registry.match_url(&parsed.path, &parsed.search)
            });
        if let Some((state, params)) = matched {
            return HookResult::Redirect(registry.target(state, params, options));
        }
    }

    HookResult::Redirect(TargetState::new(
        registry,
        StateRef::Name(target.identifier().name().to_string()),
        target.params().clone(),
        options,
    ))
}

fn redirect_to_hook(args: HookArgs) -> anyhow::Result<HookResult> {
    let transition = args.transition;
    let Some(state) = transition.tree_changes().to_state().cloned() else {
        return Ok(HookResult::Continue);
    };
    let Some(redirect) = state.redirect_to() else {
        return Ok(HookResult::Continue);
    };

    let registry = transition.registry();
    let result = match redirect {
        RedirectTo::State(name) => {
            HookResult::Redirect(registry.target(name.as_str(), transition.params(), None))
        }
        RedirectTo::Target { state, params } => {
            HookResult::Redirect(registry.target(state.as_str(), params.clone(), None))
        }
        RedirectTo::Func(redirect) => redirect(&transition)?,
    };
    debug!(from = %state, result = ?result, "redirect_to");
    Ok(result)
}
