//! Integration tests for the transition engine
//!
//! Covers the hook pipeline end to end:
//! - Phase order (exit child first, enter parent first)
//! - Abort, redirect, invalid and error rejections
//! - Hook priorities and registration order
//! - Supersession by a newer transition
//! - Resolvable memoization and injection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use rhtmx_state_router::*;
use serde_json::json;
use tokio::sync::Notify;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn bag(pairs: &[(&str, serde_json::Value)]) -> RawParams {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn router() -> (StateService, Arc<MemoryLocation>) {
    init_tracing();
    let location = Arc::new(MemoryLocation::default());
    let router = StateService::new(location.clone(), Arc::new(ViewService::new()), &RouterConfig::default());
    (router, location)
}

fn register_all(router: &StateService, declarations: Vec<StateDeclaration>) {
    for declaration in declarations {
        router.register(declaration).unwrap();
    }
}

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, prefix: &'static str) -> impl Fn(HookArgs) -> anyhow::Result<HookResult> + Send + Sync + 'static {
    let log = log.clone();
    move |args: HookArgs| {
        let name = args.state.as_ref().map(|s| s.name().to_string()).unwrap_or_default();
        log.lock().unwrap().push(format!("{prefix}:{name}"));
        Ok(HookResult::Continue)
    }
}

fn names(states: &[State]) -> Vec<&str> {
    states.iter().map(|s| s.name()).collect()
}

#[tokio::test]
async fn test_abort_hook_rejects_with_entering_path() {
    let (router, _) = router();
    register_all(
        &router,
        vec![
            StateDeclaration::new("a").with_url("/a"),
            StateDeclaration::new("a.b").with_url("/b"),
            StateDeclaration::new("a.b.c").with_url("/c"),
        ],
    );

    let target = router.target("a.b.c", RawParams::new(), None);
    let transition = router.transitions().create(router.globals().path, target);
    transition.on_start(HookCriteria::new(), |_| Ok(HookResult::Abort));

    let rejection = transition.run().await.unwrap_err();
    assert_eq!(rejection.kind(), RejectType::Aborted);
    assert_eq!(names(&transition.entering()), vec!["a", "a.b", "a.b.c"]);
    assert!(router.current().is_root());
}

fn chain_of_four(router: &StateService) {
    register_all(
        router,
        vec![
            StateDeclaration::new("a").with_url("/a"),
            StateDeclaration::new("a.b").with_url("/b"),
            StateDeclaration::new("a.b.c").with_url("/c"),
            StateDeclaration::new("a.b.c.d").with_url("/d"),
        ],
    );
}

#[tokio::test]
async fn test_enter_hook_abort_stops_entering() {
    let (router, _) = router();
    chain_of_four(&router);
    let log: Log = Arc::default();
    router.transitions().on_enter(HookCriteria::new(), recorder(&log, "enter"));
    router
        .transitions()
        .on_enter(HookCriteria::new().entering("a.b.c"), |_| Ok(HookResult::Abort));

    let rejection = router.go("a.b.c.d", RawParams::new(), None).await.unwrap_err();

    assert_eq!(rejection.kind(), RejectType::Aborted);
    assert!(!rejection.is_redirected());
    assert_eq!(*log.lock().unwrap(), vec!["enter:a", "enter:a.b", "enter:a.b.c"]);
    assert!(router.current().is_root());
}

#[tokio::test]
async fn test_enter_hook_redirect_stops_entering() {
    let (router, _) = router();
    chain_of_four(&router);
    let log: Log = Arc::default();
    router.transitions().on_enter(HookCriteria::new(), recorder(&log, "enter"));
    router
        .transitions()
        .on_enter(HookCriteria::new().entering("a.b.c"), |args| {
            let target = args.transition.registry().target("a.b", RawParams::new(), None);
            Ok(HookResult::Redirect(target))
        });

    let target = router.target("a.b.c.d", RawParams::new(), None);
    let transition = router.transitions().create(router.globals().path, target);
    let rejection = transition.run().await.unwrap_err();

    assert_eq!(rejection.kind(), RejectType::Superseded);
    assert!(rejection.is_redirected());
    assert_eq!(rejection.redirect().unwrap().target().name(), "a.b");
    assert_eq!(*log.lock().unwrap(), vec!["enter:a", "enter:a.b", "enter:a.b.c"]);
}

#[tokio::test]
async fn test_run_twice_returns_same_outcome() {
    let (router, _) = router();
    register_all(&router, vec![StateDeclaration::new("a").with_url("/a")]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    router.transitions().on_start(HookCriteria::new(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(HookResult::Continue)
    });

    let target = router.target("a", RawParams::new(), None);
    let transition = router.transitions().create(router.globals().path, target);
    let first = transition.run().await.unwrap();
    let second = transition.run().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(transition.outcome().unwrap().unwrap().name(), "a");
    assert_eq!(transition.promise().await.unwrap().name(), "a");
}

#[tokio::test]
async fn test_redirect_hook_supersedes_and_points_at_new_target() {
    let (router, _) = router();
    register_all(
        &router,
        vec![
            StateDeclaration::new("a").with_url("/a"),
            StateDeclaration::new("b").with_url("/b"),
        ],
    );
    router.transitions().on_start(HookCriteria::new().to("a"), |args| {
        let target = args.transition.registry().target("b", RawParams::new(), None);
        Ok(HookResult::Redirect(target))
    });

    let target = router.target("a", RawParams::new(), None);
    let transition = router.transitions().create(router.globals().path, target);
    let rejection = transition.run().await.unwrap_err();

    assert_eq!(rejection.kind(), RejectType::Superseded);
    assert!(rejection.is_redirected());
    let redirect = rejection.redirect().unwrap();
    assert_eq!(redirect.target().name(), "b");
    assert_eq!(redirect.previous().unwrap(), transition);
    assert_eq!(redirect.original(), transition);
    assert_eq!(redirect.redirect_count(), 1);

    let state = router.go("a", RawParams::new(), None).await.unwrap();
    assert_eq!(state.name(), "b");
    assert_eq!(router.current().name(), "b");

    // The redirect still starts from the root path it was created with.
    assert_eq!(transition.redirects().await.unwrap().name(), "b");
}

#[tokio::test]
async fn test_redirect_loop_is_cut_off() {
    let (router, _) = router();
    register_all(
        &router,
        vec![
            StateDeclaration::new("ping").with_url("/ping").with_redirect_to(RedirectTo::State("pong".to_string())),
            StateDeclaration::new("pong").with_url("/pong").with_redirect_to(RedirectTo::State("ping".to_string())),
        ],
    );

    let rejection = router.go("ping", RawParams::new(), None).await.unwrap_err();
    assert_eq!(rejection.kind(), RejectType::Error);
    assert!(rejection.cause().unwrap().to_string().contains("Too many consecutive Transition redirects"));
    assert!(router.current().is_root());
}

#[tokio::test]
async fn test_redirect_to_declaration() {
    let (router, _) = router();
    register_all(
        &router,
        vec![
            StateDeclaration::new("inbox").with_url("/inbox"),
            StateDeclaration::new("mail")
                .with_url("/mail")
                .with_redirect_to(RedirectTo::State("inbox".to_string())),
        ],
    );

    let state = router.go("mail", RawParams::new(), None).await.unwrap();
    assert_eq!(state.name(), "inbox");
}

#[tokio::test]
async fn test_exit_child_first_enter_parent_first() {
    let (router, _) = router();
    let log: Log = Arc::default();
    register_all(
        &router,
        vec![
            StateDeclaration::new("c").with_url("/c").on_enter(&[], recorder(&log, "own-enter")),
            StateDeclaration::new("c.d").with_url("/d").on_exit(&[], recorder(&log, "own-exit")),
            StateDeclaration::new("x").with_url("/x"),
        ],
    );
    router.transitions().on_enter(HookCriteria::new(), recorder(&log, "enter"));
    router.transitions().on_exit(HookCriteria::new(), recorder(&log, "exit"));

    router.go("c.d", RawParams::new(), None).await.unwrap();
    assert_eq!(
        log.lock().unwrap().drain(..).collect::<Vec<_>>(),
        vec!["enter:c", "own-enter:c", "enter:c.d"]
    );

    router.go("x", RawParams::new(), None).await.unwrap();
    assert_eq!(
        log.lock().unwrap().drain(..).collect::<Vec<_>>(),
        vec!["exit:c.d", "own-exit:c.d", "exit:c", "enter:x"]
    );
}

#[tokio::test]
async fn test_retain_hooks_run_for_kept_states() {
    let (router, _) = router();
    let log: Log = Arc::default();
    register_all(
        &router,
        vec![
            StateDeclaration::new("app").with_url("/app").on_retain(&[], recorder(&log, "own-retain")),
            StateDeclaration::new("app.one").with_url("/one"),
            StateDeclaration::new("app.two").with_url("/two"),
        ],
    );
    router.transitions().on_retain(HookCriteria::new().retained("app"), recorder(&log, "retain"));

    router.go("app.one", RawParams::new(), None).await.unwrap();
    assert!(log.lock().unwrap().is_empty());

    router.go("app.two", RawParams::new(), None).await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["retain:app", "own-retain:app"]);
}

#[tokio::test]
async fn test_equal_priorities_run_in_registration_order() {
    let (router, _) = router();
    register_all(&router, vec![StateDeclaration::new("a").with_url("/a")]);
    let log: Log = Arc::default();

    let hooks = router.transitions();
    for (label, priority) in [("first", 0), ("second", 0), ("high", 5), ("third", 0)] {
        let log = log.clone();
        hooks.register_hook(
            HookEvent::Start,
            HookCriteria::new(),
            Injectable::new(&[], move |_| {
                log.lock().unwrap().push(label.to_string());
                Ok(HookResult::Continue)
            }),
            HookOptions {
                priority,
                invoke_limit: None,
            },
        );
    }

    router.go("a", RawParams::new(), None).await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["high", "first", "second", "third"]);
}

#[tokio::test]
async fn test_phases_run_in_order() {
    let (router, _) = router();
    register_all(&router, vec![StateDeclaration::new("a").with_url("/a")]);
    let log: Log = Arc::default();
    let hooks = router.transitions();
    hooks.on_success(HookCriteria::new(), recorder(&log, "success"));
    hooks.on_enter(HookCriteria::new(), recorder(&log, "enter"));
    hooks.on(HookCriteria::new(), recorder(&log, "on"));
    hooks.on_start(HookCriteria::new(), recorder(&log, "start"));
    hooks.on_before(HookCriteria::new(), recorder(&log, "before"));

    router.go("a", RawParams::new(), None).await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before:", "start:", "on:", "enter:a", "success:"]
    );
}

#[tokio::test]
async fn test_invalid_target_runs_invalid_hooks() {
    let (router, _) = router();
    register_all(&router, vec![StateDeclaration::new("fallback").with_url("/fallback")]);

    let rejection = router.go("nowhere", RawParams::new(), None).await.unwrap_err();
    assert_eq!(rejection.kind(), RejectType::Invalid);

    router.transitions().on_invalid(HookCriteria::new(), |args| {
        Ok(HookResult::Redirect(args.transition.registry().target("fallback", RawParams::new(), None)))
    });
    let state = router.go("nowhere", RawParams::new(), None).await.unwrap();
    assert_eq!(state.name(), "fallback");
}

#[tokio::test]
async fn test_abstract_and_bad_params_are_invalid() {
    let (router, _) = router();
    register_all(
        &router,
        vec![
            StateDeclaration::new("base").abstract_state(),
            StateDeclaration::new("base.user").with_url("/users/{id:int}"),
        ],
    );

    let abstract_target = router.go("base", RawParams::new(), None).await.unwrap_err();
    assert_eq!(abstract_target.kind(), RejectType::Invalid);

    let bad_params = router
        .go("base.user", bag(&[("id", json!("seven"))]), None)
        .await
        .unwrap_err();
    assert_eq!(bad_params.kind(), RejectType::Invalid);

    let ok = router.go("base.user", bag(&[("id", json!(7))]), None).await.unwrap();
    assert_eq!(ok.name(), "base.user");
}

#[tokio::test]
async fn test_hook_failures() {
    let (router, _) = router();
    register_all(
        &router,
        vec![
            StateDeclaration::new("sync").with_url("/sync"),
            StateDeclaration::new("async").with_url("/async"),
        ],
    );
    router
        .transitions()
        .on_start(HookCriteria::new().to("sync"), |_| Err(anyhow::anyhow!("refused")));
    router.transitions().on_start(HookCriteria::new().to("async"), |_| {
        Ok(HookResult::pending(async { Err(anyhow::anyhow!("backend down")) }))
    });

    let sync = router.go("sync", RawParams::new(), None).await.unwrap_err();
    assert_eq!(sync.kind(), RejectType::Aborted);
    assert!(sync.to_string().contains("refused"));

    let pending = router.go("async", RawParams::new(), None).await.unwrap_err();
    assert_eq!(pending.kind(), RejectType::Error);
    assert_eq!(pending.cause().unwrap().to_string(), "backend down");
}

#[tokio::test]
async fn test_failed_resolvable_errors_transition() {
    let (router, _) = router();
    register_all(
        &router,
        vec![StateDeclaration::new("broken")
            .with_url("/broken")
            .with_resolve(Resolvable::new("data", &[], |_| async { Err(anyhow::anyhow!("no data")) }))],
    );

    let rejection = router.go("broken", RawParams::new(), None).await.unwrap_err();
    assert_eq!(rejection.kind(), RejectType::Error);
    assert!(router.current().is_root());
}

#[tokio::test]
async fn test_error_and_success_hooks_are_isolated() {
    let (router, _) = router();
    register_all(&router, vec![StateDeclaration::new("a").with_url("/a")]);
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    router.transitions().on_success(HookCriteria::new(), |_| Err(anyhow::anyhow!("ignored failure")));
    router.transitions().on_error(HookCriteria::new(), move |args| {
        *captured.lock().unwrap() = args.error.map(|e| e.kind());
        Ok(HookResult::Continue)
    });

    assert_eq!(router.go("a", RawParams::new(), None).await.unwrap().name(), "a");
    assert!(seen.lock().unwrap().is_none());

    router.transitions().on_start(HookCriteria::new().to("a"), |_| Ok(HookResult::Abort));
    let _ = router.transition_to("a", RawParams::new(), TransitionOptions::default().with_reload(Reload::All)).await;
    assert_eq!(*seen.lock().unwrap(), Some(RejectType::Aborted));
}

#[tokio::test]
async fn test_newer_transition_supersedes_running_one() {
    let (router, _) = router();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (on_entered, on_release) = (entered.clone(), release.clone());
    register_all(
        &router,
        vec![
            StateDeclaration::new("slow").with_url("/slow").on_enter(&[], move |_| {
                on_entered.notify_one();
                let release = on_release.clone();
                Ok(HookResult::pending(async move {
                    release.notified().await;
                    Ok(HookResult::Continue)
                }))
            }),
            StateDeclaration::new("fast").with_url("/fast"),
        ],
    );

    let slow = router.go("slow", RawParams::new(), None);
    let fast = async {
        entered.notified().await;
        let outcome = router.go("fast", RawParams::new(), None).await;
        release.notify_one();
        outcome
    };
    let (slow, fast) = tokio::join!(slow, fast);

    let rejection = slow.unwrap_err();
    assert_eq!(rejection.kind(), RejectType::Superseded);
    assert!(!rejection.is_redirected());
    assert_eq!(fast.unwrap().name(), "fast");
    assert_eq!(router.current().name(), "fast");
    assert!(router.transition().is_none());
}

#[tokio::test]
async fn test_returning_to_current_state_cancels_pending_transition() {
    let (router, _) = router();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (on_entered, on_release) = (entered.clone(), release.clone());
    register_all(
        &router,
        vec![
            StateDeclaration::new("home").with_url("/home"),
            StateDeclaration::new("slow").with_url("/slow").on_enter(&[], move |_| {
                on_entered.notify_one();
                let release = on_release.clone();
                Ok(HookResult::pending(async move {
                    release.notified().await;
                    Ok(HookResult::Continue)
                }))
            }),
        ],
    );
    router.go("home", RawParams::new(), None).await.unwrap();

    let slow = router.go("slow", RawParams::new(), None);
    let back = async {
        entered.notified().await;
        let outcome = router.go("home", RawParams::new(), None).await;
        release.notify_one();
        outcome
    };
    let (slow, back) = tokio::join!(slow, back);

    assert_eq!(slow.unwrap_err().kind(), RejectType::Superseded);
    assert_eq!(back.unwrap_err().kind(), RejectType::Ignored);
    assert_eq!(router.current().name(), "home");
    assert!(router.transition().is_none());
}

#[tokio::test]
async fn test_resolvables_are_memoized_and_injected() {
    let (router, _) = router();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    register_all(
        &router,
        vec![
            StateDeclaration::new("a").with_url("/a").with_resolve(Resolvable::new("data", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!("payload")) }
            })),
            StateDeclaration::new("a.b").with_url("/b").with_resolve(Resolvable::new(
                "derived",
                &["data"],
                |args| {
                    let data = args.get("data").cloned().unwrap_or_default();
                    async move { Ok(json!({ "from": data })) }
                },
            )),
        ],
    );

    let injected = Arc::new(Mutex::new(None));
    let captured = injected.clone();
    router.transitions().register_hook(
        HookEvent::Enter,
        HookCriteria::new().entering("a.b"),
        Injectable::new(&["derived"], move |args| {
            *captured.lock().unwrap() = args.get("derived").cloned();
            Ok(HookResult::Continue)
        }),
        HookOptions::default(),
    );

    router.go("a.b", RawParams::new(), None).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*injected.lock().unwrap(), Some(json!({ "from": "payload" })));

    let last = router.globals().transition.unwrap();
    assert_eq!(last.resolve("data").await.unwrap(), json!("payload"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    router.go("a.b", RawParams::new(), None).await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hook_added_resolvables() {
    let (router, _) = router();
    register_all(&router, vec![StateDeclaration::new("a").with_url("/a")]);
    router.transitions().on_start(HookCriteria::new(), |_| {
        Ok(HookResult::Resolves(vec![Resolvable::value("session", json!("token"))]))
    });
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    router.transitions().register_hook(
        HookEvent::Enter,
        HookCriteria::new(),
        Injectable::new(&["session"], move |args| {
            *captured.lock().unwrap() = args.get("session").cloned();
            Ok(HookResult::Continue)
        }),
        HookOptions::default(),
    );

    router.go("a", RawParams::new(), None).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(json!("token")));
}

#[tokio::test]
async fn test_invoke_limit_deregisters_hook() {
    let (router, _) = router();
    register_all(
        &router,
        vec![
            StateDeclaration::new("a").with_url("/a"),
            StateDeclaration::new("b").with_url("/b"),
        ],
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    router.transitions().register_hook(
        HookEvent::Start,
        HookCriteria::new(),
        Injectable::new(&[], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HookResult::Continue)
        }),
        HookOptions {
            priority: 0,
            invoke_limit: Some(1),
        },
    );

    router.go("a", RawParams::new(), None).await.unwrap();
    router.go("b", RawParams::new(), None).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
