//! Multi-session runs sharing one transition lock and event log.

use magpie_core::{Outcome, Parser, StopReason};
use magpie_runtime::{
    run_sessions, Actor, HookError, HookTable, RunOptions, Session, SessionContext, Shared,
    Strategy, Timing, EVENT_LOG_FILE,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Page {
    cart: u32,
}

impl SessionContext for Page {}

const WEBSHOP: &str = "\
# Shopping loop
Start  =>  Browse
Browse  'add item'  =>  Cart
Cart  'add item'  ->  Cart
Cart  [cart is full]  'checkout'  =>  Paid
Cart  'remove item'  ->  Browse
Paid  'continue shopping'  ->  Browse
";

fn fast_shared() -> Arc<Shared> {
    Shared::with_timing(Timing {
        selection_retry: Duration::from_millis(2),
        pause_poll: Duration::from_millis(2),
        event_poll: Duration::from_millis(2),
    })
}

fn webshop() -> Actor<Page> {
    let hooks = HookTable::<Page>::new()
        .with_action("add item", |ctx| {
            ctx.handle.cart += 1;
            Ok(())
        })
        .with_action("remove item", |ctx| {
            ctx.handle.cart = ctx.handle.cart.saturating_sub(1);
            Ok(())
        })
        .with_action("checkout", |ctx| {
            if ctx.handle.cart > 4 {
                return Err(HookError::new("payment declined"));
            }
            ctx.handle.cart = 0;
            Ok(())
        })
        .with_action("continue shopping", |_| Ok(()))
        .with_condition("cart is full", |ctx| Ok(ctx.handle.cart >= 2))
        .with_state("Paid", |ctx| {
            ctx.events()
                .append("PAYMENT_RECEIVED", json!({ "by": ctx.actor }));
            Ok(())
        });
    let model = Parser::new().parse_str(WEBSHOP, "webshop.model").unwrap();
    Actor::new("webshop", model, hooks)
}

fn sessions(actor: &Actor<Page>, shared: &Arc<Shared>) -> Vec<Session<Page>> {
    (0..4u64)
        .map(|i| {
            Session::new(
                format!("buyer{}", i),
                actor,
                Page::default(),
                RunOptions::new(Strategy::SmartRandom).with_max_transitions(40),
                shared.clone(),
            )
            .unwrap()
            .with_seed(1000 + i)
        })
        .collect()
}

#[test]
fn test_concurrent_sessions_match_sequential_runs() {
    let actor = webshop();

    let sequential_shared = fast_shared();
    let mut sequential = sessions(&actor, &sequential_shared);
    for session in &mut sequential {
        assert_eq!(session.run(), Some(StopReason::MaxTransitions));
    }

    let concurrent_shared = fast_shared();
    let concurrent = run_sessions(
        sessions(&actor, &concurrent_shared),
        &concurrent_shared,
        None,
    )
    .unwrap();

    assert_eq!(concurrent.len(), sequential.len());
    for (a, b) in sequential.iter().zip(&concurrent) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.audit_trail(), b.audit_trail(), "session {}", a.name());
        assert_eq!(a.summary().results, b.summary().results, "session {}", a.name());
        assert_eq!(a.stop_reason(), b.stop_reason());
    }
    assert_eq!(
        sequential_shared.events.len(),
        concurrent_shared.events.len()
    );
}

#[test]
fn test_sessions_coordinate_through_events() {
    let producer_hooks = HookTable::<Page>::new().with_action("place order", |ctx| {
        std::thread::sleep(Duration::from_millis(20));
        ctx.events().append("ORDER_PLACED", json!({ "id": 7 }));
        Ok(())
    });
    let consumer_hooks = HookTable::<Page>::new()
        .with_condition("order placed", |ctx| {
            Ok(!ctx.events().matching("order_.*").unwrap().is_empty())
        })
        .with_action("ship", |ctx| {
            let orders = ctx.events().matching("ORDER_PLACED").unwrap();
            assert_eq!(orders[0].payload["id"], 7);
            Ok(())
        });

    let parser = Parser::new();
    let producer = Actor::new(
        "producer",
        parser.parse_str("Cart  'place order'  =>  Ordered\n", "producer.model").unwrap(),
        producer_hooks,
    );
    let consumer = Actor::new(
        "consumer",
        parser
            .parse_str("Idle  [order placed]  'ship'  =>  Shipped\n", "consumer.model")
            .unwrap(),
        consumer_hooks,
    );

    let shared = fast_shared();
    let options = RunOptions::default().with_max_run_time(Duration::from_secs(10));
    let all = vec![
        Session::new("consumer", &consumer, Page::default(), options.clone(), shared.clone())
            .unwrap(),
        Session::new("producer", &producer, Page::default(), options, shared.clone()).unwrap(),
    ];

    let done = run_sessions(all, &shared, None).unwrap();

    for session in &done {
        assert_eq!(session.stop_reason(), Some(StopReason::TerminalState));
        assert!(!session.has_failures(), "session {}", session.name());
    }
    assert_eq!(done[0].audit_trail().state_history(), vec!["Idle", "Shipped"]);
}

#[test]
fn test_cancelling_one_session_leaves_others_running() {
    let parser = Parser::new();
    let looping = Actor::new(
        "looper",
        parser.parse_str("Spin  ->  Spin\n", "looper.model").unwrap(),
        HookTable::<Page>::new().with_state("Spin", |_| {
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        }),
    );
    let linear = Actor::new(
        "linear",
        parser.parse_str("A  =>  B\nB  =>  C\n", "linear.model").unwrap(),
        HookTable::new(),
    );

    let shared = fast_shared();
    let looper = Session::new("looper", &looping, Page::default(), RunOptions::default(), shared.clone())
        .unwrap();
    let cancel = looper.cancel_handle();
    let other = Session::new("linear", &linear, Page::default(), RunOptions::default(), shared.clone())
        .unwrap();

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let done = run_sessions(vec![looper, other], &shared, None).unwrap();
    canceller.join().unwrap();

    assert_eq!(done[0].stop_reason(), Some(StopReason::Cancelled));
    assert!(!done[0].has_failures());
    assert_eq!(done[1].stop_reason(), Some(StopReason::TerminalState));
    assert_eq!(done[1].audit_trail().state_history(), vec!["A", "B", "C"]);
}

#[test]
fn test_pause_from_one_session_holds_the_other() {
    let parser = Parser::new();
    let pauser = Actor::new(
        "pauser",
        parser.parse_str("Start  'pause everyone'  =>  Waiting\n", "pauser.model").unwrap(),
        HookTable::<Page>::new().with_action("pause everyone", |ctx| {
            ctx.pause_all();
            Ok(())
        }),
    );
    let worker = Actor::new(
        "worker",
        parser.parse_str("Idle  [paused]  'work'  =>  Busy\n", "worker.model").unwrap(),
        HookTable::<Page>::new()
            .with_condition("paused", |ctx| Ok(ctx.shared.pause.is_paused()))
            .with_action("work", |_| Ok(()))
            .with_state("Busy", |ctx| {
                ctx.handle.cart += 1;
                Ok(())
            }),
    );

    let shared = fast_shared();
    let resumer = shared.clone();
    let resume = std::thread::spawn(move || {
        while !resumer.pause.is_paused() {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(40));
        resumer.pause.resume();
    });

    let all = vec![
        Session::new("pauser", &pauser, Page::default(), RunOptions::default(), shared.clone())
            .unwrap(),
        Session::new("worker", &worker, Page::default(), RunOptions::default(), shared.clone())
            .unwrap(),
    ];
    let done = run_sessions(all, &shared, None).unwrap();
    resume.join().unwrap();

    let worker = &done[1];
    assert_eq!(worker.handle().cart, 1);
    assert!(worker.summary().duration >= Duration::from_millis(40));
    assert_eq!(
        worker.summary().results.states["Busy"].outcomes(),
        &[Outcome::Passed]
    );
}

#[test]
fn test_output_directory_artifacts() {
    let dir = tempfile::TempDir::new().unwrap();
    let actor = webshop();
    let shared = fast_shared();
    let all: Vec<Session<Page>> = sessions(&actor, &shared)
        .into_iter()
        .take(2)
        .map(|s| s.with_output_dir(dir.path()).unwrap())
        .collect();

    let done = run_sessions(all, &shared, Some(dir.path())).unwrap();

    for session in &done {
        let log = std::fs::read_to_string(session.transition_log_path(dir.path())).unwrap();
        assert!(log.starts_with("Timestamp,Type,Name,Result\n"));
        assert!(log.contains("\"outbound\""));
    }
    let events = std::fs::read_to_string(dir.path().join(EVENT_LOG_FILE)).unwrap();
    assert_eq!(events.lines().next(), Some("Timestamp,Name,Data"));
    assert_eq!(events.lines().count(), 1 + shared.events.len());
}
