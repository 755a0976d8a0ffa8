use moore_fsm::{
    EventEmitter, EventSource, Fsm, FsmBuilder, FsmError, StateHandle,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum DeviceEvent {
    Tick,
}

#[derive(Debug)]
struct DeviceContext {
    power_level: u8,
    error_count: u32,
}

fn device_fsm(events: Arc<EventEmitter<DeviceEvent>>) -> Fsm<DeviceContext, DeviceEvent> {
    let off_events = Arc::clone(&events);
    let standby_events = Arc::clone(&events);
    let active_events = Arc::clone(&events);
    let error_events = Arc::clone(&events);

    FsmBuilder::new(DeviceContext {
        power_level: 0,
        error_count: 0,
    })
    .state(
        "off",
        Arc::new(move |handle: &Arc<StateHandle<DeviceContext, DeviceEvent>>| {
            handle.fsm().with_context(|ctx| ctx.power_level = 0);
            let h = Arc::clone(handle);
            handle.on(
                off_events.clone(),
                "power_on",
                Arc::new(move |_| {
                    let _ = h.goto_state("standby");
                }),
            );
        }),
    )
    .state(
        "standby",
        Arc::new(move |handle: &Arc<StateHandle<DeviceContext, DeviceEvent>>| {
            handle.fsm().with_context(|ctx| ctx.power_level = 25);
            handle.timeout(Duration::from_secs(60), || {});

            let h1 = Arc::clone(handle);
            handle.on(
                standby_events.clone(),
                "power_off",
                Arc::new(move |_| {
                    let _ = h1.goto_state("off");
                }),
            );
            let h2 = Arc::clone(handle);
            handle.on(
                standby_events.clone(),
                "activate",
                Arc::new(move |_| {
                    let _ = h2.goto_state("active");
                }),
            );
            let h3 = Arc::clone(handle);
            handle.on(
                standby_events.clone(),
                "error",
                Arc::new(move |_| {
                    let _ = h3.goto_state("error");
                }),
            );
        }),
    )
    .state(
        "active",
        Arc::new(move |handle: &Arc<StateHandle<DeviceContext, DeviceEvent>>| {
            handle.fsm().with_context(|ctx| ctx.power_level = 100);

            let h1 = Arc::clone(handle);
            handle.on(
                active_events.clone(),
                "power_off",
                Arc::new(move |_| {
                    let _ = h1.goto_state("off");
                }),
            );
            let h2 = Arc::clone(handle);
            handle.on(
                active_events.clone(),
                "deactivate",
                Arc::new(move |_| {
                    let _ = h2.goto_state("standby");
                }),
            );
            let h3 = Arc::clone(handle);
            handle.on(
                active_events.clone(),
                "error",
                Arc::new(move |_| {
                    let _ = h3.goto_state("error");
                }),
            );
        }),
    )
    .state(
        "error",
        Arc::new(move |handle: &Arc<StateHandle<DeviceContext, DeviceEvent>>| {
            let error_count = handle
                .fsm()
                .with_context(|ctx| {
                    ctx.error_count += 1;
                    ctx.power_level = 10;
                    ctx.error_count
                });

            let h = Arc::clone(handle);
            handle.on(
                error_events.clone(),
                "reset",
                Arc::new(move |_| {
                    let target = if error_count < 5 { "standby" } else { "off" };
                    let _ = h.goto_state(target);
                }),
            );
        }),
    )
    .build("off")
    .unwrap()
}

#[tokio::test]
async fn device_lifecycle() {
    let events: Arc<EventEmitter<DeviceEvent>> = Arc::new(EventEmitter::new());
    let fsm = device_fsm(Arc::clone(&events));

    assert_eq!(fsm.get_state().as_deref(), Some("off"));
    assert_eq!(fsm.with_context(|c| c.power_level), 0);

    events.emit("power_on", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("standby"));
    assert_eq!(fsm.with_context(|c| c.power_level), 25);

    events.emit("activate", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("active"));
    assert_eq!(fsm.with_context(|c| c.power_level), 100);

    events.emit("error", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("error"));
    assert_eq!(fsm.with_context(|c| c.error_count), 1);
    assert_eq!(fsm.with_context(|c| c.power_level), 10);

    events.emit("reset", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("standby"));
    assert_eq!(fsm.with_context(|c| c.power_level), 25);

    events.emit("power_off", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("off"));
    assert_eq!(fsm.with_context(|c| c.power_level), 0);
}

#[tokio::test]
async fn error_recovery_limit() {
    let events: Arc<EventEmitter<DeviceEvent>> = Arc::new(EventEmitter::new());
    let fsm = device_fsm(Arc::clone(&events));
    events.emit("power_on", &DeviceEvent::Tick);

    for i in 1..=5u32 {
        events.emit("error", &DeviceEvent::Tick);
        assert_eq!(fsm.get_state().as_deref(), Some("error"));
        assert_eq!(fsm.with_context(|c| c.error_count), i);

        if i < 5 {
            events.emit("reset", &DeviceEvent::Tick);
            assert_eq!(fsm.get_state().as_deref(), Some("standby"));
        }
    }

    events.emit("reset", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("off"));
}

#[tokio::test]
async fn events_ignored_after_leaving_state() {
    let events: Arc<EventEmitter<DeviceEvent>> = Arc::new(EventEmitter::new());
    let fsm = device_fsm(Arc::clone(&events));

    // Off only listens for power_on; other events are simply unregistered.
    assert_eq!(events.listener_count("activate"), 0);
    events.emit("activate", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("off"));

    events.emit("power_on", &DeviceEvent::Tick);
    assert_eq!(fsm.get_state().as_deref(), Some("standby"));

    // standby's "power_on" listener doesn't exist, and off's listeners were
    // torn down crossing the root boundary.
    assert_eq!(events.listener_count("power_on"), 0);
}

#[tokio::test]
async fn sub_state_listener_inheritance_across_siblings() {
    let seen: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let external: Arc<EventEmitter<()>> = Arc::new(EventEmitter::new());
    let ext_for_initial = Arc::clone(&external);

    let initial_entry = {
        let seen = Arc::clone(&seen);
        Arc::new(move |handle: &Arc<StateHandle<(), ()>>| {
            let seen = Arc::clone(&seen);
            handle.on(
                ext_for_initial.clone(),
                "foo",
                Arc::new(move |_: &()| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            );
        })
    };

    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state("initial", initial_entry)
        .sub_state("initial", "sub1", Arc::new(|_h| {}))
        .sub_state("initial", "sub2", Arc::new(|_h| {}))
        .state("next", Arc::new(|_h| {}))
        .build("initial")
        .unwrap();

    external.emit("foo", &());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(external.listener_count("foo"), 1);

    fsm.goto_state("initial.sub1").unwrap();
    fsm.goto_state("initial.sub2").unwrap();
    fsm.goto_state("initial.sub1").unwrap();
    fsm.goto_state("initial.sub2").unwrap();
    fsm.goto_state("initial.sub1").unwrap();

    // Sub-state transitions never crossed the "initial" root boundary, so
    // the listener registered by the root entry is still alive.
    external.emit("foo", &());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(external.listener_count("foo"), 1);

    fsm.goto_state("next").unwrap();
    assert_eq!(external.listener_count("foo"), 0);
    external.emit("foo", &());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn malformed_state_name_is_rejected() {
    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state("initial", Arc::new(|_h| {}))
        .build("initial")
        .unwrap();

    let err = fsm.goto_state("a.b.c").unwrap_err();
    assert!(matches!(err, FsmError::MalformedState(_)));
}

#[tokio::test]
async fn valid_transitions_restrict_targets() {
    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state(
            "initial",
            Arc::new(|h: &Arc<StateHandle<(), ()>>| {
                h.valid_transitions(["allowed"]);
            }),
        )
        .state("allowed", Arc::new(|_h| {}))
        .state("forbidden", Arc::new(|_h| {}))
        .build("initial")
        .unwrap();

    let err = fsm.goto_state("forbidden").unwrap_err();
    assert!(matches!(err, FsmError::InvalidTransition { .. }));
    assert_eq!(fsm.get_state().as_deref(), Some("initial"));

    fsm.goto_state("allowed").unwrap();
    assert_eq!(fsm.get_state().as_deref(), Some("allowed"));
}

#[tokio::test]
async fn timer_is_cancelled_by_an_earlier_transition() {
    let fired = Arc::new(AtomicU32::new(0));
    let fired_for_entry = Arc::clone(&fired);

    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state(
            "initial",
            Arc::new(move |h: &Arc<StateHandle<(), ()>>| {
                let fired = Arc::clone(&fired_for_entry);
                h.timeout(Duration::from_millis(50), move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                });
            }),
        )
        .state("next", Arc::new(|_h| {}))
        .build("initial")
        .unwrap();

    fsm.goto_state("next").unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

fn register_heartbeat(h: &Arc<StateHandle<(), ()>>) {
    let fsm_source: Arc<dyn EventSource<()>> = Arc::new(h.fsm().clone());
    h.on(fsm_source, "heartbeat", Arc::new(|_: &()| {}));
}

#[tokio::test]
async fn all_state_event_requires_re_registration_per_state() {
    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .all_state_event("heartbeat")
        .state(
            "initial",
            Arc::new(|h: &Arc<StateHandle<(), ()>>| register_heartbeat(h)),
        )
        .state(
            "diligent",
            Arc::new(|h: &Arc<StateHandle<(), ()>>| register_heartbeat(h)),
        )
        .state("forgetful", Arc::new(|_h| {}))
        .build("initial")
        .unwrap();

    // "diligent" re-registers its own heartbeat listener on entry, even
    // though crossing the root boundary tore down "initial"'s.
    fsm.goto_state("diligent").unwrap();
    assert_eq!(fsm.get_state().as_deref(), Some("diligent"));

    // "forgetful" never registers one of its own; the torn-down
    // predecessor's listener can't satisfy the requirement for it.
    let err = fsm.goto_state("forgetful").unwrap_err();
    assert!(matches!(err, FsmError::AllStateEventMissing { .. }));
}

#[tokio::test]
async fn immediate_trigger_tears_down_the_racing_external_listener() {
    let external: Arc<EventEmitter<()>> = Arc::new(EventEmitter::new());
    let ext_for_entry = Arc::clone(&external);

    let entry = Arc::new(move |handle: &Arc<StateHandle<(), ()>>| {
        let h = Arc::clone(handle);
        handle.on(
            ext_for_entry.clone(),
            "foo",
            Arc::new(move |_: &()| {
                let _ = h.goto_state("next");
            }),
        );
        let h2 = Arc::clone(handle);
        handle.immediate(move || {
            let _ = h2.goto_state("next");
        });
    });

    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state("initial", entry)
        .state("next", Arc::new(|_h| {}))
        .build("initial")
        .unwrap();

    // Before the immediate fires, the external listener installed on entry
    // is still registered.
    assert_eq!(external.listener_count("foo"), 1);

    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(fsm.get_state().as_deref(), Some("next"));
    assert_eq!(external.listener_count("foo"), 0);
}

#[tokio::test]
async fn on_state_changed_is_scoped_and_torn_down_with_the_observer() {
    let upstream: Fsm<(), ()> = FsmBuilder::new(())
        .state("a", Arc::new(|_h| {}))
        .state("b", Arc::new(|_h| {}))
        .state("c", Arc::new(|_h| {}))
        .build("a")
        .unwrap();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_for_entry = Arc::clone(&seen);
    let upstream_for_entry = upstream.clone();

    let downstream: Fsm<(), ()> = FsmBuilder::new(())
        .state(
            "watching",
            Arc::new(move |h: &Arc<StateHandle<(), ()>>| {
                let seen = Arc::clone(&seen_for_entry);
                h.on_state_changed(&upstream_for_entry, move |s| {
                    seen.lock().unwrap().push(s.to_string());
                });
            }),
        )
        .state("elsewhere", Arc::new(|_h| {}))
        .build("watching")
        .unwrap();

    upstream.goto_state("b").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["b".to_string()]);

    // Crossing "watching"'s root boundary tears down the subscription, even
    // though it was registered on a completely different FSM's channel.
    downstream.goto_state("elsewhere").unwrap();

    upstream.goto_state("c").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*seen.lock().unwrap(), vec!["b".to_string()]);
}

#[tokio::test]
async fn callback_is_a_no_op_after_the_owning_handle_is_torn_down() {
    let captured: Arc<Mutex<Option<Box<dyn Fn(i32) -> Option<i32> + Send + Sync>>>> =
        Arc::new(Mutex::new(None));
    let captured_for_entry = Arc::clone(&captured);
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_for_entry = Arc::clone(&invocations);

    let entry = Arc::new(move |h: &Arc<StateHandle<(), ()>>| {
        let invocations = Arc::clone(&invocations_for_entry);
        let wrapped = h.callback(move |n: i32| {
            invocations.fetch_add(1, Ordering::SeqCst);
            n * 2
        });
        *captured_for_entry.lock().unwrap() = Some(Box::new(wrapped));
    });

    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state("initial", entry)
        .state("next", Arc::new(|_h| {}))
        .build("initial")
        .unwrap();

    let wrapped = captured.lock().unwrap().take().unwrap();
    assert_eq!(wrapped(21), Some(42));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    fsm.goto_state("next").unwrap();

    // The handle that produced `wrapped` was invalidated by the transition
    // above; the closure becomes a silent no-op rather than forwarding.
    assert_eq!(wrapped(21), None);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn interval_fires_repeatedly_until_torn_down() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticks_for_entry = Arc::clone(&ticks);

    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state(
            "ticking",
            Arc::new(move |h: &Arc<StateHandle<(), ()>>| {
                let ticks = Arc::clone(&ticks_for_entry);
                h.interval(Duration::from_millis(15), move || {
                    ticks.fetch_add(1, Ordering::SeqCst);
                });
            }),
        )
        .state("quiet", Arc::new(|_h| {}))
        .build("ticking")
        .unwrap();

    tokio::time::sleep(Duration::from_millis(55)).await;
    let before = ticks.load(Ordering::SeqCst);
    assert!(before >= 2, "expected at least two ticks, saw {before}");

    fsm.goto_state("quiet").unwrap();
    tokio::time::sleep(Duration::from_millis(55)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn once_listener_self_removes_after_firing() {
    let emitter: Arc<EventEmitter<()>> = Arc::new(EventEmitter::new());
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_for_cb = Arc::clone(&fired);

    emitter.once(
        "tick",
        Arc::new(move |_: &()| {
            fired_for_cb.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(emitter.listener_count("tick"), 1);

    emitter.emit("tick", &());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(emitter.listener_count("tick"), 0);

    // Already self-removed; a second emission reaches no listeners.
    emitter.emit("tick", &());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn state_changed_emission_is_deferred_and_batched() {
    let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let observed2 = Arc::clone(&observed);

    let fsm: Fsm<(), ()> = FsmBuilder::new(())
        .state("a", Arc::new(|_h| {}))
        .state("b", Arc::new(|_h| {}))
        .state("c", Arc::new(|_h| {}))
        .build("a")
        .unwrap();

    fsm.on_transition(move |name| {
        observed2.lock().unwrap().push(name.to_string());
    });

    fsm.goto_state("b").unwrap();
    fsm.goto_state("c").unwrap();

    // Nothing has been flushed synchronously: observers never see
    // intermediate states mid-burst.
    assert_eq!(observed.lock().unwrap().len(), 0);

    tokio::time::sleep(Duration::from_millis(10)).await;

    let batch = observed.lock().unwrap().clone();
    assert_eq!(batch, vec!["b".to_string(), "c".to_string()]);
}
