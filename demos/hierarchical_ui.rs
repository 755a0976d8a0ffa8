//! Hierarchical UI state machine example
//!
//! `settings.display` and `settings.audio` are sub-states of `settings`;
//! moving between them never crosses the `settings` root boundary, so a
//! listener registered once by `settings` itself stays alive across both.

use moore_fsm::prelude::*;
use std::sync::Arc;

#[derive(Debug)]
struct UiContext {
    menu_index: usize,
    brightness: u8,
    volume: u8,
}

#[derive(Debug, Clone)]
enum UiEvent {
    Enter,
    Back,
    Down,
    Select,
    Home,
    Tune(i8),
}

fn build_ui(events: Arc<EventEmitter<UiEvent>>) -> Fsm<UiContext, UiEvent> {
    let root_events = Arc::clone(&events);
    let menu_events = Arc::clone(&events);
    let settings_events = Arc::clone(&events);
    let display_events = Arc::clone(&events);
    let audio_events = Arc::clone(&events);

    FsmBuilder::new(UiContext {
        menu_index: 0,
        brightness: 50,
        volume: 30,
    })
    .state(
        "root",
        Arc::new(move |handle: &Arc<StateHandle<UiContext, UiEvent>>| {
            println!("welcome to the main screen");
            let h = Arc::clone(handle);
            handle.on(
                root_events.clone(),
                "nav",
                Arc::new(move |ev: &UiEvent| {
                    if let UiEvent::Enter = ev {
                        let _ = h.goto_state("menu");
                    }
                }),
            );
        }),
    )
    .state(
        "menu",
        Arc::new(move |handle: &Arc<StateHandle<UiContext, UiEvent>>| {
            handle.fsm().with_context(|ctx| ctx.menu_index = 0);
            println!("main menu opened");

            let h1 = Arc::clone(handle);
            let h2 = Arc::clone(handle);
            handle.on(
                menu_events.clone(),
                "nav",
                Arc::new(move |ev: &UiEvent| match ev {
                    UiEvent::Back => {
                        let _ = h1.goto_state("root");
                    }
                    UiEvent::Select => {
                        let _ = h2.goto_state("settings");
                    }
                    _ => {}
                }),
            );
        }),
    )
    .state(
        "settings",
        Arc::new(move |handle: &Arc<StateHandle<UiContext, UiEvent>>| {
            println!("settings opened");
            let h = Arc::clone(handle);
            handle.on(
                settings_events.clone(),
                "nav",
                Arc::new(move |ev: &UiEvent| {
                    if let UiEvent::Home = ev {
                        let _ = h.goto_state("root");
                    }
                }),
            );
            // Re-enter immediately into the default sub-state. This is a
            // synchronous, in-entry-function `gotoState`, queued and
            // drained by the same outer transition loop rather than
            // recursing.
            let _ = handle.goto_state("settings.display");
        }),
    )
    .sub_state(
        "settings",
        "display",
        Arc::new(move |handle: &Arc<StateHandle<UiContext, UiEvent>>| {
            println!("display settings");
            let h = Arc::clone(handle);
            handle.on(
                display_events.clone(),
                "tune",
                Arc::new(move |ev: &UiEvent| {
                    if let UiEvent::Tune(delta) = ev {
                        h.fsm().with_context(|ctx| {
                            ctx.brightness = ctx.brightness.saturating_add_signed(*delta);
                        });
                    }
                }),
            );
            let h2 = Arc::clone(handle);
            handle.on(
                display_events.clone(),
                "nav",
                Arc::new(move |ev: &UiEvent| {
                    if let UiEvent::Down = ev {
                        let _ = h2.goto_state("settings.audio");
                    }
                }),
            );
        }),
    )
    .sub_state(
        "settings",
        "audio",
        Arc::new(move |handle: &Arc<StateHandle<UiContext, UiEvent>>| {
            println!("audio settings");
            let h = Arc::clone(handle);
            handle.on(
                audio_events.clone(),
                "tune",
                Arc::new(move |ev: &UiEvent| {
                    if let UiEvent::Tune(delta) = ev {
                        h.fsm().with_context(|ctx| {
                            ctx.volume = ctx.volume.saturating_add_signed(*delta);
                        });
                    }
                }),
            );
        }),
    )
    .build("root")
    .expect("ui states are well-formed")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("Hierarchical UI State Machine Example\n");

    let events: Arc<EventEmitter<UiEvent>> = Arc::new(EventEmitter::new());
    let ui = build_ui(Arc::clone(&events));

    events.emit("nav", &UiEvent::Enter);
    println!("current: {:?}", ui.get_state());

    events.emit("nav", &UiEvent::Select);
    println!("current: {:?}", ui.get_state());

    // settings.display -> settings.audio stays within the settings root.
    events.emit("nav", &UiEvent::Down);
    println!("current: {:?}", ui.get_state());

    events.emit("tune", &UiEvent::Tune(5));
    println!("volume: {}", ui.with_context(|c| c.volume));

    // settings.audio's listener for Home was never registered directly,
    // but settings itself still owns one, inherited across the sub-state
    // boundary.
    events.emit("nav", &UiEvent::Home);
    println!("current: {:?}", ui.get_state());

    Ok(())
}
