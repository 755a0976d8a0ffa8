//! Basic device state machine example

use moore_fsm::prelude::*;
use std::sync::Arc;

#[derive(Debug)]
struct DeviceContext {
    power_level: u8,
}

fn build_device(events: Arc<EventEmitter<()>>) -> Fsm<DeviceContext, ()> {
    let off_events = Arc::clone(&events);
    let standby_events = Arc::clone(&events);

    FsmBuilder::new(DeviceContext { power_level: 0 })
        .state(
            "off",
            Arc::new(move |handle: &Arc<StateHandle<DeviceContext, ()>>| {
                handle.fsm().with_context(|ctx| ctx.power_level = 0);
                println!("device powered off (power: {}%)", 0);

                let h = Arc::clone(handle);
                handle.on(
                    off_events.clone(),
                    "power_on",
                    Arc::new(move |_: &()| {
                        println!("powering on device...");
                        let _ = h.goto_state("standby");
                    }),
                );
            }),
        )
        .state(
            "standby",
            Arc::new(move |handle: &Arc<StateHandle<DeviceContext, ()>>| {
                handle.fsm().with_context(|ctx| ctx.power_level = 25);
                println!("standby (power: 25%)");

                let h = Arc::clone(handle);
                handle.on(
                    standby_events.clone(),
                    "power_off",
                    Arc::new(move |_: &()| {
                        let _ = h.goto_state("off");
                    }),
                );
            }),
        )
        .build("off")
        .expect("device states are well-formed")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("Device State Machine Example\n");

    let events: Arc<EventEmitter<()>> = Arc::new(EventEmitter::new());
    let device = build_device(Arc::clone(&events));

    assert_eq!(device.get_state().as_deref(), Some("off"));
    events.emit("power_on", &());
    assert_eq!(device.get_state().as_deref(), Some("standby"));
    events.emit("power_off", &());
    assert_eq!(device.get_state().as_deref(), Some("off"));

    println!("\nfinal state: {:?}", device.get_state());
    Ok(())
}
