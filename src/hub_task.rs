//! Hub task — the single consumer of radio and broker events.
//!
//! Runs on one thread using `edge-executor` for cooperative scheduling
//! and `async-io-mini` timers.  Four futures share the
//! [`HubService`] through `Rc<RefCell<_>>`; none holds the borrow across
//! an `.await`, so every handler runs to completion before the next.
//! Nothing here blocks on network I/O: Wi-Fi reconnection lives on its
//! own thread.
//!
//! 1. **Radio** — wakes on `RADIO_RX.receive()`
//! 2. **Broker** — wakes on `BROKER_RX.receive()`
//! 3. **Link** — wakes on `BROKER_LINK.wait()`
//! 4. **Housekeeping** — every `poll_interval_ms`: subscribe timer,
//!    button sampling
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────┐
//!  │  Hub thread                                          │
//!  │  ┌────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                  │  │
//!  │  │  ┌───────┐ ┌────────┐ ┌──────┐ ┌────────────┐  │  │
//!  │  │  │ Radio │ │ Broker │ │ Link │ │Housekeeping│  │  │
//!  │  │  │ frame │ │ data   │ │ state│ │ 20ms ⏱     │  │  │
//!  │  │  └───────┘ └────────┘ └──────┘ └────────────┘  │  │
//!  │  └────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────┘
//! ```

use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;

use embedded_hal::digital::InputPin;
use log::{error, info};

use crate::adapters::device;
use crate::app::ports::{BrokerPort, ClockPort, EventSink, RadioPort, StoragePort};
use crate::app::service::HubService;
use crate::drivers::button::{ButtonDriver, ButtonEvent};
use crate::events::{BROKER_LINK, BROKER_RX, RADIO_RX};

type Shared<T> = Rc<RefCell<T>>;

/// Local peripherals serviced by the housekeeping loop.
pub struct Housekeeping<P> {
    pub button: Option<ButtonDriver<P>>,
    pub poll_interval_ms: u32,
}

/// What the caller must do after a button gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    None,
    Restart,
}

/// Apply a button gesture to the service.  A very long press erases the
/// bridge's persisted state (certificates stay) and asks for a restart.
pub fn on_button<S, R, B, C>(
    hub: &mut HubService<S, R, B, C>,
    event: ButtonEvent,
    sink: &mut impl EventSink,
) -> ButtonAction
where
    S: StoragePort,
    R: RadioPort,
    B: BrokerPort,
    C: ClockPort,
{
    match event {
        ButtonEvent::VeryLongPress => match hub.factory_reset(sink) {
            Ok(()) => ButtonAction::Restart,
            Err(e) => {
                error!("Hub: factory reset failed: {}", e);
                ButtonAction::None
            }
        },
        ButtonEvent::ShortPress | ButtonEvent::LongPress => {
            let stats = hub.stats();
            info!(
                "Hub: link={:?} buffered={} peers={} stats={:?}",
                hub.link_state(),
                hub.buffer().len(),
                hub.peers().len(),
                stats
            );
            ButtonAction::None
        }
    }
}

async fn radio_loop<S, R, B, C, E>(hub: Shared<HubService<S, R, B, C>>, sink: Shared<E>)
where
    S: StoragePort,
    R: RadioPort,
    B: BrokerPort,
    C: ClockPort,
    E: EventSink,
{
    loop {
        let frame = RADIO_RX.receive().await;
        hub.borrow_mut()
            .on_radio_frame(frame.src, &frame.payload, &mut *sink.borrow_mut());
    }
}

async fn broker_loop<S, R, B, C, E>(hub: Shared<HubService<S, R, B, C>>, sink: Shared<E>)
where
    S: StoragePort,
    R: RadioPort,
    B: BrokerPort,
    C: ClockPort,
    E: EventSink,
{
    loop {
        let event = BROKER_RX.receive().await;
        hub.borrow_mut().on_broker_event(event, &mut *sink.borrow_mut());
    }
}

async fn link_loop<S, R, B, C, E>(hub: Shared<HubService<S, R, B, C>>, sink: Shared<E>)
where
    S: StoragePort,
    R: RadioPort,
    B: BrokerPort,
    C: ClockPort,
    E: EventSink,
{
    loop {
        let event = BROKER_LINK.wait().await;
        hub.borrow_mut().on_broker_event(event, &mut *sink.borrow_mut());
    }
}

async fn housekeeping_loop<S, R, B, C, E, P>(
    hub: Shared<HubService<S, R, B, C>>,
    sink: Shared<E>,
    mut local: Housekeeping<P>,
) where
    S: StoragePort,
    R: RadioPort,
    B: BrokerPort,
    C: ClockPort,
    E: EventSink,
    P: InputPin,
{
    let interval = Duration::from_millis(u64::from(local.poll_interval_ms));
    loop {
        let now_ms = {
            let mut hub = hub.borrow_mut();
            hub.poll();
            hub.clock().uptime_ms()
        };

        let gesture = local.button.as_mut().and_then(|b| b.tick(now_ms as u32));
        if let Some(gesture) = gesture {
            let action = on_button(&mut *hub.borrow_mut(), gesture, &mut *sink.borrow_mut());
            if action == ButtonAction::Restart {
                device::restart();
            }
        }

        async_io_mini::Timer::after(interval).await;
    }
}

/// Run the hub task on the current thread.  Blocks for the life of the
/// firmware.
pub fn run<S, R, B, C, E, P>(hub: HubService<S, R, B, C>, sink: E, local: Housekeeping<P>)
where
    S: StoragePort + 'static,
    R: RadioPort + 'static,
    B: BrokerPort + 'static,
    C: ClockPort + 'static,
    E: EventSink + 'static,
    P: InputPin + 'static,
{
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();

    let hub = Rc::new(RefCell::new(hub));
    let sink = Rc::new(RefCell::new(sink));

    hub.borrow_mut().start(&mut *sink.borrow_mut());

    executor.spawn(radio_loop(hub.clone(), sink.clone())).detach();
    executor.spawn(broker_loop(hub.clone(), sink.clone())).detach();
    executor.spawn(link_loop(hub.clone(), sink.clone())).detach();
    executor
        .spawn(housekeeping_loop(hub.clone(), sink.clone(), local))
        .detach();

    info!("Hub task started");

    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}
