//! micropad-hw-interface
//!
//! Switch/encoder → event queue → callback firmware for the Seeed XIAO
//! RP2040 micropad. Wires the `micropad-input` pipeline to real GPIO:
//!
//! 1. A key or the encoder is actuated and the GPIO edge interrupt fires.
//! 2. An edge task on the high-priority interrupt executor samples the pin
//!    level(s) and the time, and feeds the switch monitor or encoder under a
//!    critical section. Accepted transitions are pushed onto `EVENT_QUEUE`.
//! 3. The main loop on the thread-mode executor drains the queue every
//!    `IDLE_PERIOD` and runs the registered callbacks.
//! 4. Every `STATUS_PERIOD` the main loop logs the encoder value and the
//!    keys pressed since the previous status line.
//!
//! USB HID and the OLED status screen are not implemented in this firmware.

#![no_std]
#![no_main]

use core::cell::{Cell, RefCell};

use cortex_m_rt::entry;
use defmt::*;
use embassy_executor::{Executor, InterruptExecutor};
use embassy_futures::select::select;
use embassy_rp::gpio::{Input, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use micropad_input::{
    Dispatcher, Encoder, Event, EventQueue, HandlerError, InputConfig, PhasePattern, SwitchId,
    SwitchMonitor, EVENT_QUEUE_DEPTH, SWITCH_COUNT,
};

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Idle delay between queue drains in the main loop.
const IDLE_PERIOD: Duration = Duration::from_millis(10);

/// Interval between status log lines.
const STATUS_PERIOD: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Static storage
// ---------------------------------------------------------------------------

/// State shared between the edge tasks and the main loop. Locking masks
/// interrupts for the duration of the closure.
type Shared<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;

/// Interrupt-side producers → main-loop consumer.
static EVENT_QUEUE: EventQueue<EVENT_QUEUE_DEPTH> = EventQueue::new();

/// Discrete key state. Written by the switch edge tasks; latches are read
/// and cleared by the status report.
static SWITCHES: StaticCell<Shared<SwitchMonitor>> = StaticCell::new();

/// Encoder state. Written by the phase and button edge tasks only.
static ENCODER: StaticCell<Shared<Encoder>> = StaticCell::new();

/// Running encoder value, owned by the default callbacks.
static ENCODER_VALUE: Mutex<CriticalSectionRawMutex, Cell<i32>> = Mutex::new(Cell::new(0));

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_LOW: StaticCell<Executor> = StaticCell::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

// ---------------------------------------------------------------------------
// Default callbacks (main-loop context)
// ---------------------------------------------------------------------------

fn on_switch_press(event: Event) -> Result<(), HandlerError> {
    match event {
        Event::SwitchChanged { id, pressed: true } => {
            info!("Switch pressed: {}", id.name());
            Ok(())
        }
        // Releases are delivered but nothing needs them yet.
        Event::SwitchChanged { pressed: false, .. } => Ok(()),
        _ => Err(HandlerError::UnexpectedEvent),
    }
}

fn on_encoder_rotate(event: Event) -> Result<(), HandlerError> {
    let Event::Rotated { direction } = event else {
        return Err(HandlerError::UnexpectedEvent);
    };

    let value = ENCODER_VALUE.lock(|v| {
        let next = v.get().saturating_add(i32::from(direction.delta()));
        v.set(next);
        next
    });
    info!("Encoder: {} (rotated {})", value, direction.delta());
    Ok(())
}

fn on_encoder_button(_event: Event) -> Result<(), HandlerError> {
    info!("Encoder button pressed");
    ENCODER_VALUE.lock(|v| v.set(0));
    info!("Encoder value reset to 0");
    Ok(())
}

// ---------------------------------------------------------------------------
// Edge tasks (interrupt executor)
// ---------------------------------------------------------------------------

/// Edge handler for one discrete key.
///
/// Samples the level and timestamp as soon as the edge wakes the task, then
/// hands both to the switch monitor. The critical section covers only the
/// O(1) monitor update.
#[embassy_executor::task(pool_size = SWITCH_COUNT)]
async fn switch_task(
    id: SwitchId,
    mut pin: Input<'static>,
    switches: &'static Shared<SwitchMonitor>,
) {
    loop {
        pin.wait_for_any_edge().await;
        let now = Instant::now();
        let is_high = pin.is_high();

        switches.lock(|s| s.borrow_mut().on_edge(id, is_high, now, &EVENT_QUEUE));
    }
}

/// Edge handler for the CLK/DT pair. Wakes on an edge on either line and
/// samples both.
#[embassy_executor::task]
async fn encoder_phase_task(
    mut clk: Input<'static>,
    mut dt: Input<'static>,
    encoder: &'static Shared<Encoder>,
) {
    loop {
        select(clk.wait_for_any_edge(), dt.wait_for_any_edge()).await;
        let now = Instant::now();
        let (clk_high, dt_high) = (clk.is_high(), dt.is_high());

        encoder.lock(|e| {
            e.borrow_mut()
                .on_phase_edge(clk_high, dt_high, now, &EVENT_QUEUE)
        });
    }
}

/// Edge handler for the encoder push button.
#[embassy_executor::task]
async fn encoder_button_task(mut button: Input<'static>, encoder: &'static Shared<Encoder>) {
    loop {
        button.wait_for_any_edge().await;
        let now = Instant::now();
        let is_high = button.is_high();

        encoder.lock(|e| e.borrow_mut().on_button_edge(is_high, now, &EVENT_QUEUE));
    }
}

// ---------------------------------------------------------------------------
// Main loop (thread executor)
// ---------------------------------------------------------------------------

/// Drains the event queue, runs callbacks, and logs a periodic status line.
#[embassy_executor::task]
async fn main_loop_task(switches: &'static Shared<SwitchMonitor>) {
    let mut dispatcher = Dispatcher::new();
    dispatcher.init_switches(on_switch_press);
    dispatcher.init_encoder(on_encoder_rotate, on_encoder_button);

    info!("All systems initialized!");
    info!("Ready for input...");

    let mut last_status = Instant::now();
    let mut last_dropped = 0u32;
    loop {
        dispatcher.drain(&EVENT_QUEUE);

        if last_status.elapsed() >= STATUS_PERIOD {
            last_status = Instant::now();

            let active = switches.lock(|s| {
                let mut s = s.borrow_mut();
                let active = s.active_switches();
                s.reset_latched();
                active
            });
            let value = ENCODER_VALUE.lock(|v| v.get());
            info!("Status: encoder={} active={}", value, active.as_slice());

            let dropped = EVENT_QUEUE.dropped();
            if dropped != last_dropped {
                warn!("{} events dropped (queue full)", dropped.wrapping_sub(last_dropped));
                last_dropped = dropped;
            }
        }

        Timer::after(IDLE_PERIOD).await;
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let p = embassy_rp::init(Default::default());

    let config = InputConfig::default();
    unwrap!(config.validate());

    info!("==================================================");
    info!("XIAO RP2040 MICROPAD Controller");
    info!("  - {} MX-Style Switches", SWITCH_COUNT);
    info!(
        "  - EC11 Rotary Encoder (CLK=GPIO{}, DT=GPIO{}, SW=GPIO{})",
        config.encoder.clk, config.encoder.dt, config.encoder.button
    );
    info!("==================================================");

    // ── Pin assignments (must match micropad_input::SWITCH_PINS / ENCODER_PINS) ──
    // switch_1..6 → GP0..GP5   active-low, pull-up enabled
    // ENC_CLK     → GP28
    // ENC_DT      → GP27
    // ENC_SW      → GP26       active-low, pull-up enabled
    // ────────────────────────────────────────────────────────────────────────────
    let switch_pins: [Input<'static>; SWITCH_COUNT] = [
        Input::new(p.PIN_0, Pull::Up),
        Input::new(p.PIN_1, Pull::Up),
        Input::new(p.PIN_2, Pull::Up),
        Input::new(p.PIN_3, Pull::Up),
        Input::new(p.PIN_4, Pull::Up),
        Input::new(p.PIN_5, Pull::Up),
    ];
    let clk = Input::new(p.PIN_28, Pull::Up);
    let dt = Input::new(p.PIN_27, Pull::Up);
    let button = Input::new(p.PIN_26, Pull::Up);

    // Start the decoder from the knob's actual rest position.
    let initial = PhasePattern::from_levels(clk.is_high(), dt.is_high());

    let switches: &'static Shared<SwitchMonitor> =
        SWITCHES.init(Mutex::new(RefCell::new(SwitchMonitor::new(&config))));
    let encoder: &'static Shared<Encoder> =
        ENCODER.init(Mutex::new(RefCell::new(Encoder::new(&config, initial))));

    // ── Edge tasks: preempt the main loop ───────────────────────────────────────
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);

    for (id, pin) in SwitchId::ALL.into_iter().zip(switch_pins) {
        high.spawn(unwrap!(switch_task(id, pin, switches)));
    }
    high.spawn(unwrap!(encoder_phase_task(clk, dt, encoder)));
    high.spawn(unwrap!(encoder_button_task(button, encoder)));

    // ── Main loop ───────────────────────────────────────────────────────────────
    let executor = EXECUTOR_LOW.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(unwrap!(main_loop_task(switches)));
    });
}
