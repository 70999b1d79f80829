//! Runtime symbol providers for third-party crates.
//!
//! - `embassy-time` driver (`_embassy_time_now`, `_embassy_time_schedule_wake`)
//!   backing the `async-io-mini` timers of the hub task.  Ticks are
//!   microseconds: `esp_timer_get_time` on the device, a process-start
//!   `Instant` on the host.
//! - `critical-section` 1.x acquire/release for the `embassy-sync` channels
//!   on the device.  Host builds get theirs from `critical-section/std`.

use core::task::Waker;
use std::sync::{Condvar, Mutex, Once, PoisonError};
use std::time::Duration;

#[cfg(target_os = "espidf")]
use core::cell::{Cell, RefCell};
#[cfg(target_os = "espidf")]
use std::sync::MutexGuard;

// ───────────────────────────────────────────────────────────────
// Time driver
// ───────────────────────────────────────────────────────────────

/// Pending wakeups, served by one `time-wake` thread.
static ALARMS: Mutex<Vec<(u64, Waker)>> = Mutex::new(Vec::new());
static ALARM_CHANGED: Condvar = Condvar::new();
static WAKE_THREAD: Once = Once::new();

#[cfg(target_os = "espidf")]
fn now_us() -> u64 {
    unsafe { esp_idf_svc::sys::esp_timer_get_time() as u64 }
}

#[cfg(not(target_os = "espidf"))]
fn now_us() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_micros() as u64
}

#[unsafe(no_mangle)]
pub fn _embassy_time_now() -> u64 {
    now_us()
}

#[unsafe(no_mangle)]
pub fn _embassy_time_schedule_wake(at: u64, waker: &Waker) {
    WAKE_THREAD.call_once(|| {
        if let Err(e) = std::thread::Builder::new()
            .name("time-wake".into())
            .stack_size(8192)
            .spawn(wake_loop)
        {
            log::error!("Timer: wake thread spawn failed: {}", e);
        }
    });

    let mut alarms = ALARMS.lock().unwrap_or_else(PoisonError::into_inner);
    match alarms.iter_mut().find(|(_, w)| w.will_wake(waker)) {
        Some(slot) => slot.0 = slot.0.min(at),
        None => alarms.push((at, waker.clone())),
    }
    ALARM_CHANGED.notify_one();
}

fn wake_loop() {
    let mut alarms = ALARMS.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        let now = now_us();
        let mut due = Vec::new();
        alarms.retain(|(at, w)| {
            if *at <= now {
                due.push(w.clone());
                false
            } else {
                true
            }
        });

        if !due.is_empty() {
            drop(alarms);
            due.into_iter().for_each(Waker::wake);
            alarms = ALARMS.lock().unwrap_or_else(PoisonError::into_inner);
            continue;
        }

        alarms = match alarms.iter().map(|(at, _)| *at).min() {
            Some(next) => {
                ALARM_CHANGED
                    .wait_timeout(alarms, Duration::from_micros(next - now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => ALARM_CHANGED
                .wait(alarms)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}

// ───────────────────────────────────────────────────────────────
// Critical section (device)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
static CRITICAL_SECTION_MUTEX: Mutex<()> = Mutex::new(());

#[cfg(target_os = "espidf")]
thread_local! {
    static CRITICAL_SECTION_DEPTH: Cell<u8> = const { Cell::new(0) };
    static CRITICAL_SECTION_GUARD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

/// Re-entrant per thread; the outermost acquire takes the global lock.
#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    CRITICAL_SECTION_DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            let lock = CRITICAL_SECTION_MUTEX
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            CRITICAL_SECTION_GUARD.with(|guard| *guard.borrow_mut() = Some(lock));
        }
        let new_depth = d.saturating_add(1);
        depth.set(new_depth);
        new_depth
    })
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(_token: u8) {
    CRITICAL_SECTION_DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            return;
        }
        depth.set(d - 1);
        if d == 1 {
            CRITICAL_SECTION_GUARD.with(|guard| *guard.borrow_mut() = None);
        }
    })
}
