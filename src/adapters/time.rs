//! Wall clock and uptime adapter.
//!
//! Implements [`ClockPort`].  Readings are stamped with local time, so the
//! device configures the POSIX timezone and starts SNTP before the broker
//! session; [`WallClock::wait_for_sync`] is the time-ready gate in `main`.
//!
//! - **`target_os = "espidf"`**: `EspSntp` plus `gettimeofday` /
//!   `localtime_r`.
//! - **`not(target_os = "espidf")`**: `chrono::Local`.
//!
//! Uptime on both comes from `embassy_time::Instant` (microsecond ticks,
//! driver in `esp_link_shims`).

use chrono::NaiveDateTime;
use log::{info, warn};

use crate::app::ports::ClockPort;

/// Timestamp layout for telemetry readings.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Anything before 2020-01-01 means SNTP has not synced yet.
#[cfg(target_os = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

pub struct WallClock {
    #[cfg(target_os = "espidf")]
    sntp: esp_idf_svc::sntp::EspSntp<'static>,
}

impl WallClock {
    /// Apply `timezone` (POSIX TZ string) and start SNTP against `server`.
    #[cfg(target_os = "espidf")]
    pub fn start(timezone: &str, server: &str) -> Result<Self, esp_idf_svc::sys::EspError> {
        use esp_idf_svc::sntp::{EspSntp, SntpConf};

        // SAFETY: set before any other task reads the environment.
        unsafe {
            std::env::set_var("TZ", timezone);
            esp_idf_svc::sys::tzset();
        }

        // lwIP keeps the server name pointer.
        let server: &'static str = Box::leak(server.to_string().into_boxed_str());
        let mut conf = SntpConf::default();
        conf.servers[0] = server;
        let sntp = EspSntp::new(&conf)?;
        info!("Clock: TZ={} SNTP server {}", timezone, server);
        Ok(Self { sntp })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(timezone: &str, server: &str) -> Result<Self, core::convert::Infallible> {
        info!("Clock(sim): host local time (TZ={} server={} ignored)", timezone, server);
        Ok(Self {})
    }

    #[cfg(target_os = "espidf")]
    pub fn is_synced(&self) -> bool {
        use esp_idf_svc::sntp::SyncStatus;

        self.sntp.get_sync_status() == SyncStatus::Completed || Self::epoch_secs() >= EPOCH_2020
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn is_synced(&self) -> bool {
        true
    }

    /// Block until the wall clock is set or `timeout_ms` passes.  Returns
    /// whether it synced; readings are stamped either way.
    pub fn wait_for_sync(&self, timeout_ms: u64) -> bool {
        let step = std::time::Duration::from_millis(100);
        let mut waited = 0;
        while !self.is_synced() {
            if waited >= timeout_ms {
                warn!("Clock: not synced after {} ms, timestamps may be wrong", timeout_ms);
                return false;
            }
            std::thread::sleep(step);
            waited += 100;
        }
        info!("Clock: synced, local time {}", self.now_local());
        true
    }

    #[cfg(target_os = "espidf")]
    fn epoch_secs() -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: tv is a valid out-pointer; the timezone argument may be null.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    #[cfg(target_os = "espidf")]
    fn local_time() -> Option<NaiveDateTime> {
        let secs = Self::epoch_secs() as esp_idf_svc::sys::time_t;
        // SAFETY: tm is plain data and fully written by localtime_r on success.
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        if unsafe { esp_idf_svc::sys::localtime_r(&secs, &mut tm) }.is_null() {
            return None;
        }
        chrono::NaiveDate::from_ymd_opt(tm.tm_year + 1900, (tm.tm_mon + 1) as u32, tm.tm_mday as u32)?
            .and_hms_opt(tm.tm_hour as u32, tm.tm_min as u32, tm.tm_sec as u32)
    }
}

impl ClockPort for WallClock {
    #[cfg(target_os = "espidf")]
    fn now_local(&self) -> String {
        Self::local_time()
            .map(|t| format_timestamp(&t))
            .unwrap_or_default()
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_local(&self) -> String {
        format_timestamp(&chrono::Local::now().naive_local())
    }

    fn uptime_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}
