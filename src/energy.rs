//! Controller activity and energy accounting.
//!
//! The native stack reports controller activity on its own thread.  Each
//! report is folded into running totals under a mutex and wakes anyone
//! blocked in [`EnergyMonitor::request`].  Requesters wait with a bounded
//! timeout raced on the async-io-mini reactor; a late or missing report
//! just yields the totals accumulated so far.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, warn};
use serde::Serialize;

use crate::config::PowerProfile;

/// Controller state as reported by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ControllerState {
    #[default]
    Invalid,
    Active,
    Scanning,
    Idle,
}

impl ControllerState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Invalid),
            1 => Some(Self::Active),
            2 => Some(Self::Scanning),
            3 => Some(Self::Idle),
            _ => None,
        }
    }
}

/// Per-application traffic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UidTraffic {
    pub uid: u32,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One raw activity report from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerActivity {
    /// Raw controller state; values outside `0..=3` invalidate the report.
    pub ctrl_state: u8,
    pub tx_time_ms: u64,
    pub rx_time_ms: u64,
    pub idle_time_ms: u64,
    /// Energy in mA·ms·V, or 0 if the controller does not measure it.
    pub energy_used: u64,
    pub uid_traffic: Vec<UidTraffic>,
}

/// Accumulated activity, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEnergyInfo {
    /// Milliseconds since the monitor was created.
    pub timestamp_ms: u64,
    pub ctrl_state: ControllerState,
    pub tx_time_ms: u64,
    pub rx_time_ms: u64,
    pub idle_time_ms: u64,
    pub energy_used: u64,
    /// Only applications with non-zero traffic.
    pub uid_traffic: Vec<UidTraffic>,
}

#[derive(Default)]
struct EnergyTotals {
    ctrl_state: ControllerState,
    tx_time_ms: u64,
    rx_time_ms: u64,
    idle_time_ms: u64,
    energy_used: u64,
    /// uid → (rx, tx)
    uid_traffic: BTreeMap<u32, (u64, u64)>,
}

pub struct EnergyMonitor {
    power: PowerProfile,
    totals: Mutex<EnergyTotals>,
    updated: Signal<CriticalSectionRawMutex, ()>,
    epoch: Instant,
}

impl EnergyMonitor {
    pub fn new(power: PowerProfile) -> Self {
        Self {
            power,
            totals: Mutex::new(EnergyTotals::default()),
            updated: Signal::new(),
            epoch: Instant::now(),
        }
    }

    /// Fold one controller report into the totals and wake waiters.
    /// Returns `false` if the report was discarded.
    pub fn on_controller_activity(&self, report: &ControllerActivity) -> bool {
        let Some(state) = ControllerState::from_u8(report.ctrl_state) else {
            warn!("Discarding activity report with invalid state {}", report.ctrl_state);
            return false;
        };

        let energy = if report.energy_used == 0 {
            match self.derive_energy(report) {
                Some(e) => e,
                None => {
                    error!("Energy derivation overflowed, discarding report");
                    return false;
                }
            }
        } else {
            report.energy_used
        };

        let mut t = self.lock();
        let sums = (
            t.tx_time_ms.checked_add(report.tx_time_ms),
            t.rx_time_ms.checked_add(report.rx_time_ms),
            t.idle_time_ms.checked_add(report.idle_time_ms),
            t.energy_used.checked_add(energy),
        );
        let (Some(tx), Some(rx), Some(idle), Some(total)) = sums else {
            error!("Activity totals would overflow, discarding report");
            return false;
        };
        t.ctrl_state = state;
        t.tx_time_ms = tx;
        t.rx_time_ms = rx;
        t.idle_time_ms = idle;
        t.energy_used = total;

        for u in &report.uid_traffic {
            let slot = t.uid_traffic.entry(u.uid).or_insert((0, 0));
            slot.0 = slot.0.saturating_add(u.rx_bytes);
            slot.1 = slot.1.saturating_add(u.tx_bytes);
        }
        drop(t);

        debug!("Activity report folded (energy +{})", energy);
        self.updated.signal(());
        true
    }

    /// Current totals.
    pub fn snapshot(&self) -> ActivityEnergyInfo {
        let t = self.lock();
        ActivityEnergyInfo {
            timestamp_ms: self.epoch.elapsed().as_millis() as u64,
            ctrl_state: t.ctrl_state,
            tx_time_ms: t.tx_time_ms,
            rx_time_ms: t.rx_time_ms,
            idle_time_ms: t.idle_time_ms,
            energy_used: t.energy_used,
            uid_traffic: t
                .uid_traffic
                .iter()
                .filter(|(_, (rx, tx))| *rx != 0 || *tx != 0)
                .map(|(uid, (rx, tx))| UidTraffic {
                    uid: *uid,
                    rx_bytes: *rx,
                    tx_bytes: *tx,
                })
                .collect(),
        }
    }

    /// Ask for a fresh report and wait up to `timeout` for it.
    ///
    /// `post` issues the read request; if it fails the wait is skipped.
    pub fn request(&self, post: impl FnOnce() -> bool, timeout: Duration) -> ActivityEnergyInfo {
        self.updated.reset();
        if post() {
            if !self.wait_for_update(timeout) {
                debug!("No activity report within {:?}", timeout);
            }
        } else {
            warn!("Activity read request could not be posted");
        }
        self.snapshot()
    }

    /// Block until the next report or the timeout, whichever is first.
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        futures_lite::future::block_on(futures_lite::future::or(
            async {
                self.updated.wait().await;
                true
            },
            async {
                async_io_mini::Timer::after(timeout).await;
                false
            },
        ))
    }

    /// (tx·I_tx + rx·I_rx + idle·I_idle) · V, with V in volts.
    fn derive_energy(&self, r: &ControllerActivity) -> Option<u64> {
        let p = &self.power;
        let charge = r
            .tx_time_ms
            .checked_mul(u64::from(p.tx_current_ma))?
            .checked_add(r.rx_time_ms.checked_mul(u64::from(p.rx_current_ma))?)?
            .checked_add(r.idle_time_ms.checked_mul(u64::from(p.idle_current_ma))?)?;
        Some(charge.checked_mul(u64::from(p.operating_voltage_mv))? / 1000)
    }

    fn lock(&self) -> MutexGuard<'_, EnergyTotals> {
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
