//! Ordered, idempotent service teardown.
//!
//! ```text
//!  1 UnregisterService      withdraw the client-facing link
//!  2 ReleaseWakeResources   cancel alarm, release wake lock
//!  3 FlushPersistence       flush + close durable storage
//!  4 QuitStateMachines      stop the adapter loop, bond state machine
//!  5 CleanupCaches          device caches, SDP, keystore, policy managers
//!  6 ClearRegistry          forget profile registrations
//!  7 TeardownSockets        socket manager, client listeners
//!  8 ReleaseNative          native stack, only if it was acquired
//! ```
//!
//! Every step is attempted even if an earlier one failed; failures are
//! logged and collected in the [`ShutdownReport`].  A missing component
//! skips its step.  Native resources are always released last.  A second
//! shutdown request returns [`Error::ShutdownReentry`] without touching
//! anything.

use core::sync::atomic::{AtomicBool, Ordering};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::app::ports::{PersistencePort, Subsystem};
use crate::app::service::AdapterService;
use crate::error::{Error, Result};
use crate::link::ServiceLink;
use crate::power::WakeResources;
use crate::runtime::AdapterLoop;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum ShutdownStep {
    UnregisterService = 1,
    ReleaseWakeResources = 2,
    FlushPersistence = 3,
    QuitStateMachines = 4,
    CleanupCaches = 5,
    ClearRegistry = 6,
    TeardownSockets = 7,
    ReleaseNative = 8,
}

impl ShutdownStep {
    pub const ALL: [Self; 8] = [
        Self::UnregisterService,
        Self::ReleaseWakeResources,
        Self::FlushPersistence,
        Self::QuitStateMachines,
        Self::CleanupCaches,
        Self::ClearRegistry,
        Self::TeardownSockets,
        Self::ReleaseNative,
    ];
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// One-shot latch.  The first `try_begin` wins; every later call loses.
#[derive(Debug, Default)]
pub struct ShutdownGuard {
    started: AtomicBool,
}

impl ShutdownGuard {
    pub fn try_begin(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: ShutdownStep,
    /// Component that failed within the step.
    pub component: &'static str,
}

/// Outcome of a shutdown run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Steps that ran with no failures, in execution order.
    pub completed: Vec<ShutdownStep>,
    /// Steps with nothing to tear down.
    pub skipped: Vec<ShutdownStep>,
    pub failures: Vec<StepFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Every step that did any work, successful or not, in order.
    pub fn executed(&self) -> Vec<ShutdownStep> {
        let mut steps: Vec<_> = self.completed.clone();
        for f in &self.failures {
            if !steps.contains(&f.step) {
                steps.push(f.step);
            }
        }
        steps.sort();
        steps
    }

    fn record(&mut self, step: ShutdownStep, log: StepLog) {
        if log.ran == 0 {
            debug!("Shutdown step {:?}: nothing to do", step);
            self.skipped.push(step);
        } else if log.failed.is_empty() {
            self.completed.push(step);
        } else {
            for component in log.failed {
                warn!("{} ({})", Error::Cleanup(step), component);
                self.failures.push(StepFailure { step, component });
            }
        }
    }
}

#[derive(Default)]
struct StepLog {
    ran: usize,
    failed: Vec<&'static str>,
}

impl StepLog {
    fn done(&mut self) {
        self.ran += 1;
    }

    fn fail(&mut self, component: &'static str) {
        self.ran += 1;
        self.failed.push(component);
    }

    /// Run one component's teardown.  A panic is charged to that
    /// component alone.
    fn contained(&mut self, component: &'static str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_ok() {
            self.done();
        } else {
            error!("{} panicked during teardown", component);
            self.fail(component);
        }
    }

    fn subsystem(&mut self, slot: Option<Box<dyn Subsystem + Send>>) {
        let Some(mut s) = slot else { return };
        if !s.is_active() {
            debug!("{} not active, skipping", s.name());
            return;
        }
        let name = s.name();
        match catch_unwind(AssertUnwindSafe(|| s.cleanup())) {
            Ok(Ok(())) => {
                debug!("{} cleaned up", name);
                self.done();
            }
            Ok(Err(e)) => {
                error!("{}: {}", name, e);
                self.fail(name);
            }
            Err(_) => {
                error!("{} panicked during cleanup", name);
                self.fail(name);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Teardown set
// ---------------------------------------------------------------------------

/// Everything the shutdown sequence tears down.  Absent components are
/// `None` and skip their step.
#[derive(Default)]
pub struct TeardownSet {
    pub link: Option<Arc<ServiceLink>>,
    pub wake: Option<Arc<WakeResources>>,
    pub persistence: Option<Box<dyn PersistencePort + Send>>,
    pub adapter_loop: Option<AdapterLoop>,
    /// Filled by step 4 from the stopped loop, or supplied directly when
    /// the service is driven synchronously.
    pub service: Option<AdapterService>,
    pub bond_state_machine: Option<Box<dyn Subsystem + Send>>,
    /// Cleaned in order: remote devices, SDP, keystore, phone policy,
    /// silence manager, active device manager.
    pub caches: Vec<Box<dyn Subsystem + Send>>,
    pub socket_manager: Option<Box<dyn Subsystem + Send>>,
    pub native: Option<Box<dyn Subsystem + Send>>,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ShutdownSequencer {
    guard: ShutdownGuard,
}

impl ShutdownSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cleaning_up(&self) -> bool {
        self.guard.is_started()
    }

    /// Tear everything down in order.  Only the first call does anything.
    pub fn run(&self, set: &mut TeardownSet) -> Result<ShutdownReport> {
        if !self.guard.try_begin() {
            warn!("Shutdown already in progress");
            return Err(Error::ShutdownReentry);
        }
        info!("Adapter service shutting down");
        let mut report = ShutdownReport::default();

        Self::step(&mut report, ShutdownStep::UnregisterService, |log| {
            if let Some(link) = &set.link {
                log.contained("service-link", || link.withdraw());
            }
        });

        Self::step(&mut report, ShutdownStep::ReleaseWakeResources, |log| {
            if let Some(wake) = set.wake.take() {
                log.contained("wake-resources", || wake.release_all());
            }
        });

        Self::step(&mut report, ShutdownStep::FlushPersistence, |log| {
            if let Some(mut p) = set.persistence.take() {
                let flushed = p.flush();
                let closed = p.close();
                match (flushed, closed) {
                    (Ok(()), Ok(())) => log.done(),
                    (f, c) => {
                        if let Err(e) = f {
                            error!("persistence flush: {}", e);
                            log.fail("persistence-flush");
                        }
                        if let Err(e) = c {
                            error!("persistence close: {}", e);
                            log.fail("persistence-close");
                        }
                    }
                }
            }
        });

        Self::step(&mut report, ShutdownStep::QuitStateMachines, |log| {
            if let Some(lp) = set.adapter_loop.take() {
                match lp.quit() {
                    Some(svc) => {
                        set.service = Some(svc);
                        log.done();
                    }
                    None => log.fail("adapter-loop"),
                }
            }
            log.subsystem(set.bond_state_machine.take());
        });

        Self::step(&mut report, ShutdownStep::CleanupCaches, |log| {
            for c in set.caches.drain(..) {
                log.subsystem(Some(c));
            }
        });

        Self::step(&mut report, ShutdownStep::ClearRegistry, |log| {
            if let Some(svc) = set.service.as_mut() {
                log.contained("profile-registry", || svc.clear_registry());
            }
        });

        Self::step(&mut report, ShutdownStep::TeardownSockets, |log| {
            log.subsystem(set.socket_manager.take());
            if let Some(svc) = set.service.as_mut() {
                log.contained("client-listeners", || svc.clear_listeners());
            }
        });

        Self::step(&mut report, ShutdownStep::ReleaseNative, |log| {
            log.subsystem(set.native.take());
        });

        info!(
            "Shutdown finished: {} completed, {} skipped, {} failures",
            report.completed.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Components are contained individually; this outer guard only
    /// catches panics in the step's own bookkeeping.
    fn step(report: &mut ShutdownReport, step: ShutdownStep, body: impl FnOnce(&mut StepLog)) {
        debug!("Shutdown step {} {:?}", step as u8, step);
        let mut log = StepLog::default();
        if catch_unwind(AssertUnwindSafe(|| body(&mut log))).is_err() {
            error!("Shutdown step {:?} panicked, continuing", step);
            log.fail("panic");
        }
        report.record(step, log);
    }
}
