//! Wake alarm and wake lock held on behalf of the native stack.
//!
//! The stack calls in from its own threads and shutdown releases from
//! another, so both resources sit behind one mutex.  At most one alarm is
//! pending: arming a new one cancels the previous alarm first.  Once
//! released by shutdown, nothing can be armed or acquired again.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info};

use crate::app::ports::{AlarmId, PowerPort};

struct WakeLock {
    name: String,
    held: bool,
}

struct WakeInner {
    port: Box<dyn PowerPort + Send>,
    pending_alarm: Option<AlarmId>,
    wake_lock: Option<WakeLock>,
    released: bool,
}

pub struct WakeResources {
    inner: Mutex<WakeInner>,
}

impl WakeResources {
    pub fn new(port: Box<dyn PowerPort + Send>) -> Self {
        Self {
            inner: Mutex::new(WakeInner {
                port,
                pending_alarm: None,
                wake_lock: None,
                released: false,
            }),
        }
    }

    /// Arm the wake alarm, replacing any pending one.  `false` after
    /// shutdown.
    pub fn set_wake_alarm(&self, delay_ms: u64, should_wake: bool) -> bool {
        let mut inner = self.lock();
        if inner.released {
            debug!("Wake resources released, not arming alarm");
            return false;
        }
        if let Some(old) = inner.pending_alarm.take() {
            debug!("Cancelling pending alarm {:?}", old);
            inner.port.cancel_alarm(old);
        }
        let id = inner.port.schedule_alarm(delay_ms, should_wake);
        inner.pending_alarm = Some(id);
        debug!("Wake alarm {:?} armed for {} ms (wake: {})", id, delay_ms, should_wake);
        true
    }

    /// The armed alarm fired.  Returns `false` for a stale alarm id.
    pub fn on_alarm_fired(&self, id: AlarmId) -> bool {
        let mut inner = self.lock();
        if inner.pending_alarm == Some(id) {
            inner.pending_alarm = None;
            true
        } else {
            debug!("Ignoring stale alarm {:?}", id);
            false
        }
    }

    pub fn acquire_wake_lock(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let inner = &mut *inner;
        if inner.released {
            debug!("Wake resources released, not acquiring {}", name);
            return false;
        }
        let lock = inner.wake_lock.get_or_insert_with(|| WakeLock {
            name: name.to_string(),
            held: false,
        });
        if !lock.held {
            inner.port.acquire_wake_lock(&lock.name);
            lock.held = true;
        }
        true
    }

    /// Release the wake lock.  Returns `false` if no wake lock exists.
    pub fn release_wake_lock(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let Some(lock) = inner.wake_lock.as_mut() else {
            error!("Repeated wake lock release; aborting release: {}", name);
            return false;
        };
        if lock.held {
            inner.port.release_wake_lock(&lock.name);
            lock.held = false;
        }
        true
    }

    pub fn has_pending_alarm(&self) -> bool {
        self.lock().pending_alarm.is_some()
    }

    pub fn is_wake_lock_held(&self) -> bool {
        self.lock().wake_lock.as_ref().is_some_and(|l| l.held)
    }

    /// Cancel the alarm and release and drop the wake lock.
    pub fn release_all(&self) {
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.released = true;
        if let Some(id) = inner.pending_alarm.take() {
            inner.port.cancel_alarm(id);
        }
        if let Some(lock) = inner.wake_lock.take() {
            if lock.held {
                inner.port.release_wake_lock(&lock.name);
            }
        }
        info!("Wake resources released");
    }

    fn lock(&self) -> MutexGuard<'_, WakeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
