//! State shared between the adapter loop and client handles.
//!
//! Only atomics live here: the published adapter state, the
//! administrative restriction and the service-availability flag that
//! shutdown clears first.  Everything else stays owned by the loop.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::events::ListenerId;
use crate::fsm::AdapterState;

#[derive(Debug)]
pub struct ServiceLink {
    available: AtomicBool,
    disallowed: AtomicBool,
    state: AtomicU8,
    next_listener: AtomicU32,
}

impl ServiceLink {
    pub fn new(bluetooth_disallowed: bool) -> Self {
        Self {
            available: AtomicBool::new(true),
            disallowed: AtomicBool::new(bluetooth_disallowed),
            state: AtomicU8::new(AdapterState::Off as u8),
            next_listener: AtomicU32::new(1),
        }
    }

    /// Last state published by the adapter loop.
    pub fn state(&self) -> AdapterState {
        AdapterState::from_index(self.state.load(Ordering::Acquire) as usize)
    }

    pub fn publish_state(&self, state: AdapterState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_disallowed(&self) -> bool {
        self.disallowed.load(Ordering::Acquire)
    }

    pub fn set_disallowed(&self, disallowed: bool) {
        self.disallowed.store(disallowed, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Stop accepting client calls.
    pub fn withdraw(&self) {
        self.available.store(false, Ordering::Release);
    }

    pub fn next_listener_id(&self) -> ListenerId {
        self.next_listener.fetch_add(1, Ordering::Relaxed)
    }
}
