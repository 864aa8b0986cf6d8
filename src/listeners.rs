//! Client state-change listeners.
//!
//! Broadcast happens on the adapter loop after every committed transition.
//! A failing listener is logged and skipped; it never stops the broadcast
//! or the transition.

use log::{debug, warn};

use crate::app::ports::StateListener;
use crate::events::ListenerId;
use crate::fsm::AdapterState;

#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<(ListenerId, Box<dyn StateListener + Send>)>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.  An existing registration with the same id is
    /// replaced.
    pub fn register(&mut self, id: ListenerId, listener: Box<dyn StateListener + Send>) {
        if let Some(slot) = self.listeners.iter_mut().find(|(i, _)| *i == id) {
            warn!("Listener {} registered twice, replacing", id);
            slot.1 = listener;
        } else {
            self.listeners.push((id, listener));
            debug!("Listener {} registered", id);
        }
    }

    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(i, _)| *i != id);
        before != self.listeners.len()
    }

    /// Notify every listener in registration order.  Returns the number
    /// of listeners that failed.
    pub fn broadcast(&mut self, prev: AdapterState, new: AdapterState) -> usize {
        let mut failures = 0;
        for (id, l) in &mut self.listeners {
            if let Err(e) = l.on_state_changed(prev, new) {
                warn!("Listener {} failed ({}), continuing", id, e);
                failures += 1;
            }
        }
        failures
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
