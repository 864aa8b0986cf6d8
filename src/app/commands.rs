//! Inbound client requests to the adapter service.
//!
//! These are the power requests a client can make through
//! [`AdapterHandle`](crate::runtime::AdapterHandle).  The
//! [`AdapterService`](super::service::AdapterService) applies them in
//! stable states and queues them while a transition is in flight.

use serde::Serialize;

/// Power requests from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdapterRequest {
    /// Turn the adapter fully on.  `quiet_mode` suppresses auto-connect.
    Enable { quiet_mode: bool },

    /// Bring up the low-energy stack only (stop at BLE_ON).
    EnableBle,

    /// Turn the adapter off.
    Disable,

    /// A BLE-only adapter should continue to full ON.
    LeServiceUp,

    /// The classic side is gone; power the low-energy stack down too.
    BrEdrDown,
}

impl AdapterRequest {
    /// Whether this request is subject to the "Bluetooth disallowed"
    /// restriction.
    pub fn is_enable(self) -> bool {
        matches!(self, Self::Enable { .. } | Self::EnableBle | Self::LeServiceUp)
    }
}
