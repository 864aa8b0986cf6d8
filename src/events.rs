//! Serialized adapter message queue.
//!
//! Every input to the adapter service is a message on one bounded MPSC
//! channel, drained by a single consumer.  Producers are client handles,
//! the native stack's callback threads and the profile host.
//!
//! ```text
//! ┌──────────────────┐
//! │ AdapterHandle     │──┐
//! │ stack callbacks   │──┼──▶ MessageQueue ──▶ adapter loop ──▶ AdapterService
//! │ profile host      │──┘   (embassy Channel)    (one thread)
//! └──────────────────┘
//! ```
//!
//! Messages are processed strictly in arrival order.  Follow-up events a
//! message triggers inside the service run to completion before the next
//! message is taken.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_sync::signal::Signal;
use log::{debug, warn};

use crate::app::commands::AdapterRequest;
use crate::app::ports::{AlarmId, GatewayEvent, ProfileState, StateListener};
use crate::config::{ProfileName, bounded};
use crate::diagnostics::ServiceDump;
use crate::error::Error;

/// Channel depth for adapter messages.
pub const QUEUE_DEPTH: usize = 64;

/// Client listener registration key.
pub type ListenerId = u32;

/// One-shot reply slot for [`AdapterMessage::Dump`].
pub type DumpReply = Arc<Signal<CriticalSectionRawMutex, ServiceDump>>;

/// Everything the adapter loop can be asked to do.
pub enum AdapterMessage {
    /// Client power request.
    Request(AdapterRequest),
    /// Native stack callback.
    Gateway(GatewayEvent),
    /// A profile service came into existence.
    ProfileRegistered(ProfileName),
    /// A profile service went away.
    ProfileUnregistered(ProfileName),
    /// A profile service reported a running-state change.
    ProfileStateChanged {
        name: ProfileName,
        state: ProfileState,
    },
    RegisterListener {
        id: ListenerId,
        listener: Box<dyn StateListener + Send>,
    },
    UnregisterListener(ListenerId),
    /// Ask the controller for an activity report.
    ReadEnergyInfo,
    /// A wake alarm armed on behalf of the stack fired.
    AlarmFired(AlarmId),
    /// Snapshot the service state into the reply slot.
    Dump(DumpReply),
    /// Stop the adapter loop.
    Quit,
}

impl core::fmt::Debug for AdapterMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Request(r) => write!(f, "Request({r:?})"),
            Self::Gateway(e) => write!(f, "Gateway({e:?})"),
            Self::ProfileRegistered(n) => write!(f, "ProfileRegistered({n})"),
            Self::ProfileUnregistered(n) => write!(f, "ProfileUnregistered({n})"),
            Self::ProfileStateChanged { name, state } => {
                write!(f, "ProfileStateChanged({name}, {state:?})")
            }
            Self::RegisterListener { id, .. } => write!(f, "RegisterListener({id})"),
            Self::UnregisterListener(id) => write!(f, "UnregisterListener({id})"),
            Self::ReadEnergyInfo => write!(f, "ReadEnergyInfo"),
            Self::AlarmFired(id) => write!(f, "AlarmFired({})", id.0),
            Self::Dump(_) => write!(f, "Dump"),
            Self::Quit => write!(f, "Quit"),
        }
    }
}

/// The bounded channel itself.
pub type MessageChannel = Channel<CriticalSectionRawMutex, AdapterMessage, QUEUE_DEPTH>;

/// Channel plus the overflow list for callbacks that found it full.
///
/// Overflow entries are always younger than everything in the channel, and
/// while the list is non-empty every lossless post goes to its tail, so the
/// consumer sees one FIFO order.
struct Shared {
    channel: MessageChannel,
    overflow: Mutex<VecDeque<AdapterMessage>>,
}

impl Shared {
    fn overflow(&self) -> MutexGuard<'_, VecDeque<AdapterMessage>> {
        self.overflow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move overflow entries into the channel while it has room.
    fn refill(&self) {
        let mut overflow = self.overflow();
        while let Some(msg) = overflow.pop_front() {
            if let Err(TrySendError::Full(msg)) = self.channel.try_send(msg) {
                overflow.push_front(msg);
                break;
            }
        }
    }
}

/// Owner side of the queue: creates senders, hands the receiver to the loop.
pub struct MessageQueue {
    shared: Arc<Shared>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                channel: Channel::new(),
                overflow: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn sender(&self) -> MessageSender {
        MessageSender {
            shared: self.shared.clone(),
        }
    }

    /// Consumer handle for the adapter loop.
    pub fn receiver(&self) -> MessageReceiver {
        MessageReceiver {
            shared: self.shared.clone(),
        }
    }

    /// Non-blocking receive (used by synchronous drivers and tests).
    pub fn try_recv(&self) -> Option<AdapterMessage> {
        self.shared.refill();
        self.shared.channel.try_receive().ok()
    }

    /// Callbacks waiting for room in the channel.
    pub fn overflow_len(&self) -> usize {
        self.shared.overflow().len()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-consumer end of the queue.
pub struct MessageReceiver {
    shared: Arc<Shared>,
}

impl MessageReceiver {
    /// Wait for the next message in arrival order.
    pub async fn recv(&self) -> AdapterMessage {
        self.shared.refill();
        self.shared.channel.receive().await
    }
}

/// Cloneable, thread-safe producer handle.
#[derive(Clone)]
pub struct MessageSender {
    shared: Arc<Shared>,
}

impl MessageSender {
    /// Enqueue a droppable message.  Returns `false` (and logs) if the
    /// queue is full.
    pub fn post(&self, msg: AdapterMessage) -> bool {
        let overflow = self.shared.overflow();
        if !overflow.is_empty() {
            warn!("{}, dropping {:?}", Error::QueueFull, msg);
            return false;
        }
        match self.shared.channel.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!("{}, dropping {:?}", Error::QueueFull, msg);
                false
            }
        }
    }

    /// Enqueue a message that must not be lost.  Never blocks, so it is
    /// safe from the adapter loop's own thread: when the channel is full
    /// the message waits in the overflow list.
    pub fn post_lossless(&self, msg: AdapterMessage) {
        let mut overflow = self.shared.overflow();
        if overflow.is_empty() {
            match self.shared.channel.try_send(msg) {
                Ok(()) => return,
                Err(TrySendError::Full(msg)) => {
                    debug!("Queue full, holding {:?} in overflow", msg);
                    overflow.push_back(msg);
                }
            }
        } else {
            overflow.push_back(msg);
        }
    }

    pub fn request(&self, req: AdapterRequest) -> bool {
        self.post(AdapterMessage::Request(req))
    }

    pub fn gateway(&self, ev: GatewayEvent) {
        self.post_lossless(AdapterMessage::Gateway(ev));
    }

    pub fn profile_registered(&self, name: &str) {
        self.post_lossless(AdapterMessage::ProfileRegistered(bounded(name)));
    }

    pub fn profile_unregistered(&self, name: &str) {
        self.post_lossless(AdapterMessage::ProfileUnregistered(bounded(name)));
    }

    /// Platform alarm callback.
    pub fn alarm_fired(&self, id: AlarmId) {
        self.post_lossless(AdapterMessage::AlarmFired(id));
    }

    pub fn profile_state(&self, name: &str, state: ProfileState) {
        self.post_lossless(AdapterMessage::ProfileStateChanged {
            name: bounded(name),
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_fifo() {
        let q = MessageQueue::new();
        let tx = q.sender();
        assert!(tx.request(AdapterRequest::Enable { quiet_mode: false }));
        tx.gateway(GatewayEvent::StackPoweredOn);
        assert!(matches!(q.try_recv(), Some(AdapterMessage::Request(_))));
        assert!(matches!(
            q.try_recv(),
            Some(AdapterMessage::Gateway(GatewayEvent::StackPoweredOn))
        ));
        assert!(q.try_recv().is_none());
    }

    #[test]
    fn full_queue_drops() {
        let q = MessageQueue::new();
        let tx = q.sender();
        for _ in 0..QUEUE_DEPTH {
            assert!(tx.post(AdapterMessage::ReadEnergyInfo));
        }
        assert!(!tx.post(AdapterMessage::ReadEnergyInfo));
    }

    #[test]
    fn callbacks_survive_a_full_queue_in_order() {
        let q = MessageQueue::new();
        let tx = q.sender();
        for _ in 0..QUEUE_DEPTH {
            assert!(tx.post(AdapterMessage::ReadEnergyInfo));
        }
        tx.profile_state("A2DP", ProfileState::Stopped);
        tx.gateway(GatewayEvent::StackPoweredOff);
        assert_eq!(q.overflow_len(), 2);
        // Droppable traffic may not overtake held callbacks.
        assert!(!tx.request(AdapterRequest::Disable));

        let msgs: Vec<_> = std::iter::from_fn(|| q.try_recv()).collect();
        assert_eq!(msgs.len(), QUEUE_DEPTH + 2);
        assert!(matches!(
            msgs[QUEUE_DEPTH],
            AdapterMessage::ProfileStateChanged { state: ProfileState::Stopped, .. }
        ));
        assert!(matches!(
            msgs[QUEUE_DEPTH + 1],
            AdapterMessage::Gateway(GatewayEvent::StackPoweredOff)
        ));
        assert_eq!(q.overflow_len(), 0);
    }

    #[test]
    fn receiver_drains_overflow() {
        let q = MessageQueue::new();
        let tx = q.sender();
        let rx = q.receiver();
        for _ in 0..QUEUE_DEPTH {
            tx.alarm_fired(AlarmId(1));
        }
        tx.post_lossless(AdapterMessage::Quit);
        let mut seen = 0;
        loop {
            let msg = futures_lite::future::block_on(rx.recv());
            seen += 1;
            if matches!(msg, AdapterMessage::Quit) {
                break;
            }
        }
        assert_eq!(seen, QUEUE_DEPTH + 1);
    }

    #[test]
    fn senders_share_one_queue() {
        let q = MessageQueue::new();
        let a = q.sender();
        let b = a.clone();
        a.profile_registered("GATT");
        b.profile_state("GATT", ProfileState::Running);
        assert!(matches!(q.try_recv(), Some(AdapterMessage::ProfileRegistered(n)) if n == "GATT"));
        assert!(matches!(
            q.try_recv(),
            Some(AdapterMessage::ProfileStateChanged { state: ProfileState::Running, .. })
        ));
    }
}
