//! Threaded runtime: the adapter loop thread, client handles and the
//! builder that wires them to the native stack adapters.
//!
//! ```text
//!  ┌───────────────┐ post ┌──────────────┐ receive ┌──────────────────────┐
//!  │ AdapterHandle │─────▶│ MessageQueue │────────▶│ "adapter-loop" thread │
//!  │ (any thread)  │      └──────────────┘         │ block_on(service loop)│
//!  └───────┬───────┘             ▲                 └──────────┬───────────┘
//!          │ atomics             │ callbacks                  │ ports
//!          ▼                     │                            ▼
//!     ServiceLink         native stack / profile host ◀── RadioStackGateway
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use embassy_sync::signal::Signal;
use log::{debug, info, warn};

use crate::app::commands::AdapterRequest;
use crate::app::ports::{EventSink, ProfileHost, RadioStackGateway, StateListener, SystemSettings};
use crate::app::service::AdapterService;
use crate::config::AdapterConfig;
use crate::diagnostics::ServiceDump;
use crate::energy::{ActivityEnergyInfo, EnergyMonitor};
use crate::error::{Error, Result};
use crate::events::{AdapterMessage, ListenerId, MessageQueue, MessageReceiver, MessageSender};
use crate::fsm::AdapterState;
use crate::link::ServiceLink;
use crate::shutdown::{ShutdownReport, ShutdownSequencer, TeardownSet};

/// Poll interval for [`AdapterHandle::wait_for_state`].
const STATE_POLL: Duration = Duration::from_millis(5);

// ───────────────────────────────────────────────────────────────
// Adapter loop
// ───────────────────────────────────────────────────────────────

/// The single consumer of the message queue.
pub struct AdapterLoop {
    thread: Option<JoinHandle<AdapterService>>,
    tx: MessageSender,
}

impl AdapterLoop {
    /// Start the service on a dedicated thread.
    pub fn spawn<H, S>(
        mut service: AdapterService,
        rx: MessageReceiver,
        tx: MessageSender,
        mut hal: H,
        mut sink: S,
    ) -> std::io::Result<Self>
    where
        H: RadioStackGateway + ProfileHost + SystemSettings + Send + 'static,
        S: EventSink + Send + 'static,
    {
        let thread = std::thread::Builder::new()
            .name("adapter-loop".into())
            .spawn(move || {
                service.start(&mut sink);
                futures_lite::future::block_on(async {
                    loop {
                        let msg = rx.recv().await;
                        if matches!(msg, AdapterMessage::Quit) {
                            break;
                        }
                        service.handle_message(msg, &mut hal, &mut sink);
                    }
                });
                info!("Adapter loop stopped in {:?}", service.state());
                service
            })?;
        Ok(Self {
            thread: Some(thread),
            tx,
        })
    }

    /// Stop the loop after the messages already queued and hand the
    /// service back.  `None` if the loop thread panicked.
    pub fn quit(mut self) -> Option<AdapterService> {
        self.tx.post_lossless(AdapterMessage::Quit);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(svc) => Some(svc),
            Err(_) => {
                warn!("Adapter loop thread panicked");
                None
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Client handle
// ───────────────────────────────────────────────────────────────

/// Thread-safe client API.  Cheap to clone.
#[derive(Clone)]
pub struct AdapterHandle {
    link: Arc<ServiceLink>,
    tx: MessageSender,
    energy: Arc<EnergyMonitor>,
    energy_timeout: Duration,
    energy_supported: bool,
}

impl AdapterHandle {
    /// Turn the adapter fully on.  `false` if refused or not queued.
    pub fn enable(&self, quiet_mode: bool) -> bool {
        self.submit(AdapterRequest::Enable { quiet_mode })
    }

    /// Bring up the low-energy stack only.
    pub fn enable_ble(&self) -> bool {
        self.submit(AdapterRequest::EnableBle)
    }

    pub fn disable(&self) -> bool {
        self.submit(AdapterRequest::Disable)
    }

    pub fn le_service_up(&self) -> bool {
        self.submit(AdapterRequest::LeServiceUp)
    }

    pub fn br_edr_down(&self) -> bool {
        self.submit(AdapterRequest::BrEdrDown)
    }

    /// Last state published by the adapter loop.
    pub fn state(&self) -> AdapterState {
        self.link.state()
    }

    pub fn set_bluetooth_disallowed(&self, disallowed: bool) {
        info!("Bluetooth disallowed: {}", disallowed);
        self.link.set_disallowed(disallowed);
    }

    pub fn is_bluetooth_disallowed(&self) -> bool {
        self.link.is_disallowed()
    }

    pub fn register_listener(&self, listener: Box<dyn StateListener + Send>) -> Option<ListenerId> {
        if !self.link.is_available() {
            return None;
        }
        let id = self.link.next_listener_id();
        self.tx
            .post(AdapterMessage::RegisterListener { id, listener })
            .then_some(id)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.link.is_available() && self.tx.post(AdapterMessage::UnregisterListener(id))
    }

    /// Fresh controller activity totals, waiting a bounded time for the
    /// controller.  `None` unless the adapter is ON and energy reporting
    /// is supported.
    pub fn request_activity_info(&self) -> Option<ActivityEnergyInfo> {
        if !self.link.is_available() || !self.energy_supported || self.state() != AdapterState::On {
            return None;
        }
        let tx = self.tx.clone();
        Some(
            self.energy
                .request(move || tx.post(AdapterMessage::ReadEnergyInfo), self.energy_timeout),
        )
    }

    /// Snapshot of the service, taken on the adapter loop.
    pub fn dump(&self, timeout: Duration) -> Option<ServiceDump> {
        let reply = Arc::new(Signal::new());
        if !self.tx.post(AdapterMessage::Dump(reply.clone())) {
            return None;
        }
        futures_lite::future::block_on(futures_lite::future::or(
            async { Some(reply.wait().await) },
            async {
                async_io_mini::Timer::after(timeout).await;
                None
            },
        ))
    }

    /// Block until the published state equals `target` or `timeout`
    /// passes.
    pub fn wait_for_state(&self, target: AdapterState, timeout: Duration) -> bool {
        let link = self.link.clone();
        futures_lite::future::block_on(futures_lite::future::or(
            async move {
                while link.state() != target {
                    async_io_mini::Timer::after(STATE_POLL).await;
                }
                true
            },
            async {
                async_io_mini::Timer::after(timeout).await;
                false
            },
        ))
    }

    /// Producer for native-stack and profile-host callbacks.
    pub fn sender(&self) -> MessageSender {
        self.tx.clone()
    }

    fn submit(&self, req: AdapterRequest) -> bool {
        if !self.link.is_available() {
            warn!("{:?} refused: {}", req, Error::Unavailable);
            return false;
        }
        if req.is_enable() && self.link.is_disallowed() {
            debug!("{:?}: not enabling, bluetooth disallowed", req);
            return false;
        }
        self.tx.request(req)
    }
}

// ───────────────────────────────────────────────────────────────
// Builder and runtime
// ───────────────────────────────────────────────────────────────

/// Assembles a runtime.  Create it first so stack adapters can be given
/// the [`sender`](Self::sender) and [`energy_monitor`](Self::energy_monitor)
/// before [`start`](Self::start).
pub struct RuntimeBuilder {
    config: AdapterConfig,
    queue: MessageQueue,
    energy: Arc<EnergyMonitor>,
    teardown: TeardownSet,
}

impl RuntimeBuilder {
    pub fn new(config: AdapterConfig) -> Self {
        let energy = Arc::new(EnergyMonitor::new(config.power_profile));
        Self {
            config,
            queue: MessageQueue::new(),
            energy,
            teardown: TeardownSet::default(),
        }
    }

    pub fn sender(&self) -> MessageSender {
        self.queue.sender()
    }

    pub fn energy_monitor(&self) -> Arc<EnergyMonitor> {
        self.energy.clone()
    }

    /// Collaborators torn down by [`AdapterRuntime::shutdown`].  The link,
    /// loop and service slots are filled in by `start`.
    #[must_use]
    pub fn teardown(mut self, set: TeardownSet) -> Self {
        self.teardown = set;
        self
    }

    pub fn start<H, S>(self, hal: H, sink: S) -> std::io::Result<AdapterRuntime>
    where
        H: RadioStackGateway + ProfileHost + SystemSettings + Send + 'static,
        S: EventSink + Send + 'static,
    {
        let link = Arc::new(ServiceLink::new(self.config.bluetooth_disallowed));
        let mut service = AdapterService::with_link(&self.config, link.clone());
        if let Some(wake) = &self.teardown.wake {
            service.attach_wake_resources(wake.clone());
        }
        let adapter_loop = AdapterLoop::spawn(
            service,
            self.queue.receiver(),
            self.queue.sender(),
            hal,
            sink,
        )?;

        let mut teardown = self.teardown;
        teardown.link = Some(link.clone());
        teardown.adapter_loop = Some(adapter_loop);
        teardown.service = None;

        let handle = AdapterHandle {
            link,
            tx: self.queue.sender(),
            energy: self.energy,
            energy_timeout: Duration::from_millis(u64::from(self.config.energy_info_timeout_ms)),
            energy_supported: self.config.energy_reporting_supported,
        };

        info!("Adapter runtime started with {} profiles", self.config.profiles.len());
        Ok(AdapterRuntime {
            handle,
            sequencer: ShutdownSequencer::new(),
            teardown: Mutex::new(teardown),
        })
    }
}

/// A running adapter service.
pub struct AdapterRuntime {
    handle: AdapterHandle,
    sequencer: ShutdownSequencer,
    teardown: Mutex<TeardownSet>,
}

impl AdapterRuntime {
    pub fn handle(&self) -> AdapterHandle {
        self.handle.clone()
    }

    /// Ordered teardown.  Only the first call does anything.
    pub fn shutdown(&self) -> Result<ShutdownReport> {
        if self.sequencer.is_cleaning_up() {
            warn!("Shutdown already in progress");
            return Err(Error::ShutdownReentry);
        }
        let mut set = self.teardown.lock().unwrap_or_else(PoisonError::into_inner);
        self.sequencer.run(&mut set)
    }

    /// The service handed back by the stopped loop, for inspection.
    pub fn with_stopped_service<R>(&self, f: impl FnOnce(&AdapterService) -> R) -> Option<R> {
        let set = self.teardown.lock().unwrap_or_else(PoisonError::into_inner);
        set.service.as_ref().map(f)
    }
}
