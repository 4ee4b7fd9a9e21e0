//! Permission broker
//!
//! Access to the device must be granted before a session can open. A
//! request is issued synchronously and acknowledged immediately; the
//! grant or denial arrives later through a notification path the broker
//! registered, modelled as a single-slot mailbox that is resolved at most
//! once per request/response pair. Callers either poll [`PermissionBroker::state`]
//! or await the [`PermissionTicket`] returned by the request.
//!
//! On a libusb host there is no interactive prompt: access is decided by
//! udev at open time, so the default request path probes the device with a
//! low-level open on a background thread and feeds the outcome through the
//! same mailbox a prompting platform would use. A platform with a real
//! permission UX drives [`PermissionBroker::register_request`] directly and
//! resolves the returned responder from its notification handler.

use crate::device::DeviceDescriptor;
use crate::error::{Result, TransportError};
use crate::registry::DeviceRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Per-device permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// No decision has been delivered for this device
    #[default]
    Unknown,
    /// The OS granted access
    Granted,
    /// The OS denied access; the caller must re-request
    Denied,
}

#[derive(Debug, Default)]
struct BrokerState {
    states: HashMap<String, PermissionState>,
    last_permitted: Option<DeviceDescriptor>,
    /// Generation of the standing request; a responder from a superseded
    /// request must not touch the mailbox.
    pending: Option<u64>,
    next_generation: u64,
    unregistered: bool,
}

/// Tracks permission requests and their asynchronous outcomes
pub struct PermissionBroker {
    state: Arc<Mutex<BrokerState>>,
}

/// Await handle for one permission request
///
/// Resolves to the delivered decision, or [`PermissionState::Unknown`] when
/// the request is superseded or the broker shuts down first.
#[derive(Debug)]
pub struct PermissionTicket {
    rx: oneshot::Receiver<PermissionState>,
}

impl PermissionTicket {
    /// Await the decision
    pub async fn resolved(self) -> PermissionState {
        self.rx.await.unwrap_or(PermissionState::Unknown)
    }

    /// Block the calling thread until the decision arrives.
    ///
    /// Must not be called from within an async runtime; use
    /// [`PermissionTicket::resolved`] there.
    pub fn wait(self) -> PermissionState {
        self.rx.blocking_recv().unwrap_or(PermissionState::Unknown)
    }
}

/// Delivery half of one permission request
///
/// Handed to whatever answers the request (the built-in probe thread, or a
/// platform notification handler). Consumed on resolution so the mailbox is
/// updated at most once.
#[derive(Debug)]
pub struct PermissionResponder {
    descriptor: DeviceDescriptor,
    generation: u64,
    state: Arc<Mutex<BrokerState>>,
    tx: oneshot::Sender<PermissionState>,
}

impl PermissionResponder {
    /// The device this responder answers for
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Deliver the decision.
    ///
    /// Runs under the broker lock, excluding concurrent state reads. A
    /// stale responder (superseded request or shut-down broker) is ignored.
    pub fn resolve(self, granted: bool) {
        let decision = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

            if state.unregistered || state.pending != Some(self.generation) {
                debug!(
                    "Ignoring stale permission decision for {}",
                    self.descriptor.device_name
                );
                return;
            }

            state.pending = None;
            state
                .states
                .insert(self.descriptor.device_name.clone(), decision);

            if granted {
                info!("Permission granted for {}", self.descriptor.device_name);
                state.last_permitted = Some(self.descriptor.clone());
            } else {
                warn!("Permission denied for {}", self.descriptor.device_name);
            }
        }

        // The ticket may already be dropped; the mailbox update above is
        // what open() consults either way.
        let _ = self.tx.send(decision);
    }
}

impl PermissionBroker {
    /// Create a broker with its notification listener registered
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
        }
    }

    /// Issue a permission request for a device.
    ///
    /// The device is resolved against a fresh enumeration first. The
    /// returned ticket acknowledges that the request was issued, not that
    /// permission was granted; the decision arrives asynchronously.
    pub fn request(&self, registry: &DeviceRegistry, device_name: &str) -> Result<PermissionTicket> {
        if device_name.is_empty() {
            return Err(TransportError::InvalidArgument("device name is required"));
        }

        let (device, descriptor) = registry.resolve(device_name)?;
        let (ticket, responder) = self.register_request(descriptor)?;

        // Access on libusb is decided at open time; the probe's open
        // attempt is the OS's answer to this request.
        std::thread::Builder::new()
            .name("permission-probe".to_string())
            .spawn(move || {
                let granted = match device.open() {
                    Ok(_handle) => true,
                    Err(e) => {
                        debug!("Permission probe could not open device: {}", e);
                        false
                    }
                };
                responder.resolve(granted);
            })
            .map_err(|e| TransportError::Permission(e.to_string()))?;

        Ok(ticket)
    }

    /// Register interest in a permission decision for a device.
    ///
    /// Replaces any standing request (the mailbox has a single slot). The
    /// responder must be resolved by the party that answers the request.
    pub fn register_request(
        &self,
        descriptor: DeviceDescriptor,
    ) -> Result<(PermissionTicket, PermissionResponder)> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.unregistered {
            return Err(TransportError::Permission(
                "permission listener is unregistered".to_string(),
            ));
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        state.pending = Some(generation);

        debug!(
            "Permission request registered for {} (generation {})",
            descriptor.device_name, generation
        );

        let (tx, rx) = oneshot::channel();
        let responder = PermissionResponder {
            descriptor,
            generation,
            state: Arc::clone(&self.state),
            tx,
        };

        Ok((PermissionTicket { rx }, responder))
    }

    /// Current permission state for a device name
    pub fn state(&self, device_name: &str) -> PermissionState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .states
            .get(device_name)
            .copied()
            .unwrap_or(PermissionState::Unknown)
    }

    /// The most recently granted device, if any.
    ///
    /// Kept as a convenience for callers that open right after a grant;
    /// they are still expected to re-identify the device explicitly.
    pub fn last_permitted(&self) -> Option<DeviceDescriptor> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.last_permitted.clone()
    }

    /// Unregister the notification listener.
    ///
    /// Part of process teardown; safe to call repeatedly. Pending requests
    /// are discarded and further registrations are refused.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.unregistered {
            debug!("Permission listener already unregistered");
            return;
        }
        state.unregistered = true;
        state.pending = None;
        debug!("Permission listener unregistered");
    }
}

impl Default for PermissionBroker {
    fn default() -> Self {
        Self::new()
    }
}
