//! Device session lifecycle
//!
//! A [`SessionManager`] owns at most one open session: the resolved
//! descriptor, the open connection, and the claimed interface. Connection
//! and claim commit atomically from the caller's point of view; close
//! releases the interface before closing the connection and always clears
//! every field, even when teardown itself fails.
//!
//! Operations on the session are not serialized internally. The manager is
//! single-writer and caller-synchronized: issuing concurrent open, send,
//! receive, or close calls on one manager is a caller contract violation.

use crate::device::{DeviceDescriptor, INTERFACE_INDEX};
use crate::error::{Result, TransportError};
use crate::framing;
use crate::permission::{PermissionBroker, PermissionState};
use crate::registry::DeviceRegistry;
use rusb::{Context, DeviceHandle};
use tracing::{debug, info, warn};

/// The live binding of one open device
pub struct DeviceSession {
    descriptor: DeviceDescriptor,
    handle: DeviceHandle<Context>,
    interface: Option<u8>,
}

impl DeviceSession {
    /// Descriptor the session was opened from
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub(crate) fn handle(&self) -> &DeviceHandle<Context> {
        &self.handle
    }

    pub(crate) fn interface(&self) -> Option<u8> {
        self.interface
    }
}

/// Owner of the single active device session
#[derive(Default)]
pub struct SessionManager {
    session: Option<DeviceSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Whether a session is currently open
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The active session, if any
    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    /// Open a session: resolve, check permission, connect, claim.
    ///
    /// Fails without retaining anything when any step refuses; in
    /// particular a failed claim closes the just-opened connection. A
    /// second open while a session is live is rejected — callers must
    /// close first.
    pub fn open(
        &mut self,
        registry: &DeviceRegistry,
        broker: &PermissionBroker,
        device_name: &str,
    ) -> Result<()> {
        if device_name.is_empty() {
            return Err(TransportError::InvalidArgument("device name is required"));
        }

        if let Some(session) = &self.session {
            return Err(TransportError::SessionAlreadyOpen(
                session.descriptor.device_name.clone(),
            ));
        }

        let (device, descriptor) = registry.resolve(device_name)?;

        if broker.state(device_name) != PermissionState::Granted {
            return Err(TransportError::NoPermission(device_name.to_string()));
        }

        let handle = device.open().map_err(TransportError::Connection)?;

        // Interface index 0 of the active configuration; fall back to the
        // fixed number when the config descriptor is unreadable.
        let interface = device
            .active_config_descriptor()
            .ok()
            .and_then(|config| config.interfaces().next().map(|intf| intf.number()))
            .unwrap_or(INTERFACE_INDEX);

        match handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                if let Err(e) = handle.detach_kernel_driver(interface) {
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    );
                }
            }
            Ok(false) => {}
            Err(e) => {
                debug!("Could not check kernel driver status: {}", e);
            }
        }

        if let Err(e) = handle.claim_interface(interface) {
            // Dropping the handle closes the connection: either both the
            // connection and the claim are live, or neither is retained.
            drop(handle);
            return Err(TransportError::ClaimInterface {
                interface,
                source: e,
            });
        }

        info!(
            "Opened {} ({}, serial {})",
            descriptor.device_name, descriptor.product, descriptor.serial_number
        );

        self.session = Some(DeviceSession {
            descriptor,
            handle,
            interface: Some(interface),
        });
        Ok(())
    }

    /// Close the active session; a no-op when none is open.
    ///
    /// Releases the interface before closing the connection (releasing
    /// after close is unsafe on some USB stacks) and reattaches the kernel
    /// driver opportunistically. Teardown faults are logged and swallowed:
    /// the session is discarded regardless.
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("Close with no active session");
            return;
        };

        let DeviceSession {
            descriptor,
            handle,
            interface,
        } = session;

        if let Some(interface) = interface {
            if let Err(e) = handle.release_interface(interface) {
                warn!("Failed to release interface {}: {}", interface, e);
            }
            if let Err(e) = handle.attach_kernel_driver(interface) {
                debug!(
                    "Could not reattach kernel driver to interface {} (may not have been detached): {}",
                    interface, e
                );
            }
        }
        drop(handle);

        info!("Closed {}", descriptor.device_name);
    }

    /// Framed write to the device; see [`crate::framing`]
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let session = self.session.as_ref().ok_or(TransportError::NoConnection)?;
        framing::send(session, data)
    }

    /// Blocking framed read of at most one report
    pub fn read_blocking(&mut self) -> Result<Vec<u8>> {
        let session = self.session.as_ref().ok_or(TransportError::NoConnection)?;
        framing::read_blocking(session)
    }

    /// Best-effort poll read; empty on any precondition or transfer fault
    pub fn poll_nonblocking(&mut self) -> Vec<u8> {
        match &self.session {
            Some(session) => framing::poll_nonblocking(session),
            None => Vec::new(),
        }
    }
}
