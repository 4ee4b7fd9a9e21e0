//! Host-side USB transport for a BitBox02 hardware security device
//!
//! This crate discovers the device on the USB bus, obtains access to it,
//! opens a connection and claims its interface, and exchanges framed byte
//! payloads using fixed 64-byte HID reports. Transfer timeouts are sized
//! for human-in-the-loop operations such as on-device password entry.
//!
//! Control flow: [`DeviceRegistry`] enumerates, [`PermissionBroker`]
//! acquires access asynchronously, [`SessionManager`] opens and claims,
//! and the framed send/receive operations run over the open session until
//! close tears it down.
//!
//! The core is synchronous and caller-synchronized: every operation blocks
//! on the calling thread for at most its declared timeout, and nothing
//! here serializes concurrent calls on one session.

pub mod device;
pub mod error;
pub mod framing;
pub mod logging;
pub mod permission;
pub mod registry;
pub mod session;
pub mod test_utils;

pub use device::{
    DeviceDescriptor, INTERFACE_INDEX, POLL_TIMEOUT, PRODUCT_ID, REPORT_SIZE, TRANSFER_TIMEOUT,
    VENDOR_ID,
};
pub use error::{Result, TransportError};
pub use logging::setup_logging;
pub use permission::{PermissionBroker, PermissionResponder, PermissionState, PermissionTicket};
pub use registry::DeviceRegistry;
pub use session::{DeviceSession, SessionManager};
