//! Transport error types

use thiserror::Error;

/// Errors surfaced by the device transport.
///
/// Each failure mode gets its own variant so callers can branch on kind
/// (re-request permission vs. re-plug the device) instead of parsing
/// messages.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Device enumeration itself failed (distinct from "no device found")
    #[error("Device scan failed: {0}")]
    Scan(#[source] rusb::Error),

    /// A required argument was missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No device with the given name is currently on the bus
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The permission request could not be issued
    #[error("Failed to issue permission request: {0}")]
    Permission(String),

    /// Permission for the device has not been granted
    #[error("No permission for device {0}")]
    NoPermission(String),

    /// A session is already open; close it before opening another
    #[error("Session already open for {0}")]
    SessionAlreadyOpen(String),

    /// The OS refused to open a connection to the device
    #[error("Failed to open device: {0}")]
    Connection(#[source] rusb::Error),

    /// The interface claim failed; the connection was not retained
    #[error("Failed to claim interface {interface}: {source}")]
    ClaimInterface {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// No device session is open
    #[error("No device connection")]
    NoConnection,

    /// The session holds no claimed interface
    #[error("No interface claimed")]
    InterfaceNotClaimed,

    /// The claimed interface exposes no endpoints
    #[error("No endpoint on claimed interface")]
    NoEndpoint,

    /// A bulk write to the device failed
    #[error("USB write failed: {0}")]
    Write(#[source] rusb::Error),

    /// A bulk read from the device failed
    #[error("USB read failed: {0}")]
    Read(#[source] rusb::Error),
}

/// Type alias for transport results
pub type Result<T> = std::result::Result<T, TransportError>;
