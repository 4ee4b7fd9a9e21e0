//! Test utilities for bitbox-usb
//!
//! Mock descriptors, synthetic endpoint layouts, and an async timeout
//! wrapper, shared by unit and integration tests.
//!
//! # Example
//!
//! ```
//! use transport::test_utils::mock_descriptor;
//!
//! let device = mock_descriptor(4);
//! assert_eq!(device.device_name, "001-004");
//! ```

use crate::device::DeviceDescriptor;
use rusb::Direction;
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock DeviceDescriptor for testing
///
/// The device name follows the `BBB-DDD` bus/address rendering, always on
/// bus 1.
pub fn mock_descriptor(address: u8) -> DeviceDescriptor {
    DeviceDescriptor {
        product: "BitBox02".to_string(),
        serial_number: format!("v9.21.0-{:06}", address),
        device_name: format!("{:03}-{:03}", 1, address),
    }
}

/// A typical BitBox02 endpoint layout: one IN and one OUT bulk endpoint
pub fn mock_endpoint_layout() -> Vec<(u8, Direction)> {
    vec![(0x81, Direction::In), (0x01, Direction::Out)]
}

/// An interface that only exposes IN endpoints (no direction match for OUT)
pub fn mock_in_only_layout() -> Vec<(u8, Direction)> {
    vec![(0x81, Direction::In), (0x82, Direction::In)]
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
