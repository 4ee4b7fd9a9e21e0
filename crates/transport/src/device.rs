//! Device identity and fixed transport constants
//!
//! A `DeviceDescriptor` is an immutable snapshot of one enumerated device.
//! It is never owned by a session; callers re-resolve the device by its
//! `device_name` whenever they need a live handle.

use rusb::{Context, Device};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// BitBox02 USB vendor ID
pub const VENDOR_ID: u16 = 0x03eb;

/// BitBox02 USB product ID
pub const PRODUCT_ID: u16 = 0x2403;

/// Fixed HID report size; the atomic unit of transfer in both directions
pub const REPORT_SIZE: usize = 64;

/// Interface claimed on open (the device exposes its HID on the first one)
pub const INTERFACE_INDEX: u8 = 0;

/// Bulk transfer timeout, sized for on-device password entry mid-transfer
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Timeout for the best-effort poll read
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Product string reported when the device has none
const PRODUCT_PLACEHOLDER: &str = "BitBox02";

/// Serial string reported when the device has none
const SERIAL_PLACEHOLDER: &str = "unknown";

/// Snapshot of one discovered device
///
/// `device_name` is the platform path used to re-resolve the device later
/// (rendered as the libusb bus/address pair, e.g. `001-004`). The product
/// and serial strings fall back to placeholders when the device does not
/// report them or cannot be opened to read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Human-readable product name
    pub product: String,
    /// Device-reported serial number
    pub serial_number: String,
    /// Opaque platform device path, stable while the device stays plugged
    pub device_name: String,
}

impl DeviceDescriptor {
    /// Snapshot a descriptor from an enumerated device.
    ///
    /// String descriptors require an open handle; if the device cannot be
    /// opened (e.g. no permission yet) the placeholders are used. This
    /// mirrors enumeration on hosts where string reads are a privilege.
    pub(crate) fn snapshot(device: &Device<Context>) -> Self {
        let strings = device
            .open()
            .ok()
            .and_then(|handle| read_device_strings(device, &handle));

        let (product, serial_number) = strings.unwrap_or((None, None));

        Self {
            product: product.unwrap_or_else(|| PRODUCT_PLACEHOLDER.to_string()),
            serial_number: serial_number.unwrap_or_else(|| SERIAL_PLACEHOLDER.to_string()),
            device_name: device_name(device),
        }
    }
}

/// Render the platform device path for an enumerated device
pub(crate) fn device_name(device: &Device<Context>) -> String {
    format!("{:03}-{:03}", device.bus_number(), device.address())
}

/// Read product and serial string descriptors through an open handle
fn read_device_strings(
    device: &Device<Context>,
    handle: &rusb::DeviceHandle<Context>,
) -> Option<(Option<String>, Option<String>)> {
    let descriptor = device.device_descriptor().ok()?;

    let product = descriptor
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let serial_number = descriptor
        .serial_number_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    Some((product, serial_number))
}
