//! Framed transport over the open session
//!
//! Payloads travel as fixed 64-byte reports. Writes segment the input into
//! whole reports, zero-padding the final one; reads request exactly one
//! report and return only the bytes the transfer delivered. Endpoints are
//! re-resolved from the active configuration on every transfer: the layout
//! cannot change within a session, but fresh resolution is the simplest
//! correct policy.

use crate::device::{POLL_TIMEOUT, REPORT_SIZE, TRANSFER_TIMEOUT};
use crate::error::{Result, TransportError};
use crate::session::DeviceSession;
use rusb::Direction;
use tracing::{debug, trace};

/// Write a payload as zero-padded reports with the long transfer timeout.
///
/// Returns the summed count the transport reported, which on a healthy
/// device equals the padded total (not the input length). A failed chunk
/// aborts the whole send; earlier chunks are not reported back.
pub(crate) fn send(session: &DeviceSession, data: &[u8]) -> Result<usize> {
    let endpoint = resolve_endpoint(session, Direction::Out)?;
    debug!(
        "Sending {} byte(s) as {} report(s) via endpoint {:#04x}",
        data.len(),
        data.len().div_ceil(REPORT_SIZE),
        endpoint
    );

    write_reports(data, |report| {
        session
            .handle()
            .write_bulk(endpoint, report, TRANSFER_TIMEOUT)
            .map_err(TransportError::Write)
    })
}

/// Blocking read of at most one report
pub(crate) fn read_blocking(session: &DeviceSession) -> Result<Vec<u8>> {
    let endpoint = resolve_endpoint(session, Direction::In)?;

    let mut report = [0u8; REPORT_SIZE];
    let len = session
        .handle()
        .read_bulk(endpoint, &mut report, TRANSFER_TIMEOUT)
        .map_err(TransportError::Read)?;

    debug!("Read {} byte(s) from endpoint {:#04x}", len, endpoint);
    Ok(report[..len].to_vec())
}

/// Best-effort short-timeout read.
///
/// Missing endpoint, empty transfer, and transfer faults all collapse to
/// "no data available": this entry point feeds pollers that cannot act on
/// failure differently than on absence.
pub(crate) fn poll_nonblocking(session: &DeviceSession) -> Vec<u8> {
    let Ok(endpoint) = resolve_endpoint(session, Direction::In) else {
        return Vec::new();
    };

    let mut report = [0u8; REPORT_SIZE];
    match session.handle().read_bulk(endpoint, &mut report, POLL_TIMEOUT) {
        Ok(len) if len > 0 => report[..len].to_vec(),
        Ok(_) => Vec::new(),
        Err(e) => {
            trace!("Poll read returned nothing: {}", e);
            Vec::new()
        }
    }
}

/// Segment `data` into zero-padded reports and hand each to `write`.
///
/// Every report passed to `write` is exactly [`REPORT_SIZE`] bytes; the
/// final one carries `data.len() % REPORT_SIZE` payload bytes (a full
/// report when the length is a nonzero multiple). Empty input writes
/// nothing and returns 0.
pub fn write_reports<F>(data: &[u8], mut write: F) -> Result<usize>
where
    F: FnMut(&[u8; REPORT_SIZE]) -> Result<usize>,
{
    let mut total = 0;
    for chunk in data.chunks(REPORT_SIZE) {
        let mut report = [0u8; REPORT_SIZE];
        report[..chunk.len()].copy_from_slice(chunk);
        total += write(&report)?;
    }
    Ok(total)
}

/// Select an endpoint address from an interface's endpoint list.
///
/// First endpoint with the wanted direction wins; when none matches, the
/// first endpoint is attempted anyway (some interfaces expose a single
/// bidirectional-looking list). `None` only for an empty list.
pub fn pick_endpoint(endpoints: &[(u8, Direction)], wanted: Direction) -> Option<u8> {
    endpoints
        .iter()
        .find(|(_, direction)| *direction == wanted)
        .or_else(|| endpoints.first())
        .map(|(address, _)| *address)
}

/// Resolve an endpoint of the claimed interface, fresh per transfer
fn resolve_endpoint(session: &DeviceSession, wanted: Direction) -> Result<u8> {
    let interface = session
        .interface()
        .ok_or(TransportError::InterfaceNotClaimed)?;

    let endpoints = interface_endpoints(session, interface)?;
    pick_endpoint(&endpoints, wanted).ok_or(TransportError::NoEndpoint)
}

/// Endpoint addresses and directions of the claimed interface
fn interface_endpoints(session: &DeviceSession, interface: u8) -> Result<Vec<(u8, Direction)>> {
    let config = session
        .handle()
        .device()
        .active_config_descriptor()
        .map_err(|_| TransportError::NoEndpoint)?;

    let mut endpoints = Vec::new();
    for intf in config.interfaces() {
        if intf.number() != interface {
            continue;
        }
        if let Some(descriptor) = intf.descriptors().next() {
            for endpoint in descriptor.endpoint_descriptors() {
                endpoints.push((endpoint.address(), endpoint.direction()));
            }
        }
    }

    Ok(endpoints)
}
