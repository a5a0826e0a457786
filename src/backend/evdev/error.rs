use std::io;

/// Error returned from the device's read loop.
///
/// Per spec §7, any variant here means the caller must deregister the
/// device's file descriptor from the event loop; it must not tear the
/// device object down itself.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The underlying read failed for a reason other than would-block or interrupted.
    #[error("reading the event device failed: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of probing a newly created device's capabilities.
///
/// Not an error: an unhandled device is a device whose capability probe
/// found nothing this pipeline can make sense of (spec §4.7, §7).
#[derive(Debug)]
pub enum DeviceOutcome<T> {
    /// The device grants at least one seat capability and is ready to dispatch.
    Handled(T),
    /// The device's capability probe found nothing to grant; caller should drop it.
    Unhandled,
}

impl<T> DeviceOutcome<T> {
    /// Returns the handled device, if any.
    pub fn handled(self) -> Option<T> {
        match self {
            DeviceOutcome::Handled(device) => Some(device),
            DeviceOutcome::Unhandled => None,
        }
    }
}
