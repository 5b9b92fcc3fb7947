//! Error taxonomy.

use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("unknown mode '{0}'")]
    UnknownMode(String),

    #[error("unknown color '{0}'")]
    UnknownColor(String),

    #[error("invalid color format '{0}'")]
    InvalidColor(String),

    #[error("unexpected argument '{0}', mode options are set with --color, --rear and --duration")]
    UnexpectedArgument(String),

    #[error("invalid report: {0}")]
    InvalidReport(String),

    #[error("no ViewSonic devices found")]
    NoDeviceFound,

    #[error("device #{0} not found")]
    DeviceNotFound(usize),

    #[error("unable to access HID: {0}")]
    HidInit(String),

    #[error("device I/O failed: {0}")]
    DeviceIo(String),

    #[error("{0} (root permissions required)")]
    PermissionDenied(String),
}

impl Error {
    /// Whether this is a per-device failure a broadcast should skip over.
    pub fn is_device_io(&self) -> bool {
        matches!(self, Self::DeviceIo(_) | Self::PermissionDenied(_))
    }
}

impl From<hidapi::HidError> for Error {
    fn from(err: hidapi::HidError) -> Self {
        let msg = err.to_string();
        if msg.contains("Permission denied") || msg.contains("EACCES") || msg.contains("EPERM") {
            Self::PermissionDenied(msg)
        } else {
            Self::DeviceIo(msg)
        }
    }
}
