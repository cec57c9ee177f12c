//! Error types for sonixflash.

use std::io;
use thiserror::Error;

/// Result type for sonixflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sonixflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (firmware file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HID transport error.
    #[cfg(feature = "native")]
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// No device with the requested VID/PID could be opened.
    #[error("Device {vid:04x}:{pid:04x} not found (is the device connected?)")]
    DeviceNotFound {
        /// USB vendor ID.
        vid: u16,
        /// USB product ID.
        pid: u16,
    },

    /// Device busy or the feature report transfer failed.
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// Feature report shorter than a full report.
    #[error("Short report: got {actual} bytes, expected {expected}")]
    ShortReport {
        /// Expected report length.
        expected: usize,
        /// Received report length.
        actual: usize,
    },

    /// Transient failures persisted through every allowed attempt.
    #[error("Device unresponsive: {operation} failed after {attempts} attempts ({last})")]
    DeviceUnresponsive {
        /// Operation that was retried.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        last: Box<Error>,
    },

    /// Response field did not match the expected value.
    #[error("Protocol mismatch in {what}: expected {expected:#010x}, got {actual:#010x}")]
    ProtocolMismatch {
        /// Field being checked.
        what: &'static str,
        /// Expected value.
        expected: u32,
        /// Observed value.
        actual: u32,
    },

    /// Flash checksum mismatch.
    #[error("Checksum mismatch in {what}: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Step that verified the checksum.
        what: &'static str,
        /// Expected checksum.
        expected: u16,
        /// Checksum reported by the device.
        actual: u16,
    },

    /// Identity bytes do not describe a supported SN32 chip.
    #[error(
        "Unsupported chip: family {family}, bootloader version {variant}.{revision}.{sub_variant}"
    )]
    UnsupportedChip {
        /// Family byte (32 for SN32).
        family: u8,
        /// Bootloader variant byte.
        variant: u8,
        /// Bootloader revision byte.
        revision: u8,
        /// Sub-variant byte.
        sub_variant: u8,
    },

    /// Unknown code security encoding.
    #[error("Unsupported code security value: {0:#06x}")]
    UnsupportedSecurityLevel(u16),

    /// Firmware does not fit in the target region.
    #[error("Firmware too large: {size:#010x} bytes, max allowed is {max:#010x}")]
    FirmwareTooLarge {
        /// Image size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },

    /// Firmware is empty or implausibly small.
    #[error("Firmware too small: {size} bytes, minimum is {min}")]
    FirmwareTooSmall {
        /// Image size in bytes.
        size: u64,
        /// Minimum size in bytes.
        min: u64,
    },

    /// Unknown OEM reboot variant name.
    #[error("Unsupported reboot option: {0} (expected sonix, evision or hfd)")]
    InvalidRebootOption(String),
}

impl Error {
    /// Whether retrying the same transport call may succeed.
    ///
    /// Busy devices and short reads are transient; protocol and validation
    /// failures are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DeviceBusy(_) | Self::ShortReport { .. })
    }
}
