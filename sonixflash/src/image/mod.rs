//! Firmware image handling.

pub mod firmware;

pub use firmware::{FirmwareImage, ImageKind, MIN_FIRMWARE, pad_to_report, prepared_len};
