//! # sonixflash
//!
//! A library for flashing SONIX SN32F2xx microcontrollers.
//!
//! This crate provides the core functionality for talking to the SN32 USB
//! ISP bootloader over HID feature reports, including:
//!
//! - ISP command/response codec
//! - Chip identification for every SN32F2xx bootloader generation
//! - Firmware image preparation (report alignment, jumploader region)
//! - The full identify, erase, program and verify sequence
//!
//! ## Supported Chips
//!
//! - SN32F22x, SN32F23x, SN32F24x
//! - SN32F24xB, SN32F24xC
//! - SN32F26x, SN32F28x, SN32F29x
//!
//! ## Features
//!
//! - `native` (default): USB HID transport via `hidapi`
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use sonixflash::{FirmwareImage, FlashOptions, ImageKind};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::prepare_file("firmware.bin".as_ref(), ImageKind::Application)?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let mut flasher = sonixflash::Sn32Flasher::open(0x0C45, 0x7040)?;
//!         let report = flasher.flash(&image, &FlashOptions::new(0x200), &mut |current, total| {
//!             println!("Flashing: {current}/{total}");
//!         })?;
//!         println!("Flashed {} with checksum {:#06x}", report.chip.family, report.checksum);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod retry;
pub mod target;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    device::{DeviceKind, KNOWN_ISP_DEVICES, KnownDevice},
    error::{Error, Result},
    image::{FirmwareImage, ImageKind},
    port::HidPort,
    protocol::{ChipIdentity, CommandType, IspCommand, IspResponse, RebootMagic},
    retry::RetryPolicy,
    target::{
        ChipDescriptor, ChipFamily, CodeSecurityLevel, FlashOptions, FlashReport, IspStep,
        SessionConfig, SessionState, Sn32Flasher,
    },
};
