//! Chip targets.
//!
//! [`chip`] holds the identification table shared by every SN32 bootloader
//! generation; [`sn32`] drives the ISP sequence.

pub mod chip;
pub mod sn32;

pub use chip::{ChipDescriptor, ChipFamily, CodeSecurityLevel};
pub use sn32::{FlashOptions, FlashReport, IspStep, SessionConfig, SessionState, Sn32Flasher};
