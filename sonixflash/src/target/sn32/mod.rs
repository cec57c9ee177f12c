//! SN32F2xx ISP bootloader support.

mod flasher;
pub mod session;

pub use flasher::Sn32Flasher;
pub use session::{FlashOptions, FlashReport, FlashSession, IspStep, SessionConfig, SessionState};
