//! HID feature report transport.
//!
//! The ISP engine never talks to hidapi directly. It drives a [`HidPort`],
//! which moves whole 64-byte payloads in and out of the device:
//!
//! ```text
//! +--------------------+
//! |  ISP engine        |   64-byte logical reports
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |  HidPort trait     |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |  NativePort        |   report ID 0 + 64 bytes on the wire
//! |  (hidapi)          |
//! +--------------------+
//! ```
//!
//! Implementations own the report ID framing. The engine never sees the
//! leading report ID byte.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sonixflash::port::HidPort;
//! use sonixflash::protocol::{IspCommand, REPORT_SIZE};
//!
//! fn example<P: HidPort>(port: &mut P) -> sonixflash::Result<()> {
//!     port.send_feature_report(&IspCommand::GetFwVersion { code_option: 0 }.encode())?;
//!
//!     let mut report = [0u8; REPORT_SIZE];
//!     let n = port.get_feature_report(&mut report)?;
//!     println!("Received {n} bytes");
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use crate::error::Result;
use crate::protocol::Report;

/// A device that exchanges fixed-size HID feature reports.
pub trait HidPort {
    /// Send one 64-byte report.
    fn send_feature_report(&mut self, report: &Report) -> Result<()>;

    /// Read one 64-byte report into `report`.
    ///
    /// Returns the payload length, which is always the full report size on
    /// success. Shorter transfers are reported as [`crate::Error::ShortReport`].
    fn get_feature_report(&mut self, report: &mut Report) -> Result<usize>;

    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Close the device and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;
}

impl<P: HidPort + ?Sized> HidPort for &mut P {
    fn send_feature_report(&mut self, report: &Report) -> Result<()> {
        (**self).send_feature_report(report)
    }

    fn get_feature_report(&mut self, report: &mut Report) -> Result<usize> {
        (**self).get_feature_report(report)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(feature = "native")]
pub use native::NativePort;
