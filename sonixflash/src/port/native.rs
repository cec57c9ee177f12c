//! Native HID transport using the `hidapi` crate.
//!
//! hidapi expects the report ID as the first byte of every feature report
//! buffer. SN32 bootloaders use unnumbered reports, so ID 0 is prepended on
//! send and stripped on receive.

use {
    crate::{
        error::{Error, Result},
        port::HidPort,
        protocol::{REPORT_SIZE, Report},
        retry::RetryPolicy,
    },
    hidapi::{HidApi, HidDevice},
    log::{debug, trace},
};

/// Report ID used for unnumbered feature reports.
const REPORT_ID: u8 = 0;

/// Wire buffer: report ID followed by the payload.
type WireBuffer = [u8; REPORT_SIZE + 1];

/// Native USB HID device.
pub struct NativePort {
    device: Option<HidDevice>,
    name: String,
}

impl NativePort {
    /// Open the first device matching `vid`/`pid`.
    pub fn open(vid: u16, pid: u16) -> Result<Self> {
        let api = HidApi::new()?;
        let device = api.open(vid, pid).map_err(|e| {
            debug!("hid_open({vid:04x}:{pid:04x}) failed: {e}");
            Error::DeviceNotFound { vid, pid }
        })?;

        let name = match device.get_product_string() {
            Ok(Some(product)) => format!("{product} ({vid:04x}:{pid:04x})"),
            _ => format!("{vid:04x}:{pid:04x}"),
        };

        Ok(Self {
            device: Some(device),
            name,
        })
    }

    /// Open a device, retrying while it is not (yet) present.
    ///
    /// A device that just rebooted into the bootloader can take a few seconds
    /// to enumerate. Only [`Error::DeviceNotFound`] is retried; exhausting the
    /// attempts returns the last `DeviceNotFound`.
    pub fn open_with_retry(vid: u16, pid: u16, policy: RetryPolicy) -> Result<Self> {
        let mut retries = 0;
        let result = policy.run_while(
            "open device",
            &mut retries,
            |e| matches!(e, Error::DeviceNotFound { .. }),
            || Self::open(vid, pid),
        );

        match result {
            Ok(port) => {
                if retries > 0 {
                    debug!("Device opened after {retries} retries");
                }
                Ok(port)
            },
            Err(Error::DeviceUnresponsive { last, .. }) => Err(*last),
            Err(e) => Err(e),
        }
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::DeviceBusy("device closed".into()))
    }
}

impl HidPort for NativePort {
    fn send_feature_report(&mut self, report: &Report) -> Result<()> {
        let mut wire: WireBuffer = [0; REPORT_SIZE + 1];
        wire[0] = REPORT_ID;
        wire[1..].copy_from_slice(report);

        trace!("Sending feature report 0x{:02x} to {}", report[0], self.name);
        self.device()?
            .send_feature_report(&wire)
            .map_err(|e| Error::DeviceBusy(format!("writing command 0x{:02x}: {e}", report[0])))
    }

    fn get_feature_report(&mut self, report: &mut Report) -> Result<usize> {
        let mut wire: WireBuffer = [0; REPORT_SIZE + 1];
        wire[0] = REPORT_ID;

        let n = self
            .device()?
            .get_feature_report(&mut wire)
            .map_err(|e| Error::DeviceBusy(format!("reading feature report: {e}")))?;

        if n != wire.len() {
            return Err(Error::ShortReport {
                expected: REPORT_SIZE,
                actual: n.saturating_sub(1),
            });
        }

        report.copy_from_slice(&wire[1..]);
        Ok(REPORT_SIZE)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes it.
        self.device
            .take();
        Ok(())
    }
}
