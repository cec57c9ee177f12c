//! USB device identification.
//!
//! SONIX bootloaders enumerate under the SONIX vendor ID with one product ID
//! per bootloader generation. Keyboards running OEM firmware enumerate under
//! the keyboard vendor's IDs and must be rebooted into the bootloader first.

use crate::target::chip::ChipFamily;

/// SONIX vendor ID.
pub const SONIX_VID: u16 = 0x0C45;

/// eVision vendor ID (OEM keyboard firmware).
pub const EVISION_VID: u16 = 0x320F;

/// Apple vendor ID, used by some OEM keyboard firmwares.
pub const APPLE_VID: u16 = 0x05AC;

/// A known ISP bootloader VID/PID pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KnownDevice {
    /// Display name.
    pub name: &'static str,
    /// Chip family served by this bootloader.
    pub family: ChipFamily,
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
}

const fn sonix(name: &'static str, family: ChipFamily, pid: u16) -> KnownDevice {
    KnownDevice {
        name,
        family,
        vid: SONIX_VID,
        pid,
    }
}

/// Supported ISP bootloaders. SN32F22x/23x/24x share one PID.
pub const KNOWN_ISP_DEVICES: &[KnownDevice] = &[
    sonix("SONIX SN32F22x", ChipFamily::Sn220, 0x7900),
    sonix("SONIX SN32F23x", ChipFamily::Sn230, 0x7900),
    sonix("SONIX SN32F24x", ChipFamily::Sn240, 0x7900),
    sonix("SONIX SN32F24xB", ChipFamily::Sn240B, 0x7040),
    sonix("SONIX SN32F24xC", ChipFamily::Sn240C, 0x7160),
    sonix("SONIX SN32F26x", ChipFamily::Sn260, 0x7010),
    sonix("SONIX SN32F28x", ChipFamily::Sn280, 0x7120),
    sonix("SONIX SN32F29x", ChipFamily::Sn290, 0x7140),
];

/// Classification of a VID/PID pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// A SONIX ISP bootloader.
    SonixIsp,
    /// eVision OEM firmware.
    Evision,
    /// Apple VID OEM firmware.
    Apple,
    /// Anything else.
    Unknown,
}

impl DeviceKind {
    /// Classify a VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        if is_known_isp(vid, pid) {
            return Self::SonixIsp;
        }
        match vid {
            EVISION_VID => Self::Evision,
            APPLE_VID => Self::Apple,
            _ => Self::Unknown,
        }
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SonixIsp => "SONIX ISP bootloader",
            Self::Evision => "eVision",
            Self::Apple => "Apple",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the device is already in ISP mode.
    pub fn is_isp(&self) -> bool {
        matches!(self, Self::SonixIsp)
    }

    /// Whether the device most likely runs OEM firmware that needs `--reboot`.
    pub fn needs_reboot(&self) -> bool {
        matches!(self, Self::Evision | Self::Apple)
    }
}

/// Whether `vid`/`pid` is a known SONIX ISP bootloader.
pub fn is_known_isp(vid: u16, pid: u16) -> bool {
    KNOWN_ISP_DEVICES
        .iter()
        .any(|d| d.vid == vid && d.pid == pid)
}

/// Format the known device table for display.
pub fn format_known_devices() -> Vec<String> {
    let mut result = Vec::with_capacity(KNOWN_ISP_DEVICES.len() + 4);
    let rule = format!("+{:-<17}+{:-<12}+{:-<12}+", "", "", "");

    result.push(rule.clone());
    result.push(format!("| {:<15} | {:<10} | {:<10} |", "Device", "VID", "PID"));
    result.push(rule.clone());
    for device in KNOWN_ISP_DEVICES {
        result.push(format!(
            "| {:<15} | 0x{:04X}     | 0x{:04X}     |",
            device.name, device.vid, device.pid
        ));
    }
    result.push(rule);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_from_vid_pid() {
        assert_eq!(DeviceKind::from_vid_pid(0x0C45, 0x7900), DeviceKind::SonixIsp);
        assert_eq!(DeviceKind::from_vid_pid(0x0C45, 0x7040), DeviceKind::SonixIsp);
        assert_eq!(DeviceKind::from_vid_pid(0x0C45, 0x7140), DeviceKind::SonixIsp);
        assert_eq!(DeviceKind::from_vid_pid(0x320F, 0x5013), DeviceKind::Evision);
        assert_eq!(DeviceKind::from_vid_pid(0x05AC, 0x024F), DeviceKind::Apple);
        assert_eq!(DeviceKind::from_vid_pid(0x1234, 0x5678), DeviceKind::Unknown);
    }

    #[test]
    fn test_unknown_sonix_pid_is_not_isp() {
        // SONIX VID alone does not mean bootloader mode.
        assert_eq!(DeviceKind::from_vid_pid(0x0C45, 0x652F), DeviceKind::Unknown);
        assert!(!is_known_isp(0x0C45, 0x652F));
    }

    #[test]
    fn test_reboot_hint() {
        assert!(DeviceKind::Evision.needs_reboot());
        assert!(DeviceKind::Apple.needs_reboot());
        assert!(!DeviceKind::SonixIsp.needs_reboot());
        assert!(!DeviceKind::Unknown.needs_reboot());
        assert!(DeviceKind::SonixIsp.is_isp());
    }

    #[test]
    fn test_known_devices_cover_every_family() {
        for family in [
            ChipFamily::Sn220,
            ChipFamily::Sn230,
            ChipFamily::Sn240,
            ChipFamily::Sn240B,
            ChipFamily::Sn240C,
            ChipFamily::Sn260,
            ChipFamily::Sn280,
            ChipFamily::Sn290,
        ] {
            assert!(KNOWN_ISP_DEVICES.iter().any(|d| d.family == family));
        }
    }

    #[test]
    fn test_format_known_devices() {
        let lines = format_known_devices();
        assert_eq!(lines.len(), KNOWN_ISP_DEVICES.len() + 4);
        assert!(lines[1].contains("Device"));
        assert!(lines[3].contains("SONIX SN32F22x"));
        assert!(lines[3].contains("0x0C45"));
        assert!(lines[3].contains("0x7900"));
        assert!(lines.iter().any(|l| l.contains("SONIX SN32F24xB") && l.contains("0x7040")));
        // Every row has the same width.
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }
}
