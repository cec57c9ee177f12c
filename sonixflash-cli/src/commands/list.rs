//! Known VID/PID listing.

use anyhow::{Context, Result};
use sonixflash::{KNOWN_ISP_DEVICES, device::format_known_devices};

/// Print the known SONIX ISP bootloaders, as a table or as JSON.
pub(crate) fn cmd_list_vidpid(json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(KNOWN_ISP_DEVICES)
            .context("Failed to serialize device list")?;
        println!("{out}");
        return Ok(());
    }

    println!("Supported VID/PID pairs:");
    for line in format_known_devices() {
        println!("{line}");
    }
    Ok(())
}
