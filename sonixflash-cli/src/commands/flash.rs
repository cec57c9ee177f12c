//! Flash command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use sonixflash::{
    DeviceKind, FirmwareImage, FlashOptions, FlashReport, HidPort, ImageKind, RebootMagic,
    SessionState, Sn32Flasher,
};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::use_fancy_output;

/// Pause after warning about a non-ISP device, to leave room for Ctrl-C.
const NON_ISP_GRACE: Duration = Duration::from_secs(3);

/// Fully resolved flash request.
#[derive(Debug, Clone)]
pub(crate) struct FlashArgs {
    pub vid: u16,
    pub pid: u16,
    pub file: PathBuf,
    pub offset: u32,
    pub jumploader: bool,
    pub reboot: Option<RebootMagic>,
    pub skip_offset_check: bool,
    pub quiet: bool,
}

/// Flash command implementation.
pub(crate) fn cmd_flash(args: &FlashArgs) -> Result<()> {
    if !args.quiet {
        eprintln!(
            "{} Firmware to flash: {} with offset {:#06x}, device {:04x}/{:04x}",
            style("📦").cyan(),
            args.file.display(),
            args.offset,
            args.vid,
            args.pid
        );
    }

    // The image is validated and padded before the device is touched.
    let kind = if args.jumploader {
        ImageKind::Jumploader
    } else {
        ImageKind::Application
    };
    let image = FirmwareImage::prepare_file(&args.file, kind)
        .with_context(|| format!("Failed to prepare firmware {}", args.file.display()))?;
    debug!(
        "Prepared {} bytes ({} reports) from {} bytes",
        image.len(),
        image.chunk_count(),
        image.original_len()
    );

    let mut flasher = Sn32Flasher::open(args.vid, args.pid).with_context(|| {
        format!(
            "Failed to open device {:04x}/{:04x} (check --list-vidpid and USB permissions)",
            args.vid, args.pid
        )
    })?;
    if !args.quiet {
        eprintln!(
            "{} Connected to {}",
            style("✓").green(),
            flasher.port().name()
        );
    }

    warn_if_not_isp(args);

    let pb = if args.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(image.chunk_count() as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message("Flashing");
        pb
    };

    let options = FlashOptions::new(args.offset)
        .with_reboot(args.reboot)
        .with_skip_offset_check(args.skip_offset_check);

    let result = flasher.flash(&image, &options, &mut |current, _total| {
        pb.set_position(current as u64);
    });

    let failed_step = match flasher.session().state {
        SessionState::Failed(step) => Some(step),
        _ => None,
    };

    let mut port = flasher.into_port();
    if let Err(e) = port.close() {
        debug!("Closing device failed: {e}");
    }

    match result {
        Ok(report) => {
            pb.finish_with_message("Complete");
            if !args.quiet {
                print_report(&report);
            }
            Ok(())
        },
        Err(err) => {
            pb.abandon();
            let step = failed_step.map_or_else(|| "flash".to_string(), |s| s.to_string());
            Err(err).with_context(|| format!("Could not flash the device ({step} failed), try again"))
        },
    }
}

/// Warn when the VID/PID is not a known SONIX ISP bootloader.
fn warn_if_not_isp(args: &FlashArgs) {
    let kind = DeviceKind::from_vid_pid(args.vid, args.pid);
    if kind.is_isp() {
        return;
    }

    if kind.needs_reboot() && args.reboot.is_none() {
        warn!(
            "{} VID detected! You probably need to use the reboot option.",
            kind.name()
        );
    }
    warn!("Flashing a non-SONIX bootloader device, you are now on your own.");
    thread::sleep(NON_ISP_GRACE);
}

fn print_report(report: &FlashReport) {
    eprintln!(
        "\n{} Device successfully flashed!",
        style("🎉").green().bold()
    );
    eprintln!(
        "   Chip:      {} ({} KiB)",
        report.chip.family,
        report.chip.rom_size_bytes / 1024
    );
    eprintln!("   Offset:    {:#06x}", report.offset);
    eprintln!("   Size:      {} bytes", report.image_len);
    let verified = if report.checksum_verified {
        style("verified").green()
    } else {
        style("not verified").yellow()
    };
    eprintln!("   Checksum:  {:#06x} ({verified})", report.checksum);
    if report.retries > 0 {
        eprintln!("   Retries:   {}", report.retries);
    }
    if !report.rebooted {
        eprintln!(
            "{} The device did not confirm the reboot, power cycle it to start the new firmware",
            style("!").yellow()
        );
    }
}
