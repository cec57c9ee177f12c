//! sonixflash CLI - Command-line tool for flashing SONIX SN32F2xx chips.
//!
//! ## Features
//!
//! - Flash application firmware at any offset
//! - Flash a jumploader padded to its reserved region
//! - OEM reboot into the bootloader (sonix, evision, hfd)
//! - Known ISP VID/PID table (text or JSON)
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Result, anyhow, bail};
use clap::{ArgAction, Parser};
use clap_complete::Shell;
use env_logger::Env;
use log::debug;
use sonixflash::RebootMagic;
use std::env;
use std::path::PathBuf;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if colors and animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;

use commands::flash::FlashArgs;
use config::Config;

/// sonixflash - Flash SONIX SN32F2xx microcontrollers over the USB ISP bootloader.
///
/// Environment variables:
///   SONIXFLASH_VIDPID   - Default VID/PID pair
///   SONIXFLASH_OFFSET   - Default flash offset
///   SONIXFLASH_REBOOT   - Default OEM reboot variant (sonix, evision, hfd)
#[derive(Parser)]
#[command(name = "sonixflash")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Example: sonixflash --vidpid 0c45/7040 --offset 0x200 --file fw.bin")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Device VID/PID, e.g. 0c45/7040, 0c45:7040 or "0x0c45 0x7040".
    #[arg(short = 'v', long, env = "SONIXFLASH_VIDPID", value_parser = parse_vid_pid)]
    vidpid: Option<VidPid>,

    /// Flash offset (decimal, 0x hex or 0 octal).
    #[arg(short, long, env = "SONIXFLASH_OFFSET", value_parser = parse_offset)]
    offset: Option<u32>,

    /// Firmware binary to flash.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Treat the file as a jumploader (padded to the 0x200-byte region).
    #[arg(short, long)]
    jumploader: bool,

    /// Reboot a running device into the bootloader first (sonix, evision, hfd).
    #[arg(short, long, env = "SONIXFLASH_REBOOT", value_parser = parse_reboot)]
    reboot: Option<RebootMagic>,

    /// Disable the SN32F26x offset safety check.
    #[arg(short = 'k', long)]
    nooffset: bool,

    /// List the known ISP VID/PID pairs and exit.
    #[arg(short = 'l', long)]
    list_vidpid: bool,

    /// Print the VID/PID list as JSON.
    #[arg(long, requires = "list_vidpid")]
    json: bool,

    /// Dump every HID report (same as -vv).
    #[arg(short, long)]
    debug: bool,

    /// Verbose output (-vv for trace). Has no short form, -v selects the device.
    #[arg(long, action = ArgAction::Count)]
    verbose: u8,

    /// Quiet mode, only warnings and errors.
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,

    /// Path to a config file instead of the default lookup.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Print a shell completion script and exit.
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

/// Selected USB device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VidPid {
    vid: u16,
    pid: u16,
}

impl std::fmt::Display for VidPid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}/{:04x}", self.vid, self.pid)
    }
}

/// Parse an integer with C `strtol(.., 0)` base rules: `0x` hex, leading `0`
/// octal, otherwise decimal. The whole string must be consumed.
fn parse_int_auto(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() {
        return Err(format!("'{s}' is not a number"));
    }
    u32::from_str_radix(digits, radix).map_err(|e| format!("'{s}' is not a valid number: {e}"))
}

fn parse_offset(s: &str) -> Result<u32, String> {
    parse_int_auto(s)
}

fn parse_reboot(s: &str) -> Result<RebootMagic, String> {
    RebootMagic::from_name(s).map_err(|e| e.to_string())
}

/// Parse a hex ID of at most four digits, with an optional `0x` prefix.
fn parse_hex_id(s: &str) -> Option<u16> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

fn parse_vid_pid(s: &str) -> Result<VidPid, String> {
    let s = s.trim();

    // Canonical form: hex VVVV/PPPP or VVVV:PPPP.
    let hex_pair = s
        .split_once('/')
        .or_else(|| s.split_once(':'))
        .and_then(|(vid, pid)| Some((parse_hex_id(vid)?, parse_hex_id(pid)?)));

    let (vid, pid) = match hex_pair {
        Some(pair) => pair,
        None => {
            // Fallback: two numbers separated by any of ":/, ", C base rules.
            let parts: Vec<&str> = s
                .split([':', '/', ',', ' '])
                .filter(|p| !p.is_empty())
                .collect();
            let [vid, pid] = parts.as_slice() else {
                return Err(format!("'{s}' is not a VID/PID pair"));
            };
            let vid = parse_int_auto(vid)?;
            let pid = parse_int_auto(pid)?;
            let vid = u16::try_from(vid).map_err(|_| format!("VID {vid:#x} does not fit in 16 bits"))?;
            let pid = u16::try_from(pid).map_err(|_| format!("PID {pid:#x} does not fit in 16 bits"))?;
            (vid, pid)
        },
    };

    if vid == 0 || pid == 0 {
        return Err(format!("'{s}': VID and PID must be non-zero"));
    }
    Ok(VidPid { vid, pid })
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors exit 1; --help and --version print to stdout and exit 0.
            let _ = e.print();
            std::process::exit(i32::from(e.use_stderr()));
        },
    };

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let verbose = if cli.debug { 2 } else { cli.verbose };
    let log_level = if cli.quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(verbose >= 2)
        .format_timestamp(if verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "sonixflash v{} (verbose level: {verbose})",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(shell) = cli.completions {
        commands::completions::cmd_completions(shell);
        return Ok(());
    }

    if cli.list_vidpid {
        return commands::list::cmd_list_vidpid(cli.json);
    }

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    let args = resolve_flash_args(cli, &config)?;
    commands::flash::cmd_flash(&args)
}

/// Merge flags and environment (already folded in by clap) over the config file.
fn resolve_flash_args(cli: &Cli, config: &Config) -> Result<FlashArgs> {
    let Some(file) = cli.file.clone() else {
        bail!("No firmware file given, use --file <FILE> (see --help)");
    };

    let device = match (cli.vidpid, config.device.vidpid.as_deref()) {
        (Some(device), _) => device,
        (None, Some(value)) => {
            parse_vid_pid(value).map_err(|e| anyhow!("Invalid vidpid in config file: {e}"))?
        },
        (None, None) => bail!("No device selected, use --vidpid <VID/PID> (see --list-vidpid)"),
    };

    let reboot = match (cli.reboot, config.device.reboot.as_deref()) {
        (Some(magic), _) => Some(magic),
        (None, Some(value)) => {
            Some(parse_reboot(value).map_err(|e| anyhow!("Invalid reboot in config file: {e}"))?)
        },
        (None, None) => None,
    };

    let offset = cli
        .offset
        .or(config.flash.offset)
        .unwrap_or(0);

    Ok(FlashArgs {
        vid: device.vid,
        pid: device.pid,
        file,
        offset,
        jumploader: cli.jumploader,
        reboot,
        skip_offset_check: cli.nooffset || config.flash.no_offset_check,
        quiet: cli.quiet,
    })
}
