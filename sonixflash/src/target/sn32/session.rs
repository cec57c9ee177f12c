//! Per-flash session state and tunables.

use crate::protocol::RebootMagic;
use crate::retry::RetryPolicy;
use crate::target::chip::{ChipDescriptor, CodeSecurityLevel};
use std::fmt;
use std::time::Duration;

/// Timing and retry tunables for a flash session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Policy for feature report reads.
    pub read_retry: RetryPolicy,
    /// Policy for feature report writes.
    pub write_retry: RetryPolicy,
    /// Policy for the identification request.
    pub init_retry: RetryPolicy,
    /// Pause between ISP steps.
    pub step_settle: Duration,
    /// Pause before asking the device to boot the user application.
    pub reboot_settle: Duration,
    /// Pause after warning about an unsafe SN32F26x offset.
    pub unsafe_offset_warning: Duration,
    /// Extra pause before proceeding when the offset check is disabled.
    pub unsafe_offset_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_retry: RetryPolicy::READ,
            write_retry: RetryPolicy::WRITE,
            init_retry: RetryPolicy::INIT,
            step_settle: Duration::from_secs(1),
            reboot_settle: Duration::from_secs(2),
            unsafe_offset_warning: Duration::from_secs(3),
            unsafe_offset_grace: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Same attempt counts with every delay removed.
    ///
    /// Intended for simulated devices.
    pub fn immediate() -> Self {
        let defaults = Self::default();
        Self {
            read_retry: defaults.read_retry.immediate(),
            write_retry: defaults.write_retry.immediate(),
            init_retry: defaults.init_retry.immediate(),
            step_settle: Duration::ZERO,
            reboot_settle: Duration::ZERO,
            unsafe_offset_warning: Duration::ZERO,
            unsafe_offset_grace: Duration::ZERO,
        }
    }

    /// Set the write retry policy.
    #[must_use]
    pub fn with_write_retry(mut self, policy: RetryPolicy) -> Self {
        self.write_retry = policy;
        self
    }

    /// Set the pause between ISP steps.
    #[must_use]
    pub fn with_step_settle(mut self, delay: Duration) -> Self {
        self.step_settle = delay;
        self
    }
}

/// Caller choices for one flash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashOptions {
    /// Requested flash offset.
    pub offset: u32,
    /// OEM reboot request sent before identification.
    pub reboot: Option<RebootMagic>,
    /// Program SN32F26x at offset 0 even without a jumploader image.
    pub skip_offset_check: bool,
}

impl FlashOptions {
    /// Options for flashing at `offset`.
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Request an OEM reboot first.
    #[must_use]
    pub fn with_reboot(mut self, reboot: Option<RebootMagic>) -> Self {
        self.reboot = reboot;
        self
    }

    /// Disable the SN32F26x offset safety check.
    #[must_use]
    pub fn with_skip_offset_check(mut self, skip: bool) -> Self {
        self.skip_offset_check = skip;
        self
    }
}

/// One step of the ISP sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IspStep {
    /// OEM firmware reboot request.
    OemReboot,
    /// Bootloader identification.
    Identify,
    /// Offset override and size check.
    PreFlight,
    /// Code option table comparison.
    CodeOptionCheck,
    /// Code security reset to CS0.
    SecurityReset,
    /// Explicit flash erase.
    Erase,
    /// Program stream announcement.
    ProgramEnable,
    /// Image upload.
    ProgramStream,
    /// Completion marker and checksum verification.
    VerifyCompletion,
    /// Return to the user application.
    UserReboot,
}

impl fmt::Display for IspStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OemReboot => "OEM reboot",
            Self::Identify => "identify",
            Self::PreFlight => "pre-flight check",
            Self::CodeOptionCheck => "code option check",
            Self::SecurityReset => "security reset",
            Self::Erase => "erase",
            Self::ProgramEnable => "program enable",
            Self::ProgramStream => "program",
            Self::VerifyCompletion => "verify",
            Self::UserReboot => "user reboot",
        };
        write!(f, "{name}")
    }
}

/// Where a session is in the ISP sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Not started.
    #[default]
    Idle,
    /// Executing a step.
    Running(IspStep),
    /// Flash completed.
    Done,
    /// Aborted during a step.
    Failed(IspStep),
}

/// Mutable state of one flash operation.
///
/// Reset at the start of every flash.
#[derive(Debug, Clone, Default)]
pub struct FlashSession {
    /// Identified chip, `None` until identification succeeds.
    pub chip: Option<ChipDescriptor>,
    /// Cached code option table. The device value wins on mismatch.
    pub code_option: u16,
    /// Current code security level.
    pub security: Option<CodeSecurityLevel>,
    /// Effective flash offset.
    pub offset: u32,
    /// Transport retries consumed so far.
    pub retries: u32,
    /// Current position in the ISP sequence.
    pub state: SessionState,
}

impl FlashSession {
    /// Fresh session for a flash at `offset`.
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }
}

/// Outcome of a successful flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlashReport {
    /// Identified chip.
    pub chip: ChipDescriptor,
    /// Code option table in effect.
    pub code_option: u16,
    /// Security level reported before any reset.
    pub initial_security: CodeSecurityLevel,
    /// Offset the image was programmed at.
    pub offset: u32,
    /// Prepared image length in bytes.
    pub image_len: usize,
    /// Checksum of the streamed image.
    pub checksum: u16,
    /// Whether the device checksum matched.
    pub checksum_verified: bool,
    /// Whether the user-mode reboot request was delivered.
    pub rebooted: bool,
    /// Transport retries consumed.
    pub retries: u32,
}
