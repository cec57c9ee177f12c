//! SN32 ISP flashing sequence.
//!
//! ```text
//! OemReboot? -> Identify -> PreFlight -> CodeOptionCheck? -> SecurityReset?
//!            -> Erase? -> ProgramEnable -> ProgramStream -> VerifyCompletion
//!            -> UserReboot
//! ```
//!
//! Optional steps are gated by the caller options, the decoded security level
//! and the per-family flags in [`ChipDescriptor`].

use crate::error::{Error, Result};
use crate::image::{FirmwareImage, ImageKind};
use crate::port::HidPort;
use crate::protocol::isp::hex_dump;
use crate::protocol::{
    Checksum16, CommandType, IspCommand, IspResponse, REPORT_SIZE, RebootMagic, Report,
};
use crate::retry::RetryPolicy;
use crate::target::chip::{ChipDescriptor, ChipFamily, CodeSecurityLevel, JUMPLOADER_SIZE};
use crate::target::sn32::session::{
    FlashOptions, FlashReport, FlashSession, IspStep, SessionConfig, SessionState,
};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, trace, warn};
use std::thread;
use std::time::Duration;

/// SN32F2xx flasher.
///
/// Generic over the port type `P`, which must implement the `HidPort` trait.
/// One flasher drives one device; the session is reset on every flash.
pub struct Sn32Flasher<P: HidPort> {
    port: P,
    config: SessionConfig,
    session: FlashSession,
}

impl<P: HidPort> Sn32Flasher<P> {
    /// Create a new flasher with an opened device.
    pub fn new(port: P) -> Self {
        Self {
            port,
            config: SessionConfig::default(),
            session: FlashSession::default(),
        }
    }

    /// Set session tunables.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// State of the current or last session.
    pub fn session(&self) -> &FlashSession {
        &self.session
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consume the flasher and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Run the full ISP sequence for `image`.
    ///
    /// `progress` is called with `(chunks_sent, total_chunks)` after every
    /// streamed report.
    pub fn flash(
        &mut self,
        image: &FirmwareImage,
        options: &FlashOptions,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<FlashReport> {
        self.session = FlashSession::new(options.offset);

        if let Some(magic) = options.reboot {
            self.step(IspStep::OemReboot, |f| {
                f.oem_reboot(magic);
                Ok(())
            })?;
        }

        let (chip, initial_security) =
            self.step(IspStep::Identify, |f| f.identify(options.reboot.is_some()))?;
        let offset = self.step(IspStep::PreFlight, |f| f.pre_flight(&chip, image, options))?;
        self.settle();

        if chip.requires_code_option_check {
            self.step(IspStep::CodeOptionCheck, Self::code_option_check)?;
            self.settle();
        }

        if initial_security != CodeSecurityLevel::Cs0 {
            self.step(IspStep::SecurityReset, |f| {
                f.security_reset(&chip, initial_security)
            })?;
            self.settle();
        }

        if chip.requires_explicit_erase {
            self.step(IspStep::Erase, |f| f.erase(&chip))?;
            self.settle();
        }

        self.step(IspStep::ProgramEnable, |f| f.program_enable(offset, image))?;
        let (checksum, last_chunk) =
            self.step(IspStep::ProgramStream, |f| f.program_stream(image, progress))?;
        let checksum_verified = self.step(IspStep::VerifyCompletion, |f| {
            f.verify_completion(offset, checksum, last_chunk)
        })?;

        info!("Device successfully flashed");
        let rebooted = self.step(IspStep::UserReboot, |f| Ok(f.user_reboot()))?;
        self.session.state = SessionState::Done;

        Ok(FlashReport {
            chip,
            code_option: self.session.code_option,
            initial_security,
            offset,
            image_len: image.len(),
            checksum,
            checksum_verified,
            rebooted,
            retries: self.session.retries,
        })
    }

    /// Track `step` in the session state around `f`.
    fn step<T>(&mut self, step: IspStep, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.session.state = SessionState::Running(step);
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.session.state = SessionState::Failed(step);
                Err(e)
            },
        }
    }

    fn oem_reboot(&mut self, magic: RebootMagic) {
        info!("Requesting bootloader reboot ({magic})...");
        match self.send(&IspCommand::Reboot(magic), self.config.write_retry, "reboot request") {
            Ok(()) => info!("Bootloader reboot request sent"),
            // The device may already be in ISP mode; identification decides.
            Err(e) => warn!("Bootloader reboot request failed: {e}"),
        }
    }

    fn identify(&mut self, rebooted: bool) -> Result<(ChipDescriptor, CodeSecurityLevel)> {
        info!("Fetching flash version...");
        let command = IspCommand::GetFwVersion {
            code_option: self.session.code_option,
        };
        self.send(&command, self.config.init_retry, "GET_FW_VERSION")?;
        let report = self.receive()?;

        let raw = IspResponse::new(report);
        let response = if rebooted && raw.verify_code() == 0 {
            debug!("Empty verify code after reboot request, assuming a fresh bootloader");
            raw
        } else {
            IspResponse::parse(CommandType::GetFwVersion, &report)?
        };

        let identity = response.identity();
        debug!(
            "Bootloader identity: family {} variant {} revision {} sub-variant {}",
            identity.family, identity.variant, identity.revision, identity.sub_variant
        );

        let chip = ChipDescriptor::identify(&identity)?;
        info!(
            "Sonix SN32 detected: {} ({} KB, {} pages)",
            chip.family,
            chip.rom_size_bytes / 1024,
            chip.rom_pages
        );

        let security = CodeSecurityLevel::decode(identity.code_security)?;
        info!(
            "Current security level: {security} (code security value {:#06x})",
            identity.code_security
        );

        if identity.code_option != self.session.code_option {
            warn!(
                "Code option table mismatch: cached {:#06x}, device reports {:#06x}; using the device value",
                self.session.code_option, identity.code_option
            );
            self.session.code_option = identity.code_option;
        } else {
            debug!("Code option table: {:#06x}", identity.code_option);
        }

        self.session.chip = Some(chip);
        self.session.security = Some(security);
        Ok((chip, security))
    }

    fn pre_flight(
        &mut self,
        chip: &ChipDescriptor,
        image: &FirmwareImage,
        options: &FlashOptions,
    ) -> Result<u32> {
        let mut offset = options.offset;

        // Programming a 26x application at 0 overwrites the jumploader region.
        if chip.family == ChipFamily::Sn260 && image.kind() == ImageKind::Application && offset == 0
        {
            warn!("{} flashing without offset", chip.family);
            warn!("POTENTIALLY DANGEROUS OPERATION");
            sleep(self.config.unsafe_offset_warning);

            if options.skip_offset_check {
                warn!(
                    "Flashing {} without offset, continuing after {:?}...",
                    chip.family, self.config.unsafe_offset_grace
                );
                sleep(self.config.unsafe_offset_grace);
            } else {
                warn!("Fail-safing to offset {JUMPLOADER_SIZE:#06x}");
                offset = JUMPLOADER_SIZE;
            }
        }

        let len = image.len() as u64;
        if !chip.fits(offset, len) {
            return Err(Error::FirmwareTooLarge {
                size: len,
                max: u64::from(chip.rom_size_bytes.saturating_sub(offset)),
            });
        }

        self.session.offset = offset;
        Ok(offset)
    }

    fn code_option_check(&mut self) -> Result<()> {
        info!("Checking code option table...");
        let command = IspCommand::CompareCodeOption {
            code_option: self.session.code_option,
        };
        self.send(&command, self.config.write_retry, "COMPARE_CODE_OPTION")
    }

    fn security_reset(
        &mut self,
        chip: &ChipDescriptor,
        current: CodeSecurityLevel,
    ) -> Result<()> {
        let code_security = CodeSecurityLevel::Cs0.encoding(chip);
        info!("Resetting code security from {current} to CS0...");
        debug!(
            "Setting code option table {:#06x} with code security value {code_security:#06x}",
            self.session.code_option
        );

        let command = IspCommand::SetEncryptionAlgo {
            code_option: self.session.code_option,
            code_security,
        };
        self.exchange(&command, self.config.write_retry, "SET_ENCRYPTION_ALGO")?;
        self.session.security = Some(CodeSecurityLevel::Cs0);
        Ok(())
    }

    fn erase(&mut self, chip: &ChipDescriptor) -> Result<()> {
        info!("Erasing flash from page 0 to page {}...", chip.rom_pages);
        let command = IspCommand::EnableErase {
            page_start: 0,
            page_end: chip.rom_pages,
        };
        let response = self.exchange(&command, self.config.write_retry, "ENABLE_ERASE")?;

        let actual = response.checksum();
        if actual != chip.blank_checksum {
            return Err(Error::ChecksumMismatch {
                what: "flash erase",
                expected: chip.blank_checksum,
                actual,
            });
        }

        info!("Flash erase verified");
        Ok(())
    }

    fn program_enable(&mut self, offset: u32, image: &FirmwareImage) -> Result<()> {
        let chunks = u32::try_from(image.chunk_count()).map_err(|_| Error::FirmwareTooLarge {
            size: image.len() as u64,
            max: u64::from(u32::MAX),
        })?;

        info!("Enabling program mode at offset {offset:#06x} ({chunks} chunks)...");
        let command = IspCommand::EnableProgram { offset, chunks };
        self.exchange(&command, self.config.write_retry, "ENABLE_PROGRAM")?;
        Ok(())
    }

    /// Stream the image. Returns the running checksum and the completion marker.
    fn program_stream(
        &mut self,
        image: &FirmwareImage,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<(u16, u32)> {
        info!("Flashing device, please wait...");

        let total = image.chunk_count();
        let mut checksum = Checksum16::new();
        let mut last_chunk = 0u32;
        let mut report: Report = [0; REPORT_SIZE];

        for (i, chunk) in image.chunks().enumerate() {
            report.fill(0);
            report[..chunk.len()].copy_from_slice(chunk);
            checksum.update(chunk);

            let tail = chunk.len().saturating_sub(4);
            let mut marker = [0u8; 4];
            marker[..chunk.len() - tail].copy_from_slice(&chunk[tail..]);
            last_chunk = LittleEndian::read_u32(&marker);

            self.send_report(&report, self.config.write_retry, "program chunk")?;
            progress(i + 1, total);
        }

        info!("Flashed file checksum: {:#06x}", checksum.value());
        Ok((checksum.value(), last_chunk))
    }

    /// Returns whether the device checksum matched.
    fn verify_completion(&mut self, offset: u32, checksum: u16, last_chunk: u32) -> Result<bool> {
        info!("Verifying flash completion...");
        let response = IspResponse::parse(CommandType::EnableProgram, &self.receive()?)?;

        let marker = response.last_chunk();
        if marker != last_chunk {
            return Err(Error::ProtocolMismatch {
                what: "flash completion marker",
                expected: last_chunk,
                actual: marker,
            });
        }
        info!("Flash completion verified");

        let actual = response.checksum();
        if actual == checksum {
            info!("Flash verification checksum: OK");
            return Ok(true);
        }

        if offset != 0 {
            // The device sums the whole user ROM, not just the region written.
            warn!(
                "Offset {offset:#06x} requested, flash verification checksum disabled (device reports {actual:#06x})"
            );
            return Ok(false);
        }

        Err(Error::ChecksumMismatch {
            what: "flash verification",
            expected: checksum,
            actual,
        })
    }

    /// Returns whether the reboot request was delivered.
    fn user_reboot(&mut self) -> bool {
        sleep(self.config.reboot_settle);
        info!("Rebooting to user mode...");
        match self.send(&IspCommand::ReturnUserMode, self.config.write_retry, "RETURN_USER_MODE") {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to reboot the device, power cycle it manually: {e}");
                false
            },
        }
    }

    fn settle(&self) {
        sleep(self.config.step_settle);
    }

    fn send(&mut self, command: &IspCommand, policy: RetryPolicy, operation: &str) -> Result<()> {
        self.send_report(&command.encode(), policy, operation)
    }

    fn send_report(&mut self, report: &Report, policy: RetryPolicy, operation: &str) -> Result<()> {
        trace!("Sending payload ({operation}):\n{}", hex_dump(report));
        let port = &mut self.port;
        policy.run(operation, &mut self.session.retries, || {
            port.send_feature_report(report)
        })
    }

    fn receive(&mut self) -> Result<Report> {
        let mut report: Report = [0; REPORT_SIZE];
        let port = &mut self.port;
        self.config
            .read_retry
            .run("read response", &mut self.session.retries, || {
                let n = port.get_feature_report(&mut report)?;
                if n < REPORT_SIZE {
                    return Err(Error::ShortReport {
                        expected: REPORT_SIZE,
                        actual: n,
                    });
                }
                Ok(())
            })?;

        trace!("Received payload:\n{}", hex_dump(&report));
        Ok(report)
    }

    /// Send a command and read back its validated response.
    fn exchange(
        &mut self,
        command: &IspCommand,
        policy: RetryPolicy,
        operation: &str,
    ) -> Result<IspResponse> {
        self.send(command, policy, operation)?;
        let report = self.receive()?;
        match command.command_type() {
            Some(expected) => IspResponse::parse(expected, &report),
            None => Ok(IspResponse::new(report)),
        }
    }
}

fn sleep(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{Result, RetryPolicy, Sn32Flasher};
    use crate::port::NativePort;

    impl Sn32Flasher<NativePort> {
        /// Open the device by VID/PID, retrying while it enumerates.
        pub fn open(vid: u16, pid: u16) -> Result<Self> {
            let port = NativePort::open_with_retry(vid, pid, RetryPolicy::OPEN)?;
            Ok(Self::new(port))
        }
    }
}
