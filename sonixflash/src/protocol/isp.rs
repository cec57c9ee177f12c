//! SONIX SN32 ISP bootloader commands and responses.
//!
//! Every exchange with the bootloader is a fixed 64-byte HID feature report.
//!
//! ## Command Layout
//!
//! ```text
//! +--------+-----------+--------+---------------------------------------+
//! | Opcode |   Base    |  Pad   |              Parameters               |
//! +--------+-----------+--------+---------------------------------------+
//! | byte 0 | bytes 1-2 | byte 3 |              bytes 4-63               |
//! +--------+-----------+--------+---------------------------------------+
//! |  cmd   |  0x55AA   |   0    | 16/32-bit LE fields at fixed offsets  |
//! +--------+-----------+--------+---------------------------------------+
//! ```
//!
//! ## Response Layout
//!
//! ```text
//! +---------------------+-------------------+---------------------------+
//! |     Verify code     |      Status       |      Result fields        |
//! +---------------------+-------------------+---------------------------+
//! |      bytes 0-3      |     bytes 4-7     |        bytes 8-63         |
//! +---------------------+-------------------+---------------------------+
//! | (0x55AA << 8) | cmd |    0xFAFAFAFA     | checksum, identity, ...   |
//! +---------------------+-------------------+---------------------------+
//! ```
//!
//! OEM reboot requests share the same report but carry two magic words in
//! place of the opcode and base marker.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::warn;
use std::fmt;
use std::fmt::Write as _;

/// Size of every feature report payload (without the HID report ID).
pub const REPORT_SIZE: usize = 64;

/// A single feature report payload.
pub type Report = [u8; REPORT_SIZE];

/// Protocol base marker following the opcode.
pub const CMD_BASE: u16 = 0x55AA;

/// Acknowledgement status word.
pub const CMD_ACK: u32 = 0xFAFA_FAFA;

/// Offset of the completion marker in the final program status report.
pub const LAST_CHUNK_OFFSET: usize = REPORT_SIZE - 4;

/// ISP command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    /// Read bootloader version, code option and code security (0x01).
    GetFwVersion = 0x01,
    /// Compare the code option table (0x02).
    CompareCodeOption = 0x02,
    /// Set code option table and code security (0x03).
    SetEncryptionAlgo = 0x03,
    /// Erase a page range (0x04).
    EnableErase = 0x04,
    /// Start a program stream (0x05).
    EnableProgram = 0x05,
    /// Leave ISP mode and boot the user application (0x07).
    ReturnUserMode = 0x07,
}

impl CommandType {
    /// Verify code echoed by the bootloader for this command.
    pub fn verify_code(self) -> u32 {
        (u32::from(CMD_BASE) << 8) | self as u32
    }
}

/// OEM firmware reboot requests.
///
/// Some keyboard firmwares accept a magic report that jumps into the ISP
/// bootloader without a physical key combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootMagic {
    /// SONIX reference firmware (also used by eVision).
    Sonix,
    /// HFD firmware.
    Hfd,
}

impl RebootMagic {
    /// The two magic words written at the start of the report.
    pub fn words(self) -> [u32; 2] {
        match self {
            Self::Sonix => [0x5AA5_55AA, 0xCC33_00FF],
            Self::Hfd => [0x5A89_42AA, 0xCC62_71FF],
        }
    }

    /// Look up a reboot variant by name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "sonix" | "evision" => Ok(Self::Sonix),
            "hfd" => Ok(Self::Hfd),
            _ => Err(Error::InvalidRebootOption(name.to_string())),
        }
    }
}

impl fmt::Display for RebootMagic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sonix => write!(f, "sonix"),
            Self::Hfd => write!(f, "hfd"),
        }
    }
}

/// An outbound ISP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IspCommand {
    /// Identify the bootloader, presenting the cached code option.
    GetFwVersion {
        /// Cached code option table.
        code_option: u16,
    },
    /// Ask the bootloader to compare its code option table.
    CompareCodeOption {
        /// Cached code option table.
        code_option: u16,
    },
    /// Rewrite the code option table and code security.
    SetEncryptionAlgo {
        /// Code option table to keep.
        code_option: u16,
        /// Raw code security encoding to set.
        code_security: u16,
    },
    /// Erase pages `[page_start, page_end)`.
    EnableErase {
        /// First page.
        page_start: u16,
        /// End page.
        page_end: u16,
    },
    /// Announce a program stream.
    EnableProgram {
        /// Flash offset of the first chunk.
        offset: u32,
        /// Number of 64-byte chunks that follow.
        chunks: u32,
    },
    /// Reboot into the user application.
    ReturnUserMode,
    /// OEM firmware reboot request.
    Reboot(RebootMagic),
}

impl IspCommand {
    /// The opcode this command is acknowledged with, if any.
    pub fn command_type(&self) -> Option<CommandType> {
        match self {
            Self::GetFwVersion { .. } => Some(CommandType::GetFwVersion),
            Self::CompareCodeOption { .. } => Some(CommandType::CompareCodeOption),
            Self::SetEncryptionAlgo { .. } => Some(CommandType::SetEncryptionAlgo),
            Self::EnableErase { .. } => Some(CommandType::EnableErase),
            Self::EnableProgram { .. } => Some(CommandType::EnableProgram),
            Self::ReturnUserMode => Some(CommandType::ReturnUserMode),
            Self::Reboot(_) => None,
        }
    }

    /// Encode into a zero-filled report.
    pub fn encode(&self) -> Report {
        let mut buf = [0u8; REPORT_SIZE];

        if let Self::Reboot(magic) = self {
            let [first, second] = magic.words();
            LittleEndian::write_u32(&mut buf[0..4], first);
            LittleEndian::write_u32(&mut buf[4..8], second);
            return buf;
        }

        if let Some(cmd) = self.command_type() {
            buf[0] = cmd as u8;
            LittleEndian::write_u16(&mut buf[1..3], CMD_BASE);
        }

        match *self {
            Self::GetFwVersion { code_option } | Self::CompareCodeOption { code_option } => {
                LittleEndian::write_u16(&mut buf[4..6], code_option);
            },
            Self::SetEncryptionAlgo {
                code_option,
                code_security,
            } => {
                LittleEndian::write_u16(&mut buf[4..6], code_option);
                LittleEndian::write_u16(&mut buf[6..8], code_security);
            },
            Self::EnableErase {
                page_start,
                page_end,
            } => {
                LittleEndian::write_u16(&mut buf[4..6], page_start);
                LittleEndian::write_u16(&mut buf[8..10], page_end);
            },
            Self::EnableProgram { offset, chunks } => {
                LittleEndian::write_u32(&mut buf[4..8], offset);
                LittleEndian::write_u32(&mut buf[8..12], chunks);
            },
            Self::ReturnUserMode | Self::Reboot(_) => {},
        }

        buf
    }
}

/// Identity fields returned by GET_FW_VERSION.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipIdentity {
    /// Family byte (32 for SN32).
    pub family: u8,
    /// Bootloader variant byte.
    pub variant: u8,
    /// Bootloader revision byte.
    pub revision: u8,
    /// Sub-variant byte, meaningful for multi-size bootloaders.
    pub sub_variant: u8,
    /// Code option table stored on the device.
    pub code_option: u16,
    /// Raw code security encoding.
    pub code_security: u16,
}

/// A received response report.
#[derive(Debug, Clone)]
pub struct IspResponse {
    data: Report,
}

impl IspResponse {
    /// Wrap a raw report without validation.
    pub fn new(data: Report) -> Self {
        Self { data }
    }

    /// Validate the verify code and status word for `command`.
    ///
    /// An acknowledged ENABLE_PROGRAM echo in place of the expected command
    /// means an earlier program stream never finished; this is logged before
    /// the mismatch is returned.
    pub fn parse(command: CommandType, data: &Report) -> Result<Self> {
        let response = Self::new(*data);
        if let Err(e) = response.expect_verify_code(command) {
            if response.is_program_pending() {
                warn!("Device program pending. Please power cycle the device.");
            }
            return Err(e);
        }
        response.expect_ack()?;
        Ok(response)
    }

    /// Echoed verify code.
    pub fn verify_code(&self) -> u32 {
        LittleEndian::read_u32(&self.data[0..4])
    }

    /// Status word.
    pub fn status(&self) -> u32 {
        LittleEndian::read_u32(&self.data[4..8])
    }

    /// Check the echoed verify code.
    pub fn expect_verify_code(&self, command: CommandType) -> Result<()> {
        let actual = self.verify_code();
        let expected = command.verify_code();
        if actual != expected {
            return Err(Error::ProtocolMismatch {
                what: "response command",
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check the status word.
    pub fn expect_ack(&self) -> Result<()> {
        let actual = self.status();
        if actual != CMD_ACK {
            return Err(Error::ProtocolMismatch {
                what: "response status",
                expected: CMD_ACK,
                actual,
            });
        }
        Ok(())
    }

    /// Whether this looks like an acknowledged program request.
    ///
    /// Seen when a previous program stream never completed.
    pub fn is_program_pending(&self) -> bool {
        self.verify_code() == CommandType::EnableProgram.verify_code() && self.status() == CMD_ACK
    }

    /// 16-bit checksum field.
    pub fn checksum(&self) -> u16 {
        LittleEndian::read_u16(&self.data[8..10])
    }

    /// Trailing completion marker.
    pub fn last_chunk(&self) -> u32 {
        LittleEndian::read_u32(&self.data[LAST_CHUNK_OFFSET..REPORT_SIZE])
    }

    /// Identity fields.
    pub fn identity(&self) -> ChipIdentity {
        ChipIdentity {
            family: self.data[8],
            variant: self.data[9],
            revision: self.data[10],
            sub_variant: self.data[11],
            code_option: BigEndian::read_u16(&self.data[12..14]),
            code_security: BigEndian::read_u16(&self.data[14..16]),
        }
    }
}

/// Format a report as offset-prefixed hex lines of 16 bytes.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + data.len() / 16 * 7);
    for (i, line) in data.chunks(16).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:04x}:", i * 16);
        for byte in line {
            let _ = write!(out, " {byte:02x}");
        }
    }
    out
}
