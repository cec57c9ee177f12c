//! Protocol implementations.

pub mod checksum;
pub mod isp;

// Re-export common types
pub use checksum::{Checksum16, checksum16};
pub use isp::{
    CMD_ACK, CMD_BASE, ChipIdentity, CommandType, IspCommand, IspResponse, REPORT_SIZE,
    RebootMagic, Report,
};
