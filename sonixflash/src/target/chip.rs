//! SN32 chip identification and capability table.
//!
//! The bootloader reports its identity in the GET_FW_VERSION response. Per
//! family differences (ROM geometry, blank checksum, CS0 encoding, which
//! optional ISP steps apply) are kept as data in [`CHIP_TABLE`].

use crate::error::{Error, Result};
use crate::protocol::ChipIdentity;
use std::fmt;

/// Family byte reported by every SN32 bootloader.
pub const SN32_FAMILY_ID: u8 = 32;

/// Size of the jumploader region at the start of flash.
pub const JUMPLOADER_SIZE: u32 = 0x200;

/// Supported SN32F2xx chip families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChipFamily {
    /// SN32F22x (SN240 bootloader, 16KB).
    Sn220,
    /// SN32F23x (SN240 bootloader, 32KB).
    Sn230,
    /// SN32F24x (SN240 bootloader, 64KB).
    Sn240,
    /// SN32F26x.
    Sn260,
    /// SN32F24xB.
    Sn240B,
    /// SN32F28x.
    Sn280,
    /// SN32F29x.
    Sn290,
    /// SN32F24xC.
    Sn240C,
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sn220 => "SN32F22x",
            Self::Sn230 => "SN32F23x",
            Self::Sn240 => "SN32F24x",
            Self::Sn260 => "SN32F26x",
            Self::Sn240B => "SN32F24xB",
            Self::Sn280 => "SN32F28x",
            Self::Sn290 => "SN32F29x",
            Self::Sn240C => "SN32F24xC",
        };
        write!(f, "{name}")
    }
}

/// Capabilities of one chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChipDescriptor {
    /// Chip family.
    pub family: ChipFamily,
    /// User ROM size in bytes.
    pub rom_size_bytes: u32,
    /// Number of erasable ROM pages.
    pub rom_pages: u16,
    /// Checksum of fully erased flash.
    pub blank_checksum: u16,
    /// Raw code security encoding meaning CS0 on this family.
    pub unsecured_code_security_encoding: u16,
    /// Whether the code option table is sent back for comparison.
    pub requires_code_option_check: bool,
    /// Whether flash must be erased before programming.
    ///
    /// Later bootloaders erase as part of the program stream.
    pub requires_explicit_erase: bool,
}

const fn kib(n: u32) -> u32 {
    n * 1024
}

/// One row of the identification table.
struct ChipEntry {
    variant: u8,
    /// Required sub-variant byte, or `None` if the variant alone identifies the chip.
    sub_variant: Option<u8>,
    descriptor: ChipDescriptor,
}

#[allow(clippy::too_many_arguments)]
const fn entry(
    variant: u8,
    sub_variant: Option<u8>,
    family: ChipFamily,
    rom_kib: u32,
    rom_pages: u16,
    blank_checksum: u16,
    cs0: u16,
    legacy_isp: bool,
) -> ChipEntry {
    ChipEntry {
        variant,
        sub_variant,
        descriptor: ChipDescriptor {
            family,
            rom_size_bytes: kib(rom_kib),
            rom_pages,
            blank_checksum,
            unsecured_code_security_encoding: cs0,
            requires_code_option_check: legacy_isp,
            requires_explicit_erase: legacy_isp,
        },
    }
}

/// Known SN32 bootloaders.
const CHIP_TABLE: &[ChipEntry] = &[
    entry(1, Some(1), ChipFamily::Sn220, 16, 16, 0xE000, 0xFFFF, true),
    entry(1, Some(2), ChipFamily::Sn230, 32, 32, 0xC000, 0xFFFF, true),
    entry(1, Some(3), ChipFamily::Sn240, 64, 64, 0x8000, 0xFFFF, true),
    entry(2, None, ChipFamily::Sn260, 30, 480, 0x8000, 0x0000, false),
    entry(3, None, ChipFamily::Sn240B, 64, 1024, 0x8000, 0x0000, false),
    entry(4, None, ChipFamily::Sn280, 128, 128, 0x0000, 0xFFFF, true),
    entry(5, None, ChipFamily::Sn290, 256, 256, 0x0000, 0xFFFF, true),
    entry(6, None, ChipFamily::Sn240C, 128, 128, 0x0000, 0xFFFF, true),
];

impl ChipDescriptor {
    /// Look up the descriptor for an identity reported by the bootloader.
    ///
    /// Unknown identities are terminal; retrying cannot change the silicon.
    pub fn identify(identity: &ChipIdentity) -> Result<Self> {
        let unsupported = || Error::UnsupportedChip {
            family: identity.family,
            variant: identity.variant,
            revision: identity.revision,
            sub_variant: identity.sub_variant,
        };

        if identity.family != SN32_FAMILY_ID {
            return Err(unsupported());
        }

        CHIP_TABLE
            .iter()
            .find(|e| {
                e.variant == identity.variant
                    && e.sub_variant.is_none_or(|sub| sub == identity.sub_variant)
            })
            .map(|e| e.descriptor)
            .ok_or_else(unsupported)
    }

    /// Descriptor for a family, independent of a device response.
    pub fn for_family(family: ChipFamily) -> Option<Self> {
        CHIP_TABLE
            .iter()
            .map(|e| e.descriptor)
            .find(|d| d.family == family)
    }

    /// Whether an image of `len` bytes fits at `offset`.
    pub fn fits(&self, offset: u32, len: u64) -> bool {
        u64::from(offset) + len <= u64::from(self.rom_size_bytes)
    }
}

/// Flash read/write protection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CodeSecurityLevel {
    /// Unprotected (0x0000 or 0xFFFF depending on family).
    Cs0,
    /// 0x5A5A.
    Cs1,
    /// 0xA5A5.
    Cs2,
    /// 0x55AA.
    Cs3,
}

impl CodeSecurityLevel {
    /// Decode a raw code security field.
    pub fn decode(raw: u16) -> Result<Self> {
        match raw {
            0x0000 | 0xFFFF => Ok(Self::Cs0),
            0x5A5A => Ok(Self::Cs1),
            0xA5A5 => Ok(Self::Cs2),
            0x55AA => Ok(Self::Cs3),
            _ => Err(Error::UnsupportedSecurityLevel(raw)),
        }
    }

    /// Raw encoding of this level on `chip`.
    pub fn encoding(self, chip: &ChipDescriptor) -> u16 {
        match self {
            Self::Cs0 => chip.unsecured_code_security_encoding,
            Self::Cs1 => 0x5A5A,
            Self::Cs2 => 0xA5A5,
            Self::Cs3 => 0x55AA,
        }
    }

    /// Numeric level (0-3).
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CodeSecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CS{}", self.level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(family: u8, variant: u8, sub_variant: u8) -> ChipIdentity {
        ChipIdentity {
            family,
            variant,
            revision: 0,
            sub_variant,
            code_option: 0,
            code_security: 0,
        }
    }

    fn expect(
        variant: u8,
        sub: u8,
        family: ChipFamily,
        rom: u32,
        pages: u16,
        blank: u16,
        cs0: u16,
    ) {
        let d = ChipDescriptor::identify(&identity(32, variant, sub)).unwrap();
        assert_eq!(d.family, family);
        assert_eq!(d.rom_size_bytes, rom);
        assert_eq!(d.rom_pages, pages);
        assert_eq!(d.blank_checksum, blank);
        assert_eq!(d.unsecured_code_security_encoding, cs0);
    }

    #[test]
    fn test_identify_all_families() {
        expect(1, 1, ChipFamily::Sn220, 16 * 1024, 16, 0xE000, 0xFFFF);
        expect(1, 2, ChipFamily::Sn230, 32 * 1024, 32, 0xC000, 0xFFFF);
        expect(1, 3, ChipFamily::Sn240, 64 * 1024, 64, 0x8000, 0xFFFF);
        expect(2, 0, ChipFamily::Sn260, 30 * 1024, 480, 0x8000, 0x0000);
        expect(3, 0, ChipFamily::Sn240B, 64 * 1024, 1024, 0x8000, 0x0000);
        expect(4, 0, ChipFamily::Sn280, 128 * 1024, 128, 0x0000, 0xFFFF);
        expect(5, 0, ChipFamily::Sn290, 256 * 1024, 256, 0x0000, 0xFFFF);
        expect(6, 0, ChipFamily::Sn240C, 128 * 1024, 128, 0x0000, 0xFFFF);
    }

    #[test]
    fn test_sub_variant_ignored_for_single_size_bootloaders() {
        let d = ChipDescriptor::identify(&identity(32, 2, 7)).unwrap();
        assert_eq!(d.family, ChipFamily::Sn260);
    }

    #[test]
    fn test_quirk_flags() {
        for family in [ChipFamily::Sn260, ChipFamily::Sn240B] {
            let d = ChipDescriptor::for_family(family).unwrap();
            assert!(!d.requires_code_option_check);
            assert!(!d.requires_explicit_erase);
        }
        for family in [
            ChipFamily::Sn220,
            ChipFamily::Sn230,
            ChipFamily::Sn240,
            ChipFamily::Sn240C,
            ChipFamily::Sn280,
            ChipFamily::Sn290,
        ] {
            let d = ChipDescriptor::for_family(family).unwrap();
            assert!(d.requires_code_option_check);
            assert!(d.requires_explicit_erase);
        }
    }

    #[test]
    fn test_unsupported_identities() {
        for (family, variant, sub) in [(31, 1, 3), (32, 0, 0), (32, 7, 0), (32, 1, 0), (32, 1, 4)] {
            assert!(matches!(
                ChipDescriptor::identify(&identity(family, variant, sub)),
                Err(Error::UnsupportedChip { .. })
            ));
        }
    }

    #[test]
    fn test_fits() {
        let d = ChipDescriptor::for_family(ChipFamily::Sn260).unwrap();
        assert!(d.fits(0x200, u64::from(d.rom_size_bytes) - 0x200));
        assert!(!d.fits(0x200, u64::from(d.rom_size_bytes)));
    }

    #[test]
    fn test_security_decode() {
        assert_eq!(CodeSecurityLevel::decode(0x0000).unwrap(), CodeSecurityLevel::Cs0);
        assert_eq!(CodeSecurityLevel::decode(0xFFFF).unwrap(), CodeSecurityLevel::Cs0);
        assert_eq!(CodeSecurityLevel::decode(0x5A5A).unwrap(), CodeSecurityLevel::Cs1);
        assert_eq!(CodeSecurityLevel::decode(0xA5A5).unwrap(), CodeSecurityLevel::Cs2);
        assert_eq!(CodeSecurityLevel::decode(0x55AA).unwrap(), CodeSecurityLevel::Cs3);
        assert!(matches!(
            CodeSecurityLevel::decode(0x1234),
            Err(Error::UnsupportedSecurityLevel(0x1234))
        ));
    }

    #[test]
    fn test_cs0_encoding_per_family() {
        let sn240 = ChipDescriptor::for_family(ChipFamily::Sn240).unwrap();
        let sn260 = ChipDescriptor::for_family(ChipFamily::Sn260).unwrap();
        assert_eq!(CodeSecurityLevel::Cs0.encoding(&sn240), 0xFFFF);
        assert_eq!(CodeSecurityLevel::Cs0.encoding(&sn260), 0x0000);
        assert_eq!(CodeSecurityLevel::Cs2.encoding(&sn260), 0xA5A5);
        assert_eq!(CodeSecurityLevel::Cs3.to_string(), "CS3");
    }
}
