//! Raw firmware image preparation.
//!
//! The bootloader consumes the image as whole 64-byte reports, so the image
//! is zero-padded up to a report boundary. Jumploader images are
//! additionally padded to the full jumploader region.

use crate::error::{Error, Result};
use crate::protocol::REPORT_SIZE;
use crate::target::chip::JUMPLOADER_SIZE;
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

/// Smallest plausible application image.
pub const MIN_FIRMWARE: u64 = 0x100;

/// What the image is flashed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageKind {
    /// Application firmware.
    #[default]
    Application,
    /// Jumploader placed in the reserved region at offset 0.
    Jumploader,
}

/// Firmware bytes aligned to report boundaries.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
    kind: ImageKind,
    original_len: usize,
}

impl FirmwareImage {
    /// Prepare an in-memory image.
    pub fn prepare(mut data: Vec<u8>, kind: ImageKind) -> Result<Self> {
        let original_len = data.len();
        let target = prepared_len(original_len as u64, kind)?;
        data.resize(usize::try_from(target).map_err(|_| too_large(target, kind))?, 0);

        Ok(Self {
            data,
            kind,
            original_len,
        })
    }

    /// Prepare a firmware file, growing it on disk to the prepared length.
    pub fn prepare_file(path: &Path, kind: ImageKind) -> Result<Self> {
        let file_size = fs::metadata(path)?.len();
        info!("File size: {file_size} bytes");

        let target = prepared_len(file_size, kind)?;
        if target != file_size {
            if kind == ImageKind::Jumploader && file_size < u64::from(JUMPLOADER_SIZE) {
                warn!(
                    "Jumploader binary is not {JUMPLOADER_SIZE:#06x} bytes, padding to {JUMPLOADER_SIZE:#06x}"
                );
            }
            info!("Padding file from {file_size} to {target} bytes to fit the HID report size");
            OpenOptions::new().write(true).open(path)?.set_len(target)?;
        }

        let data = fs::read(path)?;
        if data.len() as u64 != target {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {target} bytes after padding, read {}", data.len()),
            )));
        }

        Ok(Self {
            data,
            kind,
            original_len: usize::try_from(file_size).unwrap_or(usize::MAX),
        })
    }

    /// Prepared bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Prepared length in bytes (always a multiple of the report size).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image holds no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length before padding.
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    /// Image kind.
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Number of reports needed to stream the image.
    pub fn chunk_count(&self) -> usize {
        self.data.len() / REPORT_SIZE
    }

    /// Iterate over report-sized chunks.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(REPORT_SIZE)
    }
}

/// Round `len` up to the next report boundary.
pub fn pad_to_report(len: u64) -> u64 {
    len.div_ceil(REPORT_SIZE as u64) * REPORT_SIZE as u64
}

/// Compute the prepared length for an image of `len` bytes.
///
/// Rejects empty images, jumploaders larger than the jumploader region and
/// application images smaller than [`MIN_FIRMWARE`] after padding.
pub fn prepared_len(len: u64, kind: ImageKind) -> Result<u64> {
    if len == 0 {
        return Err(Error::FirmwareTooSmall {
            size: 0,
            min: min_len(kind),
        });
    }

    let len = match kind {
        ImageKind::Jumploader if len > u64::from(JUMPLOADER_SIZE) => {
            return Err(too_large(len, kind));
        },
        ImageKind::Jumploader => u64::from(JUMPLOADER_SIZE),
        ImageKind::Application => len,
    };

    let padded = pad_to_report(len);
    if padded < min_len(kind) {
        return Err(Error::FirmwareTooSmall {
            size: padded,
            min: min_len(kind),
        });
    }

    Ok(padded)
}

fn min_len(kind: ImageKind) -> u64 {
    match kind {
        ImageKind::Application => MIN_FIRMWARE,
        ImageKind::Jumploader => 1,
    }
}

fn too_large(size: u64, kind: ImageKind) -> Error {
    let max = match kind {
        ImageKind::Jumploader => u64::from(JUMPLOADER_SIZE),
        ImageKind::Application => u64::from(u32::MAX),
    };
    Error::FirmwareTooLarge { size, max }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_report() {
        assert_eq!(pad_to_report(1), 64);
        assert_eq!(pad_to_report(64), 64);
        assert_eq!(pad_to_report(65), 128);
        assert_eq!(pad_to_report(4096), 4096);
    }

    #[test]
    fn test_aligned_image_unchanged() {
        let data: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let image = FirmwareImage::prepare(data.clone(), ImageKind::Application).unwrap();
        assert_eq!(image.data(), data.as_slice());
        assert_eq!(image.chunk_count(), 64);
    }

    #[test]
    fn test_unaligned_image_zero_padded() {
        let image = FirmwareImage::prepare(vec![0xAB; 1000], ImageKind::Application).unwrap();
        assert_eq!(image.len(), 1024);
        assert_eq!(image.original_len(), 1000);
        assert!(image.data()[..1000].iter().all(|&b| b == 0xAB));
        assert!(image.data()[1000..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_padding_idempotent() {
        let once = FirmwareImage::prepare(vec![1; 300], ImageKind::Application).unwrap();
        let twice = FirmwareImage::prepare(once.data().to_vec(), ImageKind::Application).unwrap();
        assert_eq!(once.data(), twice.data());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            FirmwareImage::prepare(Vec::new(), ImageKind::Application),
            Err(Error::FirmwareTooSmall { size: 0, .. })
        ));
        assert!(matches!(
            FirmwareImage::prepare(Vec::new(), ImageKind::Jumploader),
            Err(Error::FirmwareTooSmall { size: 0, .. })
        ));
    }

    #[test]
    fn test_small_application_rejected() {
        assert!(matches!(
            FirmwareImage::prepare(vec![1; 100], ImageKind::Application),
            Err(Error::FirmwareTooSmall { size: 128, min: 0x100 })
        ));
    }

    #[test]
    fn test_short_jumploader_padded_to_region() {
        let image = FirmwareImage::prepare(vec![0x11; 0x80], ImageKind::Jumploader).unwrap();
        assert_eq!(image.len(), 0x200);
        assert!(image.data()[0x80..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_exact_jumploader_unchanged() {
        let image = FirmwareImage::prepare(vec![0x22; 0x200], ImageKind::Jumploader).unwrap();
        assert_eq!(image.len(), 0x200);
    }

    #[test]
    fn test_oversized_jumploader_rejected() {
        assert!(matches!(
            FirmwareImage::prepare(vec![0; 0x201], ImageKind::Jumploader),
            Err(Error::FirmwareTooLarge {
                size: 0x201,
                max: 0x200
            })
        ));
    }

    #[test]
    fn test_prepare_file_grows_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.bin");
        fs::write(&path, vec![0x5A; 1000]).unwrap();

        let image = FirmwareImage::prepare_file(&path, ImageKind::Application).unwrap();
        assert_eq!(image.len(), 1024);
        assert_eq!(fs::metadata(&path).unwrap().len(), 1024);
        assert_eq!(&fs::read(&path).unwrap()[..], image.data());
    }

    #[test]
    fn test_prepare_file_jumploader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jump.bin");
        fs::write(&path, vec![0x01; 0x1F0]).unwrap();

        let image = FirmwareImage::prepare_file(&path, ImageKind::Jumploader).unwrap();
        assert_eq!(image.len(), 0x200);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0x200);
    }

    #[test]
    fn test_prepare_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FirmwareImage::prepare_file(&dir.path().join("nope.bin"), ImageKind::Application);
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
