//! 16-bit additive checksum used by the SN32 bootloader.
//!
//! The image is summed as little-endian 16-bit words with wrapping
//! arithmetic. A trailing odd byte is added as-is.

/// Checksum of a single buffer.
pub fn checksum16(data: &[u8]) -> u16 {
    let mut words = data.chunks_exact(2);
    let mut sum = words
        .by_ref()
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_le_bytes([w[0], w[1]])));

    if let [last] = words.remainder() {
        sum = sum.wrapping_add(u16::from(*last));
    }

    sum
}

/// Running checksum over a stream of chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum16 {
    sum: u16,
}

impl Checksum16 {
    /// Start a new checksum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.sum = self.sum.wrapping_add(checksum16(chunk));
    }

    /// Current value.
    pub fn value(&self) -> u16 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(checksum16(&[]), 0);
    }

    #[test]
    fn test_little_endian_words() {
        assert_eq!(checksum16(&[0x01, 0x02]), 0x0201);
        assert_eq!(checksum16(&[0x01, 0x02, 0x03, 0x04]), 0x0201 + 0x0403);
    }

    #[test]
    fn test_odd_trailing_byte_added_unscaled() {
        assert_eq!(checksum16(&[0x01, 0x02, 0x7F]), 0x0201 + 0x7F);
        assert_eq!(checksum16(&[0xFF]), 0x00FF);
    }

    #[test]
    fn test_wrapping() {
        assert_eq!(checksum16(&[0xFF, 0xFF, 0x02, 0x00]), 0x0001);
    }

    #[test]
    fn test_blank_flash_checksum() {
        // 64KB of erased flash sums to the SN32F240 blank value.
        let blank = vec![0xFFu8; 64 * 1024];
        assert_eq!(checksum16(&blank), 0x8000);
    }

    #[test]
    fn test_streaming_matches_whole_image() {
        let image: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut running = Checksum16::new();
        for chunk in image.chunks(64) {
            running.update(chunk);
        }
        assert_eq!(running.value(), checksum16(&image));

        let mut again = Checksum16::new();
        for chunk in image.chunks(64) {
            again.update(chunk);
        }
        assert_eq!(again, running);
    }
}
