//! 44-byte PCM WAV container header.
//!
//! Segments are written with a provisional header carrying an unknown-length
//! sentinel in the two size fields; on finalize exactly those two fields are
//! patched in place from the real file size. Nothing else is ever rewound.

use crate::error::Result;
use std::io::{Seek, SeekFrom, Write};

/// Total header length in bytes.
pub const HEADER_LEN: u64 = 44;

/// Sentinel written into the data-size field before the payload is known.
pub const PROVISIONAL_DATA_SIZE: u32 = u32::MAX - HEADER_LEN as u32;

/// PCM stream parameters of a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavFormat {
    /// Bytes of payload per second of audio.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bits_per_sample as u32 / 8
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }
}

/// Writes the 44-byte header with sentinel size fields.
pub fn write_provisional_header<W: Write>(w: &mut W, fmt: &WavFormat) -> Result<()> {
    let data_size = PROVISIONAL_DATA_SIZE;
    let riff_size = data_size + 36;

    w.write_all(b"RIFF")?;
    w.write_all(&riff_size.to_le_bytes())?;
    w.write_all(b"WAVE")?;
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?; // format chunk size
    w.write_all(&1u16.to_le_bytes())?; // PCM
    w.write_all(&fmt.channels.to_le_bytes())?;
    w.write_all(&fmt.sample_rate.to_le_bytes())?;
    w.write_all(&fmt.byte_rate().to_le_bytes())?;
    w.write_all(&fmt.block_align().to_le_bytes())?;
    w.write_all(&fmt.bits_per_sample.to_le_bytes())?;
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    Ok(())
}

/// Patches the RIFF size (offset 4) and data size (offset 40) in place.
///
/// `file_size` is the final size of the whole file including the header.
pub fn patch_header_sizes<F: Write + Seek>(f: &mut F, file_size: u64) -> Result<()> {
    let riff_size = (file_size - 8) as u32;
    let data_size = (file_size - HEADER_LEN) as u32;

    f.seek(SeekFrom::Start(4))?;
    f.write_all(&riff_size.to_le_bytes())?;
    f.seek(SeekFrom::Start(40))?;
    f.write_all(&data_size.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mono16k() -> WavFormat {
        WavFormat {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    fn u32_at(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
    }

    fn u16_at(buf: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([buf[offset], buf[offset + 1]])
    }

    #[test]
    fn provisional_header_is_bit_exact() {
        let mut buf = Vec::new();
        write_provisional_header(&mut buf, &mono16k()).unwrap();

        assert_eq!(buf.len(), HEADER_LEN as usize);
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(u32_at(&buf, 4), PROVISIONAL_DATA_SIZE + 36);
        assert_eq!(&buf[8..12], b"WAVE");
        assert_eq!(&buf[12..16], b"fmt ");
        assert_eq!(u32_at(&buf, 16), 16);
        assert_eq!(u16_at(&buf, 20), 1); // PCM
        assert_eq!(u16_at(&buf, 22), 1); // channels
        assert_eq!(u32_at(&buf, 24), 16_000);
        assert_eq!(u32_at(&buf, 28), 32_000); // byte rate
        assert_eq!(u16_at(&buf, 32), 2); // block align
        assert_eq!(u16_at(&buf, 34), 16); // bits per sample
        assert_eq!(&buf[36..40], b"data");
        assert_eq!(u32_at(&buf, 40), PROVISIONAL_DATA_SIZE);
    }

    #[test]
    fn patch_rewrites_only_the_two_size_fields() {
        let mut buf = Vec::new();
        write_provisional_header(&mut buf, &mono16k()).unwrap();
        let payload = vec![0u8; 1000];
        buf.extend_from_slice(&payload);
        let before = buf.clone();

        let mut cursor = Cursor::new(&mut buf);
        let file_size = HEADER_LEN + 1000;
        patch_header_sizes(&mut cursor, file_size).unwrap();

        assert_eq!(u32_at(&buf, 4), (file_size - 8) as u32);
        assert_eq!(u32_at(&buf, 40), 1000);

        // Everything outside bytes 4..8 and 40..44 is untouched.
        for (i, (&a, &b)) in before.iter().zip(buf.iter()).enumerate() {
            if (4..8).contains(&i) || (40..44).contains(&i) {
                continue;
            }
            assert_eq!(a, b, "byte {} changed", i);
        }
    }

    #[test]
    fn patched_header_parses_with_hound() {
        let mut buf = Vec::new();
        write_provisional_header(&mut buf, &mono16k()).unwrap();
        for s in [100i16, -100, 2000, -2000] {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        let total = buf.len() as u64;
        let mut cursor = Cursor::new(&mut buf);
        patch_header_sizes(&mut cursor, total).unwrap();

        let reader = hound::WavReader::new(Cursor::new(buf)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 2000, -2000]);
    }

    #[test]
    fn byte_rate_and_block_align() {
        let fmt = mono16k();
        assert_eq!(fmt.byte_rate(), 32_000);
        assert_eq!(fmt.block_align(), 2);
    }
}
