//! Streaming RIFF/WAVE PCM writer.
//!
//! The header is written up front with zeroed length fields and patched when
//! the file is closed, so a file abandoned mid-recording is not valid WAV.

use std::io::{Seek, SeekFrom, Write};

use crate::MAX_RECORDING_SIZE;
use crate::byteorder::WriteLittleEndian;
use crate::errors::ExportError;
use crate::screen::TvStandard;

/// PCM format of the host's audio output, fixed for a session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// 1 (mono) or 2 (stereo).
    pub channels: u16,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Bytes per sample: 1 or 2.
    pub sample_size: u16,
}

impl AudioFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * self.sample_size
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.sample_size * 8
    }
}

/// Streaming WAV writer with a single `fmt ` chunk and a single `data` chunk.
pub struct WavWriter<W: Write + Seek> {
    writer: W,
    format: AudioFormat,
    fps: f64,
    start: u64,
    bytes_written: u64,
    frames_written: u64,
    limit_reached: bool,
}

impl<W: Write + Seek> WavWriter<W> {
    /// Write the 44-byte header with zeroed length placeholders and return
    /// the open session. The sink's current position becomes offset 0 of the
    /// file; the header must land exactly 44 bytes after it.
    pub fn create(mut writer: W, format: AudioFormat, tv: TvStandard) -> Result<Self, ExportError> {
        let start = writer.stream_position()?;

        writer.put_tag(b"RIFF")?;
        writer.put_u32_le(0)?; // length to be filled in upon file close
        writer.put_tag(b"WAVE")?;

        writer.put_tag(b"fmt ")?;
        writer.put_u32_le(16)?;
        writer.put_u16_le(1)?; // PCM
        writer.put_u16_le(format.channels)?;
        writer.put_u32_le(format.sample_rate)?;
        writer.put_u32_le(format.sample_rate * format.sample_size as u32)?;
        writer.put_u16_le(format.block_align())?;
        writer.put_u16_le(format.bits_per_sample())?;

        writer.put_tag(b"data")?;
        writer.put_u32_le(0)?; // length to be filled in upon file close

        let position = writer.stream_position()?;
        if position != start + 44 {
            return Err(ExportError::HeaderSizeMismatch {
                expected: start + 44,
                actual: position,
            });
        }

        Ok(Self {
            writer,
            format,
            fps: tv.fps(),
            start,
            bytes_written: 0,
            frames_written: 0,
            limit_reached: false,
        })
    }

    /// Append `num_samples` PCM samples from `buf` and return the number of
    /// bytes written. Once the recording size limit has been crossed every
    /// further call fails with [`ExportError::SizeLimitReached`]; the caller
    /// should close the file at that point.
    pub fn write_samples(&mut self, buf: &[u8], num_samples: usize) -> Result<usize, ExportError> {
        if self.limit_reached {
            return Err(ExportError::SizeLimitReached);
        }

        let size = num_samples * self.format.sample_size as usize;
        self.writer
            .put_samples_le(&buf[..size], self.format.sample_size as usize)?;

        self.bytes_written += size as u64;
        self.frames_written += 1;
        if self.bytes_written > MAX_RECORDING_SIZE {
            self.limit_reached = true;
        }
        Ok(size)
    }

    /// Current duration of the file in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.frames_written as f64 / self.fps
    }

    /// Approximate size of the file in bytes.
    pub fn current_size(&self) -> u64 {
        self.bytes_written
    }

    pub fn description(&self) -> &str {
        "WAV"
    }

    /// Pad the data chunk to a word boundary, patch the two length fields and
    /// return the sink. Must be called for the file to be valid.
    pub fn close(mut self) -> Result<W, ExportError> {
        // RIFF chunks must be word-aligned. The alignment byte counts toward
        // the RIFF length but not toward the data chunk length.
        let aligned = self.bytes_written & 1;
        if aligned != 0 {
            self.writer.write_all(&[0])?;
        }

        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.start + 4))?;
        self.writer
            .put_u32_le((self.bytes_written + 36 + aligned) as u32)?;
        self.writer.seek(SeekFrom::Start(self.start + 40))?;
        self.writer.put_u32_le(self.bytes_written as u32)?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;

        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const STEREO_16: AudioFormat = AudioFormat {
        channels: 2,
        sample_rate: 44100,
        sample_size: 2,
    };

    #[test]
    fn header_layout() -> Result<(), ExportError> {
        let writer = WavWriter::create(Cursor::new(Vec::new()), STEREO_16, TvStandard::Pal)?;
        let data = writer.close()?.into_inner();

        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WAVE");
        assert_eq!(&data[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(data[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes(data[20..22].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(data[22..24].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(data[24..28].try_into().unwrap()), 44100);
        assert_eq!(u16::from_le_bytes(data[32..34].try_into().unwrap()), 4);
        assert_eq!(u16::from_le_bytes(data[34..36].try_into().unwrap()), 16);
        assert_eq!(&data[36..40], b"data");
        Ok(())
    }

    #[test]
    fn close_patches_both_length_fields() -> Result<(), ExportError> {
        let mut writer = WavWriter::create(Cursor::new(Vec::new()), STEREO_16, TvStandard::Pal)?;

        // three 16-bit sample pairs, 12 bytes of PCM
        let samples: Vec<u8> = [100i16, -100, 2000, -2000, 30000, -30000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let written = writer.write_samples(&samples, 6)?;
        assert_eq!(written, 12);

        let data = writer.close()?.into_inner();
        assert_eq!(data.len(), 56);
        assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 48);
        assert_eq!(u32::from_le_bytes(data[40..44].try_into().unwrap()), 12);
        assert_eq!(&data[44..56], &samples[..]);
        Ok(())
    }

    #[test]
    fn odd_data_size_gets_an_alignment_byte() -> Result<(), ExportError> {
        let format = AudioFormat {
            channels: 1,
            sample_rate: 22050,
            sample_size: 1,
        };
        let mut writer = WavWriter::create(Cursor::new(Vec::new()), format, TvStandard::Ntsc)?;
        writer.write_samples(&[0x80, 0x90, 0xa0], 3)?;

        let data = writer.close()?.into_inner();
        assert_eq!(data.len(), 48);
        assert_eq!(data[47], 0);
        // RIFF length counts the pad byte, the data length does not
        assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 3 + 36 + 1);
        assert_eq!(u32::from_le_bytes(data[40..44].try_into().unwrap()), 3);
        Ok(())
    }

    #[test]
    fn elapsed_time_counts_write_calls_against_fps() -> Result<(), ExportError> {
        let mut writer = WavWriter::create(Cursor::new(Vec::new()), STEREO_16, TvStandard::Ntsc)?;
        let chunk = vec![0u8; 4];
        for _ in 0..60 {
            writer.write_samples(&chunk, 2)?;
        }
        assert!((writer.elapsed_seconds() - 60.0 / TvStandard::Ntsc.fps()).abs() < 1e-9);
        assert_eq!(writer.current_size(), 60 * 4);
        Ok(())
    }
}
