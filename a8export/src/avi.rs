//! Streaming RIFF/AVI 1.0 container writer.
//!
//! Interleaves one compressed video stream (`00dc` chunks) with an optional
//! raw PCM audio stream (`01wb` chunks). The header is written with
//! placeholder sizes at open and rewritten verbatim at close, when the
//! `movi` and RIFF payload lengths and the frame totals are known; a v1
//! `idx1` index is appended before the rewrite. Files abandoned without
//! [`AviWriter::close`] are not playable.
//!
//! AVI 1.0 indexes are 32-bit, so recording stops at [`MAX_RECORDING_SIZE`].
//! The per-frame cost of raw PCM is fixed (just under 1500 bytes per NTSC
//! frame at 44.1kHz 16-bit); the video cost depends entirely on how well the
//! codec compresses the screen, roughly 1.5k per frame for a static screen
//! and 30k for a busy one with the RLE codec.

use std::io::{Seek, SeekFrom, Write};

use crate::MAX_RECORDING_SIZE;
use crate::byteorder::WriteLittleEndian;
use crate::codec::{self, CodecDescriptor, VideoCodec};
use crate::config::ExportConfig;
use crate::errors::ExportError;
use crate::screen::{Palette, Screen, TvStandard, VideoGeometry};
use crate::wav::AudioFormat;

/// Index entries hold the video chunk size in 18 bits.
const MAX_VIDEO_CHUNK: usize = 0x3ffff;
/// Index entries hold the audio chunk size in 13 bits.
const MAX_AUDIO_CHUNK: usize = 0x1fff;
/// Index flag marking a keyframe.
const AVIIF_KEYFRAME: u32 = 0x10;

const FRAME_INDEX_RESERVE: usize = 1000;

/// Per-stream pending state between `add_*` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// Awaiting data for the current frame.
    Idle,
    /// Data buffered and ready to flush; the size may be 0 for inter-frames.
    Ready(usize),
    /// A previous operation failed; only close is safe.
    Poisoned,
}

/// One recorded frame group, packed into the `idx1` entries on close.
struct FrameIndexEntry {
    video_size: u32,
    audio_size: u32,
    keyframe: bool,
}

/// Streaming AVI recording session.
///
/// The host calls [`add_video_frame`](Self::add_video_frame) and, for
/// two-stream sessions, [`add_audio_samples`](Self::add_audio_samples) once
/// per emulated frame, in either order, then [`close`](Self::close) exactly
/// once. The sink's position 0 must be the start of the file.
pub struct AviWriter<W: Write + Seek> {
    writer: W,
    geometry: VideoGeometry,
    palette: Palette,
    fps: f64,
    audio: Option<AudioFormat>,
    keyframe_interval: u32,

    descriptor: &'static CodecDescriptor,
    codec: Box<dyn VideoCodec>,
    description: String,

    video_buffer: Vec<u8>,
    audio_buffer: Vec<u8>,

    pending_video: Pending,
    pending_audio: Pending,

    frame_index: Vec<FrameIndexEntry>,
    samples_written: u32,
    bytes_written: u64,
    size_riff: u32,
    size_movi: u32,
    movi_head_pos: u64,

    total_video_size: u64,
    smallest_video_frame: u32,
    largest_video_frame: u32,
    keyframe_residual: f64,
    current_is_keyframe: bool,
    limit_reached: bool,
}

impl<W: Write + Seek> AviWriter<W> {
    /// Open a recording session: select and start the codec, size the scratch
    /// buffers and write the initial header.
    pub fn create(
        writer: W,
        geometry: VideoGeometry,
        palette: &Palette,
        tv: TvStandard,
        audio: Option<AudioFormat>,
        config: &ExportConfig,
    ) -> Result<Self, ExportError> {
        let descriptor = codec::select_codec(&config.video_codec)?;
        let mut codec = descriptor.create(config);

        let video_buffer_size = codec.start(geometry)?;
        let fps = tv.fps();
        let audio_buffer_size = match audio {
            Some(format) => (format.byte_rate() as f64 / fps) as usize + 1024,
            None => 0,
        };

        let mut writer = Self {
            writer,
            geometry,
            palette: palette.clone(),
            fps,
            audio,
            keyframe_interval: config.keyframe_interval,
            descriptor,
            codec,
            description: format!("AVI {}", descriptor.id),
            video_buffer: vec![0; video_buffer_size],
            audio_buffer: vec![0; audio_buffer_size],
            pending_video: Pending::Idle,
            pending_audio: Pending::Idle,
            frame_index: Vec::with_capacity(FRAME_INDEX_RESERVE),
            samples_written: 0,
            bytes_written: 0,
            size_riff: 0,
            size_movi: 0,
            movi_head_pos: 0,
            total_video_size: 0,
            smallest_video_frame: u32::MAX,
            largest_video_frame: 0,
            keyframe_residual: 0.0,
            current_is_keyframe: true, // first frame always a keyframe
            limit_reached: false,
        };

        if let Err(e) = writer.write_header() {
            let _ = writer.codec.finish();
            return Err(e);
        }

        // current size plus the forthcoming index header
        writer.bytes_written = writer.writer.stream_position()? + 8;
        Ok(writer)
    }

    pub fn frames_written(&self) -> u32 {
        self.frame_index.len() as u32
    }

    pub fn samples_written(&self) -> u32 {
        self.samples_written
    }

    /// Current duration of the recording in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.frames_written() as f64 / self.fps
    }

    /// Approximate size of the file in bytes, including the index still to be
    /// written. Not a file position.
    pub fn current_size(&self) -> u64 {
        self.bytes_written
    }

    /// Short status string, e.g. `AVI zmbv`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Compress the current screen as the pending video frame, flushing the
    /// previous frame group first if it is complete.
    ///
    /// In a two-stream session, two video frames without audio between them
    /// fail with [`ExportError::VideoWithoutAudio`]. Once the size limit is
    /// crossed every call fails with [`ExportError::SizeLimitReached`] and
    /// the session should be closed.
    pub fn add_video_frame(&mut self, screen: &Screen) -> Result<(), ExportError> {
        if self.limit_reached {
            return Err(ExportError::SizeLimitReached);
        }
        match (self.pending_video, self.pending_audio) {
            (Pending::Poisoned, _) | (_, Pending::Poisoned) => return Err(ExportError::Poisoned),
            (Pending::Ready(_), _) if self.audio.is_none() => self.write_frame()?,
            (Pending::Ready(_), Pending::Ready(_)) => self.write_frame()?,
            (Pending::Ready(_), Pending::Idle) => return Err(ExportError::VideoWithoutAudio),
            (Pending::Idle, _) => {}
        }

        match self.codec.encode_frame(
            screen,
            &self.palette,
            self.current_is_keyframe,
            &mut self.video_buffer,
        ) {
            Ok(size) => {
                self.pending_video = Pending::Ready(size);
                Ok(())
            }
            Err(e) => {
                self.pending_video = Pending::Poisoned;
                Err(e.into())
            }
        }
    }

    /// Buffer `num_samples` PCM samples as the pending audio data, flushing
    /// the previous frame group first if it is complete. `buf` must hold at
    /// least `num_samples` samples.
    pub fn add_audio_samples(&mut self, buf: &[u8], num_samples: usize) -> Result<(), ExportError> {
        let Some(format) = self.audio else {
            return Err(ExportError::NoAudioStream);
        };
        if self.limit_reached {
            return Err(ExportError::SizeLimitReached);
        }
        match (self.pending_audio, self.pending_video) {
            (Pending::Poisoned, _) | (_, Pending::Poisoned) => return Err(ExportError::Poisoned),
            (Pending::Ready(_), Pending::Ready(_)) => self.write_frame()?,
            (Pending::Ready(_), Pending::Idle) => return Err(ExportError::AudioWithoutVideo),
            (Pending::Idle, _) => {}
        }

        let size = num_samples * format.sample_size as usize;
        if size > self.audio_buffer.len() {
            self.pending_audio = Pending::Poisoned;
            return Err(ExportError::AudioBufferTooSmall {
                samples: num_samples,
            });
        }
        self.audio_buffer[..size].copy_from_slice(&buf[..size]);
        self.pending_audio = Pending::Ready(num_samples);
        Ok(())
    }

    /// Flush the pending frame group: `00dc` chunk, optional `01wb` chunk,
    /// index entry, statistics and the keyframe cadence for the next frame.
    fn write_frame(&mut self) -> Result<(), ExportError> {
        let Pending::Ready(video_size) = self.pending_video else {
            return Err(ExportError::Poisoned);
        };
        if video_size > MAX_VIDEO_CHUNK {
            self.pending_video = Pending::Poisoned;
            return Err(ExportError::VideoFrameTooLarge { size: video_size });
        }

        let start = self.writer.stream_position()?;

        // Chunks are word-aligned: odd payloads get one zero pad byte, but
        // the length field records the unpadded size.
        let video_padding = video_size % 2;
        self.writer.put_tag(b"00dc")?;
        self.writer.put_u32_le(video_size as u32)?;
        self.writer.write_all(&self.video_buffer[..video_size])?;
        if video_padding != 0 {
            self.writer.write_all(&[0])?;
        }
        let mut expected = (8 + video_size + video_padding) as u64;

        let mut audio_size = 0usize;
        if let Some(format) = self.audio {
            let Pending::Ready(samples) = self.pending_audio else {
                return Err(ExportError::Poisoned);
            };
            audio_size = samples * format.sample_size as usize;
            if audio_size > MAX_AUDIO_CHUNK {
                self.pending_audio = Pending::Poisoned;
                return Err(ExportError::AudioChunkTooLarge { size: audio_size });
            }
            let audio_padding = audio_size % 2;
            self.writer.put_tag(b"01wb")?;
            self.writer.put_u32_le(audio_size as u32)?;
            self.writer
                .put_samples_le(&self.audio_buffer[..audio_size], format.sample_size as usize)?;
            if audio_padding != 0 {
                self.writer.write_all(&[0])?;
            }
            self.samples_written += samples as u32;
            expected += (8 + audio_size + audio_padding) as u64;
        }

        self.frame_index.push(FrameIndexEntry {
            video_size: video_size as u32,
            audio_size: audio_size as u32,
            keyframe: self.current_is_keyframe,
        });

        let frame_size = self.writer.stream_position()? - start;
        if frame_size != expected {
            return Err(ExportError::FrameSizeMismatch {
                expected,
                actual: frame_size,
            });
        }
        // plus 32 bytes for the frame's future index entries
        self.bytes_written += frame_size + 32;

        self.total_video_size += video_size as u64;
        self.smallest_video_frame = self.smallest_video_frame.min(video_size as u32);
        self.largest_video_frame = self.largest_video_frame.max(video_size as u32);

        if self.descriptor.uses_interframes {
            self.keyframe_residual += 1000.0 / self.fps;
            if self.keyframe_residual > self.keyframe_interval as f64 {
                self.current_is_keyframe = true;
                let interval = self.keyframe_interval as f64;
                self.keyframe_residual -= (self.keyframe_residual / interval).trunc() * interval;
            } else {
                self.current_is_keyframe = false;
            }
        } else {
            self.current_is_keyframe = true;
        }

        self.pending_video = Pending::Idle;
        self.pending_audio = Pending::Idle;

        if self.bytes_written > MAX_RECORDING_SIZE {
            self.limit_reached = true;
        }
        Ok(())
    }

    /// Lay the header down from offset 0. Called with placeholder sizes at
    /// open and with the final sizes at close.
    fn write_header(&mut self) -> Result<(), ExportError> {
        let w = &mut self.writer;
        let width = self.geometry.width as u32;
        let height = self.geometry.height as u32;
        let frames = self.frame_index.len() as u32;
        let num_streams = if self.audio.is_some() { 2 } else { 1 };

        w.seek(SeekFrom::Start(0))?;

        w.put_tag(b"RIFF")?;
        w.put_u32_le(self.size_riff)?; // length of entire file minus 8 bytes
        w.put_tag(b"AVI ")?;

        // hdrl LIST payload: the 'hdrl' identifier, avih, and the video strl
        // LIST (strh + strf with palette + strn)
        let mut list_size = 4 + 8 + 56 + (12 + (8 + 56 + 8 + 40 + 256 * 4 + 8 + 16));
        if num_streams == 2 {
            list_size += 12 + (8 + 56 + 8 + 18 + 8 + 12);
        }
        w.put_tag(b"LIST")?;
        w.put_u32_le(list_size)?;
        w.put_tag(b"hdrl")?;

        w.put_tag(b"avih")?;
        w.put_u32_le(56)?; // 14 x 4 byte words
        w.put_u32_le((1_000_000.0 / self.fps).round() as u32)?; // microseconds per frame
        w.put_u32_le(width * height * 3)?; // approximate bytes per second
        w.put_u32_le(0)?; // reserved
        w.put_u32_le(0x10)?; // flags: index at end of file
        w.put_u32_le(frames)?;
        w.put_u32_le(0)?; // initial frames
        w.put_u32_le(num_streams)?;
        w.put_u32_le(width * height * 3)?; // suggested buffer size
        w.put_u32_le(width)?;
        w.put_u32_le(height)?;
        w.put_u32_le(0)?; // reserved
        w.put_u32_le(0)?;
        w.put_u32_le(0)?;
        w.put_u32_le(0)?;

        // video stream list
        w.put_tag(b"LIST")?;
        w.put_u32_le(4 + 8 + 56 + 8 + 40 + 256 * 4 + 8 + 16)?;
        w.put_tag(b"strl")?;

        w.put_tag(b"strh")?;
        w.put_u32_le(56)?;
        w.put_tag(b"vids")?;
        w.put_tag(&self.descriptor.fourcc)?;
        w.put_u32_le(0)?; // flags
        w.put_u16_le(0)?; // priority
        w.put_u16_le(0)?; // language
        w.put_u32_le(0)?; // initial frames
        w.put_u32_le(1_000_000)?; // scale
        w.put_u32_le((self.fps * 1_000_000.0).round() as u32)?; // rate
        w.put_u32_le(0)?; // start
        w.put_u32_le(frames)?; // length, in frames for video
        w.put_u32_le(width * height * 3)?; // suggested buffer size
        w.put_u32_le(0)?; // quality
        w.put_u32_le(0)?; // sample size, 0 = variable
        w.put_u32_le(0)?; // rcRect
        w.put_u32_le(0)?;

        // BITMAPINFOHEADER plus the 256-entry palette
        w.put_tag(b"strf")?;
        w.put_u32_le(40 + 256 * 4)?;
        w.put_u32_le(40)?; // header size
        w.put_u32_le(width)?;
        w.put_u32_le(height)?;
        w.put_u16_le(1)?; // planes
        w.put_u16_le(8)?; // bits per pixel, paletted
        w.put_tag(&self.descriptor.bi_compression)?;
        w.put_u32_le(width * height * 3)?; // nominal image size
        w.put_u32_le(0)?; // x pels per meter
        w.put_u32_le(0)?; // y pels per meter
        w.put_u32_le(256)?; // colors used
        w.put_u32_le(0)?; // colors important, 0 = all
        for i in 0..=255u8 {
            w.write_all(&[self.palette.b(i), self.palette.g(i), self.palette.r(i), 0])?;
        }

        w.put_tag(b"strn")?;
        w.put_u32_le(16)?;
        w.write_all(b"atari800 video\0\0")?; // null terminator plus pad

        if let Some(format) = self.audio {
            // audio stream list
            w.put_tag(b"LIST")?;
            w.put_u32_le(4 + 8 + 56 + 8 + 18 + 8 + 12)?;
            w.put_tag(b"strl")?;

            w.put_tag(b"strh")?;
            w.put_u32_le(56)?;
            w.put_tag(b"auds")?;
            w.put_u32_le(1)?; // uncompressed PCM in the handler slot
            w.put_u32_le(0)?; // flags
            w.put_u16_le(0)?; // priority
            w.put_u16_le(0)?; // language
            w.put_u32_le(0)?; // initial frames
            w.put_u32_le(1)?; // scale
            w.put_u32_le(format.sample_rate)?; // rate, samples per second
            w.put_u32_le(0)?; // start
            w.put_u32_le(self.samples_written)?; // length, in samples for audio
            w.put_u32_le(format.byte_rate())?; // suggested buffer size
            w.put_u32_le(0)?; // quality
            w.put_u32_le(format.block_align() as u32)?; // sample size
            w.put_u32_le(0)?; // rcRect
            w.put_u32_le(0)?;

            // WAVEFORMATEX
            w.put_tag(b"strf")?;
            w.put_u32_le(18)?;
            w.put_u16_le(1)?; // PCM
            w.put_u16_le(format.channels)?;
            w.put_u32_le(format.sample_rate)?;
            w.put_u32_le(format.byte_rate())?;
            w.put_u16_le(format.block_align())?;
            w.put_u16_le(format.bits_per_sample())?;
            w.put_u16_le(0)?; // extension size

            w.put_tag(b"strn")?;
            w.put_u32_le(12)?;
            w.write_all(b"POKEY audio\0")?;
        }

        w.put_tag(b"LIST")?;
        w.put_u32_le(self.size_movi)?;
        self.movi_head_pos = self.writer.stream_position()?;
        self.writer.put_tag(b"movi")?;

        let expected = (12 + 8 + list_size + 12) as u64;
        let position = self.writer.stream_position()?;
        if position != expected {
            return Err(ExportError::HeaderSizeMismatch {
                expected,
                actual: position,
            });
        }
        Ok(())
    }

    /// Append the `idx1` chunk: one entry per video chunk and, for two-stream
    /// files, one per audio chunk, with offsets relative to the start of the
    /// `movi` list payload.
    fn write_index(&mut self) -> Result<(), ExportError> {
        let start = self.writer.stream_position()?;
        let entry_size: u32 = if self.audio.is_some() { 32 } else { 16 };
        let index_size = self.frame_index.len() as u32 * entry_size;

        self.writer.put_tag(b"idx1")?;
        self.writer.put_u32_le(index_size)?;

        let mut offset: u32 = 4;
        for entry in &self.frame_index {
            self.writer.put_tag(b"00dc")?;
            self.writer
                .put_u32_le(if entry.keyframe { AVIIF_KEYFRAME } else { 0 })?;
            self.writer.put_u32_le(offset)?;
            self.writer.put_u32_le(entry.video_size)?;
            offset += entry.video_size + 8 + entry.video_size % 2;

            if self.audio.is_some() {
                self.writer.put_tag(b"01wb")?;
                self.writer.put_u32_le(AVIIF_KEYFRAME)?; // PCM is all keyframes
                self.writer.put_u32_le(offset)?;
                self.writer.put_u32_le(entry.audio_size)?;
                offset += entry.audio_size + 8 + entry.audio_size % 2;
            }
        }

        let written = self.writer.stream_position()? - start;
        if written != (8 + index_size) as u64 {
            return Err(ExportError::IndexSizeMismatch {
                expected: (8 + index_size) as u64,
                actual: written,
            });
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), ExportError> {
        let flushable = matches!(self.pending_video, Pending::Ready(_))
            && (self.audio.is_none() || matches!(self.pending_audio, Pending::Ready(_)));
        if flushable {
            self.write_frame()?;
        }

        if !self.frame_index.is_empty() {
            let seconds = (self.frames_written() as f64 / self.fps) as u64;
            log::info!(
                "AVI stats: {}:{:02}:{:02}, {}MB, {} frames; video codec avg frame size {:.1}kB, min={:.1}kB, max={:.1}kB",
                seconds / 3600,
                (seconds / 60) % 60,
                seconds % 60,
                self.bytes_written / 1024 / 1024,
                self.frames_written(),
                self.total_video_size as f64 / self.frames_written() as f64 / 1024.0,
                self.smallest_video_frame as f64 / 1024.0,
                self.largest_video_frame as f64 / 1024.0,
            );
        }

        self.size_movi = (self.writer.stream_position()? - self.movi_head_pos) as u32;
        self.write_index()?;
        self.size_riff = (self.writer.stream_position()? - 8) as u32;
        self.write_header()?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush a final complete frame group, append the index, rewrite the
    /// header with the real sizes and release the codec. Must be called for
    /// the file to be playable.
    pub fn close(mut self) -> Result<W, ExportError> {
        let result = self.finalize();
        let finish_result = self.codec.finish();
        result?;
        finish_result.map_err(ExportError::from)?;
        Ok(self.writer)
    }

    #[cfg(test)]
    fn force_bytes_written(&mut self, bytes: u64) {
        self.bytes_written = bytes;
    }
}
