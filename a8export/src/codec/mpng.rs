//! Motion PNG: one complete indexed-color PNG per frame.
//!
//! There is no notion of a delta from the previous frame, so every frame is a
//! keyframe and the codec never becomes the automatic choice; it exists for
//! hosts that want frames they can extract with any image tool.

use std::io::{self, Write};

use super::{CodecDescriptor, VideoCodec};
use crate::errors::CodecError;
use crate::png;
use crate::screen::{Palette, Screen, VideoGeometry};

pub const DESCRIPTOR: CodecDescriptor = CodecDescriptor {
    id: "mpng",
    description: "Motion PNG",
    fourcc: *b"MPNG",
    bi_compression: *b"MPNG",
    uses_interframes: false,
    create: |config| Box::new(MpngCodec::new(config.compression_level)),
};

pub struct MpngCodec {
    compression_level: u8,
    geometry: Option<VideoGeometry>,
}

impl MpngCodec {
    pub fn new(compression_level: u8) -> Self {
        Self {
            compression_level,
            geometry: None,
        }
    }
}

impl VideoCodec for MpngCodec {
    fn start(&mut self, geometry: VideoGeometry) -> Result<usize, CodecError> {
        self.geometry = Some(geometry);
        // filtered scan lines plus deflate stored-block expansion, palette
        // chunk and the fixed chunk scaffolding
        let raw = (geometry.width + 1) * geometry.height;
        Ok(raw + raw / 1000 + 2048)
    }

    fn encode_frame(
        &mut self,
        screen: &Screen,
        palette: &Palette,
        _keyframe: bool,
        dest: &mut [u8],
    ) -> Result<usize, CodecError> {
        let Some(geometry) = self.geometry else {
            return Err(CodecError::Compress("codec used before start".into()));
        };

        let mut sink = BoundedSink { dest, len: 0 };
        match png::save_screen(
            &mut sink,
            geometry,
            palette,
            screen,
            None,
            self.compression_level,
        ) {
            Ok(()) => Ok(sink.len),
            Err(e) if e.kind() == io::ErrorKind::WriteZero => Err(CodecError::BufferTooSmall {
                capacity: sink.dest.len(),
            }),
            Err(e) => Err(CodecError::Encode(e)),
        }
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        self.geometry = None;
        Ok(())
    }
}

/// `Write` adapter over the fixed scratch buffer; overrunning it surfaces as
/// `WriteZero` and becomes a buffer-too-small codec failure.
struct BoundedSink<'a> {
    dest: &'a mut [u8],
    len: usize,
}

impl Write for BoundedSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.len + buf.len() > self.dest.len() {
            return Err(io::ErrorKind::WriteZero.into());
        }
        self.dest[self.len..self.len + buf.len()].copy_from_slice(buf);
        self.len += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
