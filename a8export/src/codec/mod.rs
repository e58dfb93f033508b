//! Video codec plug-in contract and registry.
//!
//! A codec is a [`CodecDescriptor`] (immutable metadata plus a constructor)
//! and a [`VideoCodec`] implementation (per-session state). The registry is a
//! fixed ordered list known at build time; selection is by id or `auto`.

pub mod mpng;
pub mod mrle;
pub mod zmbv;

use crate::config::{CodecRequest, ExportConfig};
use crate::errors::{CodecError, ConfigError};
use crate::screen::{Palette, Screen, VideoGeometry};

/// Immutable description of one codec in the registry.
pub struct CodecDescriptor {
    /// Short identifier matched case-insensitively against user requests.
    pub id: &'static str,
    pub description: &'static str,
    /// 4-byte handler tag for the AVI stream header.
    pub fourcc: [u8; 4],
    /// 4-byte compression tag for the BITMAPINFOHEADER. May differ from
    /// `fourcc`; MRLE uses the numeric BI_RLE8 tag here.
    pub bi_compression: [u8; 4],
    /// False means every frame is a keyframe and the keyframe cadence is
    /// ignored.
    pub uses_interframes: bool,
    create: fn(&ExportConfig) -> Box<dyn VideoCodec>,
}

impl CodecDescriptor {
    pub fn create(&self, config: &ExportConfig) -> Box<dyn VideoCodec> {
        (self.create)(config)
    }
}

/// Per-session compression state of one codec.
///
/// `start` is called once before any frame, `finish` exactly once when the
/// session ends.
pub trait VideoCodec {
    /// Prepare for a session on the given recording window. Returns the
    /// largest compressed size one frame can take, so the caller can size the
    /// scratch buffer.
    fn start(&mut self, geometry: VideoGeometry) -> Result<usize, CodecError>;

    /// Compress one frame into `dest` and return the compressed size. Zero is
    /// a valid size for inter-frames. `keyframe` requests a self-contained
    /// frame; codecs without interframes ignore it.
    fn encode_frame(
        &mut self,
        screen: &Screen,
        palette: &Palette,
        keyframe: bool,
        dest: &mut [u8],
    ) -> Result<usize, CodecError>;

    /// Release session state.
    fn finish(&mut self) -> Result<(), CodecError>;
}

/// Built-in codecs in registry order.
pub static CODECS: &[CodecDescriptor] = &[mrle::DESCRIPTOR, mpng::DESCRIPTOR, zmbv::DESCRIPTOR];

/// Look a codec up by id, case-insensitively.
pub fn find_codec(id: &str) -> Option<&'static CodecDescriptor> {
    CODECS.iter().find(|c| c.id.eq_ignore_ascii_case(id))
}

/// Resolve a configured request to a registry entry.
///
/// `auto` picks ZMBV: its compressed stream beats RLE on nearly every screen,
/// and per-frame PNG is never a default.
pub fn select_codec(request: &CodecRequest) -> Result<&'static CodecDescriptor, ConfigError> {
    match request {
        CodecRequest::Auto => Ok(&zmbv::DESCRIPTOR),
        CodecRequest::Id(id) => {
            find_codec(id).ok_or_else(|| ConfigError::UnknownCodec(id.clone()))
        }
    }
}

/// Bounded byte sink for compressed frame data. Overflow is reported as
/// [`CodecError::BufferTooSmall`], which poisons the recording session.
pub(crate) struct FrameBuf<'a> {
    dest: &'a mut [u8],
    len: usize,
}

impl<'a> FrameBuf<'a> {
    pub(crate) fn new(dest: &'a mut [u8]) -> Self {
        Self { dest, len: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.dest.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.dest.len() - self.len
    }

    /// Unwritten tail of the buffer, for encoders that fill it directly.
    pub(crate) fn unfilled(&mut self) -> &mut [u8] {
        &mut self.dest[self.len..]
    }

    /// Mark `n` bytes of the unfilled tail as written.
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.len + n <= self.dest.len());
        self.len += n;
    }

    pub(crate) fn push(&mut self, byte: u8) -> Result<(), CodecError> {
        self.extend(&[byte])
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        if self.len + bytes.len() > self.dest.len() {
            return Err(CodecError::BufferTooSmall {
                capacity: self.dest.len(),
            });
        }
        self.dest[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_order_and_lookup() {
        let ids: Vec<&str> = CODECS.iter().map(|c| c.id).collect();
        assert_eq!(ids, ["mrle", "mpng", "zmbv"]);
        assert_eq!(find_codec("MRLE").unwrap().id, "mrle");
        assert!(find_codec("avc1").is_none());
    }

    #[test]
    fn auto_selects_zmbv() {
        let descriptor = select_codec(&CodecRequest::Auto).unwrap();
        assert_eq!(descriptor.id, "zmbv");
    }

    #[test]
    fn explicit_request_wins_over_auto() {
        let descriptor = select_codec(&CodecRequest::Id("mpng".into())).unwrap();
        assert_eq!(descriptor.id, "mpng");
        assert!(select_codec(&CodecRequest::Id("none".into())).is_err());
    }

    #[test]
    fn frame_buf_reports_overflow() {
        let mut dest = [0u8; 4];
        let mut buf = FrameBuf::new(&mut dest);
        buf.extend(&[1, 2, 3]).unwrap();
        assert_eq!(buf.len(), 3);
        assert!(matches!(
            buf.extend(&[4, 5]),
            Err(CodecError::BufferTooSmall { capacity: 4 })
        ));
    }
}
