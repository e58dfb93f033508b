//! DOSBox Zip Motion Block Video codec, 8-bit paletted format.
//!
//! Keyframes carry the palette and the whole frame; inter-frames carry one
//! motion/change marker per 16x16 block plus XOR deltas for the blocks that
//! changed. No motion search is performed, so every vector is zero. The
//! payload runs through a single zlib stream that is sync-flushed after every
//! frame and reset on keyframes, which is what decoders expect.

use flate2::{Compress, Compression, FlushCompress, Status};

use super::{CodecDescriptor, FrameBuf, VideoCodec};
use crate::errors::CodecError;
use crate::screen::{Palette, Screen, VideoGeometry};

pub const DESCRIPTOR: CodecDescriptor = CodecDescriptor {
    id: "zmbv",
    description: "Zip Motion Block Video",
    fourcc: *b"ZMBV",
    bi_compression: *b"ZMBV",
    uses_interframes: true,
    create: |config| Box::new(ZmbvCodec::new(config.compression_level)),
};

const KEYFRAME_FLAG: u8 = 0x01;
const PALETTE_CHANGE_FLAG: u8 = 0x02;
const VERSION_HIGH: u8 = 0;
const VERSION_LOW: u8 = 1;
const COMPRESSION_ZLIB: u8 = 1;
const FORMAT_8BPP: u8 = 4;
const BLOCK_SIZE: usize = 16;

pub struct ZmbvCodec {
    compression_level: u8,
    geometry: Option<VideoGeometry>,
    compressor: Option<Compress>,
    prev: Vec<u8>,
    palette: [u8; 768],
    work: Vec<u8>,
}

impl ZmbvCodec {
    pub fn new(compression_level: u8) -> Self {
        Self {
            compression_level,
            geometry: None,
            compressor: None,
            prev: Vec::new(),
            palette: [0; 768],
            work: Vec::new(),
        }
    }

    /// Deflate the assembled frame payload into the scratch buffer with a
    /// sync flush. Per zlib, the flush is complete once a call returns with
    /// output space left over.
    fn deflate_into(&mut self, out: &mut FrameBuf) -> Result<(), CodecError> {
        let compressor = self.compressor.as_mut().expect("codec started");
        let base_in = compressor.total_in();
        let mut consumed = 0usize;
        loop {
            if out.remaining() == 0 {
                return Err(CodecError::BufferTooSmall {
                    capacity: out.capacity(),
                });
            }
            let before_out = out.len();
            let before_total = compressor.total_out();
            let status = compressor
                .compress(&self.work[consumed..], out.unfilled(), FlushCompress::Sync)
                .map_err(|e| CodecError::Compress(e.to_string()))?;
            out.advance((compressor.total_out() - before_total) as usize);

            let now_consumed = (compressor.total_in() - base_in) as usize;
            let progressed = now_consumed != consumed || out.len() != before_out;
            consumed = now_consumed;

            if consumed == self.work.len()
                && out.remaining() > 0
                && matches!(status, Status::Ok)
            {
                return Ok(());
            }
            if !progressed {
                return Err(CodecError::Compress("deflate made no progress".into()));
            }
        }
    }
}

impl VideoCodec for ZmbvCodec {
    fn start(&mut self, geometry: VideoGeometry) -> Result<usize, CodecError> {
        self.prev = vec![0; geometry.width * geometry.height];
        self.palette = [0; 768];
        self.compressor = Some(Compress::new(
            Compression::new(self.compression_level as u32),
            true,
        ));
        self.geometry = Some(geometry);

        // worst case is an incompressible inter-frame: palette delta, block
        // table, full XOR data, plus the deflate stored-block expansion
        let raw = 768 + geometry.width * geometry.height + 2 * block_count(geometry) + 4;
        Ok(7 + raw + raw / 1000 + 128)
    }

    fn encode_frame(
        &mut self,
        screen: &Screen,
        palette: &Palette,
        keyframe: bool,
        dest: &mut [u8],
    ) -> Result<usize, CodecError> {
        let Some(geometry) = self.geometry else {
            return Err(CodecError::Compress("codec used before start".into()));
        };

        let mut pal = [0u8; 768];
        for i in 0..=255u8 {
            pal[3 * i as usize] = palette.r(i);
            pal[3 * i as usize + 1] = palette.g(i);
            pal[3 * i as usize + 2] = palette.b(i);
        }

        self.work.clear();
        let mut out = FrameBuf::new(dest);

        if keyframe {
            out.extend(&[
                KEYFRAME_FLAG,
                VERSION_HIGH,
                VERSION_LOW,
                COMPRESSION_ZLIB,
                FORMAT_8BPP,
                BLOCK_SIZE as u8,
                BLOCK_SIZE as u8,
            ])?;
            self.work.extend_from_slice(&pal);
            for y in 0..geometry.height {
                self.work.extend_from_slice(geometry.row(screen, y));
            }
            self.compressor.as_mut().expect("codec started").reset();
        } else {
            let mut flags = 0u8;
            if pal != self.palette {
                flags |= PALETTE_CHANGE_FLAG;
            }
            out.push(flags)?;
            if flags & PALETTE_CHANGE_FLAG != 0 {
                for (new, old) in pal.iter().zip(&self.palette) {
                    self.work.push(new ^ old);
                }
            }

            // one (vector, changed) marker pair per block; the table is
            // padded to a 4-byte boundary before the XOR data starts
            let mut changed_blocks = Vec::new();
            for (x0, y0, bw, bh) in blocks(geometry) {
                let changed = (y0..y0 + bh).any(|y| {
                    geometry.row(screen, y)[x0..x0 + bw]
                        != self.prev[y * geometry.width + x0..y * geometry.width + x0 + bw]
                });
                self.work.extend_from_slice(&[changed as u8, 0]);
                if changed {
                    changed_blocks.push((x0, y0, bw, bh));
                }
            }
            while self.work.len() % 4 != 0 {
                self.work.push(0);
            }
            for (x0, y0, bw, bh) in changed_blocks {
                for y in y0..y0 + bh {
                    let row = &geometry.row(screen, y)[x0..x0 + bw];
                    let prev = &self.prev[y * geometry.width + x0..y * geometry.width + x0 + bw];
                    for (a, b) in row.iter().zip(prev) {
                        self.work.push(a ^ b);
                    }
                }
            }
        }

        self.deflate_into(&mut out)?;

        self.palette = pal;
        for y in 0..geometry.height {
            self.prev[y * geometry.width..(y + 1) * geometry.width]
                .copy_from_slice(geometry.row(screen, y));
        }
        Ok(out.len())
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        self.compressor = None;
        self.geometry = None;
        self.prev = Vec::new();
        Ok(())
    }
}

fn block_count(geometry: VideoGeometry) -> usize {
    geometry.width.div_ceil(BLOCK_SIZE) * geometry.height.div_ceil(BLOCK_SIZE)
}

/// Block grid in encoding order, edge blocks clipped to the frame.
fn blocks(geometry: VideoGeometry) -> impl Iterator<Item = (usize, usize, usize, usize)> {
    let width = geometry.width;
    let height = geometry.height;
    (0..height.div_ceil(BLOCK_SIZE)).flat_map(move |by| {
        (0..width.div_ceil(BLOCK_SIZE)).map(move |bx| {
            let x0 = bx * BLOCK_SIZE;
            let y0 = by * BLOCK_SIZE;
            (x0, y0, BLOCK_SIZE.min(width - x0), BLOCK_SIZE.min(height - y0))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::{SCREEN_HEIGHT, SCREEN_WIDTH};
    use flate2::{Decompress, FlushDecompress};

    fn test_palette() -> Palette {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = (i as u32) * 0x010203;
        }
        Palette::new(table)
    }

    /// Decoder-side inflate state: one zlib stream shared across frames,
    /// reset only on keyframes, exactly like a ZMBV player.
    struct Inflater(Decompress);

    impl Inflater {
        fn new() -> Self {
            Self(Decompress::new(true))
        }

        fn inflate(&mut self, keyframe_payload: bool, data: &[u8]) -> Vec<u8> {
            if keyframe_payload {
                self.0.reset(true);
            }
            let before = self.0.total_out();
            let mut out = vec![0u8; 1 << 20];
            self.0
                .decompress(data, &mut out, FlushDecompress::Sync)
                .unwrap();
            out.truncate((self.0.total_out() - before) as usize);
            out
        }
    }

    fn geometry() -> VideoGeometry {
        VideoGeometry::from_visible_window(24, 0, 360, 240)
    }

    #[test]
    fn keyframe_carries_palette_and_pixels() {
        let geometry = geometry();
        let mut codec = ZmbvCodec::new(6);
        let max = codec.start(geometry).unwrap();
        let mut dest = vec![0u8; max];

        let pixels: Vec<u8> = (0..SCREEN_WIDTH * SCREEN_HEIGHT)
            .map(|i| (i % 256) as u8)
            .collect();
        let screen = Screen::new(&pixels);
        let palette = test_palette();
        let size = codec
            .encode_frame(&screen, &palette, true, &mut dest)
            .unwrap();

        assert_eq!(
            &dest[..7],
            &[KEYFRAME_FLAG, 0, 1, COMPRESSION_ZLIB, FORMAT_8BPP, 16, 16]
        );
        let payload = Inflater::new().inflate(true, &dest[7..size]);
        assert_eq!(payload.len(), 768 + geometry.width * geometry.height);
        assert_eq!(&payload[..3], &[0, 0, 0]);
        assert_eq!(&payload[3..6], &[1, 2, 3]);
        for y in 0..geometry.height {
            assert_eq!(
                &payload[768 + y * geometry.width..768 + (y + 1) * geometry.width],
                geometry.row(&screen, y)
            );
        }
        codec.finish().unwrap();
    }

    #[test]
    fn unchanged_interframe_marks_no_blocks() {
        let geometry = geometry();
        let mut codec = ZmbvCodec::new(6);
        let max = codec.start(geometry).unwrap();
        let mut dest = vec![0u8; max];
        let mut inflater = Inflater::new();

        let pixels = vec![5u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        let screen = Screen::new(&pixels);
        let palette = test_palette();
        let key_size = codec
            .encode_frame(&screen, &palette, true, &mut dest)
            .unwrap();
        inflater.inflate(true, &dest[7..key_size]);

        let size = codec
            .encode_frame(&screen, &palette, false, &mut dest)
            .unwrap();
        assert_eq!(dest[0], 0); // inter-frame, no palette change
        let payload = inflater.inflate(false, &dest[1..size]);
        let table = 2 * block_count(geometry);
        assert_eq!(payload.len(), table.next_multiple_of(4));
        assert!(payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn changed_block_gets_xor_data() {
        let geometry = geometry();
        let mut codec = ZmbvCodec::new(6);
        let max = codec.start(geometry).unwrap();
        let mut dest = vec![0u8; max];
        let mut inflater = Inflater::new();

        let pixels1 = vec![5u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        let screen1 = Screen::new(&pixels1);
        let palette = test_palette();
        let key_size = codec
            .encode_frame(&screen1, &palette, true, &mut dest)
            .unwrap();
        inflater.inflate(true, &dest[7..key_size]);

        // touch one pixel inside the first block of the window
        let mut pixels2 = pixels1.clone();
        pixels2[24 + 2] = 6;
        let screen2 = Screen::new(&pixels2);
        let size = codec
            .encode_frame(&screen2, &palette, false, &mut dest)
            .unwrap();

        let payload = inflater.inflate(false, &dest[1..size]);
        let table = 2 * block_count(geometry);
        assert_eq!(payload[0], 1); // first block marked changed, vector zero
        assert_eq!(payload[1], 0);
        assert!(payload[2..table].iter().all(|&b| b == 0));
        let xor = &payload[table.next_multiple_of(4)..];
        assert_eq!(xor.len(), BLOCK_SIZE * BLOCK_SIZE);
        assert_eq!(xor.iter().filter(|&&b| b != 0).count(), 1);
        assert_eq!(xor[2], 5 ^ 6);
    }

    #[test]
    fn palette_change_is_xored_into_the_stream() {
        let geometry = geometry();
        let mut codec = ZmbvCodec::new(6);
        let max = codec.start(geometry).unwrap();
        let mut dest = vec![0u8; max];
        let mut inflater = Inflater::new();

        let pixels = vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        let screen = Screen::new(&pixels);
        let key_size = codec
            .encode_frame(&screen, &test_palette(), true, &mut dest)
            .unwrap();
        inflater.inflate(true, &dest[7..key_size]);

        let mut table = [0u32; 256];
        table[0] = 0x00ff0000;
        let changed = Palette::new(table);
        let size = codec
            .encode_frame(&screen, &changed, false, &mut dest)
            .unwrap();

        assert_eq!(dest[0], PALETTE_CHANGE_FLAG);
        let payload = inflater.inflate(false, &dest[1..size]);
        assert_eq!(payload[0], 0xff); // red channel of entry 0 flipped
        // the other 255 entries flip by the old values, matching the table
        assert_eq!(payload[3], 1 ^ 0);
    }
}
