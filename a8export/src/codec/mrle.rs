//! Microsoft RLE8 video codec.
//!
//! The weakest compressor in the registry but decodable by virtually every
//! AVI player. Scan lines are encoded bottom-up as the DIB format requires.
//! Inter-frames re-encode only the scan lines that changed, skipping the rest
//! with delta escapes.

use super::{CodecDescriptor, FrameBuf, VideoCodec};
use crate::errors::CodecError;
use crate::screen::{Palette, Screen, VideoGeometry};

pub const DESCRIPTOR: CodecDescriptor = CodecDescriptor {
    id: "mrle",
    description: "Microsoft Run-Length Encoding",
    fourcc: *b"MRLE",
    bi_compression: [1, 0, 0, 0], // BI_RLE8
    uses_interframes: true,
    create: |_| Box::new(MrleCodec::default()),
};

// escape opcodes following a zero count byte
const END_OF_LINE: u8 = 0x00;
const END_OF_BITMAP: u8 = 0x01;
const DELTA: u8 = 0x02;

#[derive(Default)]
pub struct MrleCodec {
    geometry: Option<VideoGeometry>,
    prev: Vec<u8>,
}

impl VideoCodec for MrleCodec {
    fn start(&mut self, geometry: VideoGeometry) -> Result<usize, CodecError> {
        self.prev = vec![0; geometry.width * geometry.height];
        self.geometry = Some(geometry);
        // worst case: every pixel a lone run pair, plus per-line and final escapes
        Ok(2 * geometry.width * geometry.height + 2 * geometry.height + 2)
    }

    fn encode_frame(
        &mut self,
        screen: &Screen,
        _palette: &Palette,
        keyframe: bool,
        dest: &mut [u8],
    ) -> Result<usize, CodecError> {
        let Some(geometry) = self.geometry else {
            return Err(CodecError::Compress("codec used before start".into()));
        };
        let width = geometry.width;
        let mut out = FrameBuf::new(dest);

        // RLE8 bitmaps run bottom-up; a delta escape skips unchanged lines
        let mut skip = 0usize;
        for y in (0..geometry.height).rev() {
            let row = geometry.row(screen, y);
            let prev_row = &self.prev[y * width..(y + 1) * width];
            if !keyframe && row == prev_row {
                skip += 1;
                continue;
            }
            while skip > 0 {
                let n = skip.min(255);
                out.extend(&[0x00, DELTA, 0x00, n as u8])?;
                skip -= n;
            }
            encode_line(&mut out, row)?;
            out.extend(&[0x00, END_OF_LINE])?;
        }
        out.extend(&[0x00, END_OF_BITMAP])?;

        for y in 0..geometry.height {
            self.prev[y * width..(y + 1) * width].copy_from_slice(geometry.row(screen, y));
        }
        Ok(out.len())
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        self.geometry = None;
        self.prev = Vec::new();
        Ok(())
    }
}

fn run_length(row: &[u8], x: usize) -> usize {
    let value = row[x];
    row[x..].iter().take(255).take_while(|&&v| v == value).count()
}

fn encode_line(out: &mut FrameBuf, row: &[u8]) -> Result<(), CodecError> {
    let mut x = 0;
    while x < row.len() {
        let run = run_length(row, x);
        if run >= 2 {
            out.extend(&[run as u8, row[x]])?;
            x += run;
            continue;
        }
        // stretch of lone pixels; absolute mode once it pays for its escape
        let start = x;
        x += 1;
        while x < row.len() && x - start < 255 && run_length(row, x) < 3 {
            x += 1;
        }
        let count = x - start;
        if count >= 3 {
            out.extend(&[0x00, count as u8])?;
            out.extend(&row[start..x])?;
            if count % 2 == 1 {
                out.push(0)?; // absolute runs are word-aligned
            }
        } else {
            for &value in &row[start..x] {
                out.extend(&[1, value])?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::{SCREEN_HEIGHT, SCREEN_WIDTH};

    fn blank_palette() -> Palette {
        Palette::new([0u32; 256])
    }

    /// Reference RLE8 decoder: applies `data` on top of `canvas` (top-down
    /// row-major, `width` wide) the way a player would.
    fn decode_rle8(data: &[u8], canvas: &mut [u8], width: usize, height: usize) {
        let mut x = 0usize;
        let mut line = 0usize; // 0 = bottom line
        let mut i = 0;
        while i < data.len() {
            let count = data[i];
            let code = data[i + 1];
            i += 2;
            if count > 0 {
                let y = height - 1 - line;
                canvas[y * width + x..y * width + x + count as usize].fill(code);
                x += count as usize;
            } else {
                match code {
                    END_OF_LINE => {
                        x = 0;
                        line += 1;
                    }
                    END_OF_BITMAP => return,
                    DELTA => {
                        x += data[i] as usize;
                        line += data[i + 1] as usize;
                        i += 2;
                    }
                    n => {
                        let y = height - 1 - line;
                        canvas[y * width + x..y * width + x + n as usize]
                            .copy_from_slice(&data[i..i + n as usize]);
                        x += n as usize;
                        i += n as usize + (n as usize & 1);
                    }
                }
            }
        }
    }

    fn geometry() -> VideoGeometry {
        VideoGeometry::from_visible_window(24, 0, 360, 240)
    }

    fn patterned(seed: u8) -> Vec<u8> {
        let mut pixels = vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        for (i, px) in pixels.iter_mut().enumerate() {
            *px = if i % 17 < 9 { seed } else { (i % 251) as u8 };
        }
        pixels
    }

    #[test]
    fn keyframe_roundtrip() {
        let geometry = geometry();
        let mut codec = MrleCodec::default();
        let max = codec.start(geometry).unwrap();
        let mut dest = vec![0u8; max];

        let pixels = patterned(3);
        let screen = Screen::new(&pixels);
        let size = codec
            .encode_frame(&screen, &blank_palette(), true, &mut dest)
            .unwrap();
        assert!(size > 0 && size <= max);

        let mut canvas = vec![0xaa; geometry.width * geometry.height];
        decode_rle8(&dest[..size], &mut canvas, geometry.width, geometry.height);
        for y in 0..geometry.height {
            assert_eq!(
                &canvas[y * geometry.width..(y + 1) * geometry.width],
                geometry.row(&screen, y),
                "scan line {y}"
            );
        }
        codec.finish().unwrap();
    }

    #[test]
    fn unchanged_interframe_is_a_bare_terminator() {
        let mut codec = MrleCodec::default();
        let max = codec.start(geometry()).unwrap();
        let mut dest = vec![0u8; max];

        let pixels = patterned(3);
        let screen = Screen::new(&pixels);
        codec
            .encode_frame(&screen, &blank_palette(), true, &mut dest)
            .unwrap();
        let size = codec
            .encode_frame(&screen, &blank_palette(), false, &mut dest)
            .unwrap();
        assert_eq!(&dest[..size], &[0x00, END_OF_BITMAP]);
    }

    #[test]
    fn interframe_patches_changed_lines_only() {
        let geometry = geometry();
        let mut codec = MrleCodec::default();
        let max = codec.start(geometry).unwrap();
        let mut dest = vec![0u8; max];

        let pixels1 = patterned(3);
        let screen1 = Screen::new(&pixels1);
        let key_size = codec
            .encode_frame(&screen1, &blank_palette(), true, &mut dest)
            .unwrap();

        let mut canvas = vec![0u8; geometry.width * geometry.height];
        decode_rle8(&dest[..key_size], &mut canvas, geometry.width, geometry.height);

        let mut pixels2 = pixels1.clone();
        for x in 0..SCREEN_WIDTH {
            pixels2[40 * SCREEN_WIDTH + x] = 99;
        }
        let screen2 = Screen::new(&pixels2);
        let delta_size = codec
            .encode_frame(&screen2, &blank_palette(), false, &mut dest)
            .unwrap();
        assert!(delta_size < key_size);

        decode_rle8(&dest[..delta_size], &mut canvas, geometry.width, geometry.height);
        for y in 0..geometry.height {
            assert_eq!(
                &canvas[y * geometry.width..(y + 1) * geometry.width],
                geometry.row(&screen2, y),
                "scan line {y}"
            );
        }
    }
}
