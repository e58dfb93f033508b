//! PNG still-image encoder on top of the `png` crate.
//!
//! Writes 8-bit indexed color for a plain save and 8-bit RGB when two
//! interlaced screens are blended. The same entry point drives file output
//! and the in-memory buffers used by the per-frame PNG video codec.

use std::io::{self, Write};

use crate::screen::{Palette, Screen, VideoGeometry};

/// Map the session's 0-9 compression level onto the `png` crate's tiers.
pub(crate) fn compression(level: u8) -> ::png::Compression {
    match level {
        0..=3 => ::png::Compression::Fast,
        4..=6 => ::png::Compression::Default,
        _ => ::png::Compression::Best,
    }
}

/// Save one frame as PNG, optionally blending a second interlaced screen.
///
/// `compression_level` is the session-wide 0-9 deflate setting.
pub fn save_screen<W: Write>(
    w: W,
    geometry: VideoGeometry,
    palette: &Palette,
    screen: &Screen,
    interlaced: Option<&Screen>,
    compression_level: u8,
) -> io::Result<()> {
    let mut encoder = ::png::Encoder::new(w, geometry.width as u32, geometry.height as u32);
    encoder.set_depth(::png::BitDepth::Eight);
    encoder.set_compression(compression(compression_level));

    let data = match interlaced {
        None => {
            encoder.set_color(::png::ColorType::Indexed);
            let mut plte = Vec::with_capacity(256 * 3);
            for i in 0..=255u8 {
                plte.extend_from_slice(&[palette.r(i), palette.g(i), palette.b(i)]);
            }
            encoder.set_palette(plte);

            let mut data = Vec::with_capacity(geometry.width * geometry.height);
            for row in geometry.rows(screen) {
                data.extend_from_slice(row);
            }
            data
        }
        Some(second) => {
            encoder.set_color(::png::ColorType::Rgb);

            let mut data = Vec::with_capacity(3 * geometry.width * geometry.height);
            for y in 0..geometry.height {
                let row1 = geometry.row(screen, y);
                let row2 = geometry.row(second, y);
                for (&a, &b) in row1.iter().zip(row2) {
                    let (r, g, b) = palette.blend(a, b);
                    data.extend_from_slice(&[r, g, b]);
                }
            }
            data
        }
    };

    let mut writer = encoder.write_header().map_err(io::Error::from)?;
    writer.write_image_data(&data).map_err(io::Error::from)?;
    writer.finish().map_err(io::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::{SCREEN_HEIGHT, SCREEN_WIDTH};

    fn test_palette() -> Palette {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let i = i as u32;
            *entry = (i << 16) | ((i ^ 0xff) << 8) | (255 - i);
        }
        Palette::new(table)
    }

    fn patterned_screen() -> Vec<u8> {
        let mut pixels = vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        for (i, px) in pixels.iter_mut().enumerate() {
            *px = (i % 251) as u8;
        }
        pixels
    }

    #[test]
    fn indexed_roundtrip() -> io::Result<()> {
        let pixels = patterned_screen();
        let screen = Screen::new(&pixels);
        let geometry = VideoGeometry::from_visible_window(24, 10, 88, 42);
        let palette = test_palette();

        let mut out = Vec::new();
        save_screen(&mut out, geometry, &palette, &screen, None, 6)?;

        let decoder = ::png::Decoder::new(out.as_slice());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!(info.width, 64);
        assert_eq!(info.height, 32);
        assert_eq!(info.color_type, ::png::ColorType::Indexed);

        for y in 0..32 {
            assert_eq!(&buf[y * 64..(y + 1) * 64], geometry.row(&screen, y));
        }
        let plte = reader.info().palette.as_ref().unwrap();
        assert_eq!(&plte[3 * 9..3 * 10], &[9, 9 ^ 0xff, 255 - 9]);
        Ok(())
    }

    #[test]
    fn interlaced_blends_to_rgb() -> io::Result<()> {
        let pixels1 = vec![10u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        let pixels2 = vec![30u8; SCREEN_WIDTH * SCREEN_HEIGHT];
        let screen1 = Screen::new(&pixels1);
        let screen2 = Screen::new(&pixels2);
        let geometry = VideoGeometry::from_visible_window(0, 0, 8, 4);
        let palette = test_palette();

        let mut out = Vec::new();
        save_screen(&mut out, geometry, &palette, &screen1, Some(&screen2), 6)?;

        let decoder = ::png::Decoder::new(out.as_slice());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!(info.color_type, ::png::ColorType::Rgb);

        let expected = palette.blend(10, 30);
        for px in buf[..info.buffer_size()].chunks_exact(3) {
            assert_eq!((px[0], px[1], px[2]), expected);
        }
        Ok(())
    }

    #[test]
    fn level_maps_to_encoder_tiers() {
        assert!(matches!(compression(0), ::png::Compression::Fast));
        assert!(matches!(compression(6), ::png::Compression::Default));
        assert!(matches!(compression(9), ::png::Compression::Best));
    }
}
