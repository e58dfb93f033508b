//! Synthetic frame and audio source standing in for a live emulator: a
//! scrolling color-bar screen with a moving raster band, and a 440Hz tone
//! paced to the TV standard's frame rate.

use a8export::screen::{Palette, SCREEN_HEIGHT, SCREEN_WIDTH, TvStandard};
use a8export::wav::AudioFormat;

const TONE_HZ: f64 = 440.0;

pub struct TestSource {
    fps: f64,
    frame: u64,
    pixels: Vec<u8>,
    tone_phase: f64,
    sample_acc: f64,
}

impl TestSource {
    pub fn new(tv: TvStandard) -> Self {
        let mut source = Self {
            fps: tv.fps(),
            frame: 0,
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            tone_phase: 0.0,
            sample_acc: 0.0,
        };
        source.render();
        source
    }

    /// 16 hues by 16 luminances, hue 0 being the gray ramp.
    pub fn palette() -> Palette {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let lum = (i & 0x0f) as f64 / 15.0;
            let hue = i >> 4;
            let (r, g, b) = if hue == 0 {
                (lum, lum, lum)
            } else {
                let angle = (hue - 1) as f64 * std::f64::consts::TAU / 15.0;
                let base = 0.15 + 0.7 * lum;
                let swing = 0.3 * (1.0 - (2.0 * lum - 1.0).abs());
                (
                    base + swing * angle.cos(),
                    base + swing * (angle - 2.1).cos(),
                    base + swing * (angle + 2.1).cos(),
                )
            };
            *entry = (level(r) << 16) | (level(g) << 8) | level(b);
        }
        Palette::new(table)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Advance one frame: the bars scroll and the bright band moves.
    pub fn advance(&mut self) {
        self.frame += 1;
        self.render();
    }

    fn render(&mut self) {
        let band = (self.frame as usize * 3) % SCREEN_HEIGHT;
        for y in 0..SCREEN_HEIGHT {
            let lum = 4 + y * 8 / SCREEN_HEIGHT;
            for x in 0..SCREEN_WIDTH {
                let bar = ((x + self.frame as usize) / 24) % 16;
                let value = if y.abs_diff(band) < 4 {
                    0x0f
                } else {
                    ((bar << 4) | lum) as u8
                };
                self.pixels[y * SCREEN_WIDTH + x] = value;
            }
        }
    }

    /// Render one frame's worth of tone into `buf` and return the sample
    /// count across all channels. A fractional-sample accumulator keeps the
    /// long-run rate exact.
    pub fn fill_tone(&mut self, buf: &mut Vec<u8>, format: &AudioFormat) -> usize {
        self.sample_acc += format.sample_rate as f64 / self.fps;
        let ticks = self.sample_acc as usize;
        self.sample_acc -= ticks as f64;

        buf.clear();
        let step = TONE_HZ * std::f64::consts::TAU / format.sample_rate as f64;
        for _ in 0..ticks {
            let s = self.tone_phase.sin();
            self.tone_phase += step;
            for _ in 0..format.channels {
                if format.sample_size == 2 {
                    buf.extend_from_slice(&((s * 12000.0) as i16).to_le_bytes());
                } else {
                    buf.push((128.0 + s * 100.0) as u8);
                }
            }
        }
        ticks * format.channels as usize
    }
}

fn level(v: f64) -> u32 {
    (v.clamp(0.0, 1.0) * 255.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_pacing_matches_the_sample_rate() {
        let mut source = TestSource::new(TvStandard::Pal);
        let format = AudioFormat {
            channels: 2,
            sample_rate: 44100,
            sample_size: 2,
        };
        let mut buf = Vec::new();
        let mut total = 0;
        for _ in 0..500 {
            let samples = source.fill_tone(&mut buf, &format);
            assert_eq!(buf.len(), samples * 2);
            total += samples / 2; // per-channel sample pairs
        }
        let expected = 500.0 * 44100.0 / TvStandard::Pal.fps();
        assert!((total as f64 - expected).abs() < 1.0);
    }

    #[test]
    fn frames_change_over_time() {
        let mut source = TestSource::new(TvStandard::Ntsc);
        let first = source.pixels().to_vec();
        source.advance();
        assert_ne!(first, source.pixels());
    }
}
