use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use a8export::avi::AviWriter;
use a8export::errors::ExportError;
use a8export::screen::{Screen, VideoGeometry};
use a8export::wav::AudioFormat;

use super::command::{Cli, RecordArgs, load_config};
use crate::pattern::TestSource;

pub fn cmd_record(args: &RecordArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(id) = &args.videocodec {
        config.set_video_codec(id)?;
    }
    if let Some(ms) = args.keyframe_interval {
        config.set_keyframe_interval(ms)?;
    }
    if let Some(level) = args.compression_level {
        config.set_compression_level(level)?;
    }

    let tv = args.tv.standard();
    let geometry = VideoGeometry::standard_visible();
    let palette = TestSource::palette();
    let mut source = TestSource::new(tv);
    let audio = (!args.no_audio).then(|| AudioFormat {
        channels: args.channels,
        sample_rate: args.sample_rate,
        sample_size: args.bits.sample_size(),
    });

    let file = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut writer = AviWriter::create(BufWriter::new(file), geometry, &palette, tv, audio, &config)?;
    log::info!(
        "Recording {} frames of {} to {}",
        args.frames,
        writer.description(),
        args.output.display()
    );

    let pb = if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new(args.frames as u64));
        pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} frames")?);
        Some(pb)
    } else {
        None
    };

    let mut audio_buf = Vec::new();
    for _ in 0..args.frames {
        {
            let screen = Screen::new(source.pixels());
            match writer.add_video_frame(&screen) {
                Ok(()) => {}
                Err(ExportError::SizeLimitReached) => {
                    log::warn!("Recording size limit reached, closing early");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(format) = &audio {
            let samples = source.fill_tone(&mut audio_buf, format);
            match writer.add_audio_samples(&audio_buf, samples) {
                Ok(()) => {}
                Err(ExportError::SizeLimitReached) => {
                    log::warn!("Recording size limit reached, closing early");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        source.advance();
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    }
    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    let elapsed = writer.elapsed_seconds();
    let size = writer.current_size();
    writer.close()?;
    log::info!(
        "Wrote {}: {:.1}s of video, about {} bytes",
        args.output.display(),
        elapsed,
        size
    );
    Ok(())
}
