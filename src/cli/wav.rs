use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use a8export::errors::ExportError;
use a8export::wav::{AudioFormat, WavWriter};

use super::command::{Cli, WavArgs};
use crate::pattern::TestSource;

pub fn cmd_wav(args: &WavArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let tv = args.tv.standard();
    let format = AudioFormat {
        channels: args.channels,
        sample_rate: args.sample_rate,
        sample_size: args.bits.sample_size(),
    };
    let mut source = TestSource::new(tv);

    let file = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut writer = WavWriter::create(BufWriter::new(file), format, tv)?;

    let frames = (args.seconds * tv.fps()).ceil() as u64;
    log::info!(
        "Recording {:.1}s of tone ({} sample batches) to {}",
        args.seconds,
        frames,
        args.output.display()
    );

    let pb = if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new(frames));
        pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} batches")?);
        Some(pb)
    } else {
        None
    };

    let mut buf = Vec::new();
    for _ in 0..frames {
        let samples = source.fill_tone(&mut buf, &format);
        match writer.write_samples(&buf, samples) {
            Ok(_) => {}
            Err(ExportError::SizeLimitReached) => {
                log::warn!("Recording size limit reached, closing early");
                break;
            }
            Err(e) => return Err(e.into()),
        }
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
        "Wrote {}: {:.1}s of audio, {} PCM bytes",
        args.output.display(),
        elapsed,
        size
    );
    Ok(())
}
