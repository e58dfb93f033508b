use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result, bail};

use a8export::screen::{Screen, TvStandard, VideoGeometry};
use a8export::{pcx, png};

use super::command::{Cli, ScreenshotArgs, StillFormat, load_config};
use crate::pattern::TestSource;

pub fn cmd_screenshot(args: &ScreenshotArgs, cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(level) = args.compression_level {
        config.set_compression_level(level)?;
    }

    let format = match args.format {
        Some(format) => format,
        None => match args.output.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pcx") => StillFormat::Pcx,
            Some(ext) if ext.eq_ignore_ascii_case("png") => StillFormat::Png,
            _ => bail!(
                "cannot tell the image format from {}; pass --format",
                args.output.display()
            ),
        },
    };

    let geometry = VideoGeometry::standard_visible();
    let palette = TestSource::palette();
    let mut source = TestSource::new(TvStandard::Ntsc);
    let first = source.pixels().to_vec();
    let second = if args.interlace {
        source.advance();
        Some(source.pixels().to_vec())
    } else {
        None
    };

    let screen = Screen::new(&first);
    let second_screen = second.as_deref().map(Screen::new);

    let file = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    match format {
        StillFormat::Pcx => {
            pcx::save_screen(&mut out, geometry, &palette, &screen, second_screen.as_ref())?
        }
        StillFormat::Png => png::save_screen(
            &mut out,
            geometry,
            &palette,
            &screen,
            second_screen.as_ref(),
            config.compression_level,
        )?,
    }
    out.flush()?;

    log::info!("Wrote {}", args.output.display());
    Ok(())
}
