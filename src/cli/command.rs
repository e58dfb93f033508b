use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

use a8export::config::ExportConfig;
use a8export::screen::TvStandard;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    about      = "Record Atari 8-bit style video and audio to AVI, WAV, PCX and PNG",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Apply KEY=VALUE export settings from a file before command-line flags.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record the built-in test pattern to an AVI file.
    Record(RecordArgs),

    /// Record a test tone to a WAV file.
    Wav(WavArgs),

    /// Save one frame of the test pattern as a PCX or PNG still.
    Screenshot(ScreenshotArgs),

    /// List the built-in video codecs.
    Codecs,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Output AVI path.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// TV standard; fixes the frame rate.
    #[arg(long, value_enum, default_value_t = TvMode::Ntsc)]
    pub tv: TvMode,

    /// Video codec id, or "auto" for the best available.
    #[arg(long, value_name = "ID")]
    pub videocodec: Option<String>,

    /// Milliseconds between keyframes for codecs with interframes.
    #[arg(long, value_name = "MS")]
    pub keyframe_interval: Option<u32>,

    /// zlib/PNG compression level 0-9.
    #[arg(long, value_name = "N")]
    pub compression_level: Option<u32>,

    /// Number of frames to record.
    #[arg(long, default_value_t = 300)]
    pub frames: u32,

    /// Record video only.
    #[arg(long)]
    pub no_audio: bool,

    /// Audio sample rate.
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Audio channels.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=2))]
    pub channels: u16,

    /// Audio sample width.
    #[arg(long, value_enum, default_value_t = SampleBits::B16)]
    pub bits: SampleBits,
}

#[derive(Debug, Args)]
pub struct WavArgs {
    /// Output WAV path.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// TV standard; paces the per-frame sample batches.
    #[arg(long, value_enum, default_value_t = TvMode::Ntsc)]
    pub tv: TvMode,

    /// Duration of the tone in seconds.
    #[arg(long, default_value_t = 5.0)]
    pub seconds: f64,

    /// Audio sample rate.
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Audio channels.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=2))]
    pub channels: u16,

    /// Audio sample width.
    #[arg(long, value_enum, default_value_t = SampleBits::B16)]
    pub bits: SampleBits,
}

#[derive(Debug, Args)]
pub struct ScreenshotArgs {
    /// Output image path; the format is taken from the extension unless
    /// --format is given.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Still image format.
    #[arg(long, value_enum)]
    pub format: Option<StillFormat>,

    /// Blend two alternating-scanline frames into one still.
    #[arg(long)]
    pub interlace: bool,

    /// PNG compression level 0-9.
    #[arg(long, value_name = "N")]
    pub compression_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum TvMode {
    /// 49.86 frames per second.
    Pal,
    /// 59.92 frames per second.
    Ntsc,
}

impl TvMode {
    pub fn standard(self) -> TvStandard {
        match self {
            TvMode::Pal => TvStandard::Pal,
            TvMode::Ntsc => TvStandard::Ntsc,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum SampleBits {
    /// Unsigned 8-bit PCM.
    #[value(name = "8")]
    B8,
    /// Signed 16-bit little-endian PCM.
    #[value(name = "16")]
    B16,
}

impl SampleBits {
    pub fn sample_size(self) -> u16 {
        match self {
            SampleBits::B8 => 1,
            SampleBits::B16 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum StillFormat {
    Pcx,
    Png,
}

/// Build the session configuration: defaults, then the config file, then the
/// command-line overrides applied by each subcommand.
pub fn load_config(cli: &Cli) -> Result<ExportConfig> {
    let mut config = ExportConfig::default();
    let Some(path) = &cli.config else {
        return Ok(config);
    };

    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("malformed line in {}: {line}", path.display());
        };
        config
            .read_config_item(key.trim(), value.trim())
            .with_context(|| format!("in config file {}", path.display()))?;
    }
    Ok(config)
}
