//! Session configuration for the export writers.
//!
//! The three recognized settings travel with the session instead of living in
//! process-wide state, so concurrent sessions cannot race on them. The
//! KEY=VALUE config-file surface matches the emulator's config format.

use std::io::{self, Write};

use crate::codec;
use crate::errors::ConfigError;

/// Which video codec a recording should use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CodecRequest {
    /// Best available codec; the per-frame PNG codec is never chosen.
    #[default]
    Auto,
    /// A codec id validated against the registry, stored lowercase.
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub video_codec: CodecRequest,
    /// Target milliseconds between keyframes for codecs with interframes.
    pub keyframe_interval: u32,
    /// zlib/PNG compression level, 0-9.
    pub compression_level: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            video_codec: CodecRequest::Auto,
            keyframe_interval: 1000,
            compression_level: 6,
        }
    }
}

impl ExportConfig {
    /// Set the codec by id, case-insensitively. `auto` clears the request.
    pub fn set_video_codec(&mut self, id: &str) -> Result<(), ConfigError> {
        if id.eq_ignore_ascii_case("auto") {
            self.video_codec = CodecRequest::Auto;
        } else if codec::find_codec(id).is_some() {
            self.video_codec = CodecRequest::Id(id.to_ascii_lowercase());
        } else {
            return Err(ConfigError::UnknownCodec(id.to_string()));
        }
        Ok(())
    }

    pub fn set_keyframe_interval(&mut self, ms: u32) -> Result<(), ConfigError> {
        if ms < 1 {
            return Err(ConfigError::InvalidKeyframeInterval);
        }
        self.keyframe_interval = ms;
        Ok(())
    }

    pub fn set_compression_level(&mut self, level: u32) -> Result<(), ConfigError> {
        if level > 9 {
            return Err(ConfigError::InvalidCompressionLevel(level));
        }
        self.compression_level = level as u8;
        Ok(())
    }

    /// Apply one KEY=VALUE configuration item.
    pub fn read_config_item(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "VIDEO_CODEC" => self.set_video_codec(value),
            "VIDEO_CODEC_KEYFRAME_INTERVAL" => {
                let ms = value.parse().map_err(|_| ConfigError::InvalidValue {
                    item: "VIDEO_CODEC_KEYFRAME_INTERVAL",
                    value: value.to_string(),
                })?;
                self.set_keyframe_interval(ms)
            }
            "COMPRESSION_LEVEL" => {
                let level = value.parse().map_err(|_| ConfigError::InvalidValue {
                    item: "COMPRESSION_LEVEL",
                    value: value.to_string(),
                })?;
                self.set_compression_level(level)
            }
            _ => Err(ConfigError::UnknownItem(key.to_string())),
        }
    }

    /// Emit the current values in config-file form.
    pub fn write_config<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match &self.video_codec {
            CodecRequest::Auto => writeln!(w, "VIDEO_CODEC=AUTO")?,
            CodecRequest::Id(id) => writeln!(w, "VIDEO_CODEC={id}")?,
        }
        writeln!(w, "VIDEO_CODEC_KEYFRAME_INTERVAL={}", self.keyframe_interval)?;
        writeln!(w, "COMPRESSION_LEVEL={}", self.compression_level)?;
        Ok(())
    }
}
