use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Unknown video codec: {0}")]
    UnknownCodec(String),

    #[error("Invalid keyframe interval time, must be 1 millisecond or greater")]
    InvalidKeyframeInterval,

    #[error("Invalid png/zlib compression level - must be between 0 and 9. Got {0}")]
    InvalidCompressionLevel(u32),

    #[error("Unknown configuration item: {0}")]
    UnknownItem(String),

    #[error("Invalid value for {item}: {value}")]
    InvalidValue { item: &'static str, value: String },
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("video compression buffer size too small ({capacity} bytes)")]
    BufferTooSmall { capacity: usize },

    #[error("frame compression failed: {0}")]
    Compress(String),

    #[error("frame encoding failed")]
    Encode(#[source] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("video codec failed: {0}")]
    Codec(#[from] CodecError),

    #[error("attempted to write video frame without audio data")]
    VideoWithoutAudio,

    #[error("attempted to write audio data without video frame")]
    AudioWithoutVideo,

    #[error("stream has no audio")]
    NoAudioStream,

    #[error("audio buffer size too small to hold {samples} samples")]
    AudioBufferTooSmall { samples: usize },

    #[error("video frame of {size} bytes exceeds the index entry limit")]
    VideoFrameTooLarge { size: usize },

    #[error("audio chunk of {size} bytes exceeds the index entry limit")]
    AudioChunkTooLarge { size: usize },

    #[error("recording size limit reached")]
    SizeLimitReached,

    #[error("a previous frame failed; only close is possible")]
    Poisoned,

    #[error("frame group occupies {actual} bytes on disk, expected {expected}")]
    FrameSizeMismatch { expected: u64, actual: u64 },

    #[error("header ends at offset {actual}, expected {expected}")]
    HeaderSizeMismatch { expected: u64, actual: u64 },

    #[error("index ends {actual} bytes after its start, expected {expected}")]
    IndexSizeMismatch { expected: u64, actual: u64 },
}
