//! Streaming multimedia export for 8-bit home-computer emulator output.
//!
//! The host presents one completed screen buffer and one completed PCM buffer
//! per emulated frame; this crate serializes them into standard containers:
//!
//! 1. Feed frames to [`avi::AviWriter`] for an interleaved AVI recording,
//!    compressed by one of the codecs in [`codec::CODECS`].
//! 2. Feed samples to [`wav::WavWriter`] for an audio-only recording.
//! 3. Save single frames with [`pcx::save_screen`] or [`png::save_screen`].
//!
//! All writers share the little-endian primitive layer in [`byteorder`] and
//! the host-facing types in [`screen`]. Session options live in
//! [`config::ExportConfig`] and travel with each writer.

/// Streaming RIFF/AVI container writer.
pub mod avi;
/// Little-endian primitives shared by every container writer.
pub mod byteorder;
/// Video codec contract, registry and built-in codecs.
pub mod codec;
/// Session configuration and the config-file surface.
pub mod config;
/// Error types for configuration, codecs and recording sessions.
pub mod errors;
/// PCX still-image encoder.
pub mod pcx;
/// PNG still-image encoder.
pub mod png;
/// Host-facing screen, palette and geometry types.
pub mod screen;
/// Streaming RIFF/WAVE PCM writer.
pub mod wav;

/// RIFF containers carry 32-bit sizes, so recordings stop safely short of the
/// 4GB boundary.
pub const MAX_RECORDING_SIZE: u64 = 0xfff0_0000;
