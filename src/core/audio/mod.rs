//! Client-side audio capture framing.
//!
//! Microphone float samples are accumulated into fixed-size blocks and
//! quantized to PCM 16-bit signed little-endian, the format both the voice
//! WebSocket and the upstream live service speak.
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian, mono, 24kHz.

mod encoder;

pub use encoder::{AudioFrame, PcmEncoder, quantize};

/// Sample rate used on every audio path, in Hz.
pub const SAMPLE_RATE_HZ: u32 = 24_000;

/// Samples per emitted [`AudioFrame`].
pub const FRAME_SAMPLES: usize = 4096;
