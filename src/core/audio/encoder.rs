//! Float-to-PCM16 block encoder.
//!
//! Runs inside the real-time capture callback, so it does no allocation per
//! sample, never blocks, and has no error path: out-of-range input clamps.

use bytes::{BufMut, Bytes, BytesMut};

use super::SAMPLE_RATE_HZ;

/// A fixed-size block of encoded audio, ready for the transport.
///
/// Immutable once emitted; the payload is raw little-endian `i16` samples.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    data: Bytes,
    samples: usize,
    sample_rate: u32,
}

impl AudioFrame {
    /// Number of samples in the frame.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Raw PCM16 little-endian payload.
    pub fn pcm(&self) -> &Bytes {
        &self.data
    }

    /// Consume the frame, yielding the wire payload.
    pub fn into_pcm(self) -> Bytes {
        self.data
    }
}

/// Quantize one float sample in `[-1.0, 1.0]` to a signed 16-bit sample.
///
/// `clamp(round(x * 32768), -32768, 32767)` - values outside the nominal
/// range clamp rather than wrap.
pub fn quantize(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Accumulates capture-callback float blocks into fixed-size PCM16 frames.
///
/// The capture hardware delivers small blocks (typically 128 samples); the
/// encoder buffers them until exactly `frame_samples` have arrived, then
/// emits one [`AudioFrame`] and starts over. A partial buffer left at
/// disconnect is discarded, never emitted.
#[derive(Debug)]
pub struct PcmEncoder {
    buf: Vec<f32>,
    filled: usize,
}

impl PcmEncoder {
    pub fn new(frame_samples: usize) -> Self {
        assert!(frame_samples > 0, "frame size must be non-zero");
        Self {
            buf: vec![0.0; frame_samples],
            filled: 0,
        }
    }

    /// Feed one capture block, emitting a frame into `sink` each time the
    /// accumulation buffer fills.
    ///
    /// Always returns `true`: the capture callback must keep the audio graph
    /// running whether or not a frame was emitted this invocation.
    pub fn process(&mut self, input: &[f32], mut sink: impl FnMut(AudioFrame)) -> bool {
        for &sample in input {
            self.buf[self.filled] = sample;
            self.filled += 1;
            if self.filled == self.buf.len() {
                sink(self.encode_frame());
                self.filled = 0;
            }
        }
        true
    }

    /// Samples currently accumulated toward the next frame.
    pub fn pending(&self) -> usize {
        self.filled
    }

    fn encode_frame(&self) -> AudioFrame {
        let mut data = BytesMut::with_capacity(self.buf.len() * 2);
        for &sample in &self.buf {
            data.put_i16_le(quantize(sample));
        }
        AudioFrame {
            data: data.freeze(),
            samples: self.buf.len(),
            sample_rate: SAMPLE_RATE_HZ,
        }
    }
}
