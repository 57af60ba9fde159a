//! Incremental audio encoding.
//!
//! A [`ChunkEncoder`] wraps a [`Codec`] and enforces the encoder lifecycle:
//! samples go in while the session runs, encoded bytes come out as the codec
//! yields them, and a single flush finalizes the container. Encoding after
//! flush is a hard error.

use crate::defaults;
use crate::error::{Result, SottoError};
use std::io::Cursor;
use tracing::trace;

/// Trait for audio codecs.
///
/// A codec may buffer internally and yield bytes on its own cadence; an
/// empty return from `encode` is normal.
pub trait Codec: Send {
    /// Encode a batch of samples, returning any bytes ready so far.
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>>;

    /// Finalize the encoded output and return the remaining bytes.
    fn flush(&mut self) -> Result<Vec<u8>>;
}

/// Factory for codecs, one per recording session.
pub trait CodecFactory: Send + Sync {
    /// Open a fresh codec instance.
    fn open(&self) -> Box<dyn Codec>;
}

/// Codec wrapper enforcing the session encoder lifecycle.
pub struct ChunkEncoder {
    codec: Box<dyn Codec>,
    closed: bool,
    last_sequence: Option<u64>,
    frames_in: u64,
}

impl ChunkEncoder {
    /// Wraps a codec in a fresh, open encoder.
    pub fn new(codec: Box<dyn Codec>) -> Self {
        Self {
            codec,
            closed: false,
            last_sequence: None,
            frames_in: 0,
        }
    }

    /// Encodes one frame's worth of samples.
    ///
    /// Frames must arrive in strictly increasing sequence order. Returns
    /// [`SottoError::EncoderClosed`] once the encoder has been flushed.
    pub fn encode(&mut self, sequence: u64, samples: &[i16]) -> Result<Vec<u8>> {
        if self.closed {
            return Err(SottoError::EncoderClosed);
        }
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                return Err(SottoError::Encode {
                    message: format!("frame {sequence} arrived after frame {last}"),
                });
            }
        }
        self.last_sequence = Some(sequence);
        self.frames_in += 1;
        let bytes = self.codec.encode(samples)?;
        if !bytes.is_empty() {
            trace!("encoder yielded {} bytes at frame {sequence}", bytes.len());
        }
        Ok(bytes)
    }

    /// Finalizes the encoder and returns the trailing bytes.
    ///
    /// The first flush closes the encoder; a second flush is
    /// [`SottoError::EncoderClosed`].
    pub fn flush(&mut self) -> Result<Vec<u8>> {
        if self.closed {
            return Err(SottoError::EncoderClosed);
        }
        self.closed = true;
        self.codec.flush()
    }

    /// Returns true once the encoder has been flushed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of frames accepted so far.
    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }
}

/// WAV codec buffering samples until flush.
///
/// WAV needs its header sizes up front, so the container is only written
/// when the session ends.
pub struct WavCodec {
    sample_rate: u32,
    samples: Vec<i16>,
}

impl WavCodec {
    /// Creates a codec for mono 16-bit PCM at the given rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
        }
    }
}

impl Codec for WavCodec {
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        self.samples.extend_from_slice(samples);
        Ok(Vec::new())
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).map_err(|e| SottoError::Encode {
                    message: format!("failed to open WAV writer: {e}"),
                })?;
            for &sample in &self.samples {
                writer.write_sample(sample).map_err(|e| SottoError::Encode {
                    message: format!("failed to write WAV sample: {e}"),
                })?;
            }
            writer.finalize().map_err(|e| SottoError::Encode {
                message: format!("failed to finalize WAV: {e}"),
            })?;
        }
        self.samples.clear();
        Ok(cursor.into_inner())
    }
}

/// Default factory producing [`WavCodec`]s at the default sample rate.
pub struct WavCodecFactory {
    sample_rate: u32,
}

impl WavCodecFactory {
    /// Creates a factory for the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Default for WavCodecFactory {
    fn default() -> Self {
        Self::new(defaults::SAMPLE_RATE)
    }
}

impl CodecFactory for WavCodecFactory {
    fn open(&self) -> Box<dyn Codec> {
        Box::new(WavCodec::new(self.sample_rate))
    }
}

/// Mock codec for testing.
///
/// Yields one byte per input sample so tests can count output exactly, with
/// optional internal buffering and scripted failures.
pub struct MockCodec {
    buffer_every: usize,
    pending: Vec<u8>,
    calls: usize,
    should_fail: bool,
}

impl MockCodec {
    /// Create a mock codec that yields bytes on every encode call.
    pub fn new() -> Self {
        Self {
            buffer_every: 1,
            pending: Vec::new(),
            calls: 0,
            should_fail: false,
        }
    }

    /// Only yield accumulated bytes on every `n`th encode call.
    pub fn with_buffer_every(mut self, n: usize) -> Self {
        self.buffer_every = n.max(1);
        self
    }

    /// Configure the mock to fail on encode and flush.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for MockCodec {
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        if self.should_fail {
            return Err(SottoError::Encode {
                message: "mock codec failure".to_string(),
            });
        }
        self.calls += 1;
        self.pending.extend(samples.iter().map(|&s| s as u8));
        if self.calls % self.buffer_every == 0 {
            Ok(std::mem::take(&mut self.pending))
        } else {
            Ok(Vec::new())
        }
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        if self.should_fail {
            return Err(SottoError::Encode {
                message: "mock codec failure".to_string(),
            });
        }
        Ok(std::mem::take(&mut self.pending))
    }
}

/// Mock codec factory for testing.
pub struct MockCodecFactory {
    buffer_every: usize,
}

impl MockCodecFactory {
    /// Create a factory yielding pass-through mock codecs.
    pub fn new() -> Self {
        Self { buffer_every: 1 }
    }

    /// Codecs from this factory buffer and yield every `n`th call.
    pub fn with_buffer_every(mut self, n: usize) -> Self {
        self.buffer_every = n;
        self
    }
}

impl Default for MockCodecFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecFactory for MockCodecFactory {
    fn open(&self) -> Box<dyn Codec> {
        Box::new(MockCodec::new().with_buffer_every(self.buffer_every))
    }
}
