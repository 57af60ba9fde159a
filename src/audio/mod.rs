//! Audio capture layer.
//!
//! A [`StreamSource`] hands out microphone streams; a [`CaptureDevice`]
//! turns one into an ordered frame feed; the VAD listener watches the same
//! stream for speech edges.

pub mod device;
pub mod stream;
pub mod vad;

pub use device::{
    CaptureDevice, DeviceFactory, DeviceState, MockCaptureDevice, StreamCaptureDevice,
    StreamDeviceFactory,
};
pub use stream::{MicStream, MockStreamSource, PcmFrame, StreamSource};
pub use vad::{
    Clock, RmsVadProvider, SpeechGate, SystemClock, VadConfig, VadEdge, VadListener, VadProvider,
    calculate_rms,
};
