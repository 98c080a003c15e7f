// src/drivers/mod.rs
pub mod buffer;
pub mod channel_context;
pub mod error;
pub mod fft;
pub mod pipeline;
pub mod source;
pub use buffer::{BufferSnapshot, SampleBuffer, SharedBuffer};
pub use channel_context::{ChannelContext, ChannelContexts, ChannelContextsBuilder};
pub use error::ClientError;
pub use fft::{ChannelSpectrum, SpectrumBuilder};
pub use pipeline::{remove_dc_bias, ProcessedView};
pub use source::{DeviceSession, ScriptedRead, ScriptedSession, SimulatedSession};
