//! Acquisition client for a neuroheadset engine.
//!
//! An [`EngineClient`] owns an injected [`DeviceSession`], polls it from two
//! worker threads and keeps the most recent frames in a fixed-capacity
//! [`SampleBuffer`](drivers::SampleBuffer).
pub mod config;
pub mod drivers;
pub mod engine;
pub mod types;
pub use config::{ClientConfig, ConnectionTarget, Settings};
pub use drivers::{
    BufferSnapshot, ChannelContext, ChannelContexts, ClientError, DeviceSession, ProcessedView,
    ScriptedSession, SimulatedSession,
};
pub use engine::EngineClient;
pub use types::{Channel, ClientEvent, ContactQuality, DataChunk, Frame, HeadsetState, Property};
