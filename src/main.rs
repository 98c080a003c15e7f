// src/main.rs
use std::env;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use emoclient::{
    Channel, ChannelContexts, ClientConfig, ClientEvent, EngineClient, SimulatedSession,
};

const RUN_FOR: Duration = Duration::from_secs(5);
const FFT_SIZE: usize = 64;

// Runs the client against a simulated headset and logs what arrives.
// Usage: emoclient [config.json]
fn main() -> Result<()> {
    env_logger::init();
    let config = match env::args().nth(1) {
        Some(path) => ClientConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => ClientConfig::default(),
    };
    let session = SimulatedSession::new(SimulatedSession::DEFAULT_RATE_HZ, 42);
    let mut client = EngineClient::new(session, config, ChannelContexts::standard())?;
    let events = client.subscribe();

    client.start_engine()?;
    // give the engine a moment to announce the user
    std::thread::sleep(Duration::from_millis(100));
    client.start_data_polling()?;
    log::info!(
        "polling every {} ms, buffer holds {} frames",
        client.data_polling_period_ms(),
        client.buffer_size()
    );

    let started = Instant::now();
    let mut frames_seen = 0usize;
    while started.elapsed() < RUN_FOR {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(ClientEvent::FramesAdded { frames, buffered }) => {
                frames_seen += frames.len();
                log::debug!("+{} frames, {buffered} buffered", frames.len());
            }
            Ok(ClientEvent::StateUpdated(state)) => {
                log::debug!(
                    "t={:.1}s AF3 contact {:?}",
                    state.time_from_start_secs,
                    state.contact_quality(Channel::Af3)
                );
            }
            Ok(ClientEvent::PropertyChanged(property)) => log::trace!("{property:?} changed"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let view = client.processed_view(FFT_SIZE);
    for spectrum in &view.spectra {
        log::info!(
            "{} peak at {:.1} Hz",
            spectrum.channel,
            spectrum.peak_frequency_hz().unwrap_or_default()
        );
    }
    log::info!(
        "received {frames_seen} frames, {} buffered",
        client.buffer_snapshot().len()
    );
    client.stop_engine()?;
    Ok(())
}
