use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::config::ConnectionTarget;
use crate::types::{
    Channel, ContactQuality, DataChunk, EngineEvent, HeadsetState, UserId, WirelessSignal,
};
/// Handle to a headset engine session.
///
/// Shared by the state worker and the data worker, hence `&self` everywhere.
pub trait DeviceSession: Send + Sync {
    fn connect(&self, target: &ConnectionTarget) -> Result<()>;
    fn disconnect(&self) -> Result<()>;
    /// Drains pending engine events, waiting at most `timeout` for the first.
    fn process_events(&self, timeout: Duration) -> Result<Vec<EngineEvent>>;
    fn enable_acquisition(&self, user_id: UserId, enabled: bool) -> Result<()>;
    fn sampling_rate(&self, user_id: UserId) -> Result<u32>;
    /// Samples gathered since the previous call, `None` when there are none.
    fn get_data(&self, user_id: UserId) -> Result<Option<DataChunk>>;
}
impl<T: DeviceSession + ?Sized> DeviceSession for Arc<T> {
    fn connect(&self, target: &ConnectionTarget) -> Result<()> {
        (**self).connect(target)
    }
    fn disconnect(&self) -> Result<()> {
        (**self).disconnect()
    }
    fn process_events(&self, timeout: Duration) -> Result<Vec<EngineEvent>> {
        (**self).process_events(timeout)
    }
    fn enable_acquisition(&self, user_id: UserId, enabled: bool) -> Result<()> {
        (**self).enable_acquisition(user_id, enabled)
    }
    fn sampling_rate(&self, user_id: UserId) -> Result<u32> {
        (**self).sampling_rate(user_id)
    }
    fn get_data(&self, user_id: UserId) -> Result<Option<DataChunk>> {
        (**self).get_data(user_id)
    }
}
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
/// Scripted step returned by one `get_data` call.
#[derive(Clone, Debug)]
pub enum ScriptedRead {
    Data(DataChunk),
    Empty,
    Fail(String),
}
#[derive(Default)]
struct ScriptState {
    events: VecDeque<Vec<EngineEvent>>,
    reads: VecDeque<ScriptedRead>,
    connected: bool,
    acquiring: bool,
    connect_calls: usize,
    disconnect_error: Option<String>,
}
/// In-memory session replaying queued events and reads. Useful for tests
/// and deterministic playback.
pub struct ScriptedSession {
    state: Mutex<ScriptState>,
    sampling_rate_hz: Mutex<u32>,
    idle_wait: Duration,
}
impl ScriptedSession {
    pub fn new(sampling_rate_hz: u32) -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            sampling_rate_hz: Mutex::new(sampling_rate_hz),
            idle_wait: Duration::from_millis(2),
        }
    }
    pub fn push_events(&self, events: impl IntoIterator<Item = EngineEvent>) {
        lock(&self.state).events.push_back(events.into_iter().collect());
    }
    pub fn push_read(&self, read: ScriptedRead) {
        lock(&self.state).reads.push_back(read);
    }
    pub fn push_chunk(&self, chunk: DataChunk) {
        self.push_read(ScriptedRead::Data(chunk));
    }
    pub fn set_sampling_rate(&self, rate_hz: u32) {
        *lock(&self.sampling_rate_hz) = rate_hz;
    }
    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
    pub fn is_acquiring(&self) -> bool {
        lock(&self.state).acquiring
    }
    pub fn connect_calls(&self) -> usize {
        lock(&self.state).connect_calls
    }
    /// Makes the next `disconnect` fail with `msg`.
    pub fn fail_next_disconnect(&self, msg: impl Into<String>) {
        lock(&self.state).disconnect_error = Some(msg.into());
    }
    pub fn pending_reads(&self) -> usize {
        lock(&self.state).reads.len()
    }
}
impl DeviceSession for ScriptedSession {
    fn connect(&self, _target: &ConnectionTarget) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = true;
        state.connect_calls += 1;
        Ok(())
    }
    fn disconnect(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(msg) = state.disconnect_error.take() {
            return Err(anyhow!(msg));
        }
        state.connected = false;
        state.acquiring = false;
        Ok(())
    }
    fn process_events(&self, timeout: Duration) -> Result<Vec<EngineEvent>> {
        if let Some(events) = lock(&self.state).events.pop_front() {
            return Ok(events);
        }
        thread::sleep(self.idle_wait.min(timeout));
        Ok(Vec::new())
    }
    fn enable_acquisition(&self, _user_id: UserId, enabled: bool) -> Result<()> {
        lock(&self.state).acquiring = enabled;
        Ok(())
    }
    fn sampling_rate(&self, _user_id: UserId) -> Result<u32> {
        Ok(*lock(&self.sampling_rate_hz))
    }
    fn get_data(&self, _user_id: UserId) -> Result<Option<DataChunk>> {
        match lock(&self.state).reads.pop_front() {
            Some(ScriptedRead::Data(chunk)) => Ok(Some(chunk)),
            Some(ScriptedRead::Fail(msg)) => Err(anyhow!(msg)),
            Some(ScriptedRead::Empty) | None => Ok(None),
        }
    }
}
struct SimState {
    connected: bool,
    acquiring: bool,
    announced: bool,
    started_at: Instant,
    last_read: Instant,
    counter: u64,
    rng: StdRng,
}
/// Synthetic headset: each electrode carries a sine in the alpha/beta range
/// on top of a DC offset and noise, sampled at a fixed rate.
pub struct SimulatedSession {
    sampling_rate_hz: u32,
    user_id: UserId,
    state: Mutex<SimState>,
}
impl SimulatedSession {
    pub const DEFAULT_RATE_HZ: u32 = 128;
    pub fn new(sampling_rate_hz: u32, seed: u64) -> Self {
        let now = Instant::now();
        Self {
            sampling_rate_hz,
            user_id: 0,
            state: Mutex::new(SimState {
                connected: false,
                acquiring: false,
                announced: false,
                started_at: now,
                last_read: now,
                counter: 0,
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }
    /// Tone frequency of an electrode; AF3 sits at 10 Hz.
    pub fn electrode_frequency_hz(channel: Channel) -> f64 {
        let offset = Channel::ELECTRODES
            .iter()
            .position(|c| *c == channel)
            .unwrap_or(0);
        10.0 + offset as f64
    }
    fn random_state(state: &mut SimState) -> HeadsetState {
        let contact_quality = Channel::ELECTRODES
            .iter()
            .map(|&c| {
                let quality = match state.rng.gen_range(0..10) {
                    0 => ContactQuality::Poor,
                    1..=2 => ContactQuality::Fair,
                    _ => ContactQuality::Good,
                };
                (c, quality)
            })
            .collect();
        HeadsetState {
            time_from_start_secs: state.started_at.elapsed().as_secs_f32(),
            wireless_signal: WirelessSignal::Good,
            contact_quality,
        }
    }
}
impl DeviceSession for SimulatedSession {
    fn connect(&self, target: &ConnectionTarget) -> Result<()> {
        let mut state = lock(&self.state);
        if state.connected {
            return Err(anyhow!("simulated session already connected"));
        }
        log::info!("simulated headset connected ({target:?})");
        state.connected = true;
        state.announced = false;
        state.started_at = Instant::now();
        Ok(())
    }
    fn disconnect(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.acquiring = false;
        Ok(())
    }
    fn process_events(&self, timeout: Duration) -> Result<Vec<EngineEvent>> {
        thread::sleep(timeout.min(Duration::from_millis(20)));
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(anyhow!("simulated session is not connected"));
        }
        if !state.announced {
            state.announced = true;
            return Ok(vec![
                EngineEvent::Connected {
                    user_id: self.user_id,
                },
                EngineEvent::UserAdded {
                    user_id: self.user_id,
                },
            ]);
        }
        let headset = Self::random_state(&mut state);
        Ok(vec![EngineEvent::StateUpdated(headset)])
    }
    fn enable_acquisition(&self, user_id: UserId, enabled: bool) -> Result<()> {
        if user_id != self.user_id {
            return Err(anyhow!("unknown user {user_id}"));
        }
        let mut state = lock(&self.state);
        state.acquiring = enabled;
        state.last_read = Instant::now();
        Ok(())
    }
    fn sampling_rate(&self, _user_id: UserId) -> Result<u32> {
        Ok(self.sampling_rate_hz)
    }
    fn get_data(&self, _user_id: UserId) -> Result<Option<DataChunk>> {
        let mut state = lock(&self.state);
        if !state.acquiring {
            return Ok(None);
        }
        let elapsed = state.last_read.elapsed().as_secs_f64();
        let samples = (elapsed * f64::from(self.sampling_rate_hz)) as u64;
        if samples == 0 {
            return Ok(None);
        }
        let dt = 1.0 / f64::from(self.sampling_rate_hz);
        state.last_read += Duration::from_secs_f64(samples as f64 * dt);
        let mut chunk = DataChunk::new();
        for i in 0..samples {
            let n = state.counter + i;
            let t = n as f64 * dt;
            chunk
                .entry(Channel::Counter)
                .or_default()
                .push((n % 128) as f64);
            chunk
                .entry(Channel::Timestamp)
                .or_default()
                .push(t);
            for &electrode in Channel::ELECTRODES.iter() {
                let freq = Self::electrode_frequency_hz(electrode);
                let noise: f64 = state.rng.gen_range(-2.0..2.0);
                let value = 4200.0 + 25.0 * (2.0 * PI * freq * t).sin() + noise;
                chunk.entry(electrode).or_default().push(value);
            }
        }
        state.counter += samples;
        Ok(Some(chunk))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn scripted_session_replays_in_order() {
        let session = ScriptedSession::new(128);
        let mut chunk = DataChunk::new();
        chunk.insert(Channel::Af3, vec![1.0]);
        session.push_chunk(chunk.clone());
        session.push_read(ScriptedRead::Empty);
        session.push_read(ScriptedRead::Fail("timeout".into()));
        assert_eq!(session.get_data(0).unwrap(), Some(chunk));
        assert_eq!(session.get_data(0).unwrap(), None);
        assert!(session.get_data(0).is_err());
        assert_eq!(session.get_data(0).unwrap(), None);
    }
    #[test]
    fn simulated_session_announces_user_first() {
        let session = SimulatedSession::new(128, 7);
        assert!(session.process_events(Duration::from_millis(1)).is_err());
        session.connect(&ConnectionTarget::Direct).unwrap();
        let events = session.process_events(Duration::from_millis(1)).unwrap();
        assert_eq!(events[0], EngineEvent::Connected { user_id: 0 });
        let events = session.process_events(Duration::from_millis(1)).unwrap();
        match &events[0] {
            EngineEvent::StateUpdated(state) => {
                assert_eq!(state.contact_quality.len(), Channel::ELECTRODES.len())
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    #[test]
    fn simulated_session_produces_samples_at_its_rate() {
        let session = SimulatedSession::new(500, 1);
        session.connect(&ConnectionTarget::Direct).unwrap();
        assert_eq!(session.get_data(0).unwrap(), None);
        session.enable_acquisition(0, true).unwrap();
        thread::sleep(Duration::from_millis(40));
        let chunk = session.get_data(0).unwrap().expect("samples after 40 ms");
        let n = chunk[&Channel::Counter].len();
        assert!(n >= 10, "only {n} samples");
        for electrode in Channel::ELECTRODES {
            assert_eq!(chunk[&electrode].len(), n);
        }
        assert!(session.enable_acquisition(3, true).is_err());
    }
}
