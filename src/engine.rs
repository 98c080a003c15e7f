// src/engine.rs
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{ClientConfig, ConnectionTarget, Settings, ENGINE_TIMEOUT_MS};
use crate::drivers::{
    remove_dc_bias, BufferSnapshot, ChannelContexts, ChannelSpectrum, ClientError, DeviceSession,
    ProcessedView, SampleBuffer, SharedBuffer, SpectrumBuilder,
};
use crate::types::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// Fan-out of client events to every live subscriber.
#[derive(Default)]
struct Notifier {
    subscribers: Mutex<Vec<Sender<ClientEvent>>>,
}

impl Notifier {
    fn subscribe(&self) -> Receiver<ClientEvent> {
        let (tx, rx) = channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    fn publish(&self, event: ClientEvent) {
        // dropped receivers are pruned here
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn properties(&self, properties: &[Property]) {
        for p in properties {
            self.publish(ClientEvent::PropertyChanged(*p));
        }
    }
}

// State shared between the client handle and its worker threads.
struct Shared<S> {
    session: S,
    contexts: Arc<ChannelContexts>,
    settings: Mutex<Settings>,
    buffer: SharedBuffer,
    // held across device read + insert, and across buffer replacement
    acquisition: Mutex<()>,
    user_id: AtomicU32,
    current_state: Mutex<Option<HeadsetState>>,
    notifier: Notifier,
}

impl<S: DeviceSession> Shared<S> {
    fn user_id(&self) -> UserId {
        self.user_id.load(Ordering::SeqCst)
    }

    fn set_user_id(&self, user_id: UserId) {
        if self.user_id.swap(user_id, Ordering::SeqCst) != user_id {
            self.notifier.properties(&[Property::UserId]);
        }
    }

    fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Connected { user_id } => {
                log::info!("engine connected, user {user_id}");
                self.set_user_id(user_id);
            }
            EngineEvent::UserAdded { user_id } => {
                log::info!("user {user_id} added");
                self.set_user_id(user_id);
            }
            EngineEvent::StateUpdated(state) => {
                *lock(&self.current_state) = Some(state.clone());
                self.notifier.publish(ClientEvent::StateUpdated(state));
                self.notifier.properties(&[Property::CurrentState]);
            }
            EngineEvent::InternalStateChanged(what) => log::trace!("engine internal state: {what}"),
        }
    }

    /// One data cycle: read the device, insert and notify under the
    /// acquisition lock, so no buffer reset can slip in between. Returns the
    /// number of frames stored.
    fn poll_data_once(&self) -> usize {
        let user_id = self.user_id();
        let _acquisition = lock(&self.acquisition);
        let (frames, buffered) = match self.session.get_data(user_id) {
            Ok(Some(chunk)) => self.buffer.add_chunk(&chunk),
            Ok(None) => return 0,
            Err(err) => {
                log::warn!("get_data failed for user {user_id}: {err:#}");
                return 0;
            }
        };
        if frames.is_empty() {
            return 0;
        }
        let added = frames.len();
        log::debug!("buffered {added} frames ({buffered} held)");
        // senders never block
        self.notifier
            .publish(ClientEvent::FramesAdded { frames, buffered });
        self.notifier.properties(&[Property::Buffer]);
        added
    }

    fn engine_polling_period(&self) -> Duration {
        Duration::from_millis(lock(&self.settings).emo_engine_polling_period_ms())
    }

    fn data_polling_period(&self) -> Duration {
        Duration::from_millis(lock(&self.settings).data_polling_period_ms())
    }
}

fn run_engine_events<S: DeviceSession>(shared: &Shared<S>, cancel: &AtomicBool) {
    let timeout = Duration::from_millis(ENGINE_TIMEOUT_MS);
    while !cancel.load(Ordering::SeqCst) {
        match shared.session.process_events(timeout) {
            Ok(events) => {
                for event in events {
                    shared.handle_event(event);
                }
            }
            Err(err) => log::warn!("process_events failed: {err:#}"),
        }
        thread::sleep(shared.engine_polling_period());
    }
    log::debug!("engine event worker stopped");
}

fn run_data_polling<S: DeviceSession>(shared: &Shared<S>, cancel: &AtomicBool) {
    while !cancel.load(Ordering::SeqCst) {
        thread::sleep(shared.data_polling_period());
        shared.poll_data_once();
    }
    log::debug!("data polling worker stopped");
}

// A polling thread plus its cooperative cancellation flag.
struct Worker {
    name: &'static str,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F>(name: &'static str, body: F) -> Result<Self, ClientError>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || body(&flag))
            .map_err(ClientError::Spawn)?;
        Ok(Self {
            name,
            cancel,
            handle,
        })
    }

    /// Requests cancellation and waits for the current cycle to finish.
    fn stop(self) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            log::error!("{} worker panicked", self.name);
        }
    }
}

/// Client for a headset engine session.
///
/// Runs two workers once started: one drains engine events (user ids and
/// headset state), the other pulls raw samples into the sample buffer.
/// Observers either subscribe to [`ClientEvent`]s or read snapshots.
pub struct EngineClient<S: DeviceSession + 'static> {
    shared: Arc<Shared<S>>,
    connection: ConnectionTarget,
    engine_worker: Option<Worker>,
    data_worker: Option<Worker>,
}

impl<S: DeviceSession + 'static> EngineClient<S> {
    pub fn new(
        session: S,
        config: ClientConfig,
        contexts: Arc<ChannelContexts>,
    ) -> Result<Self, ClientError> {
        config.connection.validate()?;
        let settings = Settings::from_config(&config)?;
        let buffer = SampleBuffer::new(settings.buffer_capacity(), Arc::clone(&contexts))?;
        Ok(Self {
            shared: Arc::new(Shared {
                session,
                contexts,
                settings: Mutex::new(settings),
                buffer: SharedBuffer::new(buffer),
                acquisition: Mutex::new(()),
                user_id: AtomicU32::new(0),
                current_state: Mutex::new(None),
                notifier: Notifier::default(),
            }),
            connection: config.connection,
            engine_worker: None,
            data_worker: None,
        })
    }

    pub fn session(&self) -> &S {
        &self.shared.session
    }

    pub fn channel_contexts(&self) -> &ChannelContexts {
        &self.shared.contexts
    }

    /// Receives every event published from now on.
    pub fn subscribe(&self) -> Receiver<ClientEvent> {
        self.shared.notifier.subscribe()
    }

    pub fn is_engine_running(&self) -> bool {
        self.engine_worker.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.data_worker.is_some()
    }

    pub fn can_start_engine(&self) -> bool {
        !self.is_engine_running()
    }

    pub fn can_stop_engine(&self) -> bool {
        self.is_engine_running()
    }

    pub fn can_start_polling(&self) -> bool {
        self.is_engine_running() && !self.is_polling()
    }

    pub fn can_stop_polling(&self) -> bool {
        self.is_polling()
    }

    pub fn connection(&self) -> &ConnectionTarget {
        &self.connection
    }

    /// Takes effect on the next `start_engine`.
    pub fn set_connection(&mut self, target: ConnectionTarget) -> Result<(), ClientError> {
        target.validate()?;
        self.connection = target;
        Ok(())
    }

    pub fn user_id(&self) -> UserId {
        self.shared.user_id()
    }

    pub fn set_user_id(&self, user_id: UserId) {
        self.shared.set_user_id(user_id);
    }

    pub fn buffer_size_factor(&self) -> f64 {
        lock(&self.shared.settings).buffer_size_factor()
    }

    /// Capacity of the sample buffer, in frames.
    pub fn buffer_size(&self) -> usize {
        lock(&self.shared.settings).buffer_capacity()
    }

    pub fn sampling_rate(&self) -> u32 {
        lock(&self.shared.settings).sampling_rate_hz()
    }

    pub fn data_polling_period_ms(&self) -> u64 {
        lock(&self.shared.settings).data_polling_period_ms()
    }

    pub fn emo_engine_polling_period_ms(&self) -> u64 {
        lock(&self.shared.settings).emo_engine_polling_period_ms()
    }

    pub fn current_state(&self) -> Option<HeadsetState> {
        lock(&self.shared.current_state).clone()
    }

    pub fn buffer_snapshot(&self) -> BufferSnapshot {
        self.shared.buffer.snapshot()
    }

    /// Handle readers on other threads can snapshot from.
    pub fn buffer_handle(&self) -> SharedBuffer {
        self.shared.buffer.clone()
    }

    pub fn processed_view(&self, fft_size: usize) -> ProcessedView {
        ProcessedView::from_snapshot(
            &self.buffer_snapshot(),
            &self.shared.contexts,
            f64::from(self.sampling_rate()),
            fft_size,
        )
    }

    /// Spectrum of any buffered channel, `None` if it holds no samples.
    pub fn latest_spectrum(&self, channel: Channel, fft_size: usize) -> Option<ChannelSpectrum> {
        let mut samples = self.buffer_snapshot().series(channel);
        if samples.is_empty() {
            return None;
        }
        if self.shared.contexts.get(channel).remove_dc_bias {
            remove_dc_bias(&mut samples);
        }
        let rate = f64::from(self.sampling_rate());
        Some(SpectrumBuilder::with_size(fft_size).compute(channel, &samples, rate))
    }

    /// Changing the factor replaces the buffer with an empty one.
    pub fn set_buffer_size_factor(&self, factor: f64) -> Result<(), ClientError> {
        let changed = self.reconfigure_buffer(
            |s| s.set_buffer_size_factor(factor),
            &[
                Property::BufferSizeFactor,
                Property::BufferSize,
                Property::Buffer,
            ],
        )?;
        if changed {
            log::info!("buffer size factor set to {factor}");
        }
        Ok(())
    }

    pub fn set_emo_engine_polling_period(&self, period_ms: u64) -> Result<(), ClientError> {
        let changed = lock(&self.shared.settings).set_emo_engine_polling_period(period_ms)?;
        if changed {
            self.shared
                .notifier
                .properties(&[Property::EmoEnginePollingPeriod]);
        }
        Ok(())
    }

    fn apply_sampling_rate(&self, rate_hz: u32) -> Result<(), ClientError> {
        let changed = self.reconfigure_buffer(
            |s| s.set_sampling_rate(rate_hz),
            &[
                Property::SamplingRate,
                Property::DataPollingPeriod,
                Property::BufferSize,
                Property::Buffer,
            ],
        )?;
        if changed {
            log::info!("sampling rate set to {rate_hz} Hz");
        }
        Ok(())
    }

    // Applies a settings change to a copy, builds the new buffer, then
    // commits both and announces `properties` before the acquisition lock
    // is released. Nothing changes if either step fails.
    fn reconfigure_buffer<F>(
        &self,
        change: F,
        properties: &[Property],
    ) -> Result<bool, ClientError>
    where
        F: FnOnce(&mut Settings) -> Result<bool, ClientError>,
    {
        let _acquisition = lock(&self.shared.acquisition);
        let mut settings = lock(&self.shared.settings);
        let mut next = settings.clone();
        if !change(&mut next)? {
            return Ok(false);
        }
        let buffer = SampleBuffer::new(next.buffer_capacity(), Arc::clone(&self.shared.contexts))?;
        *settings = next;
        self.shared.buffer.replace(buffer);
        self.shared.notifier.properties(properties);
        Ok(true)
    }

    pub fn start_engine(&mut self) -> Result<(), ClientError> {
        if !self.can_start_engine() {
            return Err(ClientError::InvalidOperation("engine cannot be started"));
        }
        self.shared.session.connect(&self.connection)?;
        let shared = Arc::clone(&self.shared);
        let worker = Worker::spawn("engine-events", move |cancel| {
            run_engine_events(&shared, cancel)
        });
        match worker {
            Ok(worker) => self.engine_worker = Some(worker),
            Err(err) => {
                self.disconnect();
                return Err(err);
            }
        }
        log::info!("engine started ({:?})", self.connection);
        self.shared.notifier.properties(&[
            Property::IsEngineRunning,
            Property::CanStartEngine,
            Property::CanStartPolling,
        ]);
        Ok(())
    }

    pub fn start_data_polling(&mut self) -> Result<(), ClientError> {
        if !self.can_start_polling() {
            return Err(ClientError::InvalidOperation("data polling cannot be started"));
        }
        let user_id = self.user_id();
        self.shared.session.enable_acquisition(user_id, true)?;
        if let Err(err) = self.begin_data_polling(user_id) {
            self.disable_acquisition(user_id);
            return Err(err);
        }
        log::info!(
            "data polling started for user {user_id} at {} Hz",
            self.sampling_rate()
        );
        self.shared.notifier.properties(&[
            Property::IsPolling,
            Property::CanStartPolling,
            Property::CanStopPolling,
        ]);
        Ok(())
    }

    fn begin_data_polling(&mut self, user_id: UserId) -> Result<(), ClientError> {
        let rate = self.shared.session.sampling_rate(user_id)?;
        self.apply_sampling_rate(rate)?;
        let shared = Arc::clone(&self.shared);
        let worker = Worker::spawn("data-polling", move |cancel| {
            run_data_polling(&shared, cancel)
        })?;
        self.data_worker = Some(worker);
        Ok(())
    }

    /// Waits for the data worker to observe cancellation. No-op when not
    /// polling.
    pub fn stop_data_polling(&mut self) {
        let Some(worker) = self.data_worker.take() else {
            return;
        };
        worker.stop();
        self.disable_acquisition(self.user_id());
        log::info!("data polling stopped");
        self.shared.notifier.properties(&[
            Property::IsPolling,
            Property::CanStartPolling,
            Property::CanStopPolling,
        ]);
    }

    /// Stops both workers and disconnects the session.
    pub fn stop_engine(&mut self) -> Result<(), ClientError> {
        self.stop_data_polling();
        let Some(worker) = self.engine_worker.take() else {
            return Ok(());
        };
        worker.stop();
        let disconnected = self.shared.session.disconnect();
        log::info!("engine stopped");
        // the worker is gone whether or not the session let go cleanly
        self.shared.notifier.properties(&[
            Property::IsEngineRunning,
            Property::CanStartEngine,
            Property::CanStartPolling,
        ]);
        disconnected.map_err(ClientError::from)
    }

    pub fn shutdown(&mut self) {
        if let Err(err) = self.stop_engine() {
            log::warn!("shutdown: {err}");
        }
    }

    fn disable_acquisition(&self, user_id: UserId) {
        if let Err(err) = self.shared.session.enable_acquisition(user_id, false) {
            log::warn!("failed to disable acquisition for user {user_id}: {err:#}");
        }
    }

    fn disconnect(&self) {
        if let Err(err) = self.shared.session.disconnect() {
            log::warn!("disconnect failed: {err:#}");
        }
    }
}

impl<S: DeviceSession + 'static> Drop for EngineClient<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
