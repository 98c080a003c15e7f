// src/config.rs
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::drivers::ClientError;

/// Port the EmoComposer emulator listens on.
pub const COMPOSER_PORT: u16 = 1726;
/// Port the headset control panel listens on.
pub const CONTROL_PANEL_PORT: u16 = 3008;
pub const DEFAULT_TARGET_ADDRESS: &str = "127.0.0.1";

/// Upper bound for one `process_events` call and for the engine polling period.
pub const ENGINE_TIMEOUT_MS: u64 = 10_000;
pub const MAX_SAMPLING_RATE_HZ: u32 = 1_000;
pub const MAX_DATA_POLLING_PERIOD_MS: u64 = 1_000;
/// Largest sample buffer, in frames (about 17 minutes at the maximum rate).
pub const MAX_BUFFER_CAPACITY: usize = 1 << 20;

/// Where the session connects: straight to the headset, or to a running
/// composer / control panel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionTarget {
    Direct,
    Remote {
        #[serde(default = "default_address")]
        address: String,
        port: u16,
    },
}

fn default_address() -> String {
    DEFAULT_TARGET_ADDRESS.to_owned()
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        ConnectionTarget::Direct
    }
}

impl ConnectionTarget {
    pub fn composer() -> Self {
        ConnectionTarget::Remote {
            address: default_address(),
            port: COMPOSER_PORT,
        }
    }

    pub fn control_panel() -> Self {
        ConnectionTarget::Remote {
            address: default_address(),
            port: CONTROL_PANEL_PORT,
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            ConnectionTarget::Direct => Ok(()),
            ConnectionTarget::Remote { port, .. }
                if *port == COMPOSER_PORT || *port == CONTROL_PANEL_PORT =>
            {
                Ok(())
            }
            ConnectionTarget::Remote { port, .. } => Err(ClientError::InvalidPort(*port)),
        }
    }
}

/// Client configuration as read from disk. Every field has a default so a
/// partial (or empty) JSON object is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds of history the sample buffer holds.
    pub buffer_size_factor: f64,
    pub emo_engine_polling_period_ms: u64,
    /// Assumed until the device reports its own rate.
    pub sampling_rate_hz: u32,
    pub connection: ConnectionTarget,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            buffer_size_factor: 0.5,
            emo_engine_polling_period_ms: 100,
            sampling_rate_hz: 128,
            connection: ConnectionTarget::Direct,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        self.connection.validate()?;
        Settings::from_config(self).map(|_| ())
    }
}

/// Live, validated client settings. Setters check the new value first and
/// leave everything untouched on error; `Ok(true)` means the value changed.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    buffer_size_factor: f64,
    sampling_rate_hz: u32,
    data_polling_period_ms: u64,
    emo_engine_polling_period_ms: u64,
}

impl Settings {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let factor = check_buffer_size_factor(config.buffer_size_factor)?;
        let rate = check_sampling_rate(config.sampling_rate_hz)?;
        let period = check_engine_polling_period(config.emo_engine_polling_period_ms)?;
        let data_period = data_polling_period_for(rate)?;
        buffer_capacity(factor, rate)?;
        Ok(Self {
            buffer_size_factor: factor,
            sampling_rate_hz: rate,
            data_polling_period_ms: data_period,
            emo_engine_polling_period_ms: period,
        })
    }

    pub fn buffer_size_factor(&self) -> f64 {
        self.buffer_size_factor
    }

    pub fn sampling_rate_hz(&self) -> u32 {
        self.sampling_rate_hz
    }

    pub fn data_polling_period_ms(&self) -> u64 {
        self.data_polling_period_ms
    }

    pub fn emo_engine_polling_period_ms(&self) -> u64 {
        self.emo_engine_polling_period_ms
    }

    /// Frames the sample buffer holds at the current settings.
    pub fn buffer_capacity(&self) -> usize {
        // both inputs were checked together when they were set
        buffer_capacity(self.buffer_size_factor, self.sampling_rate_hz).unwrap_or(1)
    }

    pub fn set_buffer_size_factor(&mut self, factor: f64) -> Result<bool, ClientError> {
        let factor = check_buffer_size_factor(factor)?;
        buffer_capacity(factor, self.sampling_rate_hz)?;
        if factor == self.buffer_size_factor {
            return Ok(false);
        }
        self.buffer_size_factor = factor;
        Ok(true)
    }

    /// Also re-derives the data polling period.
    pub fn set_sampling_rate(&mut self, rate_hz: u32) -> Result<bool, ClientError> {
        let rate = check_sampling_rate(rate_hz)?;
        let data_period = data_polling_period_for(rate)?;
        buffer_capacity(self.buffer_size_factor, rate)?;
        if rate == self.sampling_rate_hz {
            return Ok(false);
        }
        self.sampling_rate_hz = rate;
        self.data_polling_period_ms = data_period;
        Ok(true)
    }

    pub fn set_emo_engine_polling_period(&mut self, period_ms: u64) -> Result<bool, ClientError> {
        let period = check_engine_polling_period(period_ms)?;
        if period == self.emo_engine_polling_period_ms {
            return Ok(false);
        }
        self.emo_engine_polling_period_ms = period;
        Ok(true)
    }
}

fn check_buffer_size_factor(factor: f64) -> Result<f64, ClientError> {
    if factor.is_finite() && factor > 0.0 {
        Ok(factor)
    } else {
        Err(ClientError::InvalidBufferSizeFactor(factor))
    }
}

fn check_sampling_rate(rate_hz: u32) -> Result<u32, ClientError> {
    if rate_hz == 0 || rate_hz > MAX_SAMPLING_RATE_HZ {
        return Err(ClientError::SamplingRateOutOfRange {
            actual: rate_hz,
            max: MAX_SAMPLING_RATE_HZ,
        });
    }
    Ok(rate_hz)
}

fn check_engine_polling_period(period_ms: u64) -> Result<u64, ClientError> {
    if period_ms == 0 || period_ms > ENGINE_TIMEOUT_MS {
        return Err(ClientError::EnginePollingPeriodOutOfRange {
            actual: period_ms,
            max: ENGINE_TIMEOUT_MS,
        });
    }
    Ok(period_ms)
}

/// `1000 / rate` milliseconds, truncated.
pub fn data_polling_period_for(rate_hz: u32) -> Result<u64, ClientError> {
    let period = if rate_hz == 0 {
        0
    } else {
        (1000.0 / f64::from(rate_hz)) as u64
    };
    if period == 0 || period > MAX_DATA_POLLING_PERIOD_MS {
        return Err(ClientError::DataPollingPeriodOutOfRange {
            actual: period,
            max: MAX_DATA_POLLING_PERIOD_MS,
        });
    }
    Ok(period)
}

/// `floor(factor * rate)`, between 1 and [`MAX_BUFFER_CAPACITY`].
pub fn buffer_capacity(factor: f64, rate_hz: u32) -> Result<usize, ClientError> {
    let capacity = (factor * f64::from(rate_hz)).floor();
    if capacity.is_nan() || capacity < 1.0 {
        return Err(ClientError::ZeroCapacity);
    }
    if capacity > MAX_BUFFER_CAPACITY as f64 {
        return Err(ClientError::CapacityTooLarge {
            max: MAX_BUFFER_CAPACITY,
        });
    }
    Ok(capacity as usize)
}
