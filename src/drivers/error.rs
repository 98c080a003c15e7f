use thiserror::Error;
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("buffer size factor must be greater than zero, got {0}")]
    InvalidBufferSizeFactor(f64),
    #[error("sampling rate must be > 0 and <= {max} Hz, got {actual}")]
    SamplingRateOutOfRange { actual: u32, max: u32 },
    #[error("engine polling period must be > 0 and <= {max} ms, got {actual}")]
    EnginePollingPeriodOutOfRange { actual: u64, max: u64 },
    #[error("data polling period must be > 0 and <= {max} ms, got {actual}")]
    DataPollingPeriodOutOfRange { actual: u64, max: u64 },
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,
    #[error("buffer capacity must not exceed {max} frames")]
    CapacityTooLarge { max: usize },
    #[error("port {0} must be either the composer port or the control panel port")]
    InvalidPort(u16),
    #[error("{0}")]
    InvalidOperation(&'static str),
    #[error("failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
    #[error(transparent)]
    Device(#[from] anyhow::Error),
}
impl ClientError {
    /// True for errors raised by validating a configuration value.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidBufferSizeFactor(_)
                | ClientError::SamplingRateOutOfRange { .. }
                | ClientError::EnginePollingPeriodOutOfRange { .. }
                | ClientError::DataPollingPeriodOutOfRange { .. }
                | ClientError::ZeroCapacity
                | ClientError::CapacityTooLarge { .. }
                | ClientError::InvalidPort(_)
        )
    }
}
