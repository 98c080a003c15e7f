// src/types.rs
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// Headset data channels, in device order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Counter,
    Interpolated,
    RawCq,
    Af3,
    F7,
    F3,
    Fc5,
    T7,
    P7,
    O1,
    O2,
    P8,
    T8,
    Fc6,
    F4,
    F8,
    Af4,
    GyroX,
    GyroY,
    Timestamp,
    EsTimestamp,
    FuncId,
    FuncValue,
    Marker,
    SyncSignal,
}

impl Channel {
    pub const COUNT: usize = 25;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Counter,
        Channel::Interpolated,
        Channel::RawCq,
        Channel::Af3,
        Channel::F7,
        Channel::F3,
        Channel::Fc5,
        Channel::T7,
        Channel::P7,
        Channel::O1,
        Channel::O2,
        Channel::P8,
        Channel::T8,
        Channel::Fc6,
        Channel::F4,
        Channel::F8,
        Channel::Af4,
        Channel::GyroX,
        Channel::GyroY,
        Channel::Timestamp,
        Channel::EsTimestamp,
        Channel::FuncId,
        Channel::FuncValue,
        Channel::Marker,
        Channel::SyncSignal,
    ];

    /// The 14 scalp electrodes.
    pub const ELECTRODES: [Channel; 14] = [
        Channel::Af3,
        Channel::F7,
        Channel::F3,
        Channel::Fc5,
        Channel::T7,
        Channel::P7,
        Channel::O1,
        Channel::O2,
        Channel::P8,
        Channel::T8,
        Channel::Fc6,
        Channel::F4,
        Channel::F8,
        Channel::Af4,
    ];

    /// Position in [`Channel::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_electrode(self) -> bool {
        (Channel::Af3.index()..=Channel::Af4.index()).contains(&self.index())
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Counter => "COUNTER",
            Channel::Interpolated => "INTERPOLATED",
            Channel::RawCq => "RAW_CQ",
            Channel::Af3 => "AF3",
            Channel::F7 => "F7",
            Channel::F3 => "F3",
            Channel::Fc5 => "FC5",
            Channel::T7 => "T7",
            Channel::P7 => "P7",
            Channel::O1 => "O1",
            Channel::O2 => "O2",
            Channel::P8 => "P8",
            Channel::T8 => "T8",
            Channel::Fc6 => "FC6",
            Channel::F4 => "F4",
            Channel::F8 => "F8",
            Channel::Af4 => "AF4",
            Channel::GyroX => "GYROX",
            Channel::GyroY => "GYROY",
            Channel::Timestamp => "TIMESTAMP",
            Channel::EsTimestamp => "ES_TIMESTAMP",
            Channel::FuncId => "FUNC_ID",
            Channel::FuncValue => "FUNC_VALUE",
            Channel::Marker => "MARKER",
            Channel::SyncSignal => "SYNC_SIGNAL",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Electrode contact quality as reported by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContactQuality {
    #[default]
    NoSignal,
    VeryBad,
    Poor,
    Fair,
    Good,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WirelessSignal {
    #[default]
    NoSignal,
    Bad,
    Good,
}

/// Engine-assigned user (headset) id.
pub type UserId = u32;

/// One device read: several samples per channel, sample `i` of every channel
/// belonging to the same instant.
pub type DataChunk = HashMap<Channel, Vec<f64>>;

/// One consistent set of channel values sampled at a single instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    values: BTreeMap<Channel, f64>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: Channel, value: f64) {
        self.values.insert(channel, value);
    }

    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.values.get(&channel).copied()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.values.contains_key(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        self.values.iter().map(|(c, v)| (*c, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(Channel, f64)> for Frame {
    fn from_iter<I: IntoIterator<Item = (Channel, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Device status published by the engine on every state update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadsetState {
    pub time_from_start_secs: f32,
    pub wireless_signal: WirelessSignal,
    pub contact_quality: BTreeMap<Channel, ContactQuality>,
}

impl HeadsetState {
    pub fn contact_quality(&self, channel: Channel) -> ContactQuality {
        self.contact_quality
            .get(&channel)
            .copied()
            .unwrap_or_default()
    }
}

// Events drained from the device session by one `process_events` call.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Connected { user_id: UserId },
    UserAdded { user_id: UserId },
    StateUpdated(HeadsetState),
    InternalStateChanged(String),
}

// Observable client properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    CurrentState,
    Buffer,
    BufferSize,
    BufferSizeFactor,
    UserId,
    IsPolling,
    IsEngineRunning,
    CanStartEngine,
    CanStartPolling,
    CanStopPolling,
    EmoEnginePollingPeriod,
    SamplingRate,
    DataPollingPeriod,
}

// Messages the client publishes to subscribers.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    PropertyChanged(Property),
    /// Frames stored by the last insert (already filtered), with the buffer
    /// length once the insert settled.
    FramesAdded { frames: Vec<Frame>, buffered: usize },
    StateUpdated(HeadsetState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_table_is_in_index_order() {
        for (i, ch) in Channel::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
        }
    }

    #[test]
    fn electrodes_are_contiguous() {
        let electrodes: Vec<Channel> = Channel::ALL
            .iter()
            .copied()
            .filter(|c| c.is_electrode())
            .collect();
        assert_eq!(electrodes, Channel::ELECTRODES.to_vec());
        assert!(!Channel::Counter.is_electrode());
        assert!(!Channel::GyroX.is_electrode());
    }

    #[test]
    fn frame_iterates_in_channel_order() {
        let frame: Frame = [(Channel::Af4, 2.0), (Channel::Counter, 1.0)]
            .into_iter()
            .collect();
        let order: Vec<Channel> = frame.channels().collect();
        assert_eq!(order, vec![Channel::Counter, Channel::Af4]);
        assert_eq!(frame.get(Channel::Af4), Some(2.0));
        assert_eq!(frame.get(Channel::Af3), None);
    }

    #[test]
    fn missing_contact_quality_reads_as_no_signal() {
        let state = HeadsetState::default();
        assert_eq!(state.contact_quality(Channel::O1), ContactQuality::NoSignal);
    }
}
