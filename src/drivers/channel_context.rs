use std::sync::Arc;
use once_cell::sync::OnceCell;
use crate::types::{Channel, ContactQuality};
/// Static per-channel metadata controlling what the client does with a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelContext {
    pub add_to_buffer: bool,
    pub remove_dc_bias: bool,
    pub is_electrode_channel: bool,
    pub compute_fft: bool,
    /// Present on electrode channels only.
    pub contact_quality: Option<ContactQuality>,
}
impl ChannelContext {
    /// Context for a scalp electrode: buffered with its DC bias removed.
    pub fn electrode() -> Self {
        Self {
            add_to_buffer: true,
            remove_dc_bias: true,
            is_electrode_channel: true,
            compute_fft: false,
            contact_quality: Some(ContactQuality::NoSignal),
        }
    }
    pub fn buffered() -> Self {
        Self {
            add_to_buffer: true,
            ..Self::default()
        }
    }
    pub fn with_fft(mut self) -> Self {
        self.compute_fft = true;
        self
    }
}
/// One context per channel, fixed once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelContexts {
    contexts: [ChannelContext; Channel::COUNT],
}
impl ChannelContexts {
    /// The standard headset table, built on first use and shared afterwards.
    pub fn standard() -> Arc<ChannelContexts> {
        static STANDARD: OnceCell<Arc<ChannelContexts>> = OnceCell::new();
        STANDARD
            .get_or_init(|| Arc::new(Self::build_standard()))
            .clone()
    }
    pub fn builder() -> ChannelContextsBuilder {
        ChannelContextsBuilder {
            contexts: [ChannelContext::default(); Channel::COUNT],
        }
    }
    fn build_standard() -> Self {
        let mut builder = Self::builder();
        for channel in Channel::ELECTRODES {
            builder = builder.set(channel, ChannelContext::electrode());
        }
        builder
            .set(Channel::Af3, ChannelContext::electrode().with_fft())
            .set(Channel::Counter, ChannelContext::buffered())
            .build()
    }
    pub fn get(&self, channel: Channel) -> &ChannelContext {
        &self.contexts[channel.index()]
    }
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &ChannelContext)> + '_ {
        Channel::ALL.iter().map(move |&c| (c, self.get(c)))
    }
    pub fn electrode_channels(&self) -> Vec<Channel> {
        self.iter()
            .filter(|(_, ctx)| ctx.is_electrode_channel)
            .map(|(c, _)| c)
            .collect()
    }
    pub fn buffered_channels(&self) -> Vec<Channel> {
        self.iter()
            .filter(|(_, ctx)| ctx.add_to_buffer)
            .map(|(c, _)| c)
            .collect()
    }
}
pub struct ChannelContextsBuilder {
    contexts: [ChannelContext; Channel::COUNT],
}
impl ChannelContextsBuilder {
    pub fn set(mut self, channel: Channel, context: ChannelContext) -> Self {
        self.contexts[channel.index()] = context;
        self
    }
    pub fn build(self) -> ChannelContexts {
        ChannelContexts {
            contexts: self.contexts,
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn standard_table_flags() {
        let table = ChannelContexts::standard();
        assert_eq!(table.electrode_channels(), Channel::ELECTRODES.to_vec());
        let af3 = table.get(Channel::Af3);
        assert!(af3.add_to_buffer && af3.remove_dc_bias && af3.compute_fft);
        assert_eq!(af3.contact_quality, Some(ContactQuality::NoSignal));
        let o1 = table.get(Channel::O1);
        assert!(o1.is_electrode_channel && !o1.compute_fft);
        let counter = table.get(Channel::Counter);
        assert!(counter.add_to_buffer && !counter.remove_dc_bias && !counter.is_electrode_channel);
        assert_eq!(counter.contact_quality, None);
        for ch in [Channel::Timestamp, Channel::GyroX, Channel::Marker, Channel::RawCq] {
            assert_eq!(*table.get(ch), ChannelContext::default(), "{ch}");
        }
        assert_eq!(table.buffered_channels().len(), 15);
    }
    #[test]
    fn standard_table_is_built_once() {
        let a = ChannelContexts::standard();
        let b = ChannelContexts::standard();
        assert!(Arc::ptr_eq(&a, &b));
    }
    #[test]
    fn builder_defaults_unset_channels() {
        let table = ChannelContexts::builder()
            .set(Channel::Af3, ChannelContext::electrode())
            .build();
        assert_eq!(table.buffered_channels(), vec![Channel::Af3]);
        assert!(!table.get(Channel::Timestamp).add_to_buffer);
    }
}
