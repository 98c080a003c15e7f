use std::collections::BTreeMap;
use crate::drivers::buffer::BufferSnapshot;
use crate::drivers::fft::{ChannelSpectrum, SpectrumBuilder};
use crate::drivers::ChannelContexts;
use crate::types::Channel;
/// Ready-to-plot view of a buffer snapshot: per-channel series with the DC
/// bias removed where the channel asks for it, plus spectra of the channels
/// flagged `compute_fft`.
#[derive(Clone, Debug)]
pub struct ProcessedView {
    pub sample_rate_hz: f64,
    pub series: BTreeMap<Channel, Vec<f64>>,
    pub spectra: Vec<ChannelSpectrum>,
}
impl ProcessedView {
    pub fn from_snapshot(
        snapshot: &BufferSnapshot,
        contexts: &ChannelContexts,
        sample_rate_hz: f64,
        fft_size: usize,
    ) -> Self {
        let builder = SpectrumBuilder::with_size(fft_size);
        let mut series = BTreeMap::new();
        let mut spectra = Vec::new();
        for (channel, ctx) in contexts.iter().filter(|(_, ctx)| ctx.add_to_buffer) {
            let mut values = snapshot.series(channel);
            if values.is_empty() {
                continue;
            }
            if ctx.remove_dc_bias {
                remove_dc_bias(&mut values);
            }
            if ctx.compute_fft {
                spectra.push(builder.compute(channel, &values, sample_rate_hz));
            }
            series.insert(channel, values);
        }
        Self {
            sample_rate_hz,
            series,
            spectra,
        }
    }
    pub fn spectrum(&self, channel: Channel) -> Option<&ChannelSpectrum> {
        self.spectra.iter().find(|s| s.channel == channel)
    }
}
/// Subtracts the mean of the window from every sample.
pub fn remove_dc_bias(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    for v in values.iter_mut() {
        *v -= mean;
    }
}
