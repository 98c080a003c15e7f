use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use crate::drivers::{ChannelContexts, ClientError};
use crate::types::{Channel, DataChunk, Frame};
/// Copy of the buffered history taken under the buffer lock.
#[derive(Clone, Debug)]
pub struct BufferSnapshot {
    pub capacity: usize,
    pub frames: Vec<Frame>, // oldest first
    /// Frames inserted since the buffer was created, evicted ones included.
    pub total_frames: u64,
}
impl BufferSnapshot {
    pub fn len(&self) -> usize {
        self.frames.len()
    }
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
    /// Values of one channel, oldest first, skipping frames where it is absent.
    pub fn series(&self, channel: Channel) -> Vec<f64> {
        self.frames.iter().filter_map(|f| f.get(channel)).collect()
    }
}
/// Fixed-capacity frame ring. Only channels flagged `add_to_buffer` are kept.
pub struct SampleBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
    contexts: Arc<ChannelContexts>,
    total_frames: u64,
}
impl SampleBuffer {
    pub fn new(capacity: usize, contexts: Arc<ChannelContexts>) -> Result<Self, ClientError> {
        if capacity == 0 {
            return Err(ClientError::ZeroCapacity);
        }
        Ok(Self {
            // grows on demand; length never exceeds `capacity`
            frames: VecDeque::new(),
            capacity,
            contexts,
            total_frames: 0,
        })
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.frames.len()
    }
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
    /// Appends one frame, evicting the oldest when full. Returns the stored
    /// (filtered) frame.
    pub fn add_frame<I>(&mut self, frame: I) -> &Frame
    where
        I: IntoIterator<Item = (Channel, f64)>,
    {
        let contexts = &self.contexts;
        let stored: Frame = frame
            .into_iter()
            .filter(|(channel, _)| contexts.get(*channel).add_to_buffer)
            .collect();
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(stored);
        self.total_frames += 1;
        &self.frames[self.frames.len() - 1]
    }
    /// Splits a device read into frames by sample index and appends them in
    /// order. Frame `i` holds only the channels that have an `i`-th sample.
    pub fn add_chunk(&mut self, chunk: &DataChunk) -> Vec<Frame> {
        let samples = chunk.values().map(Vec::len).max().unwrap_or(0);
        // frames before this index are evicted again by the same chunk
        let first_kept = samples.saturating_sub(self.capacity);
        let mut added = Vec::with_capacity(samples - first_kept);
        for i in 0..samples {
            let frame = chunk
                .iter()
                .filter_map(|(channel, values)| values.get(i).map(|v| (*channel, *v)));
            let stored = self.add_frame(frame);
            if i >= first_kept {
                added.push(stored.clone());
            }
        }
        added
    }
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            capacity: self.capacity,
            frames: self.frames.iter().cloned().collect(),
            total_frames: self.total_frames,
        }
    }
}
/// Sample buffer shared between the data worker and readers.
///
/// The buffer is swapped out wholesale when its capacity changes, so
/// readers always see either the old history or the fresh empty buffer.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<SampleBuffer>>,
}
impl SharedBuffer {
    pub fn new(buffer: SampleBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }
    fn lock(&self) -> MutexGuard<'_, SampleBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn add_frame<I>(&self, frame: I) -> Frame
    where
        I: IntoIterator<Item = (Channel, f64)>,
    {
        self.lock().add_frame(frame).clone()
    }
    /// Inserts a whole chunk in one critical section; returns the stored
    /// frames and the buffer length afterwards.
    pub fn add_chunk(&self, chunk: &DataChunk) -> (Vec<Frame>, usize) {
        let mut buffer = self.lock();
        let added = buffer.add_chunk(chunk);
        (added, buffer.len())
    }
    pub fn replace(&self, buffer: SampleBuffer) {
        *self.lock() = buffer;
    }
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
    pub fn len(&self) -> usize {
        self.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
    pub fn snapshot(&self) -> BufferSnapshot {
        self.lock().snapshot()
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ChannelContext;
    use std::thread;
    fn af3_only() -> Arc<ChannelContexts> {
        Arc::new(
            ChannelContexts::builder()
                .set(Channel::Af3, ChannelContext::electrode())
                .build(),
        )
    }
    fn frame(v: f64) -> Vec<(Channel, f64)> {
        vec![(Channel::Af3, v)]
    }
    #[test]
    fn rejects_zero_capacity() {
        let err = SampleBuffer::new(0, af3_only()).err().unwrap();
        assert!(err.is_config_error());
    }
    #[test]
    fn huge_capacity_is_not_allocated_up_front() {
        let mut buffer = SampleBuffer::new(usize::MAX, af3_only()).unwrap();
        buffer.add_frame(frame(1.0));
        assert_eq!(buffer.capacity(), usize::MAX);
        assert_eq!(buffer.len(), 1);
    }
    #[test]
    fn keeps_insertion_order_below_capacity() {
        let mut buffer = SampleBuffer::new(10, af3_only()).unwrap();
        for i in 0..7 {
            buffer.add_frame(frame(i as f64));
        }
        assert_eq!(buffer.len(), 7);
        assert!(!buffer.is_full());
        let snap = buffer.snapshot();
        assert_eq!(snap.series(Channel::Af3), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = SampleBuffer::new(5, af3_only()).unwrap();
        for i in 1..=7 {
            buffer.add_frame(frame(i as f64));
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.total_frames(), 7);
        assert_eq!(
            buffer.snapshot().series(Channel::Af3),
            vec![3.0, 4.0, 5.0, 6.0, 7.0]
        );
    }
    #[test]
    fn drops_channels_not_flagged_for_buffering() {
        let mut buffer = SampleBuffer::new(4, af3_only()).unwrap();
        let stored = buffer
            .add_frame(vec![(Channel::Af3, 1.5), (Channel::Timestamp, 99.0)])
            .clone();
        assert_eq!(stored.channels().collect::<Vec<_>>(), vec![Channel::Af3]);
        assert_eq!(stored.get(Channel::Timestamp), None);
    }
    #[test]
    fn fully_filtered_frame_still_takes_a_slot() {
        let mut buffer = SampleBuffer::new(4, af3_only()).unwrap();
        buffer.add_frame(vec![(Channel::Marker, 1.0)]);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.frames().next().unwrap().is_empty());
    }
    #[test]
    fn chunk_is_split_by_sample_index() {
        let contexts = ChannelContexts::standard();
        let mut buffer = SampleBuffer::new(8, contexts).unwrap();
        let mut chunk = DataChunk::new();
        chunk.insert(Channel::Counter, vec![0.0, 1.0, 2.0]);
        chunk.insert(Channel::Af3, vec![10.0, 11.0, 12.0]);
        chunk.insert(Channel::Timestamp, vec![0.1, 0.2, 0.3]);
        // ragged: O1 only has two samples
        chunk.insert(Channel::O1, vec![20.0, 21.0]);
        let added = buffer.add_chunk(&chunk);
        assert_eq!(added.len(), 3);
        assert_eq!(buffer.len(), 3);
        let snap = buffer.snapshot();
        assert_eq!(snap.series(Channel::Counter), vec![0.0, 1.0, 2.0]);
        assert_eq!(snap.series(Channel::Af3), vec![10.0, 11.0, 12.0]);
        assert!(snap.series(Channel::Timestamp).is_empty());
        assert_eq!(snap.frames[2].get(Channel::O1), None);
        assert_eq!(snap.frames[1].get(Channel::O1), Some(21.0));
    }
    #[test]
    fn oversized_chunk_reports_only_retained_frames() {
        let mut buffer = SampleBuffer::new(3, af3_only()).unwrap();
        let mut chunk = DataChunk::new();
        chunk.insert(Channel::Af3, (0..5).map(f64::from).collect());
        let added = buffer.add_chunk(&chunk);
        let values: Vec<f64> = added.iter().filter_map(|f| f.get(Channel::Af3)).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.snapshot().series(Channel::Af3), values);
    }
    #[test]
    fn empty_chunk_adds_nothing() {
        let mut buffer = SampleBuffer::new(3, af3_only()).unwrap();
        assert!(buffer.add_chunk(&DataChunk::new()).is_empty());
        assert!(buffer.is_empty());
    }
    #[test]
    fn snapshots_never_see_partial_frames() {
        let contexts = ChannelContexts::standard();
        let shared = SharedBuffer::new(SampleBuffer::new(64, contexts).unwrap());
        let writer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..2_000 {
                    let v = i as f64;
                    shared.add_frame(Channel::ELECTRODES.iter().map(|&c| (c, v)));
                }
            })
        };
        for _ in 0..500 {
            let snap = shared.snapshot();
            for f in &snap.frames {
                assert_eq!(f.len(), Channel::ELECTRODES.len());
                let first = f.get(Channel::Af3).unwrap();
                assert!(f.iter().all(|(_, v)| v == first));
            }
            let series = snap.series(Channel::Af3);
            assert!(series.windows(2).all(|w| w[1] == w[0] + 1.0));
        }
        writer.join().unwrap();
        assert_eq!(shared.len(), 64);
    }
    #[test]
    fn replace_swaps_in_an_empty_buffer() {
        let shared = SharedBuffer::new(SampleBuffer::new(4, af3_only()).unwrap());
        shared.add_frame(frame(1.0));
        shared.replace(SampleBuffer::new(9, af3_only()).unwrap());
        assert!(shared.is_empty());
        assert_eq!(shared.capacity(), 9);
    }
}
