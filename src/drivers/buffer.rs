use std::collections::VecDeque;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use crate::drivers::{PipelineError, Result};
/// Fixed-size block of samples, shaped time × channels. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    data: Array2<f64>,
}
impl SampleBuffer {
    pub fn new(data: Array2<f64>) -> Result<Self> {
        let (samples, channels) = data.dim();
        if samples == 0 || channels == 0 {
            return Err(PipelineError::Shape(format!(
                "buffer must be non-empty, got {samples} samples x {channels} channels"
            )));
        }
        Ok(Self { data })
    }
    /// Builds a buffer from one row per time step.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let channels = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((t, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != channels) {
            return Err(PipelineError::Shape(format!(
                "row {t} has {} channels, expected {channels}",
                row.len()
            )));
        }
        let data = Array2::from_shape_fn((rows.len(), channels), |(t, c)| rows[t][c]);
        Self::new(data)
    }
    pub fn time_samples(&self) -> usize {
        self.data.len_of(Axis(0))
    }
    pub fn channel_count(&self) -> usize {
        self.data.len_of(Axis(1))
    }
    pub fn channel(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.column(index)
    }
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }
    pub fn duration_seconds(&self, sample_rate_hz: f64) -> f64 {
        self.time_samples() as f64 / sample_rate_hz
    }
}
/// Rolling per-channel history that hands out a full window every `hop` new samples.
///
/// Windows are cut at exact sample offsets (`capacity`, `capacity + hop`, ...), so chunk sizes
/// that do not divide the hop never shift the cadence, and a chunk spanning several hops queues
/// one window per hop.
pub struct SlidingWindow {
    per_channel: Vec<VecDeque<f64>>, // channel -> samples
    capacity: usize,
    hop: usize,
    since_emit: usize,
    ready: VecDeque<SampleBuffer>,
}
impl SlidingWindow {
    pub fn new(channel_count: usize, capacity: usize, hop: usize) -> Result<Self> {
        if channel_count == 0 {
            return Err(PipelineError::Shape("window needs at least one channel".into()));
        }
        if capacity == 0 || hop == 0 || hop > capacity {
            return Err(PipelineError::Config(format!(
                "window of {capacity} samples cannot advance by {hop}"
            )));
        }
        Ok(Self {
            per_channel: (0..channel_count)
                .map(|_| VecDeque::with_capacity(capacity))
                .collect(),
            capacity,
            hop,
            since_emit: 0,
            ready: VecDeque::new(),
        })
    }
    pub fn channel_count(&self) -> usize {
        self.per_channel.len()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn is_full(&self) -> bool {
        self.per_channel
            .first()
            .map(|c| c.len() == self.capacity)
            .unwrap_or(false)
    }
    /// Windows cut but not yet taken.
    pub fn queued(&self) -> usize {
        self.ready.len()
    }
    /// Appends a time × channels chunk, evicting the oldest samples past capacity.
    pub fn push_chunk(&mut self, chunk: ArrayView2<'_, f64>) -> Result<()> {
        if chunk.ncols() != self.per_channel.len() {
            return Err(PipelineError::Shape(format!(
                "channel count mismatch: expected {}, got {}",
                self.per_channel.len(),
                chunk.ncols()
            )));
        }
        for row in chunk.rows() {
            for (queue, &sample) in self.per_channel.iter_mut().zip(row) {
                if queue.len() == self.capacity {
                    queue.pop_front();
                }
                queue.push_back(sample);
            }
            self.since_emit += 1;
            // Before the first window `since_emit` counts every sample, and hop <= capacity.
            if self.since_emit >= self.hop && self.is_full() {
                self.since_emit = 0;
                let snapshot = self.snapshot();
                self.ready.push_back(snapshot);
            }
        }
        Ok(())
    }
    /// Returns the oldest window cut so far, if any.
    pub fn take_ready(&mut self) -> Option<SampleBuffer> {
        self.ready.pop_front()
    }
    fn snapshot(&self) -> SampleBuffer {
        let data = Array2::from_shape_fn((self.capacity, self.per_channel.len()), |(t, c)| {
            self.per_channel[c][t]
        });
        SampleBuffer { data }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    fn ramp(rows: usize, channels: usize, start: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, channels), |(t, c)| ((start + t) * 10 + c) as f64)
    }
    #[test]
    fn buffer_reports_shape() {
        let buffer = SampleBuffer::new(ramp(20, 4, 0)).unwrap();
        assert_eq!(buffer.time_samples(), 20);
        assert_eq!(buffer.channel_count(), 4);
        assert_eq!(buffer.channel(2)[3], 32.0);
        assert!((buffer.duration_seconds(10.0) - 2.0).abs() < 1e-12);
        assert!(SampleBuffer::new(Array2::zeros((0, 4))).is_err());
    }
    #[test]
    fn ragged_rows_are_rejected() {
        let err = SampleBuffer::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::Shape(_)));
    }
    #[test]
    fn window_emits_on_hop_cadence() {
        let mut window = SlidingWindow::new(2, 8, 4).unwrap();
        window.push_chunk(ramp(6, 2, 0).view()).unwrap();
        assert!(window.take_ready().is_none());
        window.push_chunk(ramp(2, 2, 6).view()).unwrap();
        let first = window.take_ready().unwrap();
        assert_eq!(first.channel(0)[0], 0.0);
        assert_eq!(first.channel(1)[7], 71.0);
        assert!(window.take_ready().is_none());
        window.push_chunk(ramp(3, 2, 8).view()).unwrap();
        assert!(window.take_ready().is_none());
        window.push_chunk(ramp(1, 2, 11).view()).unwrap();
        let second = window.take_ready().unwrap();
        assert_eq!(second.time_samples(), 8);
        assert_eq!(second.channel(0)[0], 40.0);
        assert_eq!(second.channel(0)[7], 110.0);
    }
    #[test]
    fn cadence_holds_for_chunks_that_do_not_divide_the_hop() {
        let mut window = SlidingWindow::new(1, 20, 10).unwrap();
        let mut ends = Vec::new();
        let mut pushed = 0;
        while pushed < 117 {
            window.push_chunk(ramp(3, 1, pushed).view()).unwrap();
            pushed += 3;
            while let Some(buffer) = window.take_ready() {
                // ramp value of the newest sample, divided back to its index
                ends.push(buffer.channel(0)[19] as usize / 10 + 1);
            }
        }
        assert_eq!(ends, vec![20, 30, 40, 50, 60, 70, 80, 90, 100, 110]);
    }
    #[test]
    fn large_chunk_queues_one_window_per_hop() {
        let mut window = SlidingWindow::new(2, 8, 4).unwrap();
        window.push_chunk(ramp(17, 2, 0).view()).unwrap();
        assert_eq!(window.queued(), 3);
        let starts: Vec<f64> = std::iter::from_fn(|| window.take_ready())
            .map(|b| b.channel(0)[0])
            .collect();
        assert_eq!(starts, vec![0.0, 40.0, 80.0]);
        window.push_chunk(ramp(3, 2, 17).view()).unwrap();
        assert_eq!(window.take_ready().unwrap().channel(0)[0], 120.0);
    }
    #[test]
    fn window_rejects_channel_mismatch() {
        let mut window = SlidingWindow::new(3, 8, 4).unwrap();
        assert!(window.push_chunk(ramp(4, 2, 0).view()).is_err());
        assert!(SlidingWindow::new(3, 4, 8).is_err());
    }
}
