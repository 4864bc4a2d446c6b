use super::DataPacket;
use std::collections::VecDeque;

/// Ordered packet buffer with a duration threshold.
///
/// Packets are held until the buffered sample count exceeds
/// `sample_rate * buffer_secs`, or until a final packet arrives. A flush
/// returns every buffered packet in arrival order and resets the count.
#[derive(Debug)]
pub struct OutputBuffer<T> {
    sample_rate: u32,
    buffer_secs: f32,
    threshold_samples: usize,
    pending: VecDeque<DataPacket<T>>,
    accumulated_samples: usize,
}

impl<T> OutputBuffer<T> {
    pub fn new(sample_rate: u32, buffer_secs: f32) -> Self {
        // f32 settings such as 0.7 sit just below their decimal value
        let threshold_samples =
            (f64::from(sample_rate) * f64::from(buffer_secs.max(0.0))).round() as usize;
        Self {
            sample_rate,
            buffer_secs,
            threshold_samples,
            pending: VecDeque::new(),
            accumulated_samples: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_secs(&self) -> f32 {
        self.buffer_secs
    }

    pub fn threshold_samples(&self) -> usize {
        self.threshold_samples
    }

    pub fn accumulated_samples(&self) -> usize {
        self.accumulated_samples
    }

    /// Seconds of audio currently buffered.
    pub fn accumulated_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.accumulated_samples as f32 / self.sample_rate as f32
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffers `packet`; returns the flushed batch if it triggered one.
    pub fn push(&mut self, packet: DataPacket<T>) -> Option<Vec<DataPacket<T>>> {
        let is_final = packet.is_final;
        self.accumulated_samples += packet.len();
        self.pending.push_back(packet);

        if is_final || self.accumulated_samples > self.threshold_samples {
            Some(self.flush())
        } else {
            None
        }
    }

    /// Empties the buffer regardless of the threshold.
    pub fn flush(&mut self) -> Vec<DataPacket<T>> {
        self.accumulated_samples = 0;
        self.pending.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.accumulated_samples = 0;
    }
}
