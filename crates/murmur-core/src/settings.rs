//! Fixed audio settings and block timing.

/// Sample rate, block size, and external channel counts of an engine.
///
/// These are fixed for the lifetime of an engine. Timestamps throughout the
/// crate are absolute milliseconds as `f64`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioSettings {
    /// Samples per second.
    pub sample_rate: f32,
    /// Samples per block.
    pub block_size: usize,
    /// Channels of host input.
    pub input_channels: usize,
    /// Channels of host output.
    pub output_channels: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 64,
            input_channels: 2,
            output_channels: 2,
        }
    }
}

/// Slack, in samples, for timestamps that land a hair past a sample boundary
/// through floating-point rounding.
const OFFSET_EPSILON: f64 = 1e-6;

impl AudioSettings {
    /// Creates settings with the given rate, block size, and channel counts.
    pub fn new(
        sample_rate: f32,
        block_size: usize,
        input_channels: usize,
        output_channels: usize,
    ) -> Self {
        Self {
            sample_rate,
            block_size,
            input_channels,
            output_channels,
        }
    }

    /// Duration of one sample in milliseconds.
    #[inline]
    pub fn ms_per_sample(&self) -> f64 {
        1000.0 / f64::from(self.sample_rate)
    }

    /// Duration of one block in milliseconds.
    #[inline]
    pub fn block_duration_ms(&self) -> f64 {
        self.block_size as f64 * self.ms_per_sample()
    }

    /// Number of planar samples in one host input block.
    pub fn input_len(&self) -> usize {
        self.input_channels * self.block_size
    }

    /// Number of planar samples in one host output block.
    pub fn output_len(&self) -> usize {
        self.output_channels * self.block_size
    }

    /// Sample offset inside the block starting at `block_start` at which an
    /// event stamped `timestamp` takes effect.
    ///
    /// Rounds up to the next sample and clamps to `0..=block_size`.
    pub fn sample_offset(&self, timestamp: f64, block_start: f64) -> usize {
        let exact = (timestamp - block_start) / self.ms_per_sample();
        let offset = (exact - OFFSET_EPSILON).ceil();
        if offset <= 0.0 {
            0
        } else {
            (offset as usize).min(self.block_size)
        }
    }

    /// Converts milliseconds to a whole number of samples, rounding to nearest.
    pub fn ms_to_samples(&self, ms: f64) -> usize {
        let samples = (ms / self.ms_per_sample()).round();
        if samples <= 0.0 { 0 } else { samples as usize }
    }
}
