use crate::dsp::MAX_CHANNELS;

/// Allpass coefficients of the two polyphase branches (12th order, steep transition,
/// roughly 100 dB of stopband rejection above 0.26 of the oversampled rate).
const PATH_A: [f32; 6] = [
    0.036_681_503,
    0.274_631_76,
    0.561_098_96,
    0.769_741_8,
    0.892_260_8,
    0.962_094_56,
];
const PATH_B: [f32; 6] = [
    0.136_547_62,
    0.423_138_62,
    0.677_540_05,
    0.839_889_6,
    0.931_541_94,
    0.987_816_4,
];

/// Cascade of first-order allpass sections running at the base rate.
///
/// Each section is `y[n] = a * (x[n] - y[n-1]) + x[n-1]`.
#[derive(Clone, Debug, Default)]
struct AllpassChain {
    x1: [f32; 6],
    y1: [f32; 6],
}

impl AllpassChain {
    #[inline]
    fn process(&mut self, coeffs: &[f32; 6], input: f32) -> f32 {
        let mut x = input;
        for (i, &a) in coeffs.iter().enumerate() {
            let y = a.mul_add(x - self.y1[i], self.x1[i]);
            self.x1[i] = x;
            self.y1[i] = y;
            x = y;
        }
        x
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Debug, Default)]
struct HalfBand {
    a: AllpassChain,
    b: AllpassChain,
}

impl HalfBand {
    /// One base-rate sample in, two high-rate samples out.
    #[inline]
    fn interpolate(&mut self, input: f32) -> (f32, f32) {
        (self.a.process(&PATH_A, input), self.b.process(&PATH_B, input))
    }

    /// Two high-rate samples in, one base-rate sample out.
    #[inline]
    fn decimate(&mut self, even: f32, odd: f32) -> f32 {
        0.5 * (self.a.process(&PATH_A, odd) + self.b.process(&PATH_B, even))
    }

    fn reset(&mut self) {
        self.a.reset();
        self.b.reset();
    }
}

/// 2x oversampler built from a polyphase IIR half-band filter.
///
/// The work buffer is sized once in [`Oversampler2x::prepare`]; blocks longer than the
/// prepared size must be split by the caller.
#[derive(Clone, Debug)]
pub struct Oversampler2x {
    up: [HalfBand; MAX_CHANNELS],
    down: [HalfBand; MAX_CHANNELS],
    buffers: [Vec<f32>; MAX_CHANNELS],
    max_block_size: usize,
}

impl Oversampler2x {
    pub const FACTOR: usize = 2;

    pub fn new() -> Self {
        Self {
            up: Default::default(),
            down: Default::default(),
            buffers: Default::default(),
            max_block_size: 0,
        }
    }

    pub fn prepare(&mut self, max_block_size: usize) {
        self.max_block_size = max_block_size;
        for buffer in &mut self.buffers {
            *buffer = vec![0.0; max_block_size * Self::FACTOR];
        }
        self.reset();
    }

    pub const fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn reset(&mut self) {
        for hb in self.up.iter_mut().chain(self.down.iter_mut()) {
            hb.reset();
        }
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
    }

    /// Upsamples `input` into the channel's work buffer and returns the oversampled slice.
    pub fn upsample(&mut self, channel: usize, input: &[f32]) -> &mut [f32] {
        let len = input.len() * Self::FACTOR;
        let up = &mut self.up[channel];
        let buffer = &mut self.buffers[channel][..len];

        for (pair, &x) in buffer.chunks_exact_mut(2).zip(input) {
            let (even, odd) = up.interpolate(x);
            pair[0] = even;
            pair[1] = odd;
        }

        buffer
    }

    /// Downsamples the channel's work buffer back into `output`.
    pub fn downsample(&mut self, channel: usize, output: &mut [f32]) {
        let len = output.len() * Self::FACTOR;
        let down = &mut self.down[channel];
        let buffer = &self.buffers[channel][..len];

        for (y, pair) in output.iter_mut().zip(buffer.chunks_exact(2)) {
            *y = down.decimate(pair[0], pair[1]);
        }
    }
}

impl Default for Oversampler2x {
    fn default() -> Self {
        Self::new()
    }
}
