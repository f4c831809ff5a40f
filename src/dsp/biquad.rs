use crate::dsp::MAX_CHANNELS;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

#[derive(ValueEnum, Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowPass => write!(f, "Low-pass"),
            Self::HighPass => write!(f, "High-pass"),
            Self::BandPass => write!(f, "Band-pass"),
        }
    }
}

/// Normalised biquad coefficients (a0 folded in).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// RBJ cookbook design.
    fn design(filter_type: FilterType, cutoff: f32, resonance: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * cutoff / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * resonance);

        let (b0, b1, b2) = match filter_type {
            FilterType::LowPass => {
                let b = (1.0 - cos_omega) / 2.0;
                (b, 1.0 - cos_omega, b)
            }
            FilterType::HighPass => {
                let b = (1.0 + cos_omega) / 2.0;
                (b, -(1.0 + cos_omega), b)
            }
            FilterType::BandPass => (alpha, 0.0, -alpha),
        };

        let a0 = 1.0 + alpha;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct ChannelState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

/// Second-order IIR stage with independent state for up to two channels.
///
/// Coefficients are re-derived eagerly on every setter call.
#[derive(Clone, Debug)]
pub struct BiquadFilter {
    filter_type: FilterType,
    cutoff: f32,
    resonance: f32,
    sample_rate: f32,
    coeffs: BiquadCoefficients,
    state: [ChannelState; MAX_CHANNELS],
}

impl BiquadFilter {
    pub const MIN_CUTOFF_HZ: f32 = 20.0;
    pub const MIN_RESONANCE: f32 = 0.1;
    pub const MAX_RESONANCE: f32 = 20.0;
    pub const DEFAULT_RESONANCE: f32 = 0.707;

    pub fn new(filter_type: FilterType, cutoff: f32, sample_rate: f32) -> Self {
        let mut filter = Self {
            filter_type,
            cutoff,
            resonance: Self::DEFAULT_RESONANCE,
            sample_rate,
            coeffs: BiquadCoefficients::IDENTITY,
            state: [ChannelState::default(); MAX_CHANNELS],
        };
        filter.set_cutoff(cutoff);
        filter
    }

    fn max_cutoff(&self) -> f32 {
        self.sample_rate * 0.49
    }

    fn update_coefficients(&mut self) {
        self.coeffs = BiquadCoefficients::design(
            self.filter_type,
            self.cutoff,
            self.resonance,
            self.sample_rate,
        );
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.cutoff = self.cutoff.clamp(Self::MIN_CUTOFF_HZ, self.max_cutoff());
        self.update_coefficients();
    }

    pub fn set_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
        self.update_coefficients();
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff = cutoff_hz.clamp(Self::MIN_CUTOFF_HZ, self.max_cutoff());
        self.update_coefficients();
    }

    pub fn set_resonance(&mut self, q: f32) {
        self.resonance = q.clamp(Self::MIN_RESONANCE, Self::MAX_RESONANCE);
        self.update_coefficients();
    }

    pub const fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub const fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub const fn resonance(&self) -> f32 {
        self.resonance
    }

    pub const fn coefficients(&self) -> BiquadCoefficients {
        self.coeffs
    }

    pub fn reset(&mut self) {
        self.state = [ChannelState::default(); MAX_CHANNELS];
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32, channel: usize) -> f32 {
        debug_assert!(channel < MAX_CHANNELS, "biquad channel {channel} out of range");
        let c = &self.coeffs;
        let s = &mut self.state[channel.min(MAX_CHANNELS - 1)];

        let output = c.b0 * input + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;

        s.x2 = s.x1;
        s.x1 = input;
        s.y2 = s.y1;
        s.y1 = output;

        output
    }
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new(FilterType::LowPass, 1000.0, 44_100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    /// |H(e^jw)| evaluated directly from the coefficients.
    fn magnitude(c: BiquadCoefficients, freq: f32, sample_rate: f32) -> f32 {
        let w = 2.0 * PI * freq / sample_rate;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();
        let num_re = c.b0 + c.b1 * c1 + c.b2 * c2;
        let num_im = -(c.b1 * s1 + c.b2 * s2);
        let den_re = 1.0 + c.a1 * c1 + c.a2 * c2;
        let den_im = -(c.a1 * s1 + c.a2 * s2);
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }

    fn measured_gain(filter: &mut BiquadFilter, freq: f32) -> f32 {
        let n = (SR as usize) / 2;
        let mut peak = 0.0f32;
        for i in 0..n {
            let x = (2.0 * PI * freq * i as f32 / SR).sin();
            let y = filter.process_sample(x, 0);
            if i > n / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn impulse_response_matches_difference_equation() {
        for filter_type in [FilterType::LowPass, FilterType::HighPass, FilterType::BandPass] {
            let mut filter = BiquadFilter::new(filter_type, 1_200.0, SR);
            filter.set_resonance(2.0);
            let c = filter.coefficients();

            let h0 = filter.process_sample(1.0, 0);
            let h1 = filter.process_sample(0.0, 0);
            let h2 = filter.process_sample(0.0, 0);
            let h3 = filter.process_sample(0.0, 0);

            let e0 = c.b0;
            let e1 = c.b1 - c.a1 * e0;
            let e2 = c.b2 - c.a1 * e1 - c.a2 * e0;
            let e3 = -c.a1 * e2 - c.a2 * e1;

            for (got, want) in [(h0, e0), (h1, e1), (h2, e2), (h3, e3)] {
                assert!((got - want).abs() < 1e-6, "{filter_type}: {got} != {want}");
            }
        }
    }

    #[test]
    fn coefficients_are_finite_over_the_whole_range() {
        for filter_type in [FilterType::LowPass, FilterType::HighPass, FilterType::BandPass] {
            for &cutoff in &[20.0, 100.0, 1_000.0, 10_000.0, SR * 0.49] {
                for &q in &[0.1, 0.707, 5.0, 20.0] {
                    let mut filter = BiquadFilter::new(filter_type, cutoff, SR);
                    filter.set_resonance(q);
                    let c = filter.coefficients();
                    assert!((c.b0 + c.b1 + c.b2).is_finite());
                    assert!(c.a1.is_finite() && c.a2.is_finite());
                    // Poles inside the unit circle.
                    assert!(c.a2.abs() < 1.0, "unstable at {cutoff} Hz, Q {q}");
                }
            }
        }
    }

    #[test]
    fn lowpass_has_unity_dc_gain_and_minus_3db_at_cutoff() {
        let filter = BiquadFilter::new(FilterType::LowPass, 1_000.0, SR);
        let c = filter.coefficients();
        let dc = (c.b0 + c.b1 + c.b2) / (1.0 + c.a1 + c.a2);
        assert!((dc - 1.0).abs() < 1e-4);

        let at_cutoff = magnitude(c, 1_000.0, SR);
        assert!((at_cutoff - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn measured_response_follows_transfer_function() {
        for filter_type in [FilterType::LowPass, FilterType::HighPass, FilterType::BandPass] {
            for &freq in &[200.0, 1_000.0, 5_000.0] {
                let mut filter = BiquadFilter::new(filter_type, 1_000.0, SR);
                let expected = magnitude(filter.coefficients(), freq, SR);
                let got = measured_gain(&mut filter, freq);
                assert!(
                    (got - expected).abs() < 0.02,
                    "{filter_type} @ {freq} Hz: measured {got}, expected {expected}"
                );
            }
        }
    }

    #[test]
    fn parameters_are_clamped() {
        let mut filter = BiquadFilter::new(FilterType::HighPass, 5.0, SR);
        assert_eq!(filter.cutoff(), 20.0);

        filter.set_cutoff(100_000.0);
        assert!((filter.cutoff() - SR * 0.49).abs() < 1e-3);

        filter.set_resonance(0.0);
        assert_eq!(filter.resonance(), 0.1);
        filter.set_resonance(100.0);
        assert_eq!(filter.resonance(), 20.0);
    }

    #[test]
    fn channels_are_independent_and_reset_clears_state() {
        let mut filter = BiquadFilter::new(FilterType::LowPass, 500.0, SR);
        for _ in 0..64 {
            filter.process_sample(1.0, 0);
        }
        // Channel 1 has seen nothing yet, so its first output is just b0 * x.
        let b0 = filter.coefficients().b0;
        assert!((filter.process_sample(1.0, 1) - b0).abs() < 1e-7);

        filter.reset();
        assert!((filter.process_sample(1.0, 0) - b0).abs() < 1e-7);
    }
}
