use crate::dsp::biquad::{BiquadFilter, FilterType};
use crate::dsp::oversampler::Oversampler2x;
use crate::dsp::{AudioBuffer, MAX_CHANNELS};
use crate::effects::{Effect, EffectType, ParameterSpec, find_spec};
use std::any::Any;

static PARAMS: [ParameterSpec; 3] = [
    ParameterSpec::new("gain", "Gain", 0.0, 10.0, 0.1, 5.0, ""),
    ParameterSpec::new("tone", "Tone", 0.0, 1.0, 0.01, 0.5, ""),
    ParameterSpec::new("level", "Level", 0.0, 1.0, 0.01, 0.7, ""),
];

const PRE_FILTER_HZ: f32 = 2_000.0;
const POS_THRESHOLD: f32 = 0.3;
const NEG_THRESHOLD: f32 = 0.25;

/// Logarithmic drive curve: 0.1x at gain 0, 1x at 2.5, 1000x at 10.
#[inline]
fn drive(gain: f32) -> f32 {
    10f32.powf(gain.mul_add(0.4, -1.0))
}

#[inline]
fn tone_cutoff(tone: f32) -> f32 {
    tone.mul_add(4_700.0, 300.0)
}

/// Asymmetric clip: softer knee above +0.3, steeper below -0.25, then tanh warmth and a hard ceiling.
#[inline]
pub fn asymmetric_clip(sample: f32) -> f32 {
    let shaped = if sample > POS_THRESHOLD {
        let excess = sample - POS_THRESHOLD;
        POS_THRESHOLD + excess / excess.mul_add(excess, 1.0)
    } else if sample < -NEG_THRESHOLD {
        let excess = -(sample + NEG_THRESHOLD);
        -NEG_THRESHOLD - excess / (excess * excess).mul_add(1.5, 1.0)
    } else {
        sample
    };

    ((shaped * 1.5).tanh() * 0.8).clamp(-1.0, 1.0)
}

/// Vintage fuzz run at twice the host rate.
pub struct Fuzz {
    gain: f32,
    tone: f32,
    level: f32,

    oversampler: Oversampler2x,
    pre_filter: BiquadFilter,
    tone_filter: BiquadFilter,

    bypassed: bool,
}

impl Fuzz {
    pub fn new() -> Self {
        let sample_rate = 44_100.0 * Oversampler2x::FACTOR as f32;
        let tone = PARAMS[1].default;
        Self {
            gain: PARAMS[0].default,
            tone,
            level: PARAMS[2].default,
            oversampler: Oversampler2x::new(),
            pre_filter: BiquadFilter::new(FilterType::LowPass, PRE_FILTER_HZ, sample_rate),
            tone_filter: BiquadFilter::new(FilterType::LowPass, tone_cutoff(tone), sample_rate),
            bypassed: false,
        }
    }
}

impl Default for Fuzz {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Fuzz {
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize) {
        let oversampled_rate = sample_rate * Oversampler2x::FACTOR as f32;
        self.pre_filter.set_sample_rate(oversampled_rate);
        self.pre_filter.set_cutoff(PRE_FILTER_HZ);
        self.tone_filter.set_sample_rate(oversampled_rate);
        self.tone_filter.set_cutoff(tone_cutoff(self.tone));
        self.oversampler.prepare(max_block_size);
        self.reset();
    }

    fn reset(&mut self) {
        self.oversampler.reset();
        self.pre_filter.reset();
        self.tone_filter.reset();
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer) {
        let chunk_len = self.oversampler.max_block_size();
        if self.bypassed || chunk_len == 0 {
            return;
        }

        let gain = drive(self.gain);
        let output_gain = self.level * 0.5;

        for (ch, samples) in buffer.channels_mut().take(MAX_CHANNELS).enumerate() {
            for chunk in samples.chunks_mut(chunk_len) {
                let oversampled = self.oversampler.upsample(ch, chunk);
                for s in oversampled.iter_mut() {
                    let x = self.pre_filter.process_sample(*s, ch) * gain;
                    let x = asymmetric_clip(x);
                    *s = self.tone_filter.process_sample(x, ch) * output_gain;
                }
                self.oversampler.downsample(ch, chunk);
            }
        }
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Fuzz
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    fn parameter_specs(&self) -> &'static [ParameterSpec] {
        &PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        let value = find_spec(&PARAMS, name)?.clamp(value);
        match name {
            "gain" => self.gain = value,
            "tone" => {
                self.tone = value;
                self.tone_filter.set_cutoff(tone_cutoff(value));
            }
            "level" => self.level = value,
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "gain" => Ok(self.gain),
            "tone" => Ok(self.tone),
            "level" => Ok(self.level),
            _ => Err("Unknown parameter"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn drive_curve_endpoints() {
        assert!((drive(0.0) - 0.1).abs() < 1e-6);
        assert!((drive(2.5) - 1.0).abs() < 1e-5);
        assert!((drive(5.0) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn clipper_is_asymmetric_and_bounded() {
        assert_eq!(asymmetric_clip(0.0), 0.0);
        let pos = asymmetric_clip(2.0);
        let neg = asymmetric_clip(-2.0);
        assert!(pos > 0.0 && neg < 0.0);
        assert!((pos + neg).abs() > 1e-3, "clip should be asymmetric");
        for &x in &[-1e6f32, -10.0, -1.0, 1.0, 10.0, 1e6] {
            assert!(asymmetric_clip(x).abs() <= 1.0);
        }
    }

    #[test]
    fn tone_sweeps_filter_cutoff() {
        let mut fuzz = Fuzz::new();
        fuzz.prepare(48_000.0, 128);
        fuzz.set_parameter("tone", 0.0).unwrap();
        assert!((fuzz.tone_filter.cutoff() - 300.0).abs() < 1e-3);
        fuzz.set_parameter("tone", 1.0).unwrap();
        assert!((fuzz.tone_filter.cutoff() - 5_000.0).abs() < 1e-3);
    }

    #[test]
    fn output_is_bounded_and_processes_oversized_blocks() {
        let mut fuzz = Fuzz::new();
        fuzz.prepare(48_000.0, 64);
        fuzz.set_parameter("gain", 10.0).unwrap();
        fuzz.set_parameter("level", 1.0).unwrap();

        // Larger than the prepared block size: processed in chunks.
        let mut buffer = AudioBuffer::new(2, 1000);
        for ch in 0..2 {
            for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *s = (2.0 * PI * 220.0 * i as f32 / 48_000.0).sin();
            }
        }
        fuzz.process_block(&mut buffer);

        assert!(buffer.peak() <= 1.0);
        assert!(buffer.peak() > 0.05, "fuzz produced silence");
        assert!(buffer.channel(0).iter().all(|s| s.is_finite()));
    }

    #[test]
    fn bypass_leaves_buffer_untouched() {
        let mut fuzz = Fuzz::new();
        fuzz.prepare(44_100.0, 32);
        fuzz.set_bypassed(true);
        let mut buffer = AudioBuffer::new(1, 32);
        buffer.channel_mut(0).fill(0.5);
        fuzz.process_block(&mut buffer);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.5));
    }
}
