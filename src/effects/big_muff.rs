use crate::dsp::biquad::{BiquadFilter, FilterType};
use crate::dsp::common::{DcBlocker, soft_limit};
use crate::dsp::{AudioBuffer, MAX_CHANNELS};
use crate::effects::{Effect, EffectType, ParameterSpec, find_spec};
use std::any::Any;

static PARAMS: [ParameterSpec; 3] = [
    ParameterSpec::new("sustain", "Sustain", 0.0, 1.0, 0.01, 0.7, ""),
    ParameterSpec::new("tone", "Tone", 0.0, 1.0, 0.01, 0.5, ""),
    ParameterSpec::new("volume", "Volume", 0.0, 1.0, 0.01, 0.7, ""),
];

/// (pre-gain multiplier, clip threshold) for each of the four cascaded stages.
/// The first stage's multiplier scales the sustain drive.
const STAGES: [(f32, f32); 4] = [(0.5, 0.6), (2.0, 0.5), (1.5, 0.4), (1.3, 0.35)];

const INPUT_HP_HZ: f32 = 100.0;
const BASS_LP_HZ: f32 = 500.0;
const TREBLE_HP_HZ: f32 = 1_500.0;
const MID_BP_HZ: f32 = 800.0;
const MID_Q: f32 = 0.5;
const MID_CUT: f32 = 0.4;
const OUTPUT_KNEE: f32 = 0.9;

/// One asymmetric tanh clip stage, followed by the 0.8 make-down.
#[inline]
pub fn clip_stage(sample: f32, threshold: f32) -> f32 {
    let headroom = 1.0 - threshold;
    let clipped = if sample > threshold {
        let excess = sample - threshold;
        headroom.mul_add((excess / headroom).tanh(), threshold)
    } else if sample < -threshold {
        let excess = -sample - threshold;
        -headroom.mul_add((excess / headroom * 0.9).tanh(), threshold)
    } else {
        sample
    };
    clipped * 0.8
}

/// Four-stage sustaining fuzz with a scooped-mid tone stack.
pub struct BigMuff {
    sustain: f32,
    tone: f32,
    volume: f32,

    input_filter: BiquadFilter,
    bass_filter: BiquadFilter,
    treble_filter: BiquadFilter,
    mid_filter: BiquadFilter,
    dc_blockers: [DcBlocker; MAX_CHANNELS],

    bypassed: bool,
}

impl BigMuff {
    pub fn new() -> Self {
        let mut muff = Self {
            sustain: PARAMS[0].default,
            tone: PARAMS[1].default,
            volume: PARAMS[2].default,
            input_filter: BiquadFilter::new(FilterType::HighPass, INPUT_HP_HZ, 44_100.0),
            bass_filter: BiquadFilter::new(FilterType::LowPass, BASS_LP_HZ, 44_100.0),
            treble_filter: BiquadFilter::new(FilterType::HighPass, TREBLE_HP_HZ, 44_100.0),
            mid_filter: BiquadFilter::new(FilterType::BandPass, MID_BP_HZ, 44_100.0),
            dc_blockers: Default::default(),
            bypassed: false,
        };
        muff.mid_filter.set_resonance(MID_Q);
        muff
    }

    fn filters_mut(&mut self) -> [&mut BiquadFilter; 4] {
        [
            &mut self.input_filter,
            &mut self.bass_filter,
            &mut self.treble_filter,
            &mut self.mid_filter,
        ]
    }
}

impl Default for BigMuff {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for BigMuff {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        for filter in self.filters_mut() {
            filter.set_sample_rate(sample_rate);
        }
        self.input_filter.set_cutoff(INPUT_HP_HZ);
        self.bass_filter.set_cutoff(BASS_LP_HZ);
        self.treble_filter.set_cutoff(TREBLE_HP_HZ);
        self.mid_filter.set_cutoff(MID_BP_HZ);
        self.reset();
    }

    fn reset(&mut self) {
        for filter in self.filters_mut() {
            filter.reset();
        }
        for dc in &mut self.dc_blockers {
            dc.reset();
        }
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer) {
        if self.bypassed {
            return;
        }

        let drive = self.sustain.mul_add(99.0, 1.0);
        let bass_amount = (1.0 - self.tone).mul_add(0.7, 0.3);
        let treble_amount = self.tone.mul_add(0.7, 0.3);

        for (ch, samples) in buffer.channels_mut().take(MAX_CHANNELS).enumerate() {
            for sample in samples {
                let mut x = self.input_filter.process_sample(*sample, ch) * drive;
                for (gain, threshold) in STAGES {
                    x = clip_stage(x * gain, threshold);
                }

                let bass = self.bass_filter.process_sample(x, ch);
                let treble = self.treble_filter.process_sample(x, ch);
                let mid = self.mid_filter.process_sample(x, ch);
                let x = bass * bass_amount + treble * treble_amount - mid * MID_CUT;

                let x = self.dc_blockers[ch].process(x) * self.volume;
                *sample = soft_limit(x, OUTPUT_KNEE);
            }
        }
    }

    fn effect_type(&self) -> EffectType {
        EffectType::BigMuff
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
            "sustain" => self.sustain = value,
            "tone" => self.tone = value,
            "volume" => self.volume = value,
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "sustain" => Ok(self.sustain),
            "tone" => Ok(self.tone),
            "volume" => Ok(self.volume),
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

    fn full_scale_sine(frames: usize, freq: f32, sample_rate: f32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(2, frames);
        for ch in 0..2 {
            for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *s = (2.0 * PI * freq * i as f32 / sample_rate).sin();
            }
        }
        buffer
    }

    #[test]
    fn clip_stage_is_linear_below_threshold() {
        assert!((clip_stage(0.2, 0.6) - 0.16).abs() < 1e-7);
        assert!((clip_stage(-0.2, 0.6) + 0.16).abs() < 1e-7);
    }

    #[test]
    fn clip_stage_saturates_below_unity() {
        for &threshold in &[0.6f32, 0.5, 0.4, 0.35] {
            let pos = clip_stage(1e4, threshold);
            let neg = clip_stage(-1e4, threshold);
            assert!(pos <= 0.8 + 1e-6);
            assert!(neg >= -0.8 - 1e-6);
            assert!(clip_stage(2.0, threshold) > -clip_stage(-2.0, threshold));
        }
    }

    #[test]
    fn full_scale_input_stays_bounded() {
        for &sustain in &[0.0f32, 0.5, 1.0] {
            for &tone in &[0.0f32, 1.0] {
                let mut muff = BigMuff::new();
                muff.prepare(48_000.0, 4096);
                muff.set_parameter("sustain", sustain).unwrap();
                muff.set_parameter("tone", tone).unwrap();
                muff.set_parameter("volume", 1.0).unwrap();

                let mut buffer = full_scale_sine(4096, 110.0, 48_000.0);
                muff.process_block(&mut buffer);

                let peak = buffer.peak();
                assert!(peak <= 1.0, "sustain {sustain}, tone {tone}: peak {peak}");
                assert!(buffer.channel(1).iter().all(|s| s.is_finite()));
            }
        }
    }

    #[test]
    fn channels_keep_separate_state() {
        let mut muff = BigMuff::new();
        muff.prepare(44_100.0, 512);

        let mut stereo = full_scale_sine(512, 220.0, 44_100.0);
        stereo.channel_mut(1).fill(0.0);
        muff.process_block(&mut stereo);

        assert!(stereo.channel(1).iter().all(|&s| s == 0.0));
        assert!(stereo.channel(0).iter().any(|&s| s != 0.0));
    }
}
