use crate::dsp::common::{SILENCE_DB, calculate_coefficient, db_to_lin, lin_to_db};
use crate::dsp::{AudioBuffer, MAX_CHANNELS};
use crate::effects::{Effect, EffectType, ParameterSpec, find_spec};
use std::any::Any;

static PARAMS: [ParameterSpec; 5] = [
    ParameterSpec::new("threshold", "Threshold", -60.0, 0.0, 0.1, -20.0, "dB"),
    ParameterSpec::new("ratio", "Ratio", 1.0, 20.0, 0.1, 4.0, ":1"),
    ParameterSpec::new("attack", "Attack", 0.1, 100.0, 0.1, 10.0, "ms"),
    ParameterSpec::new("release", "Release", 10.0, 1000.0, 1.0, 100.0, "ms"),
    ParameterSpec::new("makeupGain", "Makeup", 0.0, 24.0, 0.1, 0.0, "dB"),
];

/// Static gain computer: reduction in dB for an envelope level, zero at or below threshold.
#[inline]
pub fn gain_reduction_db(envelope_db: f32, threshold_db: f32, ratio: f32) -> f32 {
    if envelope_db > threshold_db {
        (envelope_db - threshold_db) * (1.0 - 1.0 / ratio)
    } else {
        0.0
    }
}

/// Feed-forward compressor with a dB-domain envelope follower per channel.
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    makeup_db: f32,

    attack_coeff: f32,
    release_coeff: f32,
    envelope_db: [f32; MAX_CHANNELS],
    gain_reduction_db: f32,

    sample_rate: f32,
    bypassed: bool,
}

impl Compressor {
    pub fn new() -> Self {
        let mut compressor = Self {
            threshold_db: PARAMS[0].default,
            ratio: PARAMS[1].default,
            attack_ms: PARAMS[2].default,
            release_ms: PARAMS[3].default,
            makeup_db: PARAMS[4].default,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope_db: [SILENCE_DB; MAX_CHANNELS],
            gain_reduction_db: 0.0,
            sample_rate: 44_100.0,
            bypassed: false,
        };
        compressor.update_coefficients();
        compressor
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = calculate_coefficient(self.attack_ms, self.sample_rate);
        self.release_coeff = calculate_coefficient(self.release_ms, self.sample_rate);
    }

    /// Most recent gain reduction in dB, for metering.
    pub const fn gain_reduction(&self) -> f32 {
        self.gain_reduction_db
    }

    #[inline]
    fn process_sample(&mut self, input: f32, channel: usize, makeup: f32) -> f32 {
        let input_db = lin_to_db(input.abs());
        let envelope = self.envelope_db[channel];

        let coeff = if input_db > envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        let envelope = coeff.mul_add(envelope - input_db, input_db);
        self.envelope_db[channel] = envelope;

        let reduction = gain_reduction_db(envelope, self.threshold_db, self.ratio);
        self.gain_reduction_db = reduction;

        input * db_to_lin(-reduction) * makeup
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Compressor {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
        self.reset();
    }

    fn reset(&mut self) {
        self.envelope_db = [SILENCE_DB; MAX_CHANNELS];
        self.gain_reduction_db = 0.0;
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer) {
        if self.bypassed {
            return;
        }

        let makeup = db_to_lin(self.makeup_db);
        for (ch, samples) in buffer.channels_mut().take(MAX_CHANNELS).enumerate() {
            for sample in samples {
                *sample = self.process_sample(*sample, ch, makeup);
            }
        }
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Compressor
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
            "threshold" => self.threshold_db = value,
            "ratio" => self.ratio = value,
            "attack" => {
                self.attack_ms = value;
                self.update_coefficients();
            }
            "release" => {
                self.release_ms = value;
                self.update_coefficients();
            }
            "makeupGain" => self.makeup_db = value,
            _ => return Err("Unknown parameter"),
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "threshold" => Ok(self.threshold_db),
            "ratio" => Ok(self.ratio),
            "attack" => Ok(self.attack_ms),
            "release" => Ok(self.release_ms),
            "makeupGain" => Ok(self.makeup_db),
            _ => Err("Unknown parameter"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
