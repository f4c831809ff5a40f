use crate::dsp::freeverb::{Freeverb, ReverbParameters};
use crate::dsp::AudioBuffer;
use crate::effects::{Effect, EffectType, ParameterSpec, find_spec};
use std::any::Any;

static PARAMS: [ParameterSpec; 4] = [
    ParameterSpec::new("roomSize", "Room Size", 0.0, 1.0, 0.01, 0.5, ""),
    ParameterSpec::new("damping", "Damping", 0.0, 1.0, 0.01, 0.5, ""),
    ParameterSpec::new("wetLevel", "Wet", 0.0, 1.0, 0.01, 0.33, ""),
    ParameterSpec::new("width", "Width", 0.0, 1.0, 0.01, 1.0, ""),
];

/// Room reverb. The dry level always tracks `1 - wet`.
pub struct Reverb {
    room_size: f32,
    damping: f32,
    wet_level: f32,
    width: f32,

    core: Freeverb,
    bypassed: bool,
}

impl Reverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            room_size: PARAMS[0].default,
            damping: PARAMS[1].default,
            wet_level: PARAMS[2].default,
            width: PARAMS[3].default,
            core: Freeverb::new(),
            bypassed: false,
        };
        reverb.update_core();
        reverb
    }

    fn update_core(&mut self) {
        self.core.set_parameters(ReverbParameters {
            room_size: self.room_size,
            damping: self.damping,
            wet_level: self.wet_level,
            dry_level: 1.0 - self.wet_level,
            width: self.width,
        });
    }

    pub const fn core_parameters(&self) -> &ReverbParameters {
        self.core.parameters()
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Reverb {
    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.core.set_sample_rate(sample_rate);
        self.update_core();
        self.reset();
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn process_block(&mut self, buffer: &mut AudioBuffer) {
        if self.bypassed {
            return;
        }

        if let Some((left, right)) = buffer.stereo_mut() {
            self.core.process_stereo(left, right);
        } else if buffer.num_channels() == 1 {
            self.core.process_mono(buffer.channel_mut(0));
        }
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Reverb
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
            "roomSize" => self.room_size = value,
            "damping" => self.damping = value,
            "wetLevel" => self.wet_level = value,
            "width" => self.width = value,
            _ => return Err("Unknown parameter"),
        }
        self.update_core();
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "roomSize" => Ok(self.room_size),
            "damping" => Ok(self.damping),
            "wetLevel" => Ok(self.wet_level),
            "width" => Ok(self.width),
            _ => Err("Unknown parameter"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
