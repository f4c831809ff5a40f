use crate::dsp::AudioBuffer;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::any::Any;

pub mod big_muff;
pub mod chorus;
pub mod compressor;
pub mod fuzz;
pub mod orange;
pub mod params;
pub mod reverb;
pub mod tuner;

pub use params::{BYPASSED_KEY, ParameterDescriptor, ParameterSnapshot, ParameterSpec};

/// Closed set of effect kinds the board knows how to build.
#[derive(ValueEnum, Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    Compressor,
    Fuzz,
    #[value(name = "bigmuff")]
    BigMuff,
    Orange,
    Reverb,
    Chorus,
    Tuner,
}

impl EffectType {
    pub const ALL: [Self; 7] = [
        Self::Compressor,
        Self::Fuzz,
        Self::BigMuff,
        Self::Orange,
        Self::Reverb,
        Self::Chorus,
        Self::Tuner,
    ];

    /// Stable lowercase identifier used by the factory and in saved state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compressor => "compressor",
            Self::Fuzz => "fuzz",
            Self::BigMuff => "bigmuff",
            Self::Orange => "orange",
            Self::Reverb => "reverb",
            Self::Chorus => "chorus",
            Self::Tuner => "tuner",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == id)
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Compressor => "Compressor",
            Self::Fuzz => "Fuzz",
            Self::BigMuff => "Big Muff",
            Self::Orange => "Orange",
            Self::Reverb => "Reverb",
            Self::Chorus => "Chorus",
            Self::Tuner => "Tuner",
        }
    }

    pub const fn category(self) -> &'static str {
        match self {
            Self::Compressor => "Dynamics",
            Self::Fuzz | Self::BigMuff | Self::Orange => "Distortion",
            Self::Reverb => "Time-based",
            Self::Chorus => "Modulation",
            Self::Tuner => "Utility",
        }
    }
}

impl std::fmt::Display for EffectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// The contract every pedal on the board implements.
///
/// Lifecycle: constructed unprepared, `prepare` before any processing, then repeated
/// `process_block` calls. `reset` clears signal state but keeps parameter values.
/// `process_block` must not allocate, block or fail.
pub trait Effect: Send + 'static {
    /// Size internal buffers and derive coefficients for the stream format.
    fn prepare(&mut self, sample_rate: f32, max_block_size: usize);

    /// Clear filter, envelope and delay state.
    fn reset(&mut self);

    /// Process every sample of the buffer in place. No-op while bypassed.
    fn process_block(&mut self, buffer: &mut AudioBuffer);

    fn effect_type(&self) -> EffectType;

    fn name(&self) -> &'static str {
        self.effect_type().display_name()
    }

    fn is_bypassed(&self) -> bool;

    fn set_bypassed(&mut self, bypassed: bool);

    /// Parameters this effect exposes, with ranges and defaults.
    fn parameter_specs(&self) -> &'static [ParameterSpec];

    /// Set a parameter by name. Out-of-range values are clamped; only unknown names fail.
    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str>;

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str>;

    fn as_any(&self) -> &dyn Any;

    /// Snapshot of every parameter plus the bypass flag.
    fn get_state(&self) -> ParameterSnapshot {
        let mut snapshot = ParameterSnapshot::new();
        for spec in self.parameter_specs() {
            let value = self.get_parameter(spec.id).unwrap_or(spec.default);
            snapshot.set_float(spec.id, value);
        }
        snapshot.set_bool(BYPASSED_KEY, self.is_bypassed());
        snapshot
    }

    /// Restore from a snapshot. Missing or malformed entries fall back to defaults.
    fn set_state(&mut self, snapshot: &ParameterSnapshot) {
        for spec in self.parameter_specs() {
            let value = snapshot.get_float(spec.id).unwrap_or(spec.default);
            // Every id comes from our own spec table, so this cannot be unknown.
            let _ = self.set_parameter(spec.id, value);
        }
        self.set_bypassed(snapshot.get_bool(BYPASSED_KEY).unwrap_or(false));
    }

    /// Pull live host values. Only well-formed entries present in the snapshot are applied.
    fn apply_parameters(&mut self, snapshot: &ParameterSnapshot) {
        for spec in self.parameter_specs() {
            if let Some(value) = snapshot.get_float(spec.id) {
                let _ = self.set_parameter(spec.id, value);
            }
        }
        if let Some(bypassed) = snapshot.get_bool(BYPASSED_KEY) {
            self.set_bypassed(bypassed);
        }
    }
}

/// Finds the spec for `name` in a spec table.
pub(crate) fn find_spec(
    specs: &'static [ParameterSpec],
    name: &str,
) -> Result<&'static ParameterSpec, &'static str> {
    specs
        .iter()
        .find(|s| s.id == name)
        .ok_or("Unknown parameter")
}
