use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::factory::EffectFactory;
use crate::dsp::AudioBuffer;
use crate::effects::tuner::{Tuner, TunerHandle};
use crate::effects::{Effect, EffectType, ParameterDescriptor, ParameterSnapshot};

pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;

/// One saved effect: its type id and parameter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectState {
    #[serde(rename = "type")]
    pub effect_type: String,
    #[serde(default)]
    pub parameters: ParameterSnapshot,
}

impl EffectState {
    /// Lenient read of one entry: a missing or malformed parameter map becomes empty,
    /// a missing type id yields `None`.
    fn from_value(value: &Value) -> Option<Self> {
        let effect_type = value.get("type")?.as_str()?.to_owned();
        let parameters = value
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .map(ParameterSnapshot::from)
            .unwrap_or_default();
        Some(Self {
            effect_type,
            parameters,
        })
    }
}

/// Ordered list of effect states, first entry processed first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub effects: Vec<EffectState>,
}

impl ChainState {
    pub fn from_json(json: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(json).context("Failed to parse chain state")?;
        let entries = document
            .get("effects")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Chain state has no effects list"))?;

        let effects = entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let state = EffectState::from_value(entry);
                if state.is_none() {
                    warn!("Skipping chain entry {i}: missing effect type");
                }
                state
            })
            .collect();

        Ok(Self { effects })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize chain state")
    }
}

/// Ordered, owned sequence of effects sharing one buffer.
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
    sample_rate: f32,
    max_block_size: usize,
}

impl EffectChain {
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }

    /// Build a prepared chain from saved state.
    pub fn from_state(state: &ChainState, sample_rate: f32, max_block_size: usize) -> Self {
        let mut chain = Self::new();
        chain.prepare(sample_rate, max_block_size);
        chain.set_state(state);
        chain
    }

    pub const fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub const fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Store the stream format and prepare every effect with it.
    pub fn prepare(&mut self, sample_rate: f32, max_block_size: usize) {
        debug!("Preparing chain: {sample_rate} Hz, {max_block_size} frames");
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        for effect in &mut self.effects {
            effect.prepare(sample_rate, max_block_size);
        }
    }

    pub fn reset(&mut self) {
        for effect in &mut self.effects {
            effect.reset();
        }
    }

    pub fn process_block(&mut self, buffer: &mut AudioBuffer) {
        for effect in &mut self.effects {
            if !effect.is_bypassed() {
                effect.process_block(buffer);
            }
        }
    }

    /// Append an effect, preparing it for the chain's current format first.
    pub fn add_effect(&mut self, mut effect: Box<dyn Effect>) {
        effect.prepare(self.sample_rate, self.max_block_size);
        debug!("Adding {} at position {}", effect.name(), self.effects.len());
        self.effects.push(effect);
    }

    /// Build an effect by type id and append it. Returns false for an unknown id.
    pub fn add_effect_by_type(&mut self, type_id: &str) -> bool {
        match EffectFactory::create_effect(type_id) {
            Some(effect) => {
                self.add_effect(effect);
                true
            }
            None => {
                warn!("Unknown effect type: {type_id}");
                false
            }
        }
    }

    pub fn remove_effect(&mut self, index: usize) -> bool {
        if index >= self.effects.len() {
            return false;
        }
        let effect = self.effects.remove(index);
        debug!("Removed {} from position {index}", effect.name());
        true
    }

    /// Move the effect at `from` so it ends up at `to`.
    pub fn move_effect(&mut self, from: usize, to: usize) -> bool {
        let len = self.effects.len();
        if from >= len || to >= len {
            return false;
        }
        if from != to {
            let effect = self.effects.remove(from);
            self.effects.insert(to, effect);
        }
        true
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effect(&self, index: usize) -> Option<&dyn Effect> {
        self.effects.get(index).map(|effect| &**effect)
    }

    pub fn effect_mut(&mut self, index: usize) -> Option<&mut (dyn Effect + 'static)> {
        self.effects.get_mut(index).map(|effect| &mut **effect)
    }

    pub fn effect_types(&self) -> Vec<EffectType> {
        self.effects.iter().map(|e| e.effect_type()).collect()
    }

    pub fn get_state(&self) -> ChainState {
        ChainState {
            effects: self
                .effects
                .iter()
                .map(|effect| EffectState {
                    effect_type: effect.effect_type().as_str().to_owned(),
                    parameters: effect.get_state(),
                })
                .collect(),
        }
    }

    /// Replace the chain with the saved effects. Unknown types are skipped.
    pub fn set_state(&mut self, state: &ChainState) {
        self.clear();
        for entry in &state.effects {
            let Some(mut effect) = EffectFactory::create_effect(&entry.effect_type) else {
                warn!("Skipping unknown effect type: {}", entry.effect_type);
                continue;
            };
            effect.set_state(&entry.parameters);
            self.add_effect(effect);
        }
    }

    pub fn to_json(&self) -> Result<String> {
        self.get_state().to_json()
    }

    /// Restore from JSON. A structurally invalid document leaves the chain untouched.
    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let state = ChainState::from_json(json)?;
        self.set_state(&state);
        Ok(())
    }

    /// Pull live host values into the effects, one snapshot per position.
    pub fn apply_parameters(&mut self, snapshots: &[ParameterSnapshot]) {
        for (effect, snapshot) in self.effects.iter_mut().zip(snapshots) {
            effect.apply_parameters(snapshot);
        }
    }

    /// Every parameter in the chain under a position-prefixed id, e.g. `effect0_gain`.
    pub fn parameter_layout(&self) -> Vec<ParameterDescriptor> {
        self.effects
            .iter()
            .enumerate()
            .flat_map(|(index, effect)| {
                effect
                    .parameter_specs()
                    .iter()
                    .map(move |spec| ParameterDescriptor {
                        id: format!("effect{index}_{}", spec.id),
                        effect_index: index,
                        spec: *spec,
                    })
            })
            .collect()
    }

    /// Readout handle of the first tuner in the chain.
    pub fn tuner_handle(&self) -> Option<TunerHandle> {
        self.effects
            .iter()
            .find_map(|effect| effect.as_any().downcast_ref::<Tuner>())
            .map(Tuner::handle)
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(types: &[&str]) -> EffectChain {
        let mut chain = EffectChain::new();
        chain.prepare(48_000.0, 256);
        for t in types {
            assert!(chain.add_effect_by_type(t));
        }
        chain
    }

    fn ids(chain: &EffectChain) -> Vec<&'static str> {
        chain.effect_types().into_iter().map(EffectType::as_str).collect()
    }

    #[test]
    fn move_places_effect_at_target() {
        let mut chain = chain_of(&["fuzz", "chorus", "reverb", "tuner"]);

        assert!(chain.move_effect(0, 2));
        assert_eq!(ids(&chain), ["chorus", "reverb", "fuzz", "tuner"]);

        assert!(chain.move_effect(3, 0));
        assert_eq!(ids(&chain), ["tuner", "chorus", "reverb", "fuzz"]);

        assert!(chain.move_effect(1, 1));
        assert_eq!(ids(&chain), ["tuner", "chorus", "reverb", "fuzz"]);

        assert!(!chain.move_effect(0, 4));
        assert!(!chain.move_effect(4, 0));
        assert_eq!(ids(&chain), ["tuner", "chorus", "reverb", "fuzz"]);
    }

    #[test]
    fn remove_rejects_out_of_range() {
        let mut chain = chain_of(&["compressor", "orange"]);
        assert!(!chain.remove_effect(2));
        assert!(!chain.remove_effect(usize::MAX));
        assert_eq!(chain.len(), 2);

        assert!(chain.remove_effect(0));
        assert_eq!(ids(&chain), ["orange"]);
    }

    #[test]
    fn unknown_type_is_not_added() {
        let mut chain = EffectChain::new();
        assert!(!chain.add_effect_by_type("wah"));
        assert!(chain.is_empty());
    }

    #[test]
    fn layout_prefixes_ids_by_position() {
        let chain = chain_of(&["fuzz", "tuner", "chorus"]);
        let layout = chain.parameter_layout();
        let ids: Vec<&str> = layout.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "effect0_gain",
                "effect0_tone",
                "effect0_level",
                "effect2_rate",
                "effect2_depth",
                "effect2_mix"
            ]
        );
        assert_eq!(layout[3].effect_index, 2);
    }

    #[test]
    fn apply_parameters_only_touches_present_keys() {
        let mut chain = chain_of(&["fuzz", "chorus"]);
        chain.apply_parameters(&[
            ParameterSnapshot::new().with_float("gain", 8.0),
            ParameterSnapshot::new().with_bool("bypassed", true),
        ]);

        let fuzz = chain.effect(0).unwrap();
        assert_eq!(fuzz.get_parameter("gain"), Ok(8.0));
        assert_eq!(fuzz.get_parameter("tone"), Ok(0.5));
        assert!(chain.effect(1).unwrap().is_bypassed());
    }

    #[test]
    fn tuner_handle_found_anywhere_in_chain() {
        assert!(chain_of(&["fuzz"]).tuner_handle().is_none());
        assert!(chain_of(&["fuzz", "tuner"]).tuner_handle().is_some());
    }

    #[test]
    fn malformed_documents_leave_chain_untouched() {
        let mut chain = chain_of(&["fuzz", "reverb"]);
        assert!(chain.load_json("not json").is_err());
        assert!(chain.load_json(r#"{"pedals": []}"#).is_err());
        assert!(chain.load_json(r#"{"effects": 3}"#).is_err());
        assert_eq!(ids(&chain), ["fuzz", "reverb"]);
    }

    #[test]
    fn per_entry_recovery() {
        let mut chain = EffectChain::new();
        chain
            .load_json(
                r#"{"effects": [
                    {"type": "fuzz", "parameters": {"gain": "loud", "tone": 0.9}},
                    {"type": "flanger", "parameters": {}},
                    {"parameters": {"gain": 1.0}},
                    {"type": "chorus", "parameters": 12},
                    {"type": "orange"}
                ]}"#,
            )
            .unwrap();

        assert_eq!(ids(&chain), ["fuzz", "chorus", "orange"]);
        let fuzz = chain.effect(0).unwrap();
        assert_eq!(fuzz.get_parameter("gain"), Ok(5.0));
        assert_eq!(fuzz.get_parameter("tone"), Ok(0.9));
        assert_eq!(chain.effect(1).unwrap().get_parameter("rate"), Ok(1.5));
    }
}
