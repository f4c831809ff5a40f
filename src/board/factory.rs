use crate::effects::big_muff::BigMuff;
use crate::effects::chorus::Chorus;
use crate::effects::compressor::Compressor;
use crate::effects::fuzz::Fuzz;
use crate::effects::orange::Orange;
use crate::effects::reverb::Reverb;
use crate::effects::tuner::Tuner;
use crate::effects::{Effect, EffectType};

pub const FALLBACK_CATEGORY: &str = "Other";

/// Builds effects from their string identifiers.
pub struct EffectFactory;

impl EffectFactory {
    /// A fresh, unprepared effect with default parameters, or `None` for an unknown id.
    pub fn create_effect(type_id: &str) -> Option<Box<dyn Effect>> {
        EffectType::from_id(type_id).map(Self::create)
    }

    pub fn create(effect_type: EffectType) -> Box<dyn Effect> {
        match effect_type {
            EffectType::Compressor => Box::new(Compressor::new()),
            EffectType::Fuzz => Box::new(Fuzz::new()),
            EffectType::BigMuff => Box::new(BigMuff::new()),
            EffectType::Orange => Box::new(Orange::new()),
            EffectType::Reverb => Box::new(Reverb::new()),
            EffectType::Chorus => Box::new(Chorus::new()),
            EffectType::Tuner => Box::new(Tuner::new()),
        }
    }

    pub fn available_effect_types() -> Vec<&'static str> {
        EffectType::ALL.iter().map(|t| t.as_str()).collect()
    }

    /// Display name, or the identifier itself when it is not recognised.
    pub fn effect_display_name(type_id: &str) -> &str {
        EffectType::from_id(type_id).map_or(type_id, |t| t.display_name())
    }

    pub fn effect_category(type_id: &str) -> &'static str {
        EffectType::from_id(type_id).map_or(FALLBACK_CATEGORY, EffectType::category)
    }
}
