pub mod chain;
pub mod factory;

pub use chain::{ChainState, EffectChain, EffectState};
pub use factory::EffectFactory;
