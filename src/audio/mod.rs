pub mod engine;

pub use engine::{Engine, EngineHandle, EngineMessage, StreamFormat};
