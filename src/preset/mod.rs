use serde::{Deserialize, Serialize};

use crate::board::ChainState;

pub mod manager;

pub use manager::Manager;

/// A named, saved effect chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub chain: ChainState,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            name: "New Preset".to_string(),
            description: None,
            author: None,
            chain: ChainState::default(),
        }
    }
}

impl Preset {
    pub fn new(name: String, chain: ChainState) -> Self {
        Self {
            name,
            description: None,
            author: None,
            chain,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }
}
