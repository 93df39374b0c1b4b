use serde::{Deserialize, Serialize};

use crate::view::node::{DEFAULT_LEAF_PLACEHOLDER, DEFAULT_SLUG_FILLER};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// An editing sequence: a regex matched against the text before the caret
/// after every observed content change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSpec {
    pub name: String,
    pub pattern: String,
    /// Text that replaces the matched span, if any
    #[serde(default)]
    pub replacement: Option<String>,
}

impl SequenceSpec {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            replacement: None,
        }
    }

    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = Some(replacement.into());
        self
    }
}

/// Engine-side settings for one editing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub poll_interval_ms: u64,
    pub slug_filler: char,
    pub leaf_placeholder: char,
    pub sequences: Vec<SequenceSpec>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            slug_filler: DEFAULT_SLUG_FILLER,
            leaf_placeholder: DEFAULT_LEAF_PLACEHOLDER,
            sequences: Vec::new(),
        }
    }
}
