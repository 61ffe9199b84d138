//! Programming language model

use serde::{Deserialize, Serialize};

use crate::constants::languages;

/// Languages a submission may be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
}

impl Language {
    /// Every supported language, in registry order
    pub const ALL: [Language; 2] = [Language::Python, Language::JavaScript];

    /// Get language as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => languages::PYTHON,
            Self::JavaScript => languages::JAVASCRIPT,
        }
    }

    /// Parse language from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            languages::PYTHON => Some(Self::Python),
            languages::JAVASCRIPT => Some(Self::JavaScript),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
