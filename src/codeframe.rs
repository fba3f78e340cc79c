//! The codeframe: the fixed taxonomy of categories and codes that responses
//! are classified against.
//!
//! Loaded once at startup from a JSON document with a top-level `categories`
//! object mapping category name → (code → description). Immutable after load;
//! callers only ever see shared references.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading a codeframe. Fatal to startup; never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read codeframe: {0}")]
    Io(#[from] std::io::Error),

    #[error("codeframe is not well-formed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid codeframe: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CodeframeDoc {
    categories: BTreeMap<String, BTreeMap<String, String>>,
}

/// The loaded taxonomy: category name → (code → description).
///
/// `BTreeMap` keeps category iteration deterministic, which fixes the
/// resolution order of [`Codeframe::describe`] when a code appears in more
/// than one category.
#[derive(Debug, Clone)]
pub struct Codeframe {
    categories: BTreeMap<String, BTreeMap<String, String>>,
    // Flattened union of every code, computed once at load.
    valid_codes: BTreeSet<String>,
}

impl Codeframe {
    /// Load a codeframe from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse a codeframe from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let doc: CodeframeDoc = serde_json::from_str(raw)?;
        Self::from_categories(doc.categories)
    }

    /// Build a codeframe from an already-assembled category map.
    pub fn from_categories(
        categories: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut valid_codes = BTreeSet::new();
        for (category, codes) in &categories {
            for code in codes.keys() {
                if !valid_codes.insert(code.clone()) {
                    // Cross-category collisions are not reconciled here;
                    // describe() resolves to the first category in order.
                    warn!(code = %code, category = %category, "duplicate code across categories");
                }
            }
        }

        if valid_codes.is_empty() {
            return Err(ConfigError::Invalid("codeframe contains no codes".into()));
        }

        Ok(Self {
            categories,
            valid_codes,
        })
    }

    /// Every code across every category.
    pub fn all_valid_codes(&self) -> &BTreeSet<String> {
        &self.valid_codes
    }

    pub fn contains(&self, code: &str) -> bool {
        self.valid_codes.contains(code)
    }

    /// Description for a code, from the first category containing it.
    ///
    /// Linear scan over categories; codeframes are tens to low hundreds of
    /// entries, so this is fine.
    pub fn describe(&self, code: &str) -> Option<&str> {
        self.categories
            .values()
            .find_map(|codes| codes.get(code))
            .map(String::as_str)
    }

    pub fn categories(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.categories
    }

    /// Serialize the frame back to the on-disk document shape, for embedding
    /// in prompts.
    pub fn to_document_json(&self) -> String {
        let doc = CodeframeDoc {
            categories: self.categories.clone(),
        };
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{\"categories\":{}}".into())
    }
}
