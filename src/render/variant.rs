// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Derived artifact variants.
//!
//! A __variant__ is a secondary artifact made from a fully rendered primary
//! artifact by rewriting one configuration key's value. The rewrite is purely
//! syntactic: it pattern matches the `key: value` pair without parsing the
//! surrounding YAML.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Key/value rewrite rule for deriving a variant.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VariantRule {
    /// Configuration key to target, matched case-insensitively.
    pub key: String,

    /// Literal value to replace.
    pub from: String,

    /// Replacement value.
    pub to: String,
}

impl Default for VariantRule {
    /// Memory-conservative "mini" variant.
    fn default() -> Self {
        Self {
            key: "geodata-loader".into(),
            from: "standard".into(),
            to: "memconservative".into(),
        }
    }
}

impl VariantRule {
    /// Compile rule into a [`VariantDeriver`].
    ///
    /// # Errors
    ///
    /// - Return [`regex::Error`] if the compiled pattern exceeds regex limits.
    pub fn compile(&self) -> Result<VariantDeriver, regex::Error> {
        // INVARIANT: Key and value are literals, never patterns.
        let pattern = format!(
            r"(?i)(^|[^\w-])({key})[ \t]*:[ \t]*{from}\b",
            key = regex::escape(&self.key),
            from = regex::escape(&self.from),
        );

        Ok(VariantDeriver {
            pattern: Regex::new(&pattern)?,
            to: self.to.clone(),
        })
    }
}

/// Compiled variant rewrite.
#[derive(Debug, Clone)]
pub struct VariantDeriver {
    pattern: Regex,
    to: String,
}

impl VariantDeriver {
    /// Derive variant text from primary artifact text.
    ///
    /// Only values bound to the target key change. The key keeps its original
    /// spelling, and spacing around the colon is normalized to `key: value`.
    pub fn derive(&self, primary: &str) -> String {
        let replacement = format!("${{1}}${{2}}: {}", self.to.replace('$', "$$"));
        self.pattern
            .replace_all(primary, replacement.as_str())
            .into_owned()
    }
}
