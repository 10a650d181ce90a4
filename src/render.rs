// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Artifact rendering.
//!
//! Turn raw templates into __artifacts__, i.e., named and fully substituted
//! text blobs ready for publication. Rendering is pure. Reading templates off
//! disk is left to the caller.
//!
//! # Rendering Order
//!
//! 1. Icon URLs in the raw template get their `v` token, see [`icons`].
//! 2. Subscription placeholders are resolved, see [`substitute`].
//! 3. Derived artifacts are made from the result of step 2, see [`variant`].
//!
//! Icons are busted before substitution so subscription URLs spliced into the
//! template are never rewritten.

pub mod icons;
pub mod substitute;
pub mod variant;

use crate::{
    config::ArtifactSpec,
    render::{
        icons::{bust_icons, version_token},
        substitute::{substitute, SubstitutionTable},
        variant::{VariantDeriver, VariantRule},
    },
};

use std::collections::{btree_map, BTreeMap};

/// Named text blob ready for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Logical file name on the publication target.
    pub file: String,

    /// Fully rendered content.
    pub content: String,
}

impl Artifact {
    /// Construct new artifact.
    pub fn new(file: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            content: content.into(),
        }
    }
}

/// Artifacts destined for one publication target, keyed by file name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArtifactGroup {
    artifacts: BTreeMap<String, String>,
}

impl ArtifactGroup {
    /// Construct new empty artifact group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert artifact, replacing any artifact with the same file name.
    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.file, artifact.content);
    }

    /// Get content of artifact by file name.
    pub fn get(&self, file: &str) -> Option<&str> {
        self.artifacts.get(file).map(String::as_str)
    }

    /// Iterate over file name and content pairs in file name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.artifacts.iter()
    }

    /// Number of artifacts in group.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Check if group holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl Extend<Artifact> for ArtifactGroup {
    fn extend<T: IntoIterator<Item = Artifact>>(&mut self, iter: T) {
        for artifact in iter {
            self.insert(artifact);
        }
    }
}

impl FromIterator<Artifact> for ArtifactGroup {
    fn from_iter<T: IntoIterator<Item = Artifact>>(iter: T) -> Self {
        let mut group = Self::new();
        group.extend(iter);
        group
    }
}

/// Template renderer.
///
/// Holds everything that stays fixed across templates within one run.
#[derive(Debug, Clone)]
pub struct Renderer {
    table: SubstitutionTable,
    token: String,
    deriver: VariantDeriver,
}

impl Renderer {
    /// Construct new renderer.
    ///
    /// The commit identity is shortened into the icon version token.
    ///
    /// # Errors
    ///
    /// - Return [`RenderError::Variant`] if variant rule cannot be compiled.
    pub fn new(table: SubstitutionTable, commit: &str, rule: &VariantRule) -> Result<Self> {
        Ok(Self {
            table,
            token: version_token(commit),
            deriver: rule.compile()?,
        })
    }

    /// Icon version token used by this renderer.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Render raw template into primary artifact content.
    pub fn render(&self, template: &str) -> String {
        substitute(&bust_icons(template, &self.token), &self.table)
    }

    /// Derive variant content from primary artifact content.
    pub fn derive(&self, primary: &str) -> String {
        self.deriver.derive(primary)
    }

    /// Render all artifacts that one template produces.
    ///
    /// Always yields the primary artifact, followed by the derived variant
    /// when `spec` names one.
    pub fn render_artifacts(&self, template: &str, spec: &ArtifactSpec) -> Vec<Artifact> {
        let primary = self.render(template);
        let derived = spec
            .mini
            .as_ref()
            .map(|mini| Artifact::new(mini, self.derive(&primary)));

        std::iter::once(Artifact::new(&spec.file, primary))
            .chain(derived)
            .collect()
    }
}

/// Rendering error types.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Variant rule does not compile into a valid pattern.
    #[error("failed to compile variant rule")]
    Variant(#[from] regex::Error),
}

/// Friendly result alias :3
type Result<T, E = RenderError> = std::result::Result<T, E>;
