// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Content diff planning.
//!
//! Compare locally rendered artifacts against the last observed state of a
//! publication target, and keep only the files that actually need a remote
//! write. An empty plan is a normal outcome that means the run has nothing to
//! publish for that target.

use crate::render::ArtifactGroup;

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Number of hex digits kept for a content fingerprint.
pub const FINGERPRINT_LEN: usize = 8;

/// Single file as last observed on a publication target.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File content, if the remote returned any.
    pub content: Option<String>,

    /// Remote only returned a partial view of the content.
    pub truncated: bool,
}

impl RemoteFile {
    /// Construct new fully observed remote file.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            truncated: false,
        }
    }

    /// Construct new remote file whose content cannot be trusted.
    pub fn truncated(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            truncated: true,
        }
    }

    /// Check if content is known to equal candidate byte for byte.
    fn matches(&self, candidate: &str) -> bool {
        !self.truncated && self.content.as_deref() == Some(candidate)
    }
}

/// Last observed state of a publication target.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    /// Files keyed by file name.
    pub files: BTreeMap<String, RemoteFile>,

    /// Freshness token obtained at fetch time, e.g., an ETag.
    pub etag: Option<String>,
}

impl RemoteSnapshot {
    /// Construct new empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add file to snapshot.
    pub fn with_file(mut self, name: impl Into<String>, file: RemoteFile) -> Self {
        self.files.insert(name.into(), file);
        self
    }
}

/// Files that need a remote write, plus fingerprints of every candidate.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    /// Changed files keyed by file name.
    pub files: BTreeMap<String, String>,

    /// Short content fingerprint of every candidate, changed or not.
    pub fingerprints: BTreeMap<String, String>,
}

impl PublishPlan {
    /// Check if plan has nothing to publish.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of files to publish.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Summarize fingerprints of planned files as `file:hash` pairs.
    pub fn fingerprint_summary(&self) -> String {
        self.files
            .keys()
            .filter_map(|file| {
                self.fingerprints
                    .get(file)
                    .map(|hash| format!("{file}:{hash}"))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Plan remote writes for artifact group against snapshot.
///
/// A candidate is planned when its file is absent from the snapshot, when the
/// snapshot entry is truncated, or when its content differs.
pub fn plan(candidates: &ArtifactGroup, snapshot: &RemoteSnapshot) -> PublishPlan {
    let mut plan = PublishPlan::default();
    for (file, content) in candidates.iter() {
        plan.fingerprints.insert(file.clone(), fingerprint(content));

        let unchanged = snapshot
            .files
            .get(file)
            .is_some_and(|remote| remote.matches(content));
        if !unchanged {
            plan.files.insert(file.clone(), content.clone());
        }
    }

    plan
}

/// Short SHA-256 fingerprint of content as lowercase hex.
pub fn fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(FINGERPRINT_LEN);
    hex
}
