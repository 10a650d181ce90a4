// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote publication.
//!
//! The publisher is the only component that talks to the outside world. It
//! fetches the current state of a publication target, and sends a batched
//! update for the files of a [`PublishPlan`]. Every remote call runs through
//! the retry state machine in [`retry`].
//!
//! # Publication Targets
//!
//! A __publication target__ is a Gist identified by an opaque ID. Access goes
//! through the [`GistApi`] trait, so the publisher itself never knows whether
//! it talks to the real REST API or to an in-memory fake.

pub mod gist;
pub mod retry;

use crate::{
    plan::{PublishPlan, RemoteSnapshot},
    publish::retry::{Jitter, RandomJitter, Retrier, RetryError, RetryPolicy, Sleep, TokioSleep},
};

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Batched update for one publication target.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GistUpdate {
    /// Free text description of the update.
    pub description: String,

    /// New file contents keyed by file name.
    pub files: BTreeMap<String, String>,

    /// Freshness token the target must still match.
    pub if_match: Option<String>,
}

/// Remote metadata returned after a successful update.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct GistMetadata {
    /// Identifier of the publication target.
    #[serde(default)]
    pub id: Option<String>,

    /// Human facing page of the publication target.
    #[serde(default)]
    pub html_url: Option<String>,

    /// Per file metadata keyed by file name.
    #[serde(default)]
    pub files: BTreeMap<String, PublishedFile>,
}

impl GistMetadata {
    /// Raw access URL of published file.
    pub fn raw_url(&self, file: &str) -> Option<&str> {
        self.files.get(file).and_then(|file| file.raw_url.as_deref())
    }
}

/// Per file remote metadata.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishedFile {
    /// URL serving the raw file content.
    #[serde(default)]
    pub raw_url: Option<String>,
}

/// Access to publication targets.
#[async_trait]
pub trait GistApi: Send + Sync {
    /// Retrieve current state of publication target.
    async fn fetch(&self, target: &str) -> Result<RemoteSnapshot, ApiError>;

    /// Send batched update to publication target.
    async fn update(&self, target: &str, update: &GistUpdate) -> Result<GistMetadata, ApiError>;
}

#[async_trait]
impl<G> GistApi for &G
where
    G: GistApi + ?Sized,
{
    async fn fetch(&self, target: &str) -> Result<RemoteSnapshot, ApiError> {
        (**self).fetch(target).await
    }

    async fn update(&self, target: &str, update: &GistUpdate) -> Result<GistMetadata, ApiError> {
        (**self).update(target, update).await
    }
}

/// Build update description from commit identity and plan.
///
/// Looks like `update via CI | abc1234 | a.yaml:1f2e3d4c, b.yaml:...`. The
/// fingerprint part is left out when the plan carries no fingerprints.
pub fn describe(commit: &str, plan: &PublishPlan) -> String {
    let mut description = format!("update via CI | {commit}");
    let summary = plan.fingerprint_summary();
    if !summary.is_empty() {
        description.push_str(" | ");
        description.push_str(&summary);
    }

    description
}

/// Publisher with retrying delivery.
#[derive(Debug)]
pub struct RetryingPublisher<G, S = TokioSleep, J = RandomJitter> {
    api: G,
    retrier: Retrier<S, J>,
}

impl<G> RetryingPublisher<G>
where
    G: GistApi,
{
    /// Construct new publisher sleeping on tokio with random jitter.
    pub fn new(api: G, policy: RetryPolicy) -> Self {
        Self {
            api,
            retrier: Retrier::new(policy),
        }
    }
}

impl<G, S, J> RetryingPublisher<G, S, J>
where
    G: GistApi,
    S: Sleep,
    J: Jitter,
{
    /// Construct new publisher with custom retrier.
    pub fn with_retrier(api: G, retrier: Retrier<S, J>) -> Self {
        Self { api, retrier }
    }

    /// Fetch current snapshot of publication target.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::Fetch`] if snapshot cannot be fetched.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_snapshot(&self, target: &str) -> Result<RemoteSnapshot> {
        let label = format!("fetch {target}");
        self.retrier
            .run(&label, || self.api.fetch(target))
            .await
            .map_err(|source| PublishError::Fetch {
                target: target.to_string(),
                source,
            })
    }

    /// Publish plan to publication target as one batched update.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::EmptyPlan`] if plan has nothing to publish.
    /// - Return [`PublishError::Update`] if update fails fatally or runs out
    ///   of retries.
    #[instrument(skip(self, plan, description, if_match), level = "debug")]
    pub async fn publish(
        &self,
        target: &str,
        plan: &PublishPlan,
        description: impl Into<String>,
        if_match: Option<String>,
    ) -> Result<GistMetadata> {
        if plan.is_empty() {
            return Err(PublishError::EmptyPlan {
                target: target.to_string(),
            });
        }

        let update = GistUpdate {
            description: description.into(),
            files: plan.files.clone(),
            if_match,
        };
        let label = format!("update {target}");
        let metadata = self
            .retrier
            .run(&label, || self.api.update(target, &update))
            .await
            .map_err(|source| PublishError::Update {
                target: target.to_string(),
                source,
            })?;
        info!("published {} file(s) to {target}", plan.len());

        Ok(metadata)
    }
}

/// Remote API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Remote responded with a non-success status.
    #[error("remote responded with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Request could not be carried out.
    #[error(transparent)]
    Transport(reqwest::Error),

    /// Response body could not be decoded.
    #[error("failed to decode response")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status of failure, if the remote responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

/// Publication error types.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Snapshot of publication target cannot be fetched.
    #[error("failed to fetch snapshot of {target}")]
    Fetch {
        target: String,
        #[source]
        source: RetryError,
    },

    /// Update of publication target failed.
    #[error("failed to update {target}")]
    Update {
        target: String,
        #[source]
        source: RetryError,
    },

    /// Publisher was handed a plan without files.
    #[error("refusing to publish empty plan to {target}")]
    EmptyPlan { target: String },
}

/// Friendly result alias :3
pub type Result<T, E = PublishError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        plan::{plan, RemoteFile},
        render::{Artifact, ArtifactGroup},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedApi {
        fetches: Mutex<Vec<Result<RemoteSnapshot, ApiError>>>,
        updates: Mutex<Vec<GistUpdate>>,
    }

    #[async_trait]
    impl GistApi for ScriptedApi {
        async fn fetch(&self, _target: &str) -> Result<RemoteSnapshot, ApiError> {
            self.fetches.lock().unwrap().remove(0)
        }

        async fn update(&self, _target: &str, update: &GistUpdate) -> Result<GistMetadata, ApiError> {
            self.updates.lock().unwrap().push(update.clone());
            Ok(GistMetadata::default())
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleep for NoSleep {
        async fn sleep(&self, _delay: std::time::Duration) {}
    }

    struct NoJitter;

    impl Jitter for NoJitter {
        fn factor(&self, _spread: f64) -> f64 {
            1.0
        }
    }

    fn publisher(api: &ScriptedApi) -> RetryingPublisher<&ScriptedApi, NoSleep, NoJitter> {
        let retrier = Retrier::with_backoff(RetryPolicy::default(), NoSleep, NoJitter);
        RetryingPublisher::with_retrier(api, retrier)
    }

    fn sample_plan() -> PublishPlan {
        let group: ArtifactGroup = [Artifact::new("a.yaml", "a: 1\n")].into_iter().collect();
        plan(&group, &RemoteSnapshot::new())
    }

    #[test]
    fn describe_embeds_commit_and_fingerprints() {
        let plan = sample_plan();
        let result = describe("abc1234", &plan);
        let expect = format!("update via CI | abc1234 | a.yaml:{}", plan.fingerprints["a.yaml"]);
        assert_eq!(result, expect);

        assert_eq!(describe("dev", &PublishPlan::default()), "update via CI | dev");
    }

    #[tokio::test]
    async fn fetch_snapshot_retries_transient_failure() {
        let snapshot = RemoteSnapshot::new().with_file("a.yaml", RemoteFile::new("a: 1\n"));
        let api = ScriptedApi {
            fetches: Mutex::new(vec![Err(ApiError::Timeout), Ok(snapshot.clone())]),
            ..ScriptedApi::default()
        };

        let result = publisher(&api).fetch_snapshot("gist").await.unwrap();
        assert_eq!(result, snapshot);
    }

    #[tokio::test]
    async fn fetch_snapshot_failure_is_fatal() {
        let api = ScriptedApi {
            fetches: Mutex::new(vec![Err(ApiError::Status {
                status: 404,
                body: "Not Found".into(),
            })]),
            ..ScriptedApi::default()
        };

        let result = publisher(&api).fetch_snapshot("gist").await;
        assert!(matches!(result, Err(PublishError::Fetch { source, .. }) if source.attempts() == 1));
    }

    #[tokio::test]
    async fn publish_sends_plan_files_with_description() {
        let api = ScriptedApi::default();
        let plan = sample_plan();

        publisher(&api)
            .publish("gist", &plan, "update via CI | abc1234", Some("\"etag\"".into()))
            .await
            .unwrap();

        let updates = api.updates.lock().unwrap();
        assert_eq!(
            *updates,
            vec![GistUpdate {
                description: "update via CI | abc1234".into(),
                files: plan.files.clone(),
                if_match: Some("\"etag\"".into()),
            }]
        );
    }

    #[tokio::test]
    async fn publish_refuses_empty_plan() {
        let api = ScriptedApi::default();
        let result = publisher(&api)
            .publish("gist", &PublishPlan::default(), "noop", None)
            .await;

        assert!(matches!(result, Err(PublishError::EmptyPlan { .. })));
        assert!(api.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn gist_metadata_raw_url() -> anyhow::Result<()> {
        let metadata: GistMetadata = serde_json::from_str(
            r#"{
                "id": "abc",
                "html_url": "https://gist.github.com/abc",
                "files": {
                    "a.yaml": { "filename": "a.yaml", "raw_url": "https://gist.githubusercontent.com/raw/a.yaml" }
                },
                "owner": { "login": "someone" }
            }"#,
        )?;

        assert_eq!(
            metadata.raw_url("a.yaml"),
            Some("https://gist.githubusercontent.com/raw/a.yaml")
        );
        assert_eq!(metadata.raw_url("b.yaml"), None);

        Ok(())
    }
}
