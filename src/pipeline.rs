// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Render and publish pipeline.
//!
//! A run walks every artifact group of a [`PublishConfig`] through the same
//! steps:
//!
//! 1. Read templates, and render them into artifacts.
//! 2. Fetch a fresh snapshot of the group's publication target.
//! 3. Plan the minimal set of remote writes.
//! 4. Publish non-empty plans, unless running dry.
//!
//! Steps 1 to 3 are strictly sequential per group, so the plan never rests on
//! a snapshot older than the run itself. Groups address independent targets,
//! so they are prepared concurrently, and published concurrently. The first
//! fatal failure aborts the run. Groups already published stay published.

use crate::{
    config::{ConfigError, GroupConfig, PublishConfig},
    path::{read_template, write_generated, SourceError},
    plan::{plan, PublishPlan},
    publish::{
        describe,
        retry::{Jitter, RandomJitter, Retrier, RetryPolicy, Sleep, TokioSleep},
        GistApi, GistMetadata, PublishError, RetryingPublisher,
    },
    render::{ArtifactGroup, RenderError, Renderer},
    status::RunStatus,
};

use futures::future::try_join_all;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Outcome of a single artifact group.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupReport {
    /// Name of artifact group.
    pub name: String,

    /// Publication target of artifact group.
    pub target: String,

    /// Files that needed a remote write.
    pub planned: Vec<String>,

    /// Fingerprints of every rendered artifact.
    pub fingerprints: BTreeMap<String, String>,

    /// Remote metadata, if the group was published.
    pub published: Option<GistMetadata>,
}

impl GroupReport {
    /// Raw access URLs of published files, in file name order.
    pub fn raw_urls(&self) -> Vec<(&str, &str)> {
        let Some(metadata) = &self.published else {
            return Vec::new();
        };

        self.planned
            .iter()
            .filter_map(|file| metadata.raw_url(file).map(|url| (file.as_str(), url)))
            .collect()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Final run status.
    pub status: RunStatus,

    /// Per group outcome, in configuration order.
    pub groups: Vec<GroupReport>,
}

/// Group that went through rendering and planning.
#[derive(Debug)]
struct Prepared<'a> {
    group: &'a GroupConfig,
    plan: PublishPlan,
    etag: Option<String>,
}

impl Prepared<'_> {
    fn report(&self, published: Option<GistMetadata>) -> GroupReport {
        GroupReport {
            name: self.group.name.clone(),
            target: self.group.target.clone(),
            planned: self.plan.files.keys().cloned().collect(),
            fingerprints: self.plan.fingerprints.clone(),
            published,
        }
    }
}

/// Render and publish pipeline.
#[derive(Debug)]
pub struct Pipeline<G, S = TokioSleep, J = RandomJitter> {
    config: PublishConfig,
    renderer: Renderer,
    publisher: RetryingPublisher<G, S, J>,
}

impl<G> Pipeline<G>
where
    G: GistApi,
{
    /// Construct new pipeline publishing through given API.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError::Config`] if configuration is invalid.
    /// - Return [`PipelineError::Render`] if variant rule is invalid.
    pub fn new(config: PublishConfig, api: G) -> Result<Self> {
        let policy = RetryPolicy::from(&config.retry);
        Self::with_retrier(config, api, Retrier::new(policy))
    }
}

impl<G, S, J> Pipeline<G, S, J>
where
    G: GistApi,
    S: Sleep,
    J: Jitter,
{
    /// Construct new pipeline with custom retrier.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError::Config`] if configuration is invalid.
    /// - Return [`PipelineError::Render`] if variant rule is invalid.
    pub fn with_retrier(config: PublishConfig, api: G, retrier: Retrier<S, J>) -> Result<Self> {
        config.validate()?;
        let table = config.subscriptions.iter().cloned().collect();
        let renderer = Renderer::new(table, &config.commit, &config.variant)?;

        Ok(Self {
            config,
            renderer,
            publisher: RetryingPublisher::with_retrier(api, retrier),
        })
    }

    /// Configuration driving this pipeline.
    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Render every artifact of a group from its templates.
    ///
    /// Missing optional templates are skipped along with their derived
    /// artifacts.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError::Config`] if a required template is missing.
    /// - Return [`PipelineError::Source`] if a template cannot be read.
    pub fn build_group(&self, group: &GroupConfig) -> Result<ArtifactGroup> {
        let mut artifacts = ArtifactGroup::new();
        for spec in &group.artifacts {
            let Some(template) = read_template(&spec.template)? else {
                if spec.required {
                    return Err(ConfigError::MissingTemplate {
                        path: spec.template.clone(),
                    }
                    .into());
                }
                info!(
                    "skip {:?} for group {}, template not found",
                    spec.file, group.name
                );
                continue;
            };

            artifacts.extend(self.renderer.render_artifacts(&template, spec));
        }

        Ok(artifacts)
    }

    /// Run pipeline across all artifact groups.
    ///
    /// # Errors
    ///
    /// - Return [`PipelineError`] on the first fatal failure of any group.
    #[instrument(skip(self), level = "debug")]
    pub async fn run(&self) -> Result<RunReport> {
        let prepared = try_join_all(self.config.groups.iter().map(|group| self.prepare(group))).await?;

        if self.config.dry_run {
            for group in &prepared {
                info!(
                    "dry run, would publish {:?} to {}",
                    group.plan.files.keys().collect::<Vec<_>>(),
                    group.group.name
                );
            }

            return Ok(RunReport {
                status: RunStatus::DryRun,
                groups: prepared.iter().map(|group| group.report(None)).collect(),
            });
        }

        if prepared.iter().all(|group| group.plan.is_empty()) {
            info!("all groups up to date, nothing to publish");
            return Ok(RunReport {
                status: RunStatus::NoChange,
                groups: prepared.iter().map(|group| group.report(None)).collect(),
            });
        }

        let published = try_join_all(prepared.iter().map(|group| self.publish(group))).await?;
        let groups = prepared
            .iter()
            .zip(published)
            .map(|(group, metadata)| group.report(metadata))
            .collect();

        Ok(RunReport {
            status: RunStatus::Ok,
            groups,
        })
    }

    async fn prepare<'a>(&self, group: &'a GroupConfig) -> Result<Prepared<'a>> {
        let artifacts = self.build_group(group)?;
        if let Some(output_dir) = &self.config.output_dir {
            for (file, content) in artifacts.iter() {
                let path = write_generated(output_dir, file, content)?;
                debug!("wrote local copy {:?}", path.display());
            }
        }

        if artifacts.is_empty() {
            warn!("group {} has no artifacts to publish", group.name);
            return Ok(Prepared {
                group,
                plan: PublishPlan::default(),
                etag: None,
            });
        }

        // INVARIANT: Snapshot is fetched right before diffing, never reused.
        let snapshot = self.publisher.fetch_snapshot(&group.target).await?;
        let plan = plan(&artifacts, &snapshot);
        for (file, hash) in &plan.fingerprints {
            let state = if plan.files.contains_key(file) { "changed" } else { "unchanged" };
            debug!("{}: {file} {hash} {state}", group.name);
        }
        info!(
            "group {}: {} of {} file(s) changed",
            group.name,
            plan.len(),
            artifacts.len()
        );

        Ok(Prepared {
            group,
            plan,
            etag: snapshot.etag,
        })
    }

    async fn publish(&self, prepared: &Prepared<'_>) -> Result<Option<GistMetadata>> {
        // INVARIANT: Publisher never sees an empty plan.
        if prepared.plan.is_empty() {
            return Ok(None);
        }

        let description = describe(self.renderer.token(), &prepared.plan);
        let if_match = prepared.etag.clone().filter(|_| self.config.conditional);
        let metadata = self
            .publisher
            .publish(&prepared.group.target, &prepared.plan, description, if_match)
            .await?;

        Ok(Some(metadata))
    }
}

/// Pipeline error types.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Renderer cannot be set up.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Template source cannot be read, or local copy cannot be written.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Remote delivery failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Friendly result alias :3
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
