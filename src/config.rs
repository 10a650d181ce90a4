// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the publish configuration that drives a run. The
//! configuration is resolved once, either from a TOML file or from the CI
//! environment layout, and then handed to the pipeline as a plain value.
//! Nothing inside the core reads the environment on its own. File I/O is left
//! to the caller to figure out.

use crate::render::{substitute::Subscription, variant::VariantRule};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Commit identity used when none is supplied.
pub const DEFAULT_COMMIT: &str = "dev";

/// Publish configuration layout.
///
/// # General Layout
///
/// A publish configuration is composed of run settings, a listing of
/// subscriptions, and a listing of artifact groups. Each artifact group names
/// one publication target, i.e., a Gist, and the templates whose rendered
/// artifacts land on that target.
///
/// The access token is deliberately absent. Credentials never live in the
/// configuration file.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    /// Build or commit identity, shortened into the icon version token.
    #[serde(default = "default_commit")]
    pub commit: String,

    /// Compute everything but skip publishing.
    #[serde(default)]
    pub dry_run: bool,

    /// File to persist the final run status into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_file: Option<PathBuf>,

    /// Directory to write local copies of rendered artifacts into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Send freshness token obtained at fetch time as update precondition.
    #[serde(default)]
    pub conditional: bool,

    /// Remote API settings.
    #[serde(default)]
    pub api: ApiSettings,

    /// Retry policy settings.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Rewrite rule for derived "mini" artifacts.
    #[serde(default)]
    pub variant: VariantRule,

    /// Subscriptions in slot order.
    #[serde(default, rename = "subscription")]
    pub subscriptions: Vec<Subscription>,

    /// Artifact groups, one per publication target.
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupConfig>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            commit: default_commit(),
            dry_run: false,
            status_file: None,
            output_dir: None,
            conditional: false,
            api: ApiSettings::default(),
            retry: RetrySettings::default(),
            variant: VariantRule::default(),
            subscriptions: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl PublishConfig {
    /// Validate configuration before any I/O happens.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoGroups`] if there is nothing to publish to.
    /// - Return [`ConfigError::MissingTarget`] if a group lacks a target.
    /// - Return [`ConfigError::DuplicateGroup`] if group names collide.
    /// - Return [`ConfigError::DuplicateFile`] if artifact names collide
    ///   within one group.
    /// - Return [`ConfigError::Retry`] if retry settings are unusable.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        let mut names = HashSet::new();
        for group in &self.groups {
            if group.target.trim().is_empty() {
                return Err(ConfigError::MissingTarget {
                    group: group.name.clone(),
                });
            }

            if !names.insert(group.name.as_str()) {
                return Err(ConfigError::DuplicateGroup {
                    group: group.name.clone(),
                });
            }

            let mut files = HashSet::new();
            for file in group.artifact_files() {
                if !files.insert(file) {
                    return Err(ConfigError::DuplicateFile {
                        group: group.name.clone(),
                        file: file.to_string(),
                    });
                }
            }
        }

        self.retry.validate()
    }

    /// Apply shell expansion to every path field.
    fn expand_paths(&mut self) -> Result<()> {
        self.status_file = self.status_file.as_deref().map(expand_path).transpose()?;
        self.output_dir = self.output_dir.as_deref().map(expand_path).transpose()?;

        for artifact in self.groups.iter_mut().flat_map(|g| g.artifacts.iter_mut()) {
            artifact.template = expand_path(&artifact.template)?;
        }

        Ok(())
    }
}

impl FromStr for PublishConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: PublishConfig =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path fields.
        config.expand_paths()?;

        Ok(config)
    }
}

impl Display for PublishConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Remote API settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the Gist REST API.
    pub url: String,

    /// Per request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: "https://api.github.com".into(),
            timeout_secs: 20,
        }
    }
}

/// Retry policy settings.
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the initial one.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Relative jitter applied to every delay, e.g., 0.2 for ±20%.
    pub jitter: f64,

    /// HTTP status codes worth retrying.
    pub retryable: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            jitter: 0.2,
            retryable: vec![409, 425, 429, 500, 502, 503, 522, 524],
        }
    }
}

impl RetrySettings {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Retry("max_attempts must be at least 1".into()));
        }

        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ConfigError::Retry("jitter must be within [0, 1)".into()));
        }

        Ok(())
    }
}

/// Artifact group bound to one publication target.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    /// Name of group, e.g., "standard" or "lite".
    pub name: String,

    /// Opaque identifier of the publication target.
    pub target: String,

    /// Templates to render for this group.
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactSpec>,
}

impl GroupConfig {
    /// Iterate over every file name this group may produce.
    pub fn artifact_files(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().flat_map(|artifact| {
            std::iter::once(artifact.file.as_str()).chain(artifact.mini.as_deref())
        })
    }
}

/// Template role and the artifacts rendered from it.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ArtifactSpec {
    /// Path to template file.
    pub template: PathBuf,

    /// File name of primary artifact on publication target.
    pub file: String,

    /// File name of derived "mini" artifact, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mini: Option<String>,

    /// Treat missing template as configuration error instead of skipping it.
    #[serde(default)]
    pub required: bool,
}

impl ArtifactSpec {
    /// Construct new optional artifact specification.
    pub fn new(template: impl Into<PathBuf>, file: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            file: file.into(),
            mini: None,
            required: false,
        }
    }

    /// Also derive a "mini" artifact under given file name.
    pub fn with_mini(mut self, mini: impl Into<String>) -> Self {
        self.mini = Some(mini.into());
        self
    }
}

/// CI environment layout.
///
/// Describes the fixed two-group layout that CI workflows configure through
/// environment variables: a "standard" and a "lite" group, each with a
/// multiple-subscription template that also yields a "mini" artifact, and a
/// single-subscription template. A group is only enabled when its target is
/// set.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct EnvLayout {
    pub commit: Option<String>,
    pub dry_run: bool,
    pub status_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,

    pub sub_urls: String,
    pub sub_names: String,
    pub sub_url_1: Option<String>,
    pub sub_url_2: Option<String>,

    pub standard: GroupLayout,
    pub lite: GroupLayout,
}

/// Environment layout of a single group.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct GroupLayout {
    pub target: Option<String>,
    pub multiple_template: Option<PathBuf>,
    pub single_template: Option<PathBuf>,
    pub multiple_file: Option<String>,
    pub single_file: Option<String>,
    pub mini_file: Option<String>,
}

impl GroupLayout {
    fn into_group(self, name: &str, suffix: &str) -> Option<GroupConfig> {
        let target = self.target.filter(|target| !target.trim().is_empty())?;
        let template = |path: Option<PathBuf>, role: &str| {
            path.unwrap_or_else(|| PathBuf::from(format!("config/baiye-{role}{suffix}.yaml")))
        };
        let file = |file: Option<String>, role: &str| {
            file.unwrap_or_else(|| format!("baiye-{role}{suffix}.yaml"))
        };

        let multiple = ArtifactSpec::new(
            template(self.multiple_template, "multiple"),
            file(self.multiple_file, "multiple"),
        )
        .with_mini(file(self.mini_file, "mini"));
        let single = ArtifactSpec::new(
            template(self.single_template, "single"),
            file(self.single_file, "single"),
        );

        Some(GroupConfig {
            name: name.into(),
            target,
            artifacts: vec![multiple, single],
        })
    }
}

impl EnvLayout {
    /// Resolve environment layout into a publish configuration.
    ///
    /// Subscriptions come from the newline separated `sub_urls` listing, or
    /// from the numbered single-slot values when that listing is empty.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoGroups`] if neither group has a target.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn into_config(self) -> Result<PublishConfig> {
        let urls = match crate::render::substitute::split_lines(&self.sub_urls) {
            urls if !urls.is_empty() => urls,
            _ => [self.sub_url_1, self.sub_url_2]
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect(),
        };
        let mut names = crate::render::substitute::split_lines(&self.sub_names).into_iter();
        let subscriptions = urls
            .into_iter()
            .map(|url| Subscription::new(url, names.next()))
            .collect();

        let groups = [
            self.standard.into_group("standard", ""),
            self.lite.into_group("lite", "-lite"),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        if groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }

        let mut config = PublishConfig {
            commit: self.commit.unwrap_or_else(default_commit),
            dry_run: self.dry_run,
            status_file: self.status_file,
            output_dir: self.output_dir,
            subscriptions,
            groups,
            ..PublishConfig::default()
        };
        config.expand_paths()?;

        Ok(config)
    }
}

/// Require a non-empty access token.
///
/// # Errors
///
/// - Return [`ConfigError::MissingToken`] if token is absent or blank.
pub fn require_token(token: Option<String>) -> Result<String> {
    token
        .filter(|token| !token.trim().is_empty())
        .ok_or(ConfigError::MissingToken)
}

fn default_commit() -> String {
    DEFAULT_COMMIT.into()
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// No access token supplied.
    #[error("missing access token, set GIST_TOKEN")]
    MissingToken,

    /// No artifact group has a publication target.
    #[error("no artifact group configured with a publication target")]
    NoGroups,

    /// Artifact group lacks a publication target.
    #[error("group {group:?} has no publication target")]
    MissingTarget { group: String },

    /// Two artifact groups share a name.
    #[error("group {group:?} is defined more than once")]
    DuplicateGroup { group: String },

    /// Two artifacts of one group share a file name.
    #[error("group {group:?} produces file {file:?} more than once")]
    DuplicateFile { group: String, file: String },

    /// Retry settings are unusable.
    #[error("invalid retry settings: {0}")]
    Retry(String),

    /// Required template is missing.
    #[error("required template {:?} not found", path.display())]
    MissingTemplate { path: PathBuf },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
