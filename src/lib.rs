// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Render subscription templates and publish them to GitHub Gists.
//!
//! Subgist reads a handful of YAML subscription templates, splices in
//! subscription URLs and display names, stamps icon URLs with a cache-busting
//! version token, derives "mini" variants, and publishes the results to one
//! or more Gists. Remote writes only happen for files whose content actually
//! changed, and transient delivery failures are retried with exponential
//! backoff.
//!
//! # Layout
//!
//! - [`render`]: pure template rendering.
//! - [`plan`]: content diffing against remote snapshots.
//! - [`publish`]: remote delivery with retries.
//! - [`pipeline`]: the run that ties everything together.
//! - [`config`]: configuration layout.
//! - [`status`]: closed vocabulary of run outcomes.

pub mod config;
pub mod path;
pub mod pipeline;
pub mod plan;
pub mod publish;
pub mod render;
pub mod status;

pub use config::PublishConfig;
pub use pipeline::{Pipeline, PipelineError, RunReport};
pub use publish::{gist::GistClient, GistApi};
pub use status::RunStatus;
