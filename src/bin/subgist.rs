// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use subgist::{
    config::{require_token, EnvLayout, GroupLayout, PublishConfig},
    path::read_template,
    pipeline::RunReport,
    render::{substitute::SubstitutionTable, variant::VariantRule, Renderer},
    GistClient, Pipeline, RunStatus,
};

use anyhow::{anyhow, Context, Result};
use clap::{builder::FalseyValueParser, Args, Parser, Subcommand};
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  subgist [options] <subgist-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Only log warnings and errors.
    #[arg(short, long, global = true, env = "QUIET", value_parser = FalseyValueParser::new())]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Publish(opts) => run_publish(*opts).await,
            Command::Render(opts) => run_render(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Render templates and publish changed artifacts to their Gists.
    #[command(override_usage = "subgist publish [options]")]
    Publish(Box<PublishOptions>),

    /// Render a single template to stdout.
    #[command(override_usage = "subgist render [options] --template <path>")]
    Render(RenderOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PublishOptions {
    /// Publish configuration file, replaces the environment layout.
    #[arg(short, long, value_name = "path", env = "SUBGIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Access token for the Gist API.
    #[arg(long, value_name = "token", env = "GIST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Build or commit identity used as icon version token.
    #[arg(long, value_name = "commit", env = "COMMIT_SHORT")]
    pub commit: Option<String>,

    /// Render and diff, but skip publishing.
    #[arg(short = 'n', long, env = "DRY_RUN", value_parser = FalseyValueParser::new())]
    pub dry_run: bool,

    /// File to write the final run status into.
    #[arg(long, value_name = "path", env = "STATUS_FILE")]
    pub status_file: Option<PathBuf>,

    /// Directory to write local copies of rendered artifacts into.
    #[arg(long, value_name = "path", env = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Emit GitHub workflow annotations for published files.
    #[arg(long, env = "GITHUB_ACTIONS", value_parser = FalseyValueParser::new())]
    pub github_annotations: bool,

    #[command(flatten)]
    pub layout: LayoutOptions,
}

/// CI environment layout, used when no configuration file is given.
#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Environment layout")]
struct LayoutOptions {
    /// Newline separated subscription URLs.
    #[arg(long, value_name = "urls", env = "SUB_URLS", default_value = "")]
    pub sub_urls: String,

    /// Newline separated display names.
    #[arg(long, value_name = "names", env = "SUB_NAMES", default_value = "")]
    pub sub_names: String,

    /// First subscription URL, when no URL listing is given.
    #[arg(long, value_name = "url", env = "SUB_URL_1")]
    pub sub_url_1: Option<String>,

    /// Second subscription URL, when no URL listing is given.
    #[arg(long, value_name = "url", env = "SUB_URL_2")]
    pub sub_url_2: Option<String>,

    #[arg(long, value_name = "id", env = "GIST_ID_STANDARD")]
    pub gist_id_standard: Option<String>,

    #[arg(long, value_name = "path", env = "CONFIG_MULTIPLE_STD")]
    pub config_multiple_std: Option<PathBuf>,

    #[arg(long, value_name = "path", env = "CONFIG_SINGLE_STD")]
    pub config_single_std: Option<PathBuf>,

    #[arg(long, value_name = "file", env = "GIST_FILE_MULTIPLE_STD")]
    pub gist_file_multiple_std: Option<String>,

    #[arg(long, value_name = "file", env = "GIST_FILE_SINGLE_STD")]
    pub gist_file_single_std: Option<String>,

    #[arg(long, value_name = "file", env = "GIST_FILE_MINI_STD")]
    pub gist_file_mini_std: Option<String>,

    #[arg(long, value_name = "id", env = "GIST_ID_LITE")]
    pub gist_id_lite: Option<String>,

    #[arg(long, value_name = "path", env = "CONFIG_MULTIPLE_LITE")]
    pub config_multiple_lite: Option<PathBuf>,

    #[arg(long, value_name = "path", env = "CONFIG_SINGLE_LITE")]
    pub config_single_lite: Option<PathBuf>,

    #[arg(long, value_name = "file", env = "GIST_FILE_MULTIPLE_LITE")]
    pub gist_file_multiple_lite: Option<String>,

    #[arg(long, value_name = "file", env = "GIST_FILE_SINGLE_LITE")]
    pub gist_file_single_lite: Option<String>,

    #[arg(long, value_name = "file", env = "GIST_FILE_MINI_LITE")]
    pub gist_file_mini_lite: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RenderOptions {
    /// Template to render.
    #[arg(short, long, value_name = "path")]
    pub template: PathBuf,

    /// Render the derived "mini" variant instead.
    #[arg(short, long)]
    pub mini: bool,

    /// Build or commit identity used as icon version token.
    #[arg(long, value_name = "commit", env = "COMMIT_SHORT", default_value = "dev")]
    pub commit: String,

    /// Newline separated subscription URLs.
    #[arg(long, value_name = "urls", env = "SUB_URLS", default_value = "")]
    pub sub_urls: String,

    /// Newline separated display names.
    #[arg(long, value_name = "names", env = "SUB_NAMES", default_value = "")]
    pub sub_names: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(if cli.quiet { "warn" } else { "info" }))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run().await {
        error!("{error:?}");
        exit(RunStatus::Error.exit_code());
    }

    exit(0)
}

async fn run_publish(opts: PublishOptions) -> Result<()> {
    let (config, token) = match resolve_publish(&opts) {
        Ok(resolved) => resolved,
        Err(err) => {
            RunStatus::Error.persist(opts.status_file.as_deref());
            return Err(err);
        }
    };

    let status_file = config.status_file.clone();
    let report = match publish(config, token).await {
        Ok(report) => report,
        Err(err) => {
            RunStatus::Error.persist(status_file.as_deref());
            return Err(err);
        }
    };
    report.status.persist(status_file.as_deref());
    announce(&report, opts.github_annotations);

    Ok(())
}

fn resolve_publish(opts: &PublishOptions) -> Result<(PublishConfig, String)> {
    let token = require_token(opts.token.clone())?;
    let mut config = match &opts.config {
        Some(path) => read_to_string(path)
            .with_context(|| format!("failed to read configuration {:?}", path.display()))?
            .parse::<PublishConfig>()?,
        None => layout(opts).into_config()?,
    };

    // INVARIANT: Command line and environment win over configuration file.
    if let Some(commit) = &opts.commit {
        config.commit = commit.clone();
    }
    config.dry_run |= opts.dry_run;
    if opts.status_file.is_some() {
        config.status_file = opts.status_file.clone();
    }
    if opts.output_dir.is_some() {
        config.output_dir = opts.output_dir.clone();
    }

    Ok((config, token))
}

fn layout(opts: &PublishOptions) -> EnvLayout {
    let layout = opts.layout.clone();
    EnvLayout {
        commit: opts.commit.clone(),
        dry_run: opts.dry_run,
        status_file: opts.status_file.clone(),
        output_dir: opts.output_dir.clone(),
        sub_urls: layout.sub_urls,
        sub_names: layout.sub_names,
        sub_url_1: layout.sub_url_1,
        sub_url_2: layout.sub_url_2,
        standard: GroupLayout {
            target: layout.gist_id_standard,
            multiple_template: layout.config_multiple_std,
            single_template: layout.config_single_std,
            multiple_file: layout.gist_file_multiple_std,
            single_file: layout.gist_file_single_std,
            mini_file: layout.gist_file_mini_std,
        },
        lite: GroupLayout {
            target: layout.gist_id_lite,
            multiple_template: layout.config_multiple_lite,
            single_template: layout.config_single_lite,
            multiple_file: layout.gist_file_multiple_lite,
            single_file: layout.gist_file_single_lite,
            mini_file: layout.gist_file_mini_lite,
        },
    }
}

async fn publish(config: PublishConfig, token: String) -> Result<RunReport> {
    let client = GistClient::new(&config.api, token)?;
    let pipeline = Pipeline::new(config, client)?;
    let report = pipeline.run().await?;
    info!("run finished with status {}", report.status);

    Ok(report)
}

fn announce(report: &RunReport, annotations: bool) {
    for group in &report.groups {
        let urls = group.raw_urls();
        for (file, url) in &urls {
            info!("{}: {file} -> {url}", group.name);
        }

        if annotations && !urls.is_empty() {
            let lines = urls.iter().map(|(_, url)| *url).collect::<Vec<_>>();
            println!("::notice title=Gist Updated::{}", lines.join("%0A"));
        }
    }
}

fn run_render(opts: RenderOptions) -> Result<()> {
    let template = read_template(&opts.template)?
        .ok_or_else(|| anyhow!("template {:?} not found", opts.template.display()))?;
    let table = SubstitutionTable::from_lines(&opts.sub_urls, &opts.sub_names);
    let renderer = Renderer::new(table, &opts.commit, &VariantRule::default())?;

    let primary = renderer.render(&template);
    if opts.mini {
        print!("{}", renderer.derive(&primary));
    } else {
        print!("{primary}");
    }

    Ok(())
}
