// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{FakeGist, FixedJitter, RecordingSleep, TemplateFixture};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{collections::BTreeMap, fs::read_to_string, time::Duration};
use subgist::{
    config::{ArtifactSpec, ConfigError},
    path::generated_path,
    plan::fingerprint,
    publish::{
        retry::{Jitter, RandomJitter, Retrier, RetryError, RetryPolicy},
        PublishError,
    },
    Pipeline, PipelineError, RunStatus,
};

fn pipeline<'a, J: Jitter>(
    fixture: &TemplateFixture,
    gist: &'a FakeGist,
    sleep: &RecordingSleep,
    jitter: J,
) -> Result<Pipeline<&'a FakeGist, RecordingSleep, J>> {
    let config = fixture.config();
    let policy = RetryPolicy::from(&config.retry);
    let retrier = Retrier::with_backoff(policy, sleep.clone(), jitter);

    Ok(Pipeline::with_retrier(config, gist, retrier)?)
}

fn two_file_fixture() -> Result<TemplateFixture> {
    let fixture = TemplateFixture::new()?;
    let a = fixture.template("a.yaml", "a: 1\n")?;
    let b = fixture.template("b.yaml", "b: 替换订阅链接1\n")?;

    Ok(fixture.with_group(
        "standard",
        "gist-std",
        [ArtifactSpec::new(a, "a.yaml"), ArtifactSpec::new(b, "b.yaml")],
    ))
}

#[tokio::test]
async fn publish_only_changed_files() -> Result<()> {
    let fixture = two_file_fixture()?;
    let gist = FakeGist::new()
        .with_file("gist-std", "a.yaml", "a: 1\n")
        .with_file("gist-std", "b.yaml", "b: old\n");
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::Ok);

    let updates = gist.updates();
    assert_eq!(updates.len(), 1);
    let (target, update) = &updates[0];
    assert_eq!(target, "gist-std");
    assert_eq!(
        update.files,
        BTreeMap::from([("b.yaml".to_string(), "b: https://a.example/sub\n".to_string())])
    );
    assert_eq!(
        update.description,
        format!(
            "update via CI | abc1234 | b.yaml:{}",
            fingerprint("b: https://a.example/sub\n")
        )
    );
    assert_eq!(update.if_match, None);

    let group = &report.groups[0];
    assert_eq!(group.planned, vec!["b.yaml".to_string()]);
    assert_eq!(group.fingerprints.len(), 2);
    assert_eq!(
        group.raw_urls(),
        vec![("b.yaml", "https://gist.example/gist-std/raw/b.yaml")]
    );

    Ok(())
}

#[tokio::test]
async fn unchanged_remote_yields_no_change() -> Result<()> {
    let fixture = two_file_fixture()?;
    let gist = FakeGist::new()
        .with_file("gist-std", "a.yaml", "a: 1\n")
        .with_file("gist-std", "b.yaml", "b: https://a.example/sub\n");
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::NoChange);
    assert_eq!(gist.fetch_count(), 1);
    assert!(gist.updates().is_empty());
    assert!(report.groups[0].planned.is_empty());

    Ok(())
}

#[tokio::test]
async fn dry_run_never_updates() -> Result<()> {
    let mut fixture = two_file_fixture()?;
    fixture.config_mut().dry_run = true;
    let gist = FakeGist::new();
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::DryRun);
    assert!(gist.updates().is_empty());
    assert_eq!(
        report.groups[0].planned,
        vec!["a.yaml".to_string(), "b.yaml".to_string()]
    );
    assert!(report.groups[0].raw_urls().is_empty());

    Ok(())
}

#[tokio::test]
async fn persistent_server_error_exhausts_retries() -> Result<()> {
    let fixture = two_file_fixture()?;
    let gist = FakeGist::new().fail_update([503; 5]);
    let sleep = RecordingSleep::default();

    let pipeline = pipeline(&fixture, &gist, &sleep, RandomJitter)?;
    let result = pipeline.run().await;
    match result {
        Err(PipelineError::Publish(PublishError::Update { target, source })) => {
            assert_eq!(target, "gist-std");
            assert!(matches!(source, RetryError::Exhausted { .. }));
            assert_eq!(source.attempts(), 5);
            assert_eq!(source.last_error().status(), Some(503));
        }
        other => panic!("expected exhausted update, got {other:?}"),
    }
    assert_eq!(gist.updates().len(), 5);

    let policy = RetryPolicy::default();
    let delays = sleep.delays();
    assert_eq!(delays.len(), 4);
    for (retry, delay) in delays.iter().enumerate() {
        let (low, high) = policy.delay_bounds(retry as u32);
        assert!(
            low <= *delay && *delay <= high,
            "retry {retry}: {delay:?} outside {low:?}..={high:?}"
        );
    }

    Ok(())
}

#[tokio::test]
async fn unauthorized_fails_without_retry() -> Result<()> {
    let fixture = two_file_fixture()?;
    let gist = FakeGist::new().fail_update([401]);
    let sleep = RecordingSleep::default();

    let result = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await;
    match result {
        Err(PipelineError::Publish(PublishError::Update { source, .. })) => {
            assert!(matches!(source, RetryError::Fatal { .. }));
            assert_eq!(source.attempts(), 1);
        }
        other => panic!("expected fatal update, got {other:?}"),
    }
    assert_eq!(gist.updates().len(), 1);
    assert!(sleep.delays().is_empty());

    Ok(())
}

#[tokio::test]
async fn transient_failure_then_success() -> Result<()> {
    let fixture = two_file_fixture()?;
    let gist = FakeGist::new().fail_update([502, 429]);
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(gist.updates().len(), 3);
    assert_eq!(
        sleep.delays(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
    assert_eq!(
        gist.content("gist-std", "b.yaml"),
        Some("b: https://a.example/sub\n".to_string())
    );

    Ok(())
}

#[tokio::test]
async fn fetch_failure_is_fatal() -> Result<()> {
    let fixture = two_file_fixture()?;
    let gist = FakeGist::new().fail_fetch([404]);
    let sleep = RecordingSleep::default();

    let result = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await;
    assert!(matches!(
        result,
        Err(PipelineError::Publish(PublishError::Fetch { .. }))
    ));
    assert_eq!(gist.fetch_count(), 1);
    assert!(gist.updates().is_empty());

    Ok(())
}

#[tokio::test]
async fn fetch_is_retried_on_transient_failure() -> Result<()> {
    let fixture = two_file_fixture()?;
    let gist = FakeGist::new().fail_fetch([500]);
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(gist.fetch_count(), 2);
    assert_eq!(sleep.delays(), vec![Duration::from_millis(500)]);

    Ok(())
}

#[tokio::test]
async fn publish_every_group_to_its_own_target() -> Result<()> {
    let fixture = TemplateFixture::new()?;
    let std = fixture.template("std.yaml", "name: [显示名称1]\n")?;
    let lite = fixture.template("lite.yaml", "name: [显示名称2]\n")?;
    let fixture = fixture
        .with_group("standard", "gist-std", [ArtifactSpec::new(std, "std.yaml")])
        .with_group("lite", "gist-lite", [ArtifactSpec::new(lite, "lite.yaml")]);
    let gist = FakeGist::new();
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(gist.updates().len(), 2);
    assert_eq!(
        gist.content("gist-std", "std.yaml"),
        Some("name: Alpha\n".to_string())
    );
    assert_eq!(
        gist.content("gist-lite", "lite.yaml"),
        Some("name: [Sub2]\n".to_string())
    );

    let names = report
        .groups
        .iter()
        .map(|group| group.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["standard", "lite"]);

    Ok(())
}

#[tokio::test]
async fn missing_optional_template_is_skipped() -> Result<()> {
    let fixture = TemplateFixture::new()?;
    let single = fixture.template("single.yaml", "single: 替换订阅链接2\n")?;
    let missing = fixture.path().join("multiple.yaml");
    let fixture = fixture.with_group(
        "standard",
        "gist-std",
        [
            ArtifactSpec::new(missing, "multiple.yaml").with_mini("mini.yaml"),
            ArtifactSpec::new(single, "single.yaml"),
        ],
    );
    let gist = FakeGist::new();
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.groups[0].planned, vec!["single.yaml".to_string()]);
    assert_eq!(
        gist.content("gist-std", "single.yaml"),
        Some("single: https://b.example/sub\n".to_string())
    );

    Ok(())
}

#[tokio::test]
async fn missing_required_template_is_config_error() -> Result<()> {
    let fixture = TemplateFixture::new()?;
    let missing = fixture.path().join("multiple.yaml");
    let mut spec = ArtifactSpec::new(missing.clone(), "multiple.yaml");
    spec.required = true;
    let fixture = fixture.with_group("standard", "gist-std", [spec]);
    let gist = FakeGist::new();
    let sleep = RecordingSleep::default();

    let result = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await;
    match result {
        Err(PipelineError::Config(ConfigError::MissingTemplate { path })) => {
            assert_eq!(path, missing)
        }
        other => panic!("expected missing template, got {other:?}"),
    }
    assert_eq!(gist.fetch_count(), 0);

    Ok(())
}

#[tokio::test]
async fn render_and_publish_end_to_end() -> Result<()> {
    let fixture = TemplateFixture::new()?;
    let multiple = fixture.template(
        "multiple.yaml",
        indoc! {"
            geodata-loader: standard
            proxy-providers:
              first:
                url: 替换订阅链接1
                name: [显示名称1]
                icon: https://cdn.example/icons/first.png?v=old
              tenth:
                url: 替换订阅链接10
        "},
    )?;
    let mut fixture = fixture.with_group(
        "standard",
        "gist-std",
        [ArtifactSpec::new(multiple, "multiple.yaml").with_mini("mini.yaml")],
    );
    let out = fixture.path().join("out");
    fixture.config_mut().output_dir = Some(out.clone());
    let gist = FakeGist::new();
    let sleep = RecordingSleep::default();

    let report = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    assert_eq!(report.status, RunStatus::Ok);

    let primary = indoc! {"
        geodata-loader: standard
        proxy-providers:
          first:
            url: https://a.example/sub
            name: Alpha
            icon: https://cdn.example/icons/first.png?v=abc1234
          tenth:
            url: 替换订阅链接10
    "};
    let mini = primary.replace("geodata-loader: standard", "geodata-loader: memconservative");
    assert_eq!(gist.content("gist-std", "multiple.yaml").as_deref(), Some(primary));
    assert_eq!(gist.content("gist-std", "mini.yaml"), Some(mini.clone()));

    assert_eq!(
        read_to_string(generated_path(&out, "multiple.yaml"))?,
        primary
    );
    assert_eq!(read_to_string(generated_path(&out, "mini.yaml"))?, mini);

    Ok(())
}

#[tokio::test]
async fn conditional_update_sends_fetched_etag() -> Result<()> {
    let mut fixture = two_file_fixture()?;
    fixture.config_mut().conditional = true;
    let gist = FakeGist::new().with_file("gist-std", "a.yaml", "a: 0\n");
    let sleep = RecordingSleep::default();

    pipeline(&fixture, &gist, &sleep, FixedJitter(1.0))?.run().await?;
    let updates = gist.updates();
    assert_eq!(updates[0].1.if_match.as_deref(), Some("\"gist-std-v1\""));

    Ok(())
}

#[tokio::test]
async fn invalid_config_is_rejected_before_io() -> Result<()> {
    let fixture = TemplateFixture::new()?;
    let gist = FakeGist::new();
    let sleep = RecordingSleep::default();

    let result = pipeline(&fixture, &gist, &sleep, FixedJitter(1.0));
    assert!(matches!(
        result
            .err()
            .and_then(|err| err.downcast::<PipelineError>().ok()),
        Some(PipelineError::Config(ConfigError::NoGroups))
    ));
    assert_eq!(gist.fetch_count(), 0);

    Ok(())
}
