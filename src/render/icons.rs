// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Icon cache busting.
//!
//! Icon references under an `/icons/` path get a `v` query parameter carrying
//! the short commit identity. Clients and CDNs then refetch icons whenever the
//! published configuration is regenerated, without renaming any files.

use regex::{Captures, Regex};
use reqwest::Url;
use std::sync::LazyLock;
use tracing::debug;

static ICON_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)https?://[^\s"'<>]+/icons/[^\s"'<>]+\.(?:png|jpe?g|webp|svg)(?:\?[^\s"'<>]*)?"#,
    )
    .expect("valid icon url pattern")
});

/// Length of version token taken from commit identity.
pub const VERSION_TOKEN_LEN: usize = 7;

/// Shorten commit identity into a version token.
pub fn version_token(commit: &str) -> String {
    commit.chars().take(VERSION_TOKEN_LEN).collect()
}

/// Set `v` query parameter on every icon URL in text.
///
/// Existing `v` parameters are overwritten, never duplicated. URLs that fail to
/// parse are left unchanged.
pub fn bust_icons(text: &str, token: &str) -> String {
    ICON_URL
        .replace_all(text, |caps: &Captures| {
            let found = &caps[0];
            match set_version(found, token) {
                Some(url) => url,
                None => {
                    debug!("leave malformed icon url untouched: {found}");
                    found.to_string()
                }
            }
        })
        .into_owned()
}

fn set_version(raw: &str, token: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;

    // INVARIANT: First `v` keeps its position, later duplicates are dropped.
    let mut pairs = Vec::new();
    let mut replaced = false;
    for (key, value) in url.query_pairs() {
        if key == "v" {
            if !replaced {
                pairs.push(("v".to_string(), token.to_string()));
                replaced = true;
            }
            continue;
        }
        pairs.push((key.into_owned(), value.into_owned()));
    }
    if !replaced {
        pairs.push(("v".to_string(), token.to_string()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
    Some(url.to_string())
}
