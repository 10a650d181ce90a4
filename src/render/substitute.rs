// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Positional placeholder substitution.
//!
//! Templates mark subscription slots with two kinds of __placeholders__: a URL
//! marker `替换订阅链接<i>` and a display-name marker `[显示名称<i>]`, where `<i>`
//! is a 1-based slot index. Both are resolved through a [`SubstitutionTable`].
//!
//! Substitution is fail-open. A slot without a URL leaves both of its markers
//! in the output exactly as written, so a partially configured template still
//! renders into valid YAML.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::LazyLock};

static URL_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"替换订阅链接(\d+)").expect("valid url placeholder pattern"));

static NAME_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[显示名称(\d+)\]").expect("valid name placeholder pattern"));

/// Single subscription slot.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subscription {
    /// Subscription URL to splice into the template.
    pub url: String,

    /// Display name for the slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Subscription {
    /// Construct new subscription slot.
    pub fn new(url: impl Into<String>, name: Option<impl Into<String>>) -> Self {
        Self {
            url: url.into(),
            name: name.map(Into::into),
        }
    }
}

/// Ordered mapping of 1-based slot index to subscription.
///
/// # Invariant
///
/// - Slot indices start at 1.
/// - A slot only applies when its URL is non-empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubstitutionTable {
    slots: BTreeMap<usize, Subscription>,
}

impl SubstitutionTable {
    /// Construct new empty substitution table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build table from parallel lists of URLs and names.
    ///
    /// Slot `i` takes the `i`-th URL and the `i`-th name, if there is one.
    pub fn from_lists(
        urls: impl IntoIterator<Item = impl Into<String>>,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut names = names.into_iter().map(Into::<String>::into);
        let slots = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| (index + 1, Subscription::new(url, names.next())))
            .collect();

        Self { slots }
    }

    /// Build table from newline separated URL and name listings.
    ///
    /// Lines are trimmed and blank lines dropped before pairing.
    pub fn from_lines(urls: &str, names: &str) -> Self {
        Self::from_lists(split_lines(urls), split_lines(names))
    }

    /// Insert subscription at 1-based slot index.
    ///
    /// # Panics
    ///
    /// - Will panic if `slot` is zero.
    pub fn insert(&mut self, slot: usize, subscription: Subscription) {
        assert!(slot > 0, "substitution slots are 1-based");
        self.slots.insert(slot, subscription);
    }

    /// Get applicable subscription for slot.
    ///
    /// Slots with an empty URL are treated as absent.
    pub fn get(&self, slot: usize) -> Option<&Subscription> {
        self.slots.get(&slot).filter(|sub| !sub.url.is_empty())
    }

    /// Number of slots, applicable or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if table has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Resolve display name for slot, falling back to `[Sub<i>]`.
    fn display_name(&self, slot: usize, subscription: &Subscription) -> String {
        match subscription.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("[Sub{slot}]"),
        }
    }
}

impl FromIterator<Subscription> for SubstitutionTable {
    /// Assign slots in iteration order, starting at 1.
    fn from_iter<T: IntoIterator<Item = Subscription>>(iter: T) -> Self {
        let slots = iter
            .into_iter()
            .enumerate()
            .map(|(index, subscription)| (index + 1, subscription))
            .collect();

        Self { slots }
    }
}

/// Replace every applicable placeholder in template.
///
/// Placeholders are matched as whole tokens, so slot 1 never consumes the
/// prefix of slot 10.
pub fn substitute(template: &str, table: &SubstitutionTable) -> String {
    let out = URL_PLACEHOLDER.replace_all(template, |caps: &Captures| {
        match slot_of(caps).and_then(|slot| table.get(slot)) {
            Some(subscription) => subscription.url.clone(),
            None => caps[0].to_string(),
        }
    });

    NAME_PLACEHOLDER
        .replace_all(&out, |caps: &Captures| {
            match slot_of(caps).and_then(|slot| table.get(slot).map(|sub| (slot, sub))) {
                Some((slot, subscription)) => table.display_name(slot, subscription),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn slot_of(caps: &Captures) -> Option<usize> {
    caps[1].parse().ok()
}

pub(crate) fn split_lines(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
