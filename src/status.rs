// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run status reporting.
//!
//! Every run ends in one status out of a small closed vocabulary. The status
//! can be persisted into a status file, so later CI steps can branch on the
//! outcome without parsing logs.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::write,
    path::Path,
    str::FromStr,
};
use tracing::warn;

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// At least one group was published.
    Ok,

    /// Every group was already up to date.
    NoChange,

    /// Publishing was skipped on request.
    DryRun,

    /// Run failed.
    Error,
}

impl RunStatus {
    /// Status marker as written to the status file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoChange => "NOCHANGE",
            Self::DryRun => "DRYRUN",
            Self::Error => "ERROR",
        }
    }

    /// Process exit code for status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Error => 1,
            _ => 0,
        }
    }

    /// Persist status into status file.
    ///
    /// Failing to write the status file never changes the outcome of a run,
    /// so the failure is only logged.
    pub fn persist(&self, path: Option<&Path>) {
        let Some(path) = path else {
            return;
        };

        if let Err(err) = write(path, format!("{self}\n")) {
            warn!("failed to write status file {:?}: {err}", path.display());
        }
    }
}

impl Display for RunStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data.trim() {
            "OK" => Ok(Self::Ok),
            "NOCHANGE" => Ok(Self::NoChange),
            "DRYRUN" => Ok(Self::DryRun),
            "ERROR" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Status marker outside the known vocabulary.
#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown run status {0:?}")]
pub struct UnknownStatus(pub String);
