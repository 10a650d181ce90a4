// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Read template sources off disk, and determine where local copies of
//! rendered artifacts should be written.

use std::{
    fs::{create_dir_all, read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Read template source if it exists.
///
/// A missing template is not an error. It simply means that there is nothing
/// to render for that template role.
///
/// # Errors
///
/// - Return [`SourceError::Read`] if template exists but cannot be read.
#[instrument(skip(path), level = "debug")]
pub fn read_template(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    match read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("template {:?} not found", path.display());
            Ok(None)
        }
        Err(err) => Err(SourceError::Read {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

/// Determine path of local copy for artifact file name.
///
/// Strips a trailing ".yaml" or ".yml" extension and appends
/// ".generated.yaml", so "baiye-mini.yaml" becomes
/// "baiye-mini.generated.yaml" inside `output_dir`.
pub fn generated_path(output_dir: impl AsRef<Path>, file: &str) -> PathBuf {
    let stem = file
        .strip_suffix(".yaml")
        .or_else(|| file.strip_suffix(".yml"))
        .unwrap_or(file);

    output_dir.as_ref().join(format!("{stem}.generated.yaml"))
}

/// Write local copy of artifact into output directory.
///
/// Creates output directory if it does not exist yet.
///
/// # Errors
///
/// - Return [`SourceError::Write`] if directory or file cannot be written.
pub fn write_generated(output_dir: impl AsRef<Path>, file: &str, content: &str) -> Result<PathBuf> {
    let path = generated_path(output_dir.as_ref(), file);
    create_dir_all(output_dir.as_ref())
        .and_then(|_| write(&path, content))
        .map_err(|err| SourceError::Write {
            source: err,
            path: path.clone(),
        })?;

    Ok(path)
}

/// Template source error types.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Template exists but cannot be read.
    #[error("failed to read template at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Local artifact copy cannot be written.
    #[error("failed to write generated artifact at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SourceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("baiye-mini.yaml", "out/baiye-mini.generated.yaml"; "yaml extension")]
    #[test_case("lite.yml", "out/lite.generated.yaml"; "yml extension")]
    #[test_case("notes.txt", "out/notes.txt.generated.yaml"; "other extension")]
    #[test]
    fn generated_path_strips_yaml_extension(file: &str, expect: &str) {
        pretty_assertions::assert_eq!(generated_path("out", file), PathBuf::from(expect));
    }

    #[test]
    fn read_template_missing_is_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(read_template(dir.path().join("nope.yaml"))?, None);

        Ok(())
    }

    #[test]
    fn write_then_read_generated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("nested");

        let path = write_generated(&out, "multi.yaml", "a: 1\n")?;
        assert_eq!(path, out.join("multi.generated.yaml"));
        assert_eq!(read_template(&path)?, Some("a: 1\n".to_string()));

        Ok(())
    }
}
