//! Staging-directory path handling and job id derivation.

use std::env;
use std::path::{Component, Path, PathBuf};

use crate::core::errors::{FixtureError, Result};

/// Make a path absolute against CWD and normalize it syntactically.
///
/// Symlinks are not resolved; the final segment is kept as passed.
pub fn absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// The job id is the staging directory's final path segment, taken verbatim.
pub fn job_id_from_staging_dir(staging_dir: &Path) -> Result<String> {
    let name = staging_dir
        .file_name()
        .ok_or_else(|| FixtureError::InvalidJob {
            details: format!(
                "staging directory {} has no final path segment",
                staging_dir.display()
            ),
        })?;
    let job = name.to_str().ok_or_else(|| FixtureError::InvalidJob {
        details: format!("staging directory name {name:?} is not valid UTF-8"),
    })?;
    if job.trim().is_empty() {
        return Err(FixtureError::InvalidJob {
            details: "job id derived from staging directory is blank".to_string(),
        });
    }
    Ok(job.to_string())
}
