//! The four validated inputs a fixture run is started with.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::errors::{FixtureError, Result};
use crate::core::paths::{absolute_path, job_id_from_staging_dir};

/// Job identity and placement for one fixture process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: String,
    pub staging_dir: PathBuf,
    pub listen_port: u16,
    /// Accepted for parity with the real tool's invocation; unused by the protocol.
    pub worker_count: u32,
}

impl JobContext {
    /// Build a context from the raw staging directory argument.
    ///
    /// The job id is the final segment as given; a symlinked staging
    /// directory is not resolved to its target.
    pub fn from_staging_dir(
        staging_dir: &Path,
        listen_port: u16,
        worker_count: u32,
    ) -> Result<Self> {
        let staging_dir = absolute_path(staging_dir);
        let job_id = job_id_from_staging_dir(&staging_dir)?;
        if worker_count == 0 {
            return Err(FixtureError::InvalidJob {
                details: "worker count must be >= 1".to_string(),
            });
        }
        Ok(Self {
            job_id,
            staging_dir,
            listen_port,
            worker_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_derives_job_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("780200XXC00");
        let ctx = JobContext::from_staging_dir(&staging, 3000, 4).unwrap();
        assert_eq!(ctx.job_id, "780200XXC00");
        assert_eq!(ctx.listen_port, 3000);
        assert_eq!(ctx.worker_count, 4);
        assert!(ctx.staging_dir.is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_staging_dir_uses_link_name_as_job() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("scratch_target");
        std::fs::create_dir(&target).unwrap();
        let link = dir.path().join("780200XXC00");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let ctx = JobContext::from_staging_dir(&link, 3000, 4).unwrap();
        assert_eq!(ctx.job_id, "780200XXC00");
        assert_eq!(ctx.staging_dir, link);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = JobContext::from_staging_dir(Path::new("/tmp/JOB"), 3000, 0).unwrap_err();
        assert_eq!(err.code(), "MDL-1101");
    }
}
