//! Fixture tree layout and the copy operations that make up a staging step.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

/// The four canned-result subtrees kept per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureVariant {
    /// Data.xml as the tool writes it when a job starts.
    Start,
    Pass,
    Fail,
    /// Data.xml with no overall result recorded.
    None,
}

impl FixtureVariant {
    pub const ALL: [Self; 4] = [Self::Start, Self::Pass, Self::Fail, Self::None];

    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::None => "None",
        }
    }
}

impl fmt::Display for FixtureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A test-data root resolved for a single job.
///
/// `<root>/<job> - Start`, `<root>/<job> - Pass`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureTree {
    root: PathBuf,
    job: String,
}

impl FixtureTree {
    pub fn new(root: impl Into<PathBuf>, job: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            job: job.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Directory holding one variant's files.
    #[must_use]
    pub fn subtree(&self, variant: FixtureVariant) -> PathBuf {
        self.root.join(format!("{} - {}", self.job, variant.suffix()))
    }

    /// A named file inside one variant's subtree.
    #[must_use]
    pub fn file(&self, variant: FixtureVariant, name: &str) -> PathBuf {
        self.subtree(variant).join(name)
    }
}

/// One copy from the fixture tree into the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingOp {
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl StagingOp {
    /// Copy `name` from a fixture variant to the same basename in `staging_dir`.
    #[must_use]
    pub fn same_name(
        tree: &FixtureTree,
        variant: FixtureVariant,
        name: &str,
        staging_dir: &Path,
    ) -> Self {
        Self {
            source: tree.file(variant, name),
            dest: staging_dir.join(name),
        }
    }
}
