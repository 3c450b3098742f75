//! Job step enumeration and the per-step staging table.

#![allow(missing_docs)]

use std::fmt;
use std::path::Path;

use crate::stager::plan::{FixtureTree, FixtureVariant, StagingOp};

/// Ordered, closed set of steps the Modeler reports.
///
/// `None` is the pre-connection state; a session starts at `Step1` and never
/// moves past `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStep {
    None,
    Step1,
    Step2,
    Step3,
    Step4,
    Step5,
    Step6,
    Complete,
}

impl JobStep {
    pub const ALL: [Self; 8] = [
        Self::None,
        Self::Step1,
        Self::Step2,
        Self::Step3,
        Self::Step4,
        Self::Step5,
        Self::Step6,
        Self::Complete,
    ];

    /// Ordinal as reported on the wire (`Step {n} in process.`).
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Step1 => 1,
            Self::Step2 => 2,
            Self::Step3 => 3,
            Self::Step4 => 4,
            Self::Step5 => 5,
            Self::Step6 => 6,
            Self::Complete => 7,
        }
    }

    /// The following step; `Complete` is absorbing.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::None => Self::Step1,
            Self::Step1 => Self::Step2,
            Self::Step2 => Self::Step3,
            Self::Step3 => Self::Step4,
            Self::Step4 => Self::Step5,
            Self::Step5 => Self::Step6,
            Self::Step6 | Self::Complete => Self::Complete,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Files deposited when a poll is processed at this step.
    ///
    /// `Complete` stages the "no result yet" Data.xml; the Pass/Fail outcome
    /// is decided separately by the terminal quirk policy.
    #[must_use]
    pub fn staging_action(self, tree: &FixtureTree, staging_dir: &Path) -> Vec<StagingOp> {
        let job = tree.job();
        let pass = |name: &str| StagingOp::same_name(tree, FixtureVariant::Pass, name, staging_dir);
        match self {
            Self::None | Self::Step1 => Vec::new(),
            Self::Step2 => vec![pass(&format!("{job}_step1.mat"))],
            Self::Step3 => vec![pass(&format!("{job}_step2.mat"))],
            Self::Step4 => vec![pass(&format!("{job}_step3.mat"))],
            Self::Step5 => vec![pass(&format!("EEPROM_variables_{job}.mat"))],
            Self::Step6 => vec![pass("CAP.tab"), pass("TUNE.tab")],
            Self::Complete => vec![StagingOp::same_name(
                tree,
                FixtureVariant::None,
                "Data.xml",
                staging_dir,
            )],
        }
    }

    /// The Data.xml copied before the listener opens.
    #[must_use]
    pub fn setup_action(tree: &FixtureTree, staging_dir: &Path) -> StagingOp {
        StagingOp::same_name(tree, FixtureVariant::Start, "Data.xml", staging_dir)
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("NONE"),
            Self::Complete => f.write_str("STEP_COMPLETE"),
            other => write!(f, "STEP_{}", other.ordinal()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn ordinals_are_dense_and_ordered() {
        for (i, step) in JobStep::ALL.iter().enumerate() {
            assert_eq!(usize::from(step.ordinal()), i);
        }
        assert!(JobStep::Step1 < JobStep::Step6);
        assert!(JobStep::Step6 < JobStep::Complete);
    }

    #[test]
    fn next_advances_by_one_and_saturates() {
        for pair in JobStep::ALL.windows(2) {
            assert_eq!(pair[0].next(), pair[1]);
        }
        assert_eq!(JobStep::Complete.next(), JobStep::Complete);
    }

    #[test]
    fn staging_table_matches_tool_outputs() {
        let tree = FixtureTree::new("/t", "J1");
        let stage = Path::new("/s/J1");
        let dests = |step: JobStep| -> Vec<PathBuf> {
            step.staging_action(&tree, stage)
                .into_iter()
                .map(|op| op.dest)
                .collect()
        };

        assert!(dests(JobStep::Step1).is_empty());
        assert_eq!(dests(JobStep::Step2), vec![PathBuf::from("/s/J1/J1_step1.mat")]);
        assert_eq!(dests(JobStep::Step3), vec![PathBuf::from("/s/J1/J1_step2.mat")]);
        assert_eq!(dests(JobStep::Step4), vec![PathBuf::from("/s/J1/J1_step3.mat")]);
        assert_eq!(
            dests(JobStep::Step5),
            vec![PathBuf::from("/s/J1/EEPROM_variables_J1.mat")]
        );
        assert_eq!(
            dests(JobStep::Step6),
            vec![PathBuf::from("/s/J1/CAP.tab"), PathBuf::from("/s/J1/TUNE.tab")]
        );
        assert_eq!(dests(JobStep::Complete), vec![PathBuf::from("/s/J1/Data.xml")]);
    }

    #[test]
    fn step_files_come_from_pass_subtree() {
        let tree = FixtureTree::new("/t", "J1");
        for step in [
            JobStep::Step2,
            JobStep::Step3,
            JobStep::Step4,
            JobStep::Step5,
            JobStep::Step6,
        ] {
            for op in step.staging_action(&tree, Path::new("/s")) {
                assert!(op.source.starts_with("/t/J1 - Pass"), "{step}: {op:?}");
            }
        }
        let terminal = JobStep::Complete.staging_action(&tree, Path::new("/s"));
        assert!(terminal[0].source.starts_with("/t/J1 - None"));
        assert!(JobStep::setup_action(&tree, Path::new("/s")).source.starts_with("/t/J1 - Start"));
    }

    #[test]
    fn display_uses_tool_names() {
        assert_eq!(JobStep::Step3.to_string(), "STEP_3");
        assert_eq!(JobStep::Complete.to_string(), "STEP_COMPLETE");
        assert_eq!(JobStep::None.to_string(), "NONE");
    }
}
