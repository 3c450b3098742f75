//! Top-level CLI definition and orchestration.

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use thiserror::Error;

use modeler_fixture::core::config::Config;
use modeler_fixture::core::errors::FixtureError;
use modeler_fixture::core::job::JobContext;
use modeler_fixture::daemon::signals::{SignalHandler, WAIT_SLICE, WaitOutcome, wait_for_server};
use modeler_fixture::driver::server::FixtureServer;
use modeler_fixture::driver::session::SessionOutcome;
use modeler_fixture::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, join_logger, spawn_logger,
};

/// Exit code when the session completed.
pub const EXIT_COMPLETED: i32 = 0;
/// Exit code when the client hung up before the terminal message.
pub const EXIT_PEER_CLOSED: i32 = 2;
/// Exit code when interrupted by SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Stand-in for the Modeler tool: serves `status` polls for one job.
#[derive(Debug, Parser)]
#[command(
    name = "modeler-fixture",
    author,
    version,
    about = "Modeler tool fixture - scripted job-step server for client tests",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Job staging directory; its final path segment is the job id.
    #[arg(short = 'd', long = "dir", value_name = "STAGING_DIR")]
    staging_dir: PathBuf,
    /// TCP port to listen on (loopback only).
    #[arg(short = 's', long = "port", value_name = "PORT")]
    port: u16,
    /// CPU core count passed by the caller; accepted and reported only.
    #[arg(short = 'p', long = "cores", value_name = "CPU_CORES")]
    cores: u32,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Parent directory of the "<job> - Start/Pass/Fail/None" fixture trees.
    #[arg(long, value_name = "PATH")]
    test_root: Option<PathBuf>,
    /// Seed the terminal quirk draws for a reproducible run.
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
    /// Delete and recreate the staging directory before setup.
    #[arg(long)]
    reset_staging: bool,
    /// Copy the staging directory to <PATH>/<job> after a completed session.
    #[arg(long, value_name = "PATH")]
    archive_dir: Option<PathBuf>,
    /// Suppress console echo (errors still go to stderr).
    #[arg(short, long)]
    quiet: bool,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

impl CliError {
    /// Every failure exits 1.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Fixture(_) => 1,
        }
    }
}

impl Cli {
    /// The invocation as the real tool would have been called.
    fn invocation(&self) -> String {
        let exe = env::args()
            .next()
            .unwrap_or_else(|| "modeler-fixture".to_string());
        format!(
            "{exe} -d {} -s {} -p {}",
            self.staging_dir.display(),
            self.port,
            self.cores
        )
    }

    fn effective_config(&self) -> Result<Config, CliError> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(root) = &self.test_root {
            config.fixture.test_root.clone_from(root);
        }
        if self.seed.is_some() {
            config.quirks.seed = self.seed;
        }
        if self.reset_staging {
            config.fixture.reset_staging = true;
        }
        if self.archive_dir.is_some() {
            config.fixture.archive_dir.clone_from(&self.archive_dir);
        }
        if self.quiet {
            config.logging.console = false;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Run one fixture session and return the process exit code.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    let config = cli.effective_config()?;
    let job = JobContext::from_staging_dir(&cli.staging_dir, cli.port, cli.cores)?;

    let (logger, logger_join) = spawn_logger(ActivityLoggerConfig::from(&config.logging))?;
    let started = Instant::now();
    logger.send(ActivityEvent::FixtureStarted {
        job: job.job_id.clone(),
        invocation: cli.invocation(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_hash: config.stable_hash()?,
    });

    let job_id = job.job_id.clone();
    let result = serve(job, config, &logger);

    let outcome = match &result {
        Ok(code) if *code == EXIT_INTERRUPTED => "interrupted".to_string(),
        Ok(code) if *code == EXIT_PEER_CLOSED => "peer closed".to_string(),
        Ok(_) => "completed".to_string(),
        Err(e) => format!("failed: {e}"),
    };
    logger.send(ActivityEvent::FixtureStopped {
        job: job_id,
        outcome,
        uptime_secs: started.elapsed().as_secs(),
    });
    logger.shutdown();
    join_logger(logger_join);

    result
}

fn serve(job: JobContext, config: Config, logger: &ActivityLoggerHandle) -> Result<i32, CliError> {
    let signals = SignalHandler::new();
    let handle = FixtureServer::new(job, config, Some(logger.clone())).spawn()?;

    match wait_for_server(&handle, &signals, WAIT_SLICE) {
        // The driver thread may still be blocked in accept or read; leave it.
        WaitOutcome::Interrupted => Ok(EXIT_INTERRUPTED),
        WaitOutcome::Finished => {
            let report = handle.join()?;
            Ok(match report.outcome {
                SessionOutcome::Completed { .. } => EXIT_COMPLETED,
                SessionOutcome::PeerClosed => EXIT_PEER_CLOSED,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_tool_invocation() {
        let cli = Cli::try_parse_from([
            "modeler-fixture",
            "-d",
            "/srv/buffer/780200XXC00",
            "-s",
            "5000",
            "-p",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.staging_dir, PathBuf::from("/srv/buffer/780200XXC00"));
        assert_eq!(cli.port, 5000);
        assert_eq!(cli.cores, 4);
        assert!(!cli.quiet);
        assert!(cli.invocation().ends_with("-d /srv/buffer/780200XXC00 -s 5000 -p 4"));
    }

    #[test]
    fn rejects_out_of_range_port() {
        let err = Cli::try_parse_from(["modeler-fixture", "-d", "/x/J", "-s", "70000", "-p", "1"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        assert!(Cli::try_parse_from(["modeler-fixture", "-d", "/x/J", "-s", "1"]).is_err());
    }

    #[test]
    fn flags_override_loaded_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(&cfg_path, "[quirks]\nseed = 1\n").unwrap();
        let cfg_arg = cfg_path.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from([
            "modeler-fixture",
            "-d",
            "/x/J",
            "-s",
            "1",
            "-p",
            "1",
            "--config",
            &cfg_arg,
            "--seed",
            "99",
            "--test-root",
            "/fixtures",
            "--reset-staging",
            "--quiet",
        ])
        .unwrap();
        let config = cli.effective_config().unwrap();
        assert_eq!(config.quirks.seed, Some(99));
        assert_eq!(config.fixture.test_root, PathBuf::from("/fixtures"));
        assert!(config.fixture.reset_staging);
        assert!(!config.logging.console);
    }
}
