use std::{path::PathBuf, process::ExitCode};

use tokio_util::sync::CancellationToken;
use web2apk_build::{WatchOutcome, WatchReport};
use web2apk_core::{
    models::{RepositoryId, RunId},
    util::size,
};
use web2apk_packaging::VersionBump;

// For argp::FromArgs
pub fn native_path(value: &str) -> Result<PathBuf, String> { Ok(PathBuf::from(value)) }

pub fn repository_id(value: &str) -> Result<RepositoryId, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

pub fn run_id(value: &str) -> Result<RunId, String> {
    value.parse().map_err(|_| format!("Invalid run ID '{value}'"))
}

pub fn version_bump(value: &str) -> Result<VersionBump, String> {
    value.parse().map_err(|e: anyhow::Error| format!("{e:#}"))
}

/// Cancelled when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current check");
            token.cancel();
        }
    });
    cancel
}

pub const EXIT_BUILD_FAILED: u8 = 2;
pub const EXIT_TIMED_OUT: u8 = 3;

pub fn exit_code(outcome: &WatchOutcome) -> ExitCode {
    match outcome {
        WatchOutcome::Succeeded(_) => ExitCode::SUCCESS,
        WatchOutcome::Failed | WatchOutcome::OtherConclusion(_) => {
            ExitCode::from(EXIT_BUILD_FAILED)
        }
        WatchOutcome::TimedOut => ExitCode::from(EXIT_TIMED_OUT),
    }
}

/// Human-readable summary of a finished watch.
pub fn describe(report: &WatchReport) -> String {
    let elapsed = report.elapsed.as_secs();
    match &report.outcome {
        WatchOutcome::Succeeded(payload) => format!(
            "Build {} succeeded after {}m {}s\nAPK: {} ({})",
            report.run_id,
            elapsed / 60,
            elapsed % 60,
            payload.path.display(),
            size(payload.size)
        ),
        WatchOutcome::Failed => {
            format!("Build {} failed. Logs: {}", report.run_id, report.run_url())
        }
        WatchOutcome::OtherConclusion(conclusion) => format!(
            "Build {} finished as {}. Details: {}",
            report.run_id,
            conclusion,
            report.run_url()
        ),
        WatchOutcome::TimedOut => format!(
            "Build {} still {} after {} checks. It may finish later: {}",
            report.run_id,
            report.last_state.status,
            report.attempts,
            report.run_url()
        ),
    }
}

/// Print the outcome of a watch and map it to the process exit code.
pub fn finish(report: &WatchReport) -> ExitCode {
    let summary = describe(report);
    match report.outcome {
        WatchOutcome::Succeeded(_) => println!("{summary}"),
        _ => eprintln!("{summary}"),
    }
    exit_code(&report.outcome)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::UtcDateTime;
    use web2apk_build::StagedPayload;
    use web2apk_core::models::{ArtifactBundle, RunConclusion, RunState, RunStatus};

    use super::*;

    fn report(outcome: WatchOutcome, status: RunStatus) -> WatchReport {
        let conclusion = status.is_completed().then_some(RunConclusion::Failure);
        WatchReport {
            repo: RepositoryId::new("octo", "site"),
            run_id: RunId(42),
            outcome,
            attempts: 3,
            elapsed: Duration::from_secs(95),
            last_state: RunState::new(
                status,
                conclusion,
                UtcDateTime::UNIX_EPOCH,
                UtcDateTime::UNIX_EPOCH,
            ),
        }
    }

    #[test]
    fn test_describe_success() {
        let payload = StagedPayload {
            path: PathBuf::from("downloads/app-debug.apk"),
            source: PathBuf::from("app-debug/app-debug.apk"),
            size: 2_500_000,
            bundle: ArtifactBundle {
                run_id: RunId(42),
                root: PathBuf::from("downloads/run-42"),
                entries: vec![],
            },
        };
        let report = report(WatchOutcome::Succeeded(payload), RunStatus::Completed);
        let summary = describe(&report);
        assert!(summary.starts_with("Build 42 succeeded after 1m 35s"), "{summary}");
        assert!(summary.contains("downloads/app-debug.apk"), "{summary}");
        assert_eq!(exit_code(&report.outcome), ExitCode::SUCCESS);
    }

    #[test]
    fn test_describe_unsuccessful() {
        let url = "https://github.com/octo/site/actions/runs/42";
        let failed = report(WatchOutcome::Failed, RunStatus::Completed);
        assert!(describe(&failed).ends_with(url));
        assert_eq!(exit_code(&failed.outcome), ExitCode::from(EXIT_BUILD_FAILED));

        let timed_out = report(WatchOutcome::TimedOut, RunStatus::InProgress);
        assert!(describe(&timed_out).contains("still in_progress after 3 checks"));
        assert_eq!(exit_code(&timed_out.outcome), ExitCode::from(EXIT_TIMED_OUT));

        let skipped = report(
            WatchOutcome::OtherConclusion(RunConclusion::Other("skipped".to_string())),
            RunStatus::Completed,
        );
        assert!(describe(&skipped).contains("finished as skipped"));
        assert_eq!(exit_code(&skipped.outcome), ExitCode::from(EXIT_BUILD_FAILED));
    }

    #[test]
    fn test_arg_parsers() {
        assert_eq!(repository_id("octo/site").unwrap(), RepositoryId::new("octo", "site"));
        assert!(repository_id("octo").is_err());
        assert_eq!(run_id("123").unwrap(), RunId(123));
        assert!(run_id("abc").is_err());
        assert_eq!(version_bump("major").unwrap(), VersionBump::Major);
    }
}
