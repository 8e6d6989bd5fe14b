use std::time::Duration;

use tokio::time::Instant;
use web2apk_core::models::{BuildRun, RunConclusion, RunId, RunState};

/// Classification of a watched run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    /// Queued or in progress.
    Pending,
    Succeeded,
    Failed,
    /// Completed with a conclusion other than success or failure.
    OtherConclusion(RunConclusion),
    /// The attempt budget ran out while the run was still pending.
    TimedOut,
}

impl WatchState {
    pub fn classify(state: &RunState) -> Self {
        if !state.status.is_completed() {
            return Self::Pending;
        }
        match state.conclusion() {
            Some(RunConclusion::Success) => Self::Succeeded,
            Some(RunConclusion::Failure) => Self::Failed,
            Some(other) => Self::OtherConclusion(other.clone()),
            None => Self::OtherConclusion(RunConclusion::Other("unknown".to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool { !matches!(self, Self::Pending) }
}

/// One bounded attempt to observe a single run until it reaches a terminal state.
#[derive(Debug)]
pub struct WatchSession {
    run_id: RunId,
    state: WatchState,
    last: RunState,
    attempts: u32,
    max_attempts: u32,
    interval: Duration,
    started: Instant,
}

impl WatchSession {
    /// Start watching `run`, classifying the state it was discovered in.
    pub fn new(run: &BuildRun, max_attempts: u32, interval: Duration) -> Self {
        let mut state = WatchState::classify(&run.state);
        if state == WatchState::Pending && max_attempts == 0 {
            state = WatchState::TimedOut;
        }
        Self {
            run_id: run.id,
            state,
            last: run.state.clone(),
            attempts: 0,
            max_attempts,
            interval,
            started: Instant::now(),
        }
    }

    /// Record the result of one polling tick.
    ///
    /// Terminal states are absorbing: once reached, further observations are ignored.
    pub fn observe(&mut self, state: RunState) -> &WatchState {
        if self.state.is_terminal() {
            return &self.state;
        }
        self.attempts += 1;
        self.state = WatchState::classify(&state);
        self.last = state;
        if self.state == WatchState::Pending && self.attempts >= self.max_attempts {
            self.state = WatchState::TimedOut;
        }
        &self.state
    }

    pub fn run_id(&self) -> RunId { self.run_id }

    pub fn state(&self) -> &WatchState { &self.state }

    pub fn last_state(&self) -> &RunState { &self.last }

    /// Number of status queries made so far.
    pub fn attempts(&self) -> u32 { self.attempts }

    pub fn max_attempts(&self) -> u32 { self.max_attempts }

    pub fn interval(&self) -> Duration { self.interval }

    pub fn elapsed(&self) -> Duration { self.started.elapsed() }
}

#[cfg(test)]
mod tests {
    use time::UtcDateTime;
    use web2apk_core::models::RunStatus;

    use super::*;

    fn state(status: &str, conclusion: Option<&str>) -> RunState {
        RunState::new(
            RunStatus::from(status),
            conclusion.map(RunConclusion::from),
            UtcDateTime::UNIX_EPOCH,
            UtcDateTime::UNIX_EPOCH,
        )
    }

    fn run(status: &str, conclusion: Option<&str>) -> BuildRun {
        BuildRun { id: RunId(7), state: state(status, conclusion) }
    }

    #[test]
    fn test_classify() {
        let cases: &[(&str, Option<&str>, WatchState)] = &[
            ("queued", None, WatchState::Pending),
            ("in_progress", None, WatchState::Pending),
            ("waiting", None, WatchState::Pending),
            ("in_progress", Some("success"), WatchState::Pending),
            ("completed", Some("success"), WatchState::Succeeded),
            ("completed", Some("failure"), WatchState::Failed),
            ("completed", Some("cancelled"), WatchState::OtherConclusion(RunConclusion::Cancelled)),
            (
                "completed",
                Some("timed_out"),
                WatchState::OtherConclusion(RunConclusion::Other("timed_out".to_string())),
            ),
        ];
        for (status, conclusion, expected) in cases {
            assert_eq!(&WatchState::classify(&state(status, *conclusion)), expected, "{status}");
        }
    }

    #[test]
    fn test_terminal_classification_is_stable() {
        let done = state("completed", Some("failure"));
        let first = WatchState::classify(&done);
        for _ in 0..5 {
            assert_eq!(WatchState::classify(&done), first);
        }
    }

    #[test]
    fn test_times_out_at_ceiling() {
        let mut session = WatchSession::new(&run("queued", None), 3, Duration::from_secs(10));
        assert_eq!(session.observe(state("in_progress", None)), &WatchState::Pending);
        assert_eq!(session.observe(state("in_progress", None)), &WatchState::Pending);
        assert_eq!(session.observe(state("in_progress", None)), &WatchState::TimedOut);
        assert_eq!(session.attempts(), 3);
    }

    #[test]
    fn test_completion_on_last_attempt_wins() {
        let mut session = WatchSession::new(&run("queued", None), 2, Duration::from_secs(10));
        session.observe(state("in_progress", None));
        assert_eq!(session.observe(state("completed", Some("success"))), &WatchState::Succeeded);
    }

    #[test]
    fn test_terminal_state_is_absorbing() {
        let mut session = WatchSession::new(&run("queued", None), 10, Duration::from_secs(10));
        session.observe(state("completed", Some("failure")));
        assert_eq!(session.observe(state("completed", Some("success"))), &WatchState::Failed);
        assert_eq!(session.attempts(), 1);
        assert_eq!(session.last_state().conclusion(), Some(&RunConclusion::Failure));
    }

    #[test]
    fn test_discovered_terminal_run() {
        let session = WatchSession::new(&run("completed", Some("success")), 10, Duration::ZERO);
        assert_eq!(session.state(), &WatchState::Succeeded);
        assert_eq!(session.attempts(), 0);
        let session = WatchSession::new(&run("queued", None), 0, Duration::ZERO);
        assert_eq!(session.state(), &WatchState::TimedOut);
    }
}
