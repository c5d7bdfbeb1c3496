//! One extraction run: walk the feed, save once, release the browser

use chrono::Local;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::controller::{PaginationController, StopReason};
use super::parser::DetailParser;
use super::{ExtractionSession, ResultsFeed};
use crate::PaginationConfig;
use crate::export::{ResultSink, SaveKind, SaveRequest};

/// How the walk ended, as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Feed exhausted, or empty from the start
    Completed,
    /// Operator stop
    Stopped,
    /// Browser went away; partial results were kept
    SessionLost,
    /// The walk itself panicked; partial results were kept
    Emergency,
}

impl RunOutcome {
    fn from_stop(reason: StopReason) -> Self {
        match reason {
            StopReason::Exhausted | StopReason::NoListings => RunOutcome::Completed,
            StopReason::Stopped => RunOutcome::Stopped,
            StopReason::SessionLost => RunOutcome::SessionLost,
        }
    }

    fn save_kind(self) -> SaveKind {
        match self {
            RunOutcome::Completed | RunOutcome::SessionLost => SaveKind::Completed,
            RunOutcome::Stopped => SaveKind::Stopped,
            RunOutcome::Emergency => SaveKind::Emergency,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// `None` when the walk panicked
    pub stop_reason: Option<StopReason>,
    pub records: usize,
    pub saved_to: Option<PathBuf>,
    pub save_error: Option<String>,
}

impl RunSummary {
    /// Completed or stopped, with nothing lost on the way to disk
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed | RunOutcome::Stopped)
            && self.save_error.is_none()
    }
}

/// Run the pagination walk over `feed` and persist whatever was collected.
///
/// Exactly one save is attempted when at least one record exists, with the
/// file naming matching how the walk ended. `feed.release()` is always
/// called afterwards, including after a panic inside the walk.
pub async fn run_extraction<F, S>(
    feed: &mut F,
    sink: &S,
    settings: &PaginationConfig,
    session: &mut ExtractionSession,
) -> RunSummary
where
    F: ResultsFeed,
    S: ResultSink + ?Sized,
{
    let walk = {
        let mut controller = PaginationController::new(&mut *feed, DetailParser::new(), settings);
        AssertUnwindSafe(controller.run(session)).catch_unwind().await
    };

    let (outcome, stop_reason) = match walk {
        Ok(reason) => (RunOutcome::from_stop(reason), Some(reason)),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Extraction aborted unexpectedly: {}", message);
            (RunOutcome::Emergency, None)
        }
    };

    let (saved_to, save_error) = if session.results.is_empty() {
        warn!("No results to save");
        (None, None)
    } else {
        let request = SaveRequest {
            kind: outcome.save_kind(),
            query: session.query.clone(),
            extracted_at: Local::now(),
        };
        match sink.save(&session.results, &request) {
            Ok(path) => {
                info!(
                    "Saved {} results to {}",
                    session.results.len(),
                    path.display()
                );
                (Some(path), None)
            }
            Err(e) => {
                error!("Error saving results: {}", e);
                (None, Some(e.to_string()))
            }
        }
    };

    feed.release().await;

    RunSummary {
        outcome,
        stop_reason,
        records: session.results.len(),
        saved_to,
        save_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::FeedError;
    use crate::extraction::testing::{EventLog, FakeFeed, FakeSink};
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn stop_saves_accumulated_records_once_then_releases() {
        let token = CancellationToken::new();
        let log = EventLog::default();
        // five visits succeed, the stop lands while the sixth is settling
        let mut feed = FakeFeed::named(10, 10)
            .stopping_on_open(6, token.clone())
            .with_log(log.clone());
        let sink = FakeSink::with_log(log.clone());
        let mut session = ExtractionSession::new(Some("cafes".into()), token);

        let summary =
            run_extraction(&mut feed, &sink, &PaginationConfig::default(), &mut session).await;

        assert_eq!(summary.outcome, RunOutcome::Stopped);
        assert_eq!(summary.records, 5);
        assert!(summary.is_success());

        let saves = sink.saves.lock().unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].0, SaveKind::Stopped);
        assert_eq!(saves[0].1.len(), 5);

        let events = log.lock().unwrap();
        let tail: Vec<_> = events.iter().rev().take(2).rev().cloned().collect();
        assert_eq!(tail, vec!["save:5".to_string(), "release".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_session_while_scrolling_keeps_partial_results() {
        let mut feed = FakeFeed::named(3, 3)
            .with_scroll_error(FeedError::classify("WebSocket connection closed"));
        let sink = FakeSink::default();
        let mut session = ExtractionSession::new(None, CancellationToken::new());

        let summary =
            run_extraction(&mut feed, &sink, &PaginationConfig::default(), &mut session).await;

        assert_eq!(summary.outcome, RunOutcome::SessionLost);
        assert_eq!(summary.stop_reason, Some(StopReason::SessionLost));
        assert_eq!(summary.records, 3);
        assert!(!summary.is_success());
        assert_eq!(sink.saves.lock().unwrap()[0].0, SaveKind::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_browser_is_reported_as_lost_session() {
        let mut feed = FakeFeed::named(5, 5)
            .dying_after(2, FeedError::classify("send failed because receiver is gone"));
        let sink = FakeSink::default();
        let mut session = ExtractionSession::new(None, CancellationToken::new());

        let summary =
            run_extraction(&mut feed, &sink, &PaginationConfig::default(), &mut session).await;

        assert_eq!(summary.outcome, RunOutcome::SessionLost);
        assert_eq!(summary.records, 2);
        assert!(!summary.is_success());
        assert_eq!(sink.saves.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_saved_when_no_results() {
        let mut feed = FakeFeed::named(0, 0);
        let sink = FakeSink::default();
        let mut session = ExtractionSession::new(None, CancellationToken::new());

        let summary =
            run_extraction(&mut feed, &sink, &PaginationConfig::default(), &mut session).await;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.stop_reason, Some(StopReason::NoListings));
        assert!(summary.saved_to.is_none());
        assert!(sink.saves.lock().unwrap().is_empty());
        assert_eq!(*feed.log.lock().unwrap(), vec!["release".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_in_walk_triggers_emergency_save_and_release() {
        let log = EventLog::default();
        let mut feed = FakeFeed::named(5, 5)
            .panicking_on_open(2)
            .with_log(log.clone());
        let sink = FakeSink::with_log(log.clone());
        let mut session = ExtractionSession::new(None, CancellationToken::new());

        let summary =
            run_extraction(&mut feed, &sink, &PaginationConfig::default(), &mut session).await;

        assert_eq!(summary.outcome, RunOutcome::Emergency);
        assert_eq!(summary.records, 2);
        assert_eq!(sink.saves.lock().unwrap()[0].0, SaveKind::Emergency);
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("release"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_reported_and_browser_still_released() {
        let mut feed = FakeFeed::named(2, 2);
        let sink = FakeSink {
            fail: true,
            ..Default::default()
        };
        let mut session = ExtractionSession::new(None, CancellationToken::new());

        let summary =
            run_extraction(&mut feed, &sink, &PaginationConfig::default(), &mut session).await;

        assert!(summary.save_error.is_some());
        assert!(!summary.is_success());
        assert_eq!(feed.log.lock().unwrap().last().map(String::as_str), Some("release"));
    }
}
