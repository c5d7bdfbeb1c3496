//! Feed walk: visit loaded listings, scroll for more, decide when to stop
//!
//! ```text
//!   Running ──(all visited / failure streak)──> Scrolling
//!   Scrolling ──(feed grew / unvisited left)──> Running
//!   Scrolling ──(no growth, threshold hit)───> Done(Exhausted)
//!   any ──(stop requested)──> Stopping ──> Done(Stopped)
//! ```

use tracing::{debug, error, info, warn};

use super::parser::DetailParser;
use super::{ExtractionSession, ResultsFeed};
use crate::PaginationConfig;
use crate::utils::settle;

/// Why a walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Scrolling stopped producing new listings
    Exhausted,
    /// The feed had no listings at all
    NoListings,
    /// Operator requested a stop
    Stopped,
    /// The browser went away mid-run
    SessionLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Scrolling,
    Stopping,
    Done(StopReason),
}

enum Visit {
    Extracted,
    Failed,
    Interrupted,
    SessionLost,
}

/// Drives a [`ResultsFeed`] until it is exhausted, lost, or stopped
pub struct PaginationController<'a, F: ResultsFeed> {
    feed: &'a mut F,
    parser: DetailParser,
    settings: &'a PaginationConfig,
    consecutive_failures: u32,
    no_growth: u32,
    loaded: usize,
}

impl<'a, F: ResultsFeed> PaginationController<'a, F> {
    pub fn new(feed: &'a mut F, parser: DetailParser, settings: &'a PaginationConfig) -> Self {
        Self {
            feed,
            parser,
            settings,
            consecutive_failures: 0,
            no_growth: 0,
            loaded: 0,
        }
    }

    /// Walk the feed, appending extracted records to `session`.
    pub async fn run(&mut self, session: &mut ExtractionSession) -> StopReason {
        let mut state = LoopState::Running;

        loop {
            if session.stop_requested() && matches!(state, LoopState::Running | LoopState::Scrolling) {
                state = LoopState::Stopping;
            }
            debug!(?state, "pagination step");

            state = match state {
                LoopState::Running => self.visit_loaded(session).await,
                LoopState::Scrolling => self.scroll_for_more(session).await,
                LoopState::Stopping => {
                    info!(
                        "Stop requested, ending extraction with {} results",
                        session.results.len()
                    );
                    LoopState::Done(StopReason::Stopped)
                }
                LoopState::Done(reason) => return reason,
            };
        }
    }

    async fn visit_loaded(&mut self, session: &mut ExtractionSession) -> LoopState {
        self.loaded = match self.count_or_last().await {
            Some(count) => count,
            None => return LoopState::Done(StopReason::SessionLost),
        };

        if self.loaded == 0 {
            error!("No listings found in the results feed");
            return LoopState::Done(StopReason::NoListings);
        }

        for index in 0..self.loaded {
            if session.stop_requested() {
                return LoopState::Stopping;
            }
            if session.attempted.contains(&index) {
                continue;
            }

            info!(
                "Processing listing {}/{} (Total extracted: {})",
                index + 1,
                self.loaded,
                session.results.len()
            );

            match self.visit(index, session).await {
                Visit::Extracted => self.consecutive_failures = 0,
                Visit::Failed => self.consecutive_failures += 1,
                Visit::Interrupted => return LoopState::Stopping,
                Visit::SessionLost => return LoopState::Done(StopReason::SessionLost),
            }

            if session.stop_requested() {
                return LoopState::Stopping;
            }

            if self.consecutive_failures >= self.settings.failure_threshold {
                info!(
                    "{} consecutive failures, scrolling for more results",
                    self.consecutive_failures
                );
                return LoopState::Scrolling;
            }
        }

        LoopState::Scrolling
    }

    async fn visit(&mut self, index: usize, session: &mut ExtractionSession) -> Visit {
        session.attempted.insert(index);

        match self.feed.open_listing(index).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Listing {} is no longer in the feed", index + 1);
                return Visit::Failed;
            }
            Err(e) if e.is_session_lost() => {
                warn!("Browser connection lost, stopping extraction: {}", e);
                return Visit::SessionLost;
            }
            Err(e) => {
                error!("Error processing listing {}: {}", index + 1, e);
                return Visit::Failed;
            }
        }

        if settle(self.settings.detail_settle(), session.stop_token()).await {
            return Visit::Interrupted;
        }

        let record = self.parser.parse(self.feed.panel()).await;
        let name = record.display_name().to_string();

        if session.accept(index, record) {
            info!("Extracted {} ({} total)", name, session.results.len());
            Visit::Extracted
        } else {
            warn!("No data extracted for listing {}", index + 1);
            Visit::Failed
        }
    }

    async fn scroll_for_more(&mut self, session: &mut ExtractionSession) -> LoopState {
        let before = match self.count_or_last().await {
            Some(count) => count,
            None => return LoopState::Done(StopReason::SessionLost),
        };

        info!(
            "Scrolling to load more results... (Total extracted so far: {})",
            session.results.len()
        );

        if let Err(e) = self.feed.scroll_to_end().await {
            if e.is_session_lost() {
                warn!("Browser connection lost, stopping extraction: {}", e);
                return LoopState::Done(StopReason::SessionLost);
            }
            error!("Error scrolling: {}", e);
        }

        if settle(self.settings.scroll_settle(), session.stop_token()).await {
            return LoopState::Stopping;
        }

        let after = match self.count_or_last().await {
            Some(count) => count,
            None => return LoopState::Done(StopReason::SessionLost),
        };

        self.consecutive_failures = 0;
        self.loaded = after;

        if after > before {
            info!("New results loaded ({} -> {}), continuing extraction", before, after);
            self.no_growth = 0;
            return LoopState::Running;
        }

        self.no_growth += 1;
        info!(
            "No new results loaded ({}/{})",
            self.no_growth, self.settings.no_growth_threshold
        );

        if self.no_growth >= self.settings.no_growth_threshold {
            info!(
                "No more results available. Extraction complete! Total results extracted: {}",
                session.results.len()
            );
            return LoopState::Done(StopReason::Exhausted);
        }

        if session.has_unattempted(self.loaded) {
            return LoopState::Running;
        }

        if settle(self.settings.idle_pause(), session.stop_token()).await {
            return LoopState::Stopping;
        }
        LoopState::Scrolling
    }

    /// Fresh listing count; the last known count on a transient error,
    /// `None` when the session is gone.
    async fn count_or_last(&mut self) -> Option<usize> {
        match self.feed.loaded_count().await {
            Ok(count) => Some(count),
            Err(e) if e.is_session_lost() => {
                warn!("Browser connection lost, stopping extraction: {}", e);
                None
            }
            Err(e) => {
                warn!("Could not count listings: {}", e);
                Some(self.loaded)
            }
        }
    }
}
