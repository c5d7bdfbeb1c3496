//! Listing extraction: detail parsing, the feed walk and run orchestration
//!
//! The walk is written against two seams so it can run against a live
//! chromiumoxide page or an in-memory fake:
//! - [`ResultsFeed`] - the scrollable, incrementally loading results list
//! - [`DetailPanel`] - the detail view of whichever listing is open

mod controller;
mod parser;
mod record;
mod run;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{LoopState, PaginationController, StopReason};
pub use parser::{
    DetailPanel, DetailParser, Field, FieldOutcome, PanelElement, PanelError, PanelResult,
};
pub use record::{ListingRecord, MIN_PHONE_DIGITS, clean_phone};
pub use run::{RunOutcome, RunSummary, run_extraction};

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Lowercase fragments of driver messages that mean the browser is gone
const SESSION_LOST_MARKERS: [&str; 5] = [
    "connection",
    "session",
    "receiver is gone",
    "oneshot canceled",
    "no response from the chromium instance",
];

/// Errors from feed operations (counting, opening, scrolling)
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    /// Browser connection or CDP session is gone; the whole run ends
    #[error("Browser session lost: {0}")]
    SessionLost(String),

    /// Anything else; counts against the current listing only
    #[error("Feed interaction failed: {0}")]
    Interaction(String),
}

impl FeedError {
    /// Classify a driver error message.
    ///
    /// Messages about the connection, the session, a dropped CDP channel or
    /// a browser that stopped answering mean the browser is unreachable.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if SESSION_LOST_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            FeedError::SessionLost(message)
        } else {
            FeedError::Interaction(message)
        }
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(self, FeedError::SessionLost(_))
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

/// The results feed of a map search
#[async_trait]
pub trait ResultsFeed: Send {
    type Panel: DetailPanel;

    /// Number of listing entries currently loaded in the feed
    async fn loaded_count(&mut self) -> FeedResult<usize>;

    /// Open the listing at `index`. `Ok(false)` when the index is not loaded.
    async fn open_listing(&mut self, index: usize) -> FeedResult<bool>;

    /// Scroll the feed to its end so the page loads more entries
    async fn scroll_to_end(&mut self) -> FeedResult<()>;

    /// Detail view of the listing opened last
    fn panel(&self) -> &Self::Panel;

    /// Release the underlying browser. Called exactly once, after saving.
    async fn release(&mut self);
}

/// State of one extraction run
#[derive(Debug)]
pub struct ExtractionSession {
    /// Append-only, in visit order
    pub results: Vec<ListingRecord>,
    /// Indices extracted successfully
    pub processed: HashSet<usize>,
    /// Indices visited, whether or not extraction succeeded
    pub attempted: HashSet<usize>,
    /// Operator supplied label used for file names and metadata
    pub query: Option<String>,
    stop: CancellationToken,
}

impl ExtractionSession {
    pub fn new(query: Option<String>, stop: CancellationToken) -> Self {
        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        Self {
            results: Vec::new(),
            processed: HashSet::new(),
            attempted: HashSet::new(),
            query,
            stop,
        }
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Keep `record` if it is named. Returns whether it was kept.
    pub(crate) fn accept(&mut self, index: usize, record: ListingRecord) -> bool {
        if !record.has_name() {
            return false;
        }
        self.results.push(record);
        self.processed.insert(index);
        true
    }

    /// Whether any index below `loaded` has not been visited yet
    pub fn has_unattempted(&self, loaded: usize) -> bool {
        (0..loaded).any(|i| !self.attempted.contains(&i))
    }
}
