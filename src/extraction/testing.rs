//! In-memory feed, panel and sink for exercising the extraction loop

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::parser::PRIMARY_NAME_SELECTOR;
use super::{
    DetailPanel, FeedError, FeedResult, ListingRecord, PanelElement, PanelError, PanelResult,
    ResultsFeed,
};
use crate::export::{ResultSink, SaveKind, SaveRequest, SinkError};

#[derive(Debug, Clone, Default)]
pub(crate) struct FakePanel {
    texts: HashMap<String, String>,
    attributes: HashMap<(String, String), String>,
    elements: HashMap<String, Vec<PanelElement>>,
    failing: HashSet<String>,
}

impl FakePanel {
    pub(crate) fn named(name: &str) -> Self {
        Self::default().with_text(PRIMARY_NAME_SELECTOR, name)
    }

    pub(crate) fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.into(), text.into());
        self
    }

    pub(crate) fn with_attribute(mut self, selector: &str, attribute: &str, value: &str) -> Self {
        self.attributes
            .insert((selector.into(), attribute.into()), value.into());
        self
    }

    pub(crate) fn with_elements(mut self, selector: &str, elements: Vec<PanelElement>) -> Self {
        self.elements.insert(selector.into(), elements);
        self
    }

    pub(crate) fn failing(mut self, selector: &str) -> Self {
        self.failing.insert(selector.into());
        self
    }

    fn check(&self, selector: &str) -> PanelResult<()> {
        if self.failing.contains(selector) {
            Err(PanelError::new(selector, "node is detached from document"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DetailPanel for FakePanel {
    async fn first_text(&self, selector: &str) -> PanelResult<Option<String>> {
        self.check(selector)?;
        Ok(self.texts.get(selector).cloned())
    }

    async fn first_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> PanelResult<Option<String>> {
        self.check(selector)?;
        Ok(self
            .attributes
            .get(&(selector.to_string(), attribute.to_string()))
            .cloned())
    }

    async fn elements(&self, selector: &str) -> PanelResult<Vec<PanelElement>> {
        self.check(selector)?;
        Ok(self.elements.get(selector).cloned().unwrap_or_default())
    }
}

/// Shared, ordered log of feed and sink events
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

/// A results list of `listings` of which `loaded` are visible. Each scroll
/// reveals `growth_per_scroll` more.
pub(crate) struct FakeFeed {
    listings: Vec<Option<String>>,
    loaded: usize,
    growth_per_scroll: usize,
    panel: FakePanel,
    open_errors: HashMap<usize, FeedError>,
    scroll_error: Option<FeedError>,
    stop_on_open: Option<(usize, CancellationToken)>,
    panic_on_open: Option<usize>,
    /// Keyed by 1-based `loaded_count` call number
    count_errors: HashMap<usize, FeedError>,
    count_calls: usize,
    dead_after: Option<(usize, FeedError)>,
    pub(crate) opened: Vec<usize>,
    pub(crate) scrolls: usize,
    pub(crate) log: EventLog,
}

impl FakeFeed {
    /// `listings[i]` is the name shown for listing `i`; `None` for an unnamed one
    pub(crate) fn new(listings: Vec<Option<&str>>, loaded: usize) -> Self {
        Self {
            listings: listings.into_iter().map(|l| l.map(str::to_string)).collect(),
            loaded,
            growth_per_scroll: 0,
            panel: FakePanel::default(),
            open_errors: HashMap::new(),
            scroll_error: None,
            stop_on_open: None,
            panic_on_open: None,
            count_errors: HashMap::new(),
            count_calls: 0,
            dead_after: None,
            opened: Vec::new(),
            scrolls: 0,
            log: EventLog::default(),
        }
    }

    pub(crate) fn named(count: usize, loaded: usize) -> Self {
        let names: Vec<String> = (0..count).map(|i| format!("Listing {i}")).collect();
        Self::new(names.iter().map(|n| Some(n.as_str())).collect(), loaded)
    }

    pub(crate) fn growing_by(mut self, per_scroll: usize) -> Self {
        self.growth_per_scroll = per_scroll;
        self
    }

    pub(crate) fn with_open_error(mut self, index: usize, error: FeedError) -> Self {
        self.open_errors.insert(index, error);
        self
    }

    pub(crate) fn with_scroll_error(mut self, error: FeedError) -> Self {
        self.scroll_error = Some(error);
        self
    }

    /// Cancel `token` while the `nth` listing (1-based) is being opened
    pub(crate) fn stopping_on_open(mut self, nth: usize, token: CancellationToken) -> Self {
        self.stop_on_open = Some((nth, token));
        self
    }

    pub(crate) fn panicking_on_open(mut self, index: usize) -> Self {
        self.panic_on_open = Some(index);
        self
    }

    /// Fail the `call`-th `loaded_count` (1-based) once with `error`
    pub(crate) fn with_count_error(mut self, call: usize, error: FeedError) -> Self {
        self.count_errors.insert(call, error);
        self
    }

    /// After `opens` listings were opened, every feed call fails with `error`
    pub(crate) fn dying_after(mut self, opens: usize, error: FeedError) -> Self {
        self.dead_after = Some((opens, error));
        self
    }

    fn check_alive(&self) -> FeedResult<()> {
        match &self.dead_after {
            Some((opens, error)) if self.opened.len() >= *opens => Err(error.clone()),
            _ => Ok(()),
        }
    }

    pub(crate) fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ResultsFeed for FakeFeed {
    type Panel = FakePanel;

    async fn loaded_count(&mut self) -> FeedResult<usize> {
        self.check_alive()?;
        self.count_calls += 1;
        if let Some(error) = self.count_errors.remove(&self.count_calls) {
            return Err(error);
        }
        Ok(self.loaded)
    }

    async fn open_listing(&mut self, index: usize) -> FeedResult<bool> {
        self.check_alive()?;
        if index >= self.loaded {
            return Ok(false);
        }
        if self.panic_on_open == Some(index) {
            panic!("listing {index} blew up");
        }
        self.opened.push(index);
        self.record(format!("open:{index}"));

        if let Some((nth, token)) = &self.stop_on_open
            && self.opened.len() == *nth
        {
            token.cancel();
        }
        if let Some(error) = self.open_errors.get(&index) {
            return Err(error.clone());
        }

        self.panel = match &self.listings[index] {
            Some(name) => FakePanel::named(name),
            None => FakePanel::default(),
        };
        Ok(true)
    }

    async fn scroll_to_end(&mut self) -> FeedResult<()> {
        self.scrolls += 1;
        self.record("scroll".into());
        self.check_alive()?;
        if let Some(error) = &self.scroll_error {
            return Err(error.clone());
        }
        self.loaded = (self.loaded + self.growth_per_scroll).min(self.listings.len());
        Ok(())
    }

    fn panel(&self) -> &FakePanel {
        &self.panel
    }

    async fn release(&mut self) {
        self.record("release".into());
    }
}

/// Sink that remembers what it was asked to save
#[derive(Default)]
pub(crate) struct FakeSink {
    pub(crate) saves: Mutex<Vec<(SaveKind, Vec<ListingRecord>)>>,
    pub(crate) log: EventLog,
    pub(crate) fail: bool,
}

impl FakeSink {
    pub(crate) fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }
}

impl ResultSink for FakeSink {
    fn save(&self, records: &[ListingRecord], request: &SaveRequest) -> Result<PathBuf, SinkError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("save:{}", records.len()));
        if self.fail {
            return Err(SinkError::Io(std::io::Error::other("disk full")));
        }
        self.saves
            .lock()
            .unwrap()
            .push((request.kind, records.to_vec()));
        Ok(PathBuf::from(format!("results_{}.xlsx", records.len())))
    }
}
