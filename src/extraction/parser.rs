//! Detail panel parsing
//!
//! Each field has an ordered table of strategies. A strategy reads one piece
//! of the panel (a selector's text, an attribute, an info button, ...) and
//! refines it; the first strategy yielding a value wins. Strategies fail in
//! isolation: a broken query for one field never affects another.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::record::{ListingRecord, MIN_PHONE_DIGITS};

pub(crate) const PRIMARY_NAME_SELECTOR: &str = "h1.DUwDvf.fontHeadlineLarge";
const NAME_SELECTORS: [&str; 4] = [
    PRIMARY_NAME_SELECTOR,
    r#"h1[class*="fontHeadlineLarge"]"#,
    "h1.DUwDvf",
    r#"[role="main"] h1"#,
];
pub(crate) const INFO_ITEM_SELECTOR: &str =
    "button[data-item-id], button[data-tooltip], a[data-item-id]";
pub(crate) const TEL_LINK_SELECTOR: &str = r#"a[href^="tel:"]"#;
pub(crate) const MAIN_PANEL_SELECTOR: &str = r#"div[role="main"]"#;
pub(crate) const RATING_LABEL_SELECTOR: &str = r#"span[role="img"][aria-label*="stars"]"#;
pub(crate) const REVIEW_COUNT_SELECTOR: &str = "span.UY7F9 a span";

static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\+?\(?[0-9]{1,3}\)?[-\s.]?\(?[0-9]{1,4}\)?[-\s.]?[0-9]{1,4}[-\s.]?[0-9]{1,9}",
        r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b",
        r"\b\d{10}\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static phone pattern"))
    .collect()
});

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("static email pattern")
});

static DECIMAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("static decimal pattern"));

static GROUPED_INTEGER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d,]*").expect("static integer pattern"));

/// A DOM query against the detail panel failed
#[derive(Error, Debug, Clone)]
#[error("Panel query '{selector}' failed: {message}")]
pub struct PanelError {
    pub selector: String,
    pub message: String,
}

impl PanelError {
    pub fn new(selector: &str, cause: impl std::fmt::Display) -> Self {
        Self {
            selector: selector.to_string(),
            message: cause.to_string(),
        }
    }
}

pub type PanelResult<T> = Result<T, PanelError>;

/// Attributes of an element the parser cares about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelElement {
    pub item_id: Option<String>,
    pub aria_label: Option<String>,
    pub text: Option<String>,
    pub href: Option<String>,
}

impl PanelElement {
    /// Whether the element's item id or accessible label mentions `marker`
    fn tagged(&self, marker: &str) -> bool {
        [&self.item_id, &self.aria_label]
            .into_iter()
            .flatten()
            .any(|value| value.to_lowercase().contains(marker))
    }
}

/// Read access to the currently displayed listing's detail view
#[async_trait]
pub trait DetailPanel: Send + Sync {
    /// Visible text of the first element matching `selector`
    async fn first_text(&self, selector: &str) -> PanelResult<Option<String>>;

    /// `attribute` of the first element matching `selector`
    async fn first_attribute(&self, selector: &str, attribute: &str)
    -> PanelResult<Option<String>>;

    /// All elements matching `selector`
    async fn elements(&self, selector: &str) -> PanelResult<Vec<PanelElement>>;
}

/// Fields of a [`ListingRecord`], in spreadsheet column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Phone,
    Email,
    Website,
    Address,
    Rating,
    ReviewsCount,
    Category,
    Hours,
    PriceLevel,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Name,
        Field::Phone,
        Field::Email,
        Field::Website,
        Field::Address,
        Field::Rating,
        Field::ReviewsCount,
        Field::Category,
        Field::Hours,
        Field::PriceLevel,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Phone => "phone",
            Field::Email => "email",
            Field::Website => "website",
            Field::Address => "address",
            Field::Rating => "rating",
            Field::ReviewsCount => "reviews_count",
            Field::Category => "category",
            Field::Hours => "hours",
            Field::PriceLevel => "price_level",
        }
    }

    fn strategies(self) -> &'static [Strategy] {
        match self {
            Field::Name => NAME_STRATEGIES,
            Field::Phone => PHONE_STRATEGIES,
            Field::Email => EMAIL_STRATEGIES,
            Field::Website => WEBSITE_STRATEGIES,
            Field::Address => ADDRESS_STRATEGIES,
            Field::Rating => RATING_STRATEGIES,
            Field::ReviewsCount => REVIEW_COUNT_STRATEGIES,
            Field::Category => CATEGORY_STRATEGIES,
            Field::Hours => HOURS_STRATEGIES,
            Field::PriceLevel => PRICE_STRATEGIES,
        }
    }
}

/// Result of extracting one field
#[derive(Debug, Clone)]
pub enum FieldOutcome {
    Found(String),
    /// Every strategy ran cleanly and none produced a value
    Absent,
    /// Nothing found and at least one strategy errored (last error kept)
    Failed(PanelError),
}

impl FieldOutcome {
    pub fn value(self) -> Option<String> {
        match self {
            FieldOutcome::Found(value) => Some(value),
            FieldOutcome::Absent | FieldOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Text(&'static str),
    Attribute(&'static str, &'static str),
    /// Accessible label of an info button tagged with the marker, after its colon
    InfoLabel(&'static str),
    /// Visible text of an info button tagged with the marker
    InfoText(&'static str),
    TelLink,
}

struct Strategy {
    source: Source,
    refine: fn(&str) -> Option<String>,
}

const fn text(selector: &'static str, refine: fn(&str) -> Option<String>) -> Strategy {
    Strategy { source: Source::Text(selector), refine }
}

static NAME_STRATEGIES: &[Strategy] = &[
    text(NAME_SELECTORS[0], non_empty),
    text(NAME_SELECTORS[1], non_empty),
    text(NAME_SELECTORS[2], non_empty),
    text(NAME_SELECTORS[3], non_empty),
];

static PHONE_STRATEGIES: &[Strategy] = &[
    Strategy { source: Source::InfoLabel("phone"), refine: non_empty },
    Strategy { source: Source::InfoText("phone"), refine: phone_in_text },
    Strategy { source: Source::TelLink, refine: strip_call_prefix },
];

static EMAIL_STRATEGIES: &[Strategy] = &[text(MAIN_PANEL_SELECTOR, email_in_text)];

static WEBSITE_STRATEGIES: &[Strategy] = &[
    Strategy { source: Source::InfoText("website"), refine: website_like },
];

static ADDRESS_STRATEGIES: &[Strategy] = &[
    Strategy { source: Source::InfoLabel("address"), refine: non_empty },
    Strategy { source: Source::InfoText("address"), refine: non_empty },
];

static RATING_STRATEGIES: &[Strategy] = &[
    Strategy { source: Source::Attribute(RATING_LABEL_SELECTOR, "aria-label"), refine: star_rating },
    text("span.MW4etd", star_rating),
];

static REVIEW_COUNT_STRATEGIES: &[Strategy] = &[
    text(REVIEW_COUNT_SELECTOR, review_count),
    text(".UY7F9", review_count),
];

static CATEGORY_STRATEGIES: &[Strategy] = &[
    text(r#"button[jsaction*="category"] .DkEaL"#, non_empty),
    text(".DkEaL", non_empty),
];

static HOURS_STRATEGIES: &[Strategy] = &[
    text(r#"[data-item-id="oh"] .fontBodyMedium"#, non_empty),
    text(".t39EBf .fontBodyMedium", non_empty),
];

static PRICE_STRATEGIES: &[Strategy] = &[
    Strategy { source: Source::Attribute(r#"span[aria-label*="Price"]"#, "aria-label"), refine: price_tier },
    text(".mgr77e .fontBodyMedium", price_tier),
];

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn digit_count(value: &str) -> usize {
    value.chars().filter(|c| c.is_ascii_digit()).count()
}

/// First phone-shaped match with enough digits, trying patterns in order
fn phone_in_text(raw: &str) -> Option<String> {
    PHONE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .find_iter(raw)
            .map(|m| m.as_str().trim())
            .find(|candidate| digit_count(candidate) >= MIN_PHONE_DIGITS)
            .map(str::to_string)
    })
}

/// `tel:+15551234567` -> `+15551234567`
fn strip_call_prefix(raw: &str) -> Option<String> {
    non_empty(raw.trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '+')))
}

fn email_in_text(raw: &str) -> Option<String> {
    EMAIL_PATTERN.find(raw).map(|m| m.as_str().to_string())
}

fn website_like(raw: &str) -> Option<String> {
    non_empty(raw).filter(|text| text.contains('.') || text.to_lowercase().contains("http"))
}

/// First decimal number, kept only on the 0-5 star scale
fn star_rating(raw: &str) -> Option<String> {
    let number = DECIMAL_PATTERN.find(raw)?.as_str();
    let rating: f64 = number.parse().ok()?;
    (0.0..=5.0).contains(&rating).then(|| number.to_string())
}

/// `(1,234)` -> `1234`
fn review_count(raw: &str) -> Option<String> {
    let digits = GROUPED_INTEGER_PATTERN.find(raw)?.as_str().replace(',', "");
    digits.parse::<u64>().ok().map(|count| count.to_string())
}

fn price_tier(raw: &str) -> Option<String> {
    non_empty(raw).filter(|text| text.contains('$'))
}

/// Per-parse view of the panel; the info buttons are fetched at most once
struct ParseScope<'p, P: DetailPanel + ?Sized> {
    panel: &'p P,
    info_items: OnceCell<PanelResult<Vec<PanelElement>>>,
}

impl<'p, P: DetailPanel + ?Sized> ParseScope<'p, P> {
    fn new(panel: &'p P) -> Self {
        Self {
            panel,
            info_items: OnceCell::new(),
        }
    }

    async fn info_items(&self) -> PanelResult<&[PanelElement]> {
        let items = self
            .info_items
            .get_or_init(|| self.panel.elements(INFO_ITEM_SELECTOR))
            .await;
        match items {
            Ok(items) => Ok(items.as_slice()),
            Err(e) => Err(e.clone()),
        }
    }

    async fn read(&self, source: Source) -> PanelResult<Vec<String>> {
        let values = match source {
            Source::Text(selector) => self.panel.first_text(selector).await?.into_iter().collect(),
            Source::Attribute(selector, attribute) => self
                .panel
                .first_attribute(selector, attribute)
                .await?
                .into_iter()
                .collect(),
            Source::InfoLabel(marker) => self
                .info_items()
                .await?
                .iter()
                .filter(|item| item.tagged(marker))
                .filter_map(|item| item.aria_label.as_deref())
                .filter_map(|label| label.split_once(':').map(|(_, rest)| rest.to_string()))
                .collect(),
            Source::InfoText(marker) => self
                .info_items()
                .await?
                .iter()
                .filter(|item| item.tagged(marker))
                .filter_map(|item| item.text.clone())
                .collect(),
            Source::TelLink => self
                .panel
                .elements(TEL_LINK_SELECTOR)
                .await?
                .into_iter()
                .filter_map(|link| link.href)
                .take(1)
                .collect(),
        };
        Ok(values)
    }

    async fn extract(&self, field: Field) -> FieldOutcome {
        let mut last_error = None;

        for strategy in field.strategies() {
            match self.read(strategy.source).await {
                Ok(candidates) => {
                    if let Some(value) = candidates.iter().find_map(|c| (strategy.refine)(c)) {
                        return FieldOutcome::Found(value);
                    }
                }
                Err(e) => {
                    debug!("{} strategy {:?} failed: {}", field.column_name(), strategy.source, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => FieldOutcome::Failed(e),
            None => FieldOutcome::Absent,
        }
    }
}

/// Turns the open detail panel into a [`ListingRecord`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DetailParser;

impl DetailParser {
    pub fn new() -> Self {
        Self
    }

    /// Run one field's strategy table
    pub async fn extract_field<P: DetailPanel + ?Sized>(&self, panel: &P, field: Field) -> FieldOutcome {
        ParseScope::new(panel).extract(field).await
    }

    /// Build a record from the panel. Never fails; unreadable fields stay `None`.
    pub async fn parse<P: DetailPanel + ?Sized>(&self, panel: &P) -> ListingRecord {
        let scope = ParseScope::new(panel);
        let mut record = ListingRecord::default();

        for field in Field::ALL {
            let value = scope.extract(field).await.value();
            match field {
                Field::Name => record.name = value,
                Field::Phone => record.phone = value,
                Field::Email => record.email = value,
                Field::Website => record.website = value,
                Field::Address => record.address = value,
                Field::Rating => record.rating = value.and_then(|v| v.parse().ok()),
                Field::ReviewsCount => record.reviews_count = value.and_then(|v| v.parse().ok()),
                Field::Category => record.category = value,
                Field::Hours => record.hours = value,
                Field::PriceLevel => record.price_level = value,
            }
        }

        info!(
            "Extracted: {} - Phone: {}",
            record.display_name(),
            record.phone.as_deref().unwrap_or("N/A")
        );
        if let Ok(json) = serde_json::to_string(&record) {
            debug!("Parsed listing: {}", json);
        }

        record
    }
}
