//! Listing record scraped from one detail panel

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum characters (digits and `+`) for a string to count as a phone number
pub const MIN_PHONE_DIGITS: usize = 10;

static NON_PHONE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\d+]").expect("static phone regex"));

/// One map listing. Every field is optional; absent data is left `None`,
/// never guessed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    /// 0.0 ..= 5.0
    pub rating: Option<f64>,
    pub reviews_count: Option<u64>,
    pub category: Option<String>,
    pub hours: Option<String>,
    pub price_level: Option<String>,
}

impl ListingRecord {
    /// Only named records are kept in the result set
    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.trim().is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Strip everything but digits and `+`.
///
/// Returns the stripped form when it is long enough to be a phone number,
/// otherwise the raw input unchanged.
pub fn clean_phone(raw: &str) -> String {
    let cleaned = NON_PHONE_CHARS.replace_all(raw, "");
    if cleaned.len() >= MIN_PHONE_DIGITS {
        cleaned.into_owned()
    } else {
        raw.to_string()
    }
}
