use crate::extraction::ListingRecord;

/// Aggregate figures for the summary sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryStats {
    pub total: usize,
    pub with_phone: usize,
    pub with_email: usize,
    pub with_website: usize,
    pub with_rating: usize,
    /// 0.0 when no record has a rating
    pub average_rating: f64,
    pub highest_rating: f64,
    pub lowest_rating: f64,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl SummaryStats {
    pub fn from_records(records: &[ListingRecord]) -> Self {
        let ratings: Vec<f64> = records.iter().filter_map(|r| r.rating).collect();

        let (average_rating, highest_rating, lowest_rating) = if ratings.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                ratings.iter().sum::<f64>() / ratings.len() as f64,
                ratings.iter().copied().fold(f64::MIN, f64::max),
                ratings.iter().copied().fold(f64::MAX, f64::min),
            )
        };

        Self {
            total: records.len(),
            with_phone: records.iter().filter(|r| present(&r.phone)).count(),
            with_email: records.iter().filter(|r| present(&r.email)).count(),
            with_website: records.iter().filter(|r| present(&r.website)).count(),
            with_rating: ratings.len(),
            average_rating,
            highest_rating,
            lowest_rating,
        }
    }
}
