use serde::Serialize;

/// One organic result or business listing. Absent fields serialize as
/// explicit nulls so every record downstream has the same shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub position: u32,
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub address: Option<String>,
    pub category: Option<String>,
}

impl SearchResult {
    pub fn empty_at(position: u32) -> Self {
        SearchResult {
            position,
            title: None,
            url: None,
            snippet: None,
            rating: None,
            review_count: None,
            address: None,
            category: None,
        }
    }
}

/// Pull the first numeric token out of rating text like "4.6", "4,6" or
/// "Rated 4.6 out of 5". Out-of-range values are treated as absent rather
/// than propagated.
pub fn parse_rating(raw: &str) -> Option<f32> {
    let cleaned = raw.trim().replace(',', ".");

    let value = cleaned
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .filter(|token| !token.is_empty())
        .find_map(|token| token.parse::<f32>().ok())?;

    if (0.0..=5.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Review counts arrive with locale punctuation: "(1,234)", "1.234", "2 301".
/// Keep the digits, drop the rest.
pub fn parse_review_count(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::{parse_rating, parse_review_count};

    #[test]
    fn rating_accepts_comma_decimal_mark() {
        assert_eq!(parse_rating("4,6"), Some(4.6));
        assert_eq!(parse_rating("4.6"), Some(4.6));
        assert_eq!(parse_rating(" 5.0 "), Some(5.0));
    }

    #[test]
    fn rating_inside_prose_is_found() {
        assert_eq!(parse_rating("Rated 3.8 out of 5"), Some(3.8));
    }

    #[test]
    fn rating_out_of_range_is_absent() {
        assert_eq!(parse_rating("9.4"), None);
        assert_eq!(parse_rating("5.1"), None);
        assert_eq!(parse_rating("47"), None);
    }

    #[test]
    fn rating_garbage_is_absent() {
        assert_eq!(parse_rating(""), None);
        assert_eq!(parse_rating("no rating yet"), None);
    }

    #[test]
    fn review_count_tolerates_locale_punctuation() {
        assert_eq!(parse_review_count("(1,234)"), Some(1234));
        assert_eq!(parse_review_count("1.234"), Some(1234));
        assert_eq!(parse_review_count("2 301 reviews"), Some(2301));
        assert_eq!(parse_review_count("7"), Some(7));
    }

    #[test]
    fn review_count_without_digits_is_absent() {
        assert_eq!(parse_review_count("no reviews"), None);
        assert_eq!(parse_review_count(""), None);
    }
}
