use scraper::{ElementRef, Html, Selector};

use crate::domain::{parse_rating, parse_review_count, PageKind, SearchResult};

// Selector precedence is a declared constant, most specific first. Layout
// drift fixes land here and get validated against the fixtures below.
const ORGANIC_CONTAINER_SELECTORS: &[&str] = &["div.g", "div.tF2Cxc", "div.MjjYud"];
const ORGANIC_TITLE_SELECTORS: &[&str] = &["h3", "div[role='heading']"];
const ORGANIC_LINK_SELECTORS: &[&str] = &["a[href]"];
const ORGANIC_SNIPPET_SELECTORS: &[&str] = &["div.VwiC3b", "div[data-sncf='1']", "span.aCOpRe"];

const MAP_CONTAINER_SELECTORS: &[&str] = &["div.VkpGBb", "div.uMdZh", "div.rllt__details"];
const MAP_TITLE_SELECTORS: &[&str] = &["div.dbg0pd", "span.OSrXXb", "div[role='heading']"];
const MAP_LINK_SELECTORS: &[&str] = &["a.yYlJEf", "a[href]"];
const MAP_RATING_SELECTORS: &[&str] = &["span.yi40Hd", "span.BTtC6e"];
const MAP_REVIEW_SELECTORS: &[&str] = &["span.RDApEe", "span.UY7F9"];
const MAP_ADDRESS_SELECTORS: &[&str] = &["span.LrzXr", "div.rllt__details div:nth-of-type(3)"];

/// Parses rendered result pages into ordered records. Pure: no network, no
/// timing, so layout fixes stay testable against saved fixtures.
pub struct ResultExtractor;

impl ResultExtractor {
    /// Every detected container yields a record, sentinel-filled on selector
    /// misses, so `position` always reflects document order.
    pub fn extract(html: &str, page_kind: PageKind) -> Vec<SearchResult> {
        let document = Html::parse_document(html);
        let containers = select_containers(&document, page_kind);

        containers
            .iter()
            .enumerate()
            .map(|(index, container)| {
                let position = index as u32 + 1;
                match page_kind {
                    PageKind::OrganicSearch => organic_record(position, container),
                    PageKind::MapListing => map_record(position, container),
                }
            })
            .collect()
    }
}

fn select_containers<'a>(document: &'a Html, page_kind: PageKind) -> Vec<ElementRef<'a>> {
    let selectors = match page_kind {
        PageKind::OrganicSearch => ORGANIC_CONTAINER_SELECTORS,
        PageKind::MapListing => MAP_CONTAINER_SELECTORS,
    };

    for raw in selectors {
        let selector = Selector::parse(raw).unwrap();
        let matches: Vec<ElementRef> = document.select(&selector).collect();
        if !matches.is_empty() {
            return matches;
        }
    }

    vec![]
}

fn organic_record(position: u32, container: &ElementRef) -> SearchResult {
    let mut record = SearchResult::empty_at(position);
    record.title = first_text(container, ORGANIC_TITLE_SELECTORS);
    record.url = first_link(container, ORGANIC_LINK_SELECTORS);
    record.snippet = first_text(container, ORGANIC_SNIPPET_SELECTORS);
    record
}

fn map_record(position: u32, container: &ElementRef) -> SearchResult {
    let mut record = SearchResult::empty_at(position);
    record.title = first_text(container, MAP_TITLE_SELECTORS);
    record.url = first_link(container, MAP_LINK_SELECTORS);
    record.rating = first_text(container, MAP_RATING_SELECTORS)
        .as_deref()
        .and_then(parse_rating);
    record.review_count = first_text(container, MAP_REVIEW_SELECTORS)
        .as_deref()
        .and_then(parse_review_count);
    record.address = first_text(container, MAP_ADDRESS_SELECTORS);

    let (category, address_fallback) = category_and_address_line(container);
    record.category = category;
    if record.address.is_none() {
        record.address = address_fallback;
    }

    record
}

/// First selector whose match has non-empty text wins; exhaustion is a miss,
/// not an error.
fn first_text(container: &ElementRef, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let selector = Selector::parse(raw).unwrap();
        if let Some(element) = container.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn first_link(container: &ElementRef, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let selector = Selector::parse(raw).unwrap();
        for anchor in container.select(&selector) {
            if let Some(href) = anchor.value().attr("href") {
                if let Some(normalized) = normalize_href(href) {
                    return Some(normalized);
                }
            }
        }
    }
    None
}

/// Result links come either absolute or wrapped as `/url?q=<target>&...`.
fn normalize_href(href: &str) -> Option<String> {
    if let Some(wrapped) = href.strip_prefix("/url?q=") {
        let target = wrapped.split('&').next().unwrap_or(wrapped);
        return match url::Url::parse(target) {
            Ok(_) => Some(target.to_string()),
            Err(_) => None,
        };
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }

    None
}

/// Local listings carry "Category · Address" as one text line. Used as the
/// declared fallback when the dedicated selectors miss.
fn category_and_address_line(container: &ElementRef) -> (Option<String>, Option<String>) {
    let text = container.text().collect::<Vec<_>>().join("\n");

    for line in text.lines() {
        let line = line.trim();
        if let Some((category, address)) = line.split_once(" · ") {
            let category = category.trim();
            let address = address.trim();
            // Rating lines also use the dot separator; skip anything numeric.
            if category.is_empty() || category.chars().next().unwrap().is_ascii_digit() {
                continue;
            }
            return (
                Some(category.to_string()),
                if address.is_empty() {
                    None
                } else {
                    Some(address.to_string())
                },
            );
        }
    }

    (None, None)
}
