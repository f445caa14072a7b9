use serde::Deserialize;
use url::Url;

const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    OrganicSearch,
    MapListing,
}

impl PageKind {
    pub fn label(&self) -> &'static str {
        match self {
            PageKind::OrganicSearch => "organic_search",
            PageKind::MapListing => "map_listing",
        }
    }
}

/// One user request. Built once, never mutated, dropped after its run.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub page_kind: PageKind,
    #[serde(default = "default_target_results")]
    pub target_results: usize,
    pub locale: Option<String>,
    pub country: Option<String>,
    /// Geographic filter for map-style searches, e.g. "Lahore" or "90210".
    pub near: Option<String>,
}

fn default_target_results() -> usize {
    10
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, page_kind: PageKind) -> Self {
        SearchQuery {
            query: query.into(),
            page_kind,
            target_results: default_target_results(),
            locale: None,
            country: None,
            near: None,
        }
    }

    pub fn search_url(&self) -> String {
        let q = match (&self.page_kind, &self.near) {
            (PageKind::MapListing, Some(near)) => format!("{} near {}", self.query, near),
            _ => self.query.clone(),
        };

        let mut url = Url::parse(GOOGLE_SEARCH_URL).unwrap();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &q);
            pairs.append_pair("num", &self.target_results.to_string());
            if self.page_kind == PageKind::MapListing {
                pairs.append_pair("tbm", "lcl");
            }
            if let Some(hl) = &self.locale {
                pairs.append_pair("hl", hl);
            }
            if let Some(gl) = &self.country {
                pairs.append_pair("gl", gl);
            }
        }
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{PageKind, SearchQuery};

    #[test]
    fn organic_url_carries_query_and_locale() {
        let mut query = SearchQuery::new("best green tea", PageKind::OrganicSearch);
        query.locale = Some("en".to_string());
        query.country = Some("pk".to_string());

        let url = query.search_url();

        assert!(url.starts_with("https://www.google.com/search?"));
        assert!(url.contains("q=best+green+tea"));
        assert!(url.contains("hl=en"));
        assert!(url.contains("gl=pk"));
        assert!(!url.contains("tbm=lcl"));
    }

    #[test]
    fn map_url_appends_near_filter_and_local_tab() {
        let mut query = SearchQuery::new("coffee shops", PageKind::MapListing);
        query.near = Some("Karachi".to_string());

        let url = query.search_url();

        assert!(url.contains("q=coffee+shops+near+Karachi"));
        assert!(url.contains("tbm=lcl"));
    }
}
