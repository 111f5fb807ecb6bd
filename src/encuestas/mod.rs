mod comments;
mod crawler;
mod data;
mod extract;

pub use comments::{emit_placeholder, CommentRevealer, RowContext, RowOutcome};
pub use crawler::{CrawlReport, CrawlSettings, CrawlSummary, Crawler};
pub use data::{RecordTable, SqliteSink};
pub use extract::{
    container_id, discover_page_count, extract_subject_detail, extract_subjects, has_listing,
    PageCount, SubjectDetail,
};

use crate::CrawlerError;
use lazy_regex::regex_captures;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

pub const URL_BASE: &str = "https://encuestas-finales.exactas.uba.ar/";
pub const LISTING_PATH: &str = "mates.html";
pub const LIST_NAME: &str = "mats";

/// Addressing of the surveyed site: where the listing lives and how its pages are named.
#[derive(Debug, Clone)]
pub struct Site {
    base: Url,
    listing: Url,
    list_name: String,
}

impl Site {
    pub fn new(base: &str, listing_path: &str, list_name: &str) -> Result<Self, CrawlerError> {
        let base = Url::parse(base)?;
        let listing = base.join(listing_path)?;
        Ok(Site {
            base,
            listing,
            list_name: list_name.to_string(),
        })
    }

    pub fn listing_url(&self) -> &Url {
        &self.listing
    }

    pub fn list_name(&self) -> &str {
        &self.list_name
    }

    /// `<listing_url>#l_<list_name>_<index>`, 0-based.
    pub fn page_url(&self, index: usize) -> String {
        let mut url = self.listing.clone();
        url.set_fragment(Some(&format!("l_{}_{}", self.list_name, index)));
        url.to_string()
    }

    pub fn resolve(&self, href: &str) -> Result<Url, CrawlerError> {
        Ok(self.base.join(href.trim())?)
    }
}

impl Default for Site {
    fn default() -> Self {
        Site::new(URL_BASE, LISTING_PATH, LIST_NAME).expect("Invalid default site")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub url: Url,
}

impl Subject {
    /// Numeric identifier from the `m<digits>.html` file name.
    pub fn numeric_id(&self) -> Option<String> {
        let file = self.url.path_segments()?.next_back()?;
        regex_captures!(r"m(\d+)\.html$", file).map(|(_, id)| id.to_string())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Department {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermRow {
    pub term_label: String,
    pub row_id: Option<String>,
    pub reported_comments: usize,
    /// `id` attribute of the row element, used to address its disclosure control.
    pub element_id: String,
}

impl TermRow {
    pub fn action_selector(&self) -> String {
        format!(r#"table.inline tr[id="{}"] a[onclick*="pbca(this,"]"#, self.element_id)
    }

    pub fn row_id_or_empty(&self) -> &str {
        self.row_id.as_deref().unwrap_or_default()
    }
}

pub const RECORD_HEADERS: [&str; 7] = [
    "Term",
    "Department",
    "DepartmentURL",
    "Subject",
    "SubjectURL",
    "RowID",
    "Comment",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Term")]
    pub term_label: String,
    #[serde(rename = "Department")]
    pub department_name: String,
    #[serde(rename = "DepartmentURL")]
    pub department_url: String,
    #[serde(rename = "Subject")]
    pub subject_name: String,
    #[serde(rename = "SubjectURL")]
    pub subject_url: String,
    #[serde(rename = "RowID")]
    pub row_id: String,
    #[serde(rename = "Comment")]
    pub comment_text: String,
}

impl Record {
    pub fn seen_key(&self) -> SeenKey {
        SeenKey {
            subject_url: self.subject_url.clone(),
            row_id: self.row_id.clone(),
            comment_text: self.comment_text.clone(),
        }
    }
}

/// Deduplication identity of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeenKey {
    pub subject_url: String,
    pub row_id: String,
    pub comment_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn page_urls_use_fragment_addressing() {
        let site = Site::default();
        assert_eq!(
            site.listing_url().as_str(),
            "https://encuestas-finales.exactas.uba.ar/mates.html"
        );
        assert_eq!(
            site.page_url(0),
            "https://encuestas-finales.exactas.uba.ar/mates.html#l_mats_0"
        );
        assert_eq!(
            site.page_url(12),
            "https://encuestas-finales.exactas.uba.ar/mates.html#l_mats_12"
        );
    }

    #[test]
    fn subject_numeric_id() {
        let site = Site::default();
        let subject = Subject {
            name: "Algebra I".to_string(),
            url: site.resolve("m1234.html").unwrap(),
        };
        assert_eq!(subject.numeric_id().as_deref(), Some("1234"));

        let odd = Subject {
            name: "Odd".to_string(),
            url: site.resolve("materia.html").unwrap(),
        };
        assert_eq!(odd.numeric_id(), None);

        let prefixed = Subject {
            name: "Prefixed".to_string(),
            url: site.resolve("xm12.html").unwrap(),
        };
        assert_eq!(prefixed.numeric_id().as_deref(), Some("12"));
    }

    #[test]
    fn action_selector_addresses_row() {
        let row = TermRow {
            term_label: "1c2023".to_string(),
            row_id: Some("77".to_string()),
            reported_comments: 2,
            element_id: "u77".to_string(),
        };
        assert_eq!(
            row.action_selector(),
            r#"table.inline tr[id="u77"] a[onclick*="pbca(this,"]"#
        );
        assert!(scraper::Selector::parse(&row.action_selector()).is_ok());
    }
}
