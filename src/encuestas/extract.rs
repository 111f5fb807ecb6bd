use super::{Department, Site, Subject, TermRow};
use crate::navigator::find_visible;
use crate::utils::normalize_text;
use crate::Fault;
use lazy_regex::{regex, regex_captures};
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

const E: &str = "Invalid selector";
lazy_static! {
    static ref LIST: Selector = Selector::parse(r#"ul[class="list"]"#).expect(E);
    static ref LI: Selector = Selector::parse("li").expect(E);
    static ref A: Selector = Selector::parse("a").expect(E);
    static ref PAGINATION: Selector =
        Selector::parse(r#"div[class="head"] a[onclick*="lst"]"#).expect(E);
    static ref B: Selector = Selector::parse("b").expect(E);
    static ref TERM_ROWS: Selector =
        Selector::parse(r#"table[class="inline"] tr[id^="u"]"#).expect(E);
    static ref DISCLOSURE: Selector = Selector::parse(r#"a[onclick*="pbca(this,"]"#).expect(E);
    static ref COMMENT: Selector = Selector::parse(r#"div[class="cm"]"#).expect(E);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCount {
    Known(usize),
    Unknown,
}

impl PageCount {
    /// Number of pages to visit. `cap` only bounds exploration of an unknown count.
    pub fn limit(self, cap: usize) -> usize {
        match self {
            PageCount::Known(n) => n,
            PageCount::Unknown => cap,
        }
    }

    pub fn known(self) -> Option<usize> {
        match self {
            PageCount::Known(n) => Some(n),
            PageCount::Unknown => None,
        }
    }
}

/// Infers the page total from the `lst('<list>', N)` handlers of the page
/// index controls. Indices are 0-based.
pub fn discover_page_count(doc: &Html, list_name: &str) -> PageCount {
    let max_index = doc
        .select(&PAGINATION)
        .filter_map(|a| a.value().attr("onclick"))
        .filter_map(|onclick| {
            let (_, list, index) = regex_captures!(r"lst\('(\w+)',\s*(\d+)\)", onclick)?;
            if list != list_name {
                return None;
            }
            index.parse::<usize>().ok()
        })
        .max();

    match max_index {
        Some(index) => {
            debug!("Total pages: {}", index + 1);
            PageCount::Known(index + 1)
        }
        None => PageCount::Unknown,
    }
}

pub fn has_listing(doc: &Html) -> bool {
    doc.select(&LIST).next().is_some()
}

/// Subjects of one listing page, in document order.
pub fn extract_subjects(doc: &Html, site: &Site) -> Result<Vec<Subject>, Fault> {
    let list = doc
        .select(&LIST)
        .next()
        .ok_or_else(|| Fault::NotFound("subject list".to_string()))?;

    let mut subjects = vec![];
    for (position, item) in list.select(&LI).enumerate() {
        let Some(anchor) = item.select(&A).next() else {
            warn!(position, "Listing entry without link: {:?}", normalize_text(item.text()));
            continue;
        };
        let name = normalize_text(anchor.text());
        let Some(href) = anchor.value().attr("href") else {
            warn!(position, "Listing entry {:?} has no href", name);
            continue;
        };
        match site.resolve(href) {
            Ok(url) => subjects.push(Subject { name, url }),
            Err(e) => warn!(position, "Listing entry {:?} has bad href {:?}: {}", name, href, e),
        }
    }
    Ok(subjects)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectDetail {
    pub department: Department,
    pub rows: Vec<TermRow>,
}

pub fn extract_subject_detail(doc: &Html, site: &Site) -> SubjectDetail {
    SubjectDetail {
        department: extract_department(doc, site),
        rows: extract_term_rows(doc),
    }
}

/// The link that follows the `Departamento:` label; empty when absent.
fn extract_department(doc: &Html, site: &Site) -> Department {
    let link = doc
        .select(&B)
        .find(|b| b.text().any(|t| t.contains("Departamento:")))
        .and_then(|label| {
            label
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "a")
        });

    let Some(link) = link else {
        return Department::default();
    };
    let url = link
        .value()
        .attr("href")
        .and_then(|href| site.resolve(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_default();
    Department {
        name: normalize_text(link.text()),
        url,
    }
}

fn extract_term_rows(doc: &Html) -> Vec<TermRow> {
    doc.select(&TERM_ROWS).map(extract_term_row).collect()
}

fn extract_term_row(row: ElementRef<'_>) -> TermRow {
    let element_id = row.value().id().unwrap_or_default().to_string();
    let term_label = row
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")
        .map(|td| normalize_text(td.text()))
        .unwrap_or_default();

    let Some(link) = row.select(&DISCLOSURE).next() else {
        warn!(row = %element_id, "Term row {:?} has no comments link", term_label);
        return TermRow {
            term_label,
            row_id: None,
            reported_comments: 0,
            element_id,
        };
    };

    let row_id = link
        .value()
        .attr("onclick")
        .and_then(|onclick| regex_captures!(r"pbca\(this,\s*(\d+)\)", onclick))
        .map(|(_, id)| id.to_string());
    if row_id.is_none() {
        warn!(row = %element_id, "Could not read row id for term {:?}", term_label);
    }

    let link_text = normalize_text(link.text());
    let reported_comments = regex!(r"ver (\d+) comentarios?")
        .captures(&link_text)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0);

    TermRow {
        term_label,
        row_id,
        reported_comments,
        element_id,
    }
}

/// `trcxm<subject_id>u<row_id>`
pub fn container_id(subject_id: &str, row_id: &str) -> String {
    format!("trcxm{subject_id}u{row_id}")
}

pub(crate) fn container_selector(container_id: &str) -> Result<Selector, Fault> {
    Selector::parse(&format!(r#"[id="{container_id}"]"#))
        .map_err(|e| Fault::Unexpected(format!("bad container id {container_id:?}: {e}")))
}

pub(crate) fn container_visible(doc: &Html, selector: &Selector) -> bool {
    find_visible(doc, selector).is_some()
}

/// Texts of the comment blocks inside the container, `None` if it is not rendered.
pub(crate) fn extract_comments(doc: &Html, selector: &Selector) -> Option<Vec<String>> {
    let container = doc.select(selector).next()?;
    Some(
        container
            .select(&COMMENT)
            .map(|cm| normalize_text(cm.text()))
            .collect(),
    )
}
