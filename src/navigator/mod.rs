mod http;
mod pool;
#[cfg(feature = "webdriver")]
mod webdriver;

pub use http::{HttpFactory, HttpNavigator};
pub use pool::NavigatorPool;
#[cfg(feature = "webdriver")]
pub use webdriver::{WebDriverFactory, WebDriverNavigator};

use rand::seq::IndexedRandom;
use scraper::{ElementRef, Html, Selector};

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:52.0) Gecko/20100101 Firefox/52.0",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Whether the element would be rendered: no `hidden` attribute and no inline
/// `display:none` or `visibility:hidden` on it or any ancestor.
pub fn is_visible(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .all(|node| {
            let value = node.value();
            if value.attr("hidden").is_some() {
                return false;
            }
            match value.attr("style") {
                Some(style) => {
                    let style: String = style
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect::<String>()
                        .to_ascii_lowercase();
                    !style.contains("display:none") && !style.contains("visibility:hidden")
                }
                None => true,
            }
        })
}

/// First element matching `selector` that is visible.
pub fn find_visible<'a>(doc: &'a Html, selector: &Selector) -> Option<ElementRef<'a>> {
    doc.select(selector).find(|el| is_visible(*el))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_follows_ancestors() {
        let doc = Html::parse_document(
            r#"<html><body>
                <div id="shown"><p class="x">a</p></div>
                <div style="display: none"><p id="inner">b</p></div>
                <p id="hidden-attr" hidden>c</p>
                <p id="invisible" style="VISIBILITY:hidden">d</p>
            </body></html>"#,
        );
        let check = |css: &str| {
            let selector = Selector::parse(css).unwrap();
            is_visible(doc.select(&selector).next().unwrap())
        };
        assert!(check("#shown p"));
        assert!(!check("#inner"));
        assert!(!check("#hidden-attr"));
        assert!(!check("#invisible"));
    }

    #[test]
    fn user_agent_is_from_list() {
        assert!(USER_AGENTS.contains(&random_user_agent()));
    }
}
