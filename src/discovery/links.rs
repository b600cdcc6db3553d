//! Hyperlink extraction from outlet homepages

use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn anchor_selector() -> &'static Selector {
    static ANCHOR: OnceLock<Selector> = OnceLock::new();
    ANCHOR.get_or_init(|| Selector::parse("a[href]").expect("Invalid CSS selector: a[href]"))
}

/// Every `a[href]` target in `html`, resolved against `base`
///
/// Only http(s) targets are kept. Fragments are stripped and duplicates
/// removed, keeping the first occurrence in document order.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(anchor_selector()) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let Ok(mut resolved) = base.join(href.trim()) else {
            continue;
        };

        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        resolved.set_fragment(None);
        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}
