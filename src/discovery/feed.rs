//! Feed URL normalization and entry link extraction

use crate::utils::error::FetchError;
use url::Url;

/// Normalize a catalog feed URL before fetching
///
/// Rewrites `http` to `https` when `force_https` is set and re-serializes the
/// query string with form-urlencoding, so that hand-entered catalog URLs with
/// spaces or stray characters in the query produce one consistent request URL.
pub fn normalize_feed_url(raw: &str, force_https: bool) -> Result<String, FetchError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;

    if force_https && url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|()| FetchError::InvalidUrl(raw.to_string()))?;
    }

    if url.query().is_some_and(|q| !q.is_empty()) {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(url.to_string())
}

/// Entry links of an RSS, Atom or JSON feed, in document order
///
/// Entries without a link fall back to an `http(s)` entry id.
pub fn parse_feed_links(bytes: &[u8]) -> Result<Vec<String>, FetchError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FetchError::Feed(e.to_string()))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            entry
                .links
                .first()
                .map(|link| link.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_forces_https() {
        assert_eq!(
            normalize_feed_url("http://example.com/feed", true).unwrap(),
            "https://example.com/feed"
        );
        assert_eq!(
            normalize_feed_url("http://example.com/feed", false).unwrap(),
            "http://example.com/feed"
        );
    }

    #[test]
    fn test_normalize_reencodes_query() {
        assert_eq!(
            normalize_feed_url("http://example.com/rss?cat=local news&format=xml", true).unwrap(),
            "https://example.com/rss?cat=local+news&format=xml"
        );
        assert_eq!(
            normalize_feed_url("https://example.com/search/?f=rss&t=article&c=news%2Flocal", true)
                .unwrap(),
            "https://example.com/search/?f=rss&t=article&c=news%2Flocal"
        );
    }

    #[test]
    fn test_normalize_invalid() {
        assert!(matches!(
            normalize_feed_url("not a url", true),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_rss_links() {
        let rss = br#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Daily</title>
<item><title>One</title><link>https://daily.com/2025/06/01/city-council-vote</link></item>
<item><title>Two</title><link>https://daily.com/2025/06/01/school-board-budget</link></item>
</channel></rss>"#;

        let links = parse_feed_links(rss).unwrap();
        assert_eq!(
            links,
            vec![
                "https://daily.com/2025/06/01/city-council-vote",
                "https://daily.com/2025/06/01/school-board-budget",
            ]
        );
    }

    #[test]
    fn test_parse_atom_links() {
        let atom = br#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>T</title><id>urn:x</id><updated>2025-06-01T00:00:00Z</updated>
<entry><title>A</title><id>urn:a</id><updated>2025-06-01T00:00:00Z</updated>
<link href="https://station.org/news/flood-warning-issued"/></entry>
</feed>"#;

        let links = parse_feed_links(atom).unwrap();
        assert_eq!(links, vec!["https://station.org/news/flood-warning-issued"]);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_feed_links(b"<html>not a feed</html>"),
            Err(FetchError::Feed(_))
        ));
    }
}
