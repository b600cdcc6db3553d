//! Article-vs-non-article URL classification
//!
//! Discovery only needs a yes/no answer per URL, so the classifier is a trait
//! injected into [`super::SeedDiscovery`]. [`HeuristicClassifier`] is the
//! default: it looks at the URL path only and never touches the network.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Judges whether a URL probably points to a single news story
pub trait ArticleClassifier: Send + Sync {
    fn is_likely_article(&self, url: &str) -> bool;
}

impl<F> ArticleClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_likely_article(&self, url: &str) -> bool {
        self(url)
    }
}

/// Path segments of section, listing and utility pages
const EXCLUDED_SEGMENTS: &[&str] = &[
    "about",
    "about-us",
    "account",
    "advertise",
    "advertising",
    "author",
    "authors",
    "careers",
    "cart",
    "categories",
    "category",
    "classifieds",
    "contact",
    "contact-us",
    "feed",
    "feeds",
    "jobs",
    "login",
    "logout",
    "newsletter",
    "newsletters",
    "page",
    "privacy",
    "privacy-policy",
    "register",
    "rss",
    "search",
    "section",
    "shop",
    "signin",
    "sitemap",
    "subscribe",
    "subscription",
    "subscriptions",
    "tag",
    "tags",
    "terms",
    "terms-of-service",
    "terms-of-use",
    "topic",
    "topics",
    "wp-admin",
    "wp-login.php",
];

/// Extensions that can still be a rendered story
const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "shtml", "php", "asp", "aspx", "cms"];

/// Segments that introduce a story slug or id
const STORY_MARKERS: &[&str] = &["article", "articles", "story", "stories", "news", "post"];

/// Path-based article heuristic
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    /// Minimum words in a hyphenated slug to count as a headline
    min_slug_words: usize,
    excluded: HashSet<&'static str>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new(4)
    }
}

impl HeuristicClassifier {
    pub fn new(min_slug_words: usize) -> Self {
        Self {
            min_slug_words: min_slug_words.max(2),
            excluded: EXCLUDED_SEGMENTS.iter().copied().collect(),
        }
    }

    fn date_pattern() -> &'static Regex {
        static DATE: OnceLock<Regex> = OnceLock::new();
        DATE.get_or_init(|| {
            Regex::new(r"/(19|20)\d{2}/(0?[1-9]|1[0-2])(/|$)|/(19|20)\d{2}-\d{2}-\d{2}|/(19|20)\d{6}(/|$)")
                .expect("Invalid regex pattern")
        })
    }

    fn numeric_id_pattern() -> &'static Regex {
        static ID: OnceLock<Regex> = OnceLock::new();
        ID.get_or_init(|| Regex::new(r"(^|[-_])\d{5,}$").expect("Invalid regex pattern"))
    }

    fn slug_words(&self, segment: &str) -> usize {
        segment
            .split(['-', '_'])
            .filter(|word| word.chars().any(|c| c.is_ascii_alphabetic()))
            .count()
    }

    fn has_numeric_id(segment: &str) -> bool {
        Self::numeric_id_pattern().is_match(segment)
    }
}

impl ArticleClassifier for HeuristicClassifier {
    fn is_likely_article(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        let path = parsed.path().to_lowercase();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(last) = segments.last() else {
            return false;
        };

        let stem = match last.rsplit_once('.') {
            Some((stem, ext)) if PAGE_EXTENSIONS.contains(&ext) => stem,
            Some(_) => return false,
            None => last,
        };

        if segments.iter().any(|segment| self.excluded.contains(segment)) {
            return false;
        }

        if Self::date_pattern().is_match(&path) {
            return true;
        }

        if self.slug_words(stem) >= self.min_slug_words {
            return true;
        }

        if segments
            .iter()
            .map(|s| s.rsplit_once('.').map_or(*s, |(stem, _)| stem))
            .any(Self::has_numeric_id)
        {
            return true;
        }

        let has_query_id = parsed.query_pairs().any(|(key, value)| {
            matches!(key.as_ref(), "id" | "p" | "story_id" | "article_id")
                && value.len() >= 3
                && value.chars().all(|c| c.is_ascii_digit())
        });
        if has_query_id {
            return true;
        }

        segments.windows(2).any(|pair| {
            STORY_MARKERS.contains(&pair[0]) && self.slug_words(pair[1]) >= 2
        })
    }
}
