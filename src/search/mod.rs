use serde::{Deserialize, Serialize};
use url::Url;

/// Result count used for every synthesized search directive.
pub const SYNTHETIC_SEARCH_LIMIT: u32 = 1;

/// "Ask the backend owning `prefix` for its best `limit` matches of `text`",
/// written as `<prefix><limit>:<text>` (e.g. `scsearch1:artist - title`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchDirective {
    pub prefix: String,
    pub limit: u32,
    pub text: String,
}

impl SearchDirective {
    pub fn new(prefix: &str, text: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            limit: SYNTHETIC_SEARCH_LIMIT,
            text: text.trim().to_string(),
        }
    }

    /// Recognizes `<prefix><digits?>:<text>` for one of `known_prefixes`.
    /// A missing count means 1.
    pub fn parse(query: &str, known_prefixes: &[&str]) -> Option<Self> {
        let (head, text) = query.split_once(':')?;
        let head = head.trim();
        for prefix in known_prefixes {
            let Some(count) = head.strip_prefix(prefix) else {
                continue;
            };
            let limit = if count.is_empty() {
                1
            } else if count.chars().all(|c| c.is_ascii_digit()) {
                count.parse().ok()?
            } else {
                continue;
            };
            let text = text.trim();
            if text.is_empty() || limit == 0 {
                return None;
            }
            return Some(Self {
                prefix: prefix.to_string(),
                limit,
                text: text.to_string(),
            });
        }
        None
    }

    pub fn to_query(&self) -> String {
        format!("{}{}:{}", self.prefix, self.limit, self.text)
    }
}

/// Whether `query` looks like a search directive of any prefix in
/// `known_prefixes`.
pub fn is_search_directive(query: &str, known_prefixes: &[&str]) -> bool {
    SearchDirective::parse(query, known_prefixes).is_some()
}

/// Parses `query` as an http(s) URL and checks its host against `domains`
/// (the domain itself or any subdomain of it).
pub fn host_matches(query: &str, domains: &[&str]) -> bool {
    let Ok(url) = Url::parse(query.trim()) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    domains
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
}

/// Target of a query that was recognized as a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlTarget {
    /// `source` indexes the dispatcher's metadata sources.
    MetadataPlaylist { source: usize, url: String },
    MetadataTrack { source: usize, url: String },
    /// Index into the dispatcher's priority-ordered backend list.
    Backend { index: usize, url: String },
}

/// States of query resolution. Each dispatcher step consumes one state and
/// either produces the next one or finishes with an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Raw(String),
    ClassifiedUrl(UrlTarget),
    ClassifiedSearch(SearchDirective),
    /// Free text, either typed by the caller or resolved from a metadata
    /// source. Never re-classified as a metadata URL.
    ResolvedText(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIXES: [&str; 2] = ["scsearch", "ytsearch"];

    #[test]
    fn test_directive_round_trip_format() {
        let directive = SearchDirective::new("ytsearch", "  Daft Punk - Around the World ");
        assert_eq!(directive.to_query(), "ytsearch1:Daft Punk - Around the World");
    }

    #[test]
    fn test_parse_directive_with_and_without_count() {
        let parsed = SearchDirective::parse("scsearch5:lofi beats", &PREFIXES).unwrap();
        assert_eq!(parsed.prefix, "scsearch");
        assert_eq!(parsed.limit, 5);
        assert_eq!(parsed.text, "lofi beats");

        let parsed = SearchDirective::parse("ytsearch:x", &PREFIXES).unwrap();
        assert_eq!(parsed.limit, 1);
    }

    #[test]
    fn test_parse_rejects_non_directives() {
        assert!(SearchDirective::parse("Artist - Title", &PREFIXES).is_none());
        assert!(SearchDirective::parse("https://soundcloud.com/a/b", &PREFIXES).is_none());
        assert!(SearchDirective::parse("ytsearchall:x", &PREFIXES).is_none());
        assert!(SearchDirective::parse("ytsearch1:   ", &PREFIXES).is_none());
        assert!(SearchDirective::parse("ytsearch0:x", &PREFIXES).is_none());
        assert!(SearchDirective::parse("bcsearch1:x", &PREFIXES).is_none());
    }

    #[test]
    fn test_host_matching() {
        assert!(host_matches("https://soundcloud.com/artist/track", &["soundcloud.com"]));
        assert!(host_matches("https://on.soundcloud.com/abc", &["soundcloud.com"]));
        assert!(host_matches("https://www.youtube.com/watch?v=1", &["youtube.com", "youtu.be"]));
        assert!(!host_matches("https://notsoundcloud.com/x", &["soundcloud.com"]));
        assert!(!host_matches("soundcloud.com rules", &["soundcloud.com"]));
        assert!(!host_matches("ftp://soundcloud.com/x", &["soundcloud.com"]));
    }
}
