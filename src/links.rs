use std::collections::HashSet;

use tracing::debug;
use url::Url;

use crate::fetch::{FetchClient, SHORTENER_TIMEOUT};

/// Hosts serving slide decks. `docs.google.com` is special-cased: only
/// presentation paths count, arbitrary documents do not.
pub const SLIDE_HOSTS: &[&str] = &[
    "speakerdeck.com",
    "www.slideshare.net",
    "slideshare.net",
    "docs.google.com",
];

/// Shortener hosts that must be resolved to their destination before
/// classification makes sense.
pub const SHORTENER_HOSTS: &[&str] = &["t.co", "bit.ly", "tinyurl.com", "goo.gl", "buff.ly", "ow.ly"];

/// Hosts accepted as bare (scheme-less) link candidates in page text.
const BARE_LINK_HOSTS: &[&str] = &[
    "togetter.com",
    "posfie.com",
    "speakerdeck.com",
    "slideshare.net",
    "www.slideshare.net",
    "docs.google.com",
];

pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Bring a raw candidate string into canonical `https://` form, or reject it.
///
/// Accepts full http(s) URLs, protocol-relative `//host/...`, `www.`-prefixed
/// hosts, and bare paths on the known link hosts. Wrapping quotes/brackets
/// and trailing punctuation are trimmed first; fragments and script
/// pseudo-URLs never classify as links.
pub fn normalize_candidate(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_matches(['<', '>', '"', '\''])
        .trim_end_matches([')', '.', ',', ';', ']']);
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("javascript:") {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Some(trimmed.to_string());
    }
    if trimmed.starts_with("www.") {
        return Some(format!("https://{trimmed}"));
    }
    for host in BARE_LINK_HOSTS {
        if let Some(rest) = trimmed.strip_prefix(host) {
            if rest.starts_with('/') {
                return Some(format!("https://{trimmed}"));
            }
        }
    }
    None
}

/// Tweet-summary link check. Togetter accepts only summary pages (`/li/`,
/// `/id/`); other `*.togetter.com` subdomains are image/CDN hosts and are
/// excluded. Posfie counts wholesale, subdomains included.
pub fn is_tweet_summary_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .unwrap_or_default();
    let path = parsed.path();

    if host == "togetter.com" || host == "min.togetter.com" {
        return path.starts_with("/li/") || path.starts_with("/id/");
    }
    if host.ends_with(".togetter.com") {
        return false;
    }
    host == "posfie.com" || host.ends_with(".posfie.com")
}

pub fn is_slide_url(url: &str) -> bool {
    let host = host_of(url);
    let on_slide_host = SLIDE_HOSTS
        .iter()
        .any(|slide| host == *slide || host.ends_with(&format!(".{slide}")));
    if !on_slide_host {
        return false;
    }
    // Google Docs can be many things; include only presentations.
    if host == "docs.google.com" && !url.contains("/presentation/") {
        return false;
    }
    true
}

pub fn is_shortener_host(host: &str) -> bool {
    SHORTENER_HOSTS.contains(&host)
}

/// Classify normalized candidates into (tweet summaries, slide decks),
/// preserving first-seen order. When a `resolver` is given, shortener hosts
/// are resolved via HEAD first; a failed resolution keeps the original URL
/// rather than dropping it. Two shorteners pointing at the same destination
/// collapse to one entry.
pub async fn split_links(
    links: &[String],
    resolver: Option<&FetchClient>,
) -> (Vec<String>, Vec<String>) {
    let mut tweet_urls = Vec::new();
    let mut slide_urls = Vec::new();
    let mut seen = HashSet::new();

    for link in links {
        let mut link = link.clone();
        if let Some(client) = resolver {
            if is_shortener_host(&host_of(&link)) {
                match client.head(&link, SHORTENER_TIMEOUT).await {
                    Ok(fetched) => link = fetched.final_url,
                    Err(err) => {
                        debug!(url = %link, error = %err, "shortener resolution failed, keeping original");
                    }
                }
            }
        }

        if is_tweet_summary_url(&link) {
            if seen.insert(link.clone()) {
                tweet_urls.push(link);
            }
            continue;
        }
        if is_slide_url(&link) && seen.insert(link.clone()) {
            slide_urls.push(link);
        }
    }

    (tweet_urls, slide_urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_candidate_shapes() {
        assert_eq!(
            normalize_candidate("//togetter.com/li/123"),
            Some("https://togetter.com/li/123".to_string())
        );
        assert_eq!(
            normalize_candidate("www.slideshare.net/deck"),
            Some("https://www.slideshare.net/deck".to_string())
        );
        assert_eq!(
            normalize_candidate("speakerdeck.com/u/talk"),
            Some("https://speakerdeck.com/u/talk".to_string())
        );
        assert_eq!(
            normalize_candidate("\"https://togetter.com/li/99),.\""),
            Some("https://togetter.com/li/99".to_string())
        );
    }

    #[test]
    fn rejects_non_links() {
        assert_eq!(normalize_candidate(""), None);
        assert_eq!(normalize_candidate("#section"), None);
        assert_eq!(normalize_candidate("javascript:void(0)"), None);
        assert_eq!(normalize_candidate("mailto:a@b.example"), None);
        assert_eq!(normalize_candidate("example.com/page"), None);
    }

    #[test]
    fn togetter_summary_paths_only() {
        assert!(is_tweet_summary_url("https://togetter.com/li/123"));
        assert!(is_tweet_summary_url("https://min.togetter.com/id/abc"));
        assert!(!is_tweet_summary_url("https://togetter.com/t/tag"));
        assert!(!is_tweet_summary_url("https://images.togetter.com/x.png"));
        assert!(is_tweet_summary_url("https://posfie.com/@user/p/xyz"));
    }

    #[test]
    fn slide_hosts_and_google_presentations() {
        assert!(is_slide_url("https://speakerdeck.com/user/deck"));
        assert!(is_slide_url("https://www.slideshare.net/user/deck"));
        assert!(is_slide_url("https://docs.google.com/presentation/d/abc"));
        assert!(!is_slide_url("https://docs.google.com/document/d/abc"));
        assert!(!is_slide_url("https://example.com/deck.pdf"));
    }

    #[tokio::test]
    async fn split_preserves_order_and_dedupes() {
        let links = vec![
            "https://togetter.com/li/1".to_string(),
            "https://speakerdeck.com/a/one".to_string(),
            "https://togetter.com/li/2".to_string(),
            "https://togetter.com/li/1".to_string(),
            "https://docs.google.com/document/d/skip".to_string(),
        ];
        let (tweets, slides) = split_links(&links, None).await;
        assert_eq!(tweets, ["https://togetter.com/li/1", "https://togetter.com/li/2"]);
        assert_eq!(slides, ["https://speakerdeck.com/a/one"]);
    }
}
