use scraper::{Html, Selector};
use tracing::debug;

use crate::error::HarvestError;
use crate::fetch::{FetchClient, LISTING_TIMEOUT, PROBE_TIMEOUT};

/// Deliberately out-of-range page number used to find the real last page:
/// the site renders its true last page while echoing the requested number in
/// the URL, and marks the actual page as active in the pagination control.
const PROBE_PAGE: u32 = 999_999;

/// Enumerates event-detail URLs from the paginated listing and can detect
/// the oldest (last) page number via a probe request.
pub struct ListingWalker<'a> {
    client: &'a FetchClient,
    base: String,
}

impl<'a> ListingWalker<'a> {
    pub fn new(client: &'a FetchClient, listing_base: &str) -> Self {
        Self {
            client,
            base: listing_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn page_url(&self, page: u32) -> String {
        format!("{}/?page={}", self.base, page)
    }

    /// Event-detail URLs on one listing page, in page order, de-duplicated.
    /// A non-200 response is fatal: a listing page has no safe partial
    /// interpretation.
    pub async fn event_urls(&self, page: u32) -> Result<Vec<String>, HarvestError> {
        let url = self.page_url(page);
        let fetched = self.client.get(&url, LISTING_TIMEOUT).await?;
        if fetched.status != 200 {
            return Err(HarvestError::HttpStatus {
                url,
                status: fetched.status,
            });
        }
        Ok(extract_event_urls(&fetched.text()))
    }

    pub async fn detect_oldest_page(&self) -> Result<u32, HarvestError> {
        let url = self.page_url(PROBE_PAGE);
        let fetched = self.client.get(&url, PROBE_TIMEOUT).await?;
        if fetched.status != 200 {
            return Err(HarvestError::BoundaryDetection {
                reason: "non-200 on probe",
            });
        }

        let html = fetched.text();
        if let Some(page) = active_page_number(&html) {
            debug!(page, "oldest page from active pagination entry");
            return Ok(page);
        }
        // Fallback: use the maximum page number visible in pagination links.
        if let Some(page) = max_linked_page(&html) {
            debug!(page, "oldest page from max pagination link");
            return Ok(page);
        }
        Err(HarvestError::BoundaryDetection {
            reason: "no pagination found",
        })
    }
}

/// Anchors carrying the listing's summary-link convention, order preserved,
/// same-page duplicates removed.
pub fn extract_event_urls(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.url.summary") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for element in doc.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        if seen.insert(href.to_string()) {
            out.push(href.to_string());
        }
    }
    out
}

/// The page number the pagination control marks as active.
pub fn active_page_number(html: &str) -> Option<u32> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("li.active span").ok()?;
    doc.select(&selector)
        .find_map(|element| element.text().collect::<String>().trim().parse::<u32>().ok())
}

/// Highest `page` query value referenced by any link on the page.
pub fn max_linked_page(html: &str) -> Option<u32> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("a[href]").ok()?;

    let mut max_page: Option<u32> = None;
    for element in doc.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some((_, query)) = href.split_once('?') else {
            continue;
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "page" {
                if let Ok(page) = value.parse::<u32>() {
                    max_page = Some(max_page.map_or(page, |current| current.max(page)));
                }
            }
        }
    }
    max_page
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"
        <html><body>
        <div class="event_list">
          <a class="url summary" href="https://example.connpass.com/event/111/">A</a>
          <a class="url summary" href="https://example.connpass.com/event/222/">B</a>
          <a class="url summary" href="https://example.connpass.com/event/111/">A again</a>
          <a class="other" href="https://example.connpass.com/event/333/">not a summary</a>
        </div>
        <ul class="pagination">
          <li><a href="/event/?page=1">1</a></li>
          <li><a href="/event/?page=2">2</a></li>
          <li class="active"><span>43</span></li>
        </ul>
        </body></html>
    "#;

    #[test]
    fn event_urls_keep_order_and_dedupe() {
        let urls = extract_event_urls(LISTING_PAGE);
        assert_eq!(
            urls,
            [
                "https://example.connpass.com/event/111/",
                "https://example.connpass.com/event/222/",
            ]
        );
    }

    #[test]
    fn active_page_wins_over_links() {
        assert_eq!(active_page_number(LISTING_PAGE), Some(43));
        assert_eq!(max_linked_page(LISTING_PAGE), Some(2));
    }

    #[test]
    fn missing_pagination_yields_nothing() {
        let html = "<html><body><p>no pager here</p></body></html>";
        assert_eq!(active_page_number(html), None);
        assert_eq!(max_linked_page(html), None);
    }
}
