use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{HarvestError, ParseError};
use crate::fetch::{DETAIL_TIMEOUT, FetchClient};
use crate::links::split_links;
use crate::listing::ListingWalker;
use crate::parse::{ParseOptions, extract_participants, parse_event_page};
use crate::store::EventStore;
use crate::types::{DraftRecord, EventRecord};
use crate::validate::{SlideCache, is_live};

static EVENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/event/([0-9]+)/").unwrap());

/// Everything one run needs. `start_page == 0` means auto-detect the oldest
/// page; `end_page` is inclusive and must not exceed the start page.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub listing_base: String,
    pub start_page: u32,
    pub end_page: Option<u32>,
    pub limit: usize,
    pub out_path: PathBuf,
    pub cache_path: PathBuf,
    pub validate_slides: bool,
    pub raw_dir: Option<PathBuf>,
    pub delay: Duration,
    pub retries: usize,
    pub user_agent: String,
    pub rebuild: bool,
}

pub async fn run(params: RunParams) -> Result<(), HarvestError> {
    if params.raw_dir.is_some() && !params.rebuild {
        return Err(HarvestError::Config("--raw-dir requires --rebuild".to_string()));
    }

    let store = EventStore::new(&params.out_path);
    let mut cache = params
        .validate_slides
        .then(|| SlideCache::load(&params.cache_path));

    if let Some(raw_dir) = params.raw_dir.clone() {
        return run_rebuild_offline(&raw_dir, &store).await;
    }

    let client = FetchClient::new(&params.user_agent, params.retries)?;
    let walker = ListingWalker::new(&client, &params.listing_base);

    let start_page = if params.start_page == 0 {
        let detected = walker.detect_oldest_page().await?;
        info!(page = detected, "auto-detected oldest listing page");
        detected
    } else {
        params.start_page
    };
    let end_page = match params.end_page {
        Some(page) => page,
        None if params.rebuild => 1,
        None => start_page,
    };
    if end_page > start_page {
        return Err(HarvestError::Config(
            "--end-page must be <= --start-page".to_string(),
        ));
    }

    if params.rebuild {
        run_rebuild(&client, &walker, &store, &mut cache, &params, start_page, end_page).await
    } else {
        run_incremental(&client, &walker, &store, &mut cache, &params, start_page, end_page).await
    }
}

/// Full rebuild over the live site: walk every page oldest → newest, parse
/// every event (strictly — one bad page aborts, since a rebuild's
/// correctness depends on all pages parsing cleanly), then overwrite the
/// store with a freshly sorted, freshly numbered table.
async fn run_rebuild(
    client: &FetchClient,
    walker: &ListingWalker<'_>,
    store: &EventStore,
    cache: &mut Option<SlideCache>,
    params: &RunParams,
    start_page: u32,
    end_page: u32,
) -> Result<(), HarvestError> {
    let mut rows: Vec<EventRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for page in (end_page..=start_page).rev() {
        let urls = walker.event_urls(page).await?;
        if urls.is_empty() {
            return Err(HarvestError::EmptyListingPage { page });
        }
        info!(page, events = urls.len(), "walking listing page");
        politeness_delay(params.delay).await;

        for url in urls {
            if !seen.insert(url.clone()) {
                continue;
            }
            let record =
                collect_event_record(client, cache, &url, params.validate_slides).await?;
            rows.push(record);
            politeness_delay(params.delay).await;
        }
        flush_cache(cache)?;
    }

    sort_for_rebuild(&mut rows);
    store.rewrite_all(&rows)?;
    flush_cache(cache)?;
    info!(rows = rows.len(), path = %store.path().display(), "rebuilt event table");
    Ok(())
}

/// Offline rebuild from archived snapshots: no network, so shorteners stay
/// unresolved, slides are not validated, and a missing participant count
/// degrades to 0.
async fn run_rebuild_offline(raw_dir: &Path, store: &EventStore) -> Result<(), HarvestError> {
    let urls_path = raw_dir.join("event_urls.txt");
    if !urls_path.exists() {
        return Err(HarvestError::Config(format!(
            "missing {}",
            urls_path.display()
        )));
    }

    let mut rows: Vec<EventRecord> = Vec::new();
    let listing = fs::read_to_string(&urls_path)?;
    for url in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(captures) = EVENT_ID_RE.captures(url) else {
            continue;
        };
        let html_path = raw_dir.join("events").join(format!("{}.html", &captures[1]));
        if !html_path.exists() {
            continue;
        }
        let html = String::from_utf8_lossy(&fs::read(&html_path)?).into_owned();
        let opts = ParseOptions {
            allow_missing_participants: true,
            ..Default::default()
        };
        let draft = parse_event_page(&html, url, &opts)
            .map_err(|source| HarvestError::parse(url, source))?;
        rows.push(finalize_draft(draft, None, &mut None, false).await);
    }

    sort_for_rebuild(&mut rows);
    store.rewrite_all(&rows)?;
    info!(rows = rows.len(), path = %store.path().display(), "rebuilt event table from snapshots");
    Ok(())
}

/// Bounded incremental append: walk the page range, skip URLs already in the
/// store, collect up to `limit` new records, and append them continuing from
/// the store's next id. Individual event pages that fail to parse are logged
/// and skipped — they stay absent from the store, so a later run retries
/// them.
async fn run_incremental(
    client: &FetchClient,
    walker: &ListingWalker<'_>,
    store: &EventStore,
    cache: &mut Option<SlideCache>,
    params: &RunParams,
    start_page: u32,
    end_page: u32,
) -> Result<(), HarvestError> {
    store.ensure_header()?;
    let mut current_id = store.next_id()?;
    let mut existing = store.existing_source_urls()?;
    let mut remaining = params.limit;

    for page in (end_page..=start_page).rev() {
        if remaining == 0 {
            break;
        }

        let urls = walker.event_urls(page).await?;
        if urls.is_empty() {
            return Err(HarvestError::EmptyListingPage { page });
        }
        politeness_delay(params.delay).await;

        let mut batch: Vec<EventRecord> = Vec::new();
        for url in urls {
            if existing.contains(&url) {
                continue;
            }
            match collect_event_record(client, cache, &url, params.validate_slides).await {
                Ok(record) => batch.push(record),
                Err(err) => warn!(url = %url, error = %err, "skipping event page"),
            }
            politeness_delay(params.delay).await;
        }

        sort_for_batch(&mut batch);
        batch.truncate(remaining);
        if !batch.is_empty() {
            store.append_rows(&batch, current_id)?;
            for record in &batch {
                existing.insert(record.source_url.clone());
            }
            current_id += batch.len() as u32;
            remaining -= batch.len();
            info!(page, appended = batch.len(), "appended new events");
            flush_cache(cache)?;
        }
    }

    flush_cache(cache)?;
    Ok(())
}

/// Fetch one event detail page and turn it into a finalized record. When the
/// main page lacks a participant count, the participation sub-page is
/// re-parsed with the same patterns before giving up.
async fn collect_event_record(
    client: &FetchClient,
    cache: &mut Option<SlideCache>,
    url: &str,
    validate_slides: bool,
) -> Result<EventRecord, HarvestError> {
    let fetched = client.get(url, DETAIL_TIMEOUT).await?;
    if fetched.status != 200 {
        return Err(HarvestError::HttpStatus {
            url: url.to_string(),
            status: fetched.status,
        });
    }
    let html = fetched.text();

    let draft = match parse_event_page(&html, url, &ParseOptions::default()) {
        Ok(draft) => draft,
        Err(ParseError::ParticipantsNotFound) => {
            let participants = participants_from_subpage(client, url).await?;
            let opts = ParseOptions {
                participants_override: Some(participants),
                ..Default::default()
            };
            parse_event_page(&html, url, &opts)
                .map_err(|source| HarvestError::parse(url, source))?
        }
        Err(source) => return Err(HarvestError::parse(url, source)),
    };

    Ok(finalize_draft(draft, Some(client), cache, validate_slides).await)
}

async fn participants_from_subpage(
    client: &FetchClient,
    url: &str,
) -> Result<u32, HarvestError> {
    let sub_url = format!("{}/participation/", url.trim_end_matches('/'));
    let fetched = client.get(&sub_url, DETAIL_TIMEOUT).await?;
    if fetched.status != 200 {
        return Err(HarvestError::parse(url, ParseError::ParticipantsNotFound));
    }
    extract_participants(&fetched.text())
        .ok_or_else(|| HarvestError::parse(url, ParseError::ParticipantsNotFound))
}

/// Classify a draft's links and, when enabled, drop slide URLs that fail the
/// liveness check. With no resolver (offline mode) shorteners stay as-is.
async fn finalize_draft(
    draft: DraftRecord,
    resolver: Option<&FetchClient>,
    cache: &mut Option<SlideCache>,
    validate_slides: bool,
) -> EventRecord {
    let (tweet_urls, slide_urls_raw) = split_links(&draft.links, resolver).await;

    let slide_urls = match (validate_slides, resolver, cache.as_mut()) {
        (true, Some(client), Some(cache)) => {
            let mut kept = Vec::new();
            for url in slide_urls_raw {
                if is_live(cache, client, &url).await {
                    kept.push(url);
                }
            }
            kept
        }
        _ => slide_urls_raw,
    };

    draft.into_record(tweet_urls, slide_urls)
}

fn sort_for_rebuild(rows: &mut [EventRecord]) {
    rows.sort_by(|a, b| {
        (a.date.as_str(), a.time_range.as_str(), a.source_url.as_str()).cmp(&(
            b.date.as_str(),
            b.time_range.as_str(),
            b.source_url.as_str(),
        ))
    });
}

fn sort_for_batch(rows: &mut [EventRecord]) {
    rows.sort_by(|a, b| {
        (a.date.as_str(), a.source_url.as_str()).cmp(&(b.date.as_str(), b.source_url.as_str()))
    });
}

async fn politeness_delay(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn flush_cache(cache: &Option<SlideCache>) -> io::Result<()> {
    if let Some(cache) = cache {
        cache.flush()?;
    }
    Ok(())
}
