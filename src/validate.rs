use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::fetch::{FetchClient, LIVENESS_TIMEOUT};

/// Enough body to read a `<title>` and an error banner; servers that ignore
/// the Range header are truncated to this client-side.
const LIVENESS_BYTE_CAP: usize = 50_000;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title>\s*(.*?)\s*</title>").unwrap());

/// Persisted `url → verdict` map for slide-liveness checks. A verdict, once
/// recorded, is never re-checked over the network and never expires — a deck
/// taken down later keeps its stale "live" verdict until the cache file is
/// deleted. That matches the source system and is a deliberate trade-off.
///
/// The map is owned by the orchestrator for the duration of one run and
/// flushed at batch boundaries; `Drop` performs a last best-effort flush so
/// a scope exit never loses more than in-flight work.
pub struct SlideCache {
    path: PathBuf,
    entries: BTreeMap<String, bool>,
}

impl SlideCache {
    /// Load the cache, treating a missing or unreadable file as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<BTreeMap<String, bool>>(&text).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, url: &str) -> Option<bool> {
        self.entries.get(url).copied()
    }

    pub fn insert(&mut self, url: &str, verdict: bool) {
        self.entries.insert(url.to_string(), verdict);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the whole map atomically: serialize to a sibling temp file,
    /// then rename over the real path.
    pub fn flush(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string(&self.entries).map_err(io::Error::other)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &self.path)
    }
}

impl Drop for SlideCache {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(path = %self.path.display(), error = %err, "failed to flush slide cache");
        }
    }
}

/// Is this slide URL live, i.e. does it still resolve to real content rather
/// than a not-found page? Cache-checked first; on a miss the verdict — true
/// or false — is cached before returning. Transport failures are fail-closed
/// (false), never fatal to the run.
pub async fn is_live(cache: &mut SlideCache, client: &FetchClient, url: &str) -> bool {
    if let Some(verdict) = cache.get(url) {
        return verdict;
    }
    let verdict = check_live(client, url).await;
    debug!(url, verdict, "slide liveness checked");
    cache.insert(url, verdict);
    verdict
}

async fn check_live(client: &FetchClient, url: &str) -> bool {
    let fetched = match client
        .get_ranged(url, LIVENESS_TIMEOUT, LIVENESS_BYTE_CAP)
        .await
    {
        Ok(fetched) => fetched,
        Err(err) => {
            debug!(url, error = %err, "liveness fetch failed");
            return false;
        }
    };
    if fetched.status != 200 {
        return false;
    }
    !body_indicates_missing(&fetched.text())
}

/// Some services return a branded 200 page on missing content; inspect the
/// title and the leading text for not-found signatures.
pub fn body_indicates_missing(html: &str) -> bool {
    let title = TITLE_RE
        .captures(html)
        .map(|captures| collapse_whitespace(&captures[1]))
        .unwrap_or_default();
    let lowered_title = title.to_lowercase();
    if lowered_title.contains("not found") || lowered_title.contains("404") {
        return true;
    }
    if title.contains("ページが見つかりません") {
        return true;
    }

    // Also guard against obvious 404 bodies.
    let snippet = collapse_whitespace(&html.chars().take(2_000).collect::<String>()).to_lowercase();
    snippet.contains("404") && snippet.contains("not found")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
