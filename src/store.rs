use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::EventRecord;

/// The table header, fixed: downstream consumers key on this column order.
pub const TABLE_HEADER: &str = "\
| id | vol | タイプ | タイトル | 実施形態 | 会場名 | 住所 | connpass URL | ツイートまとめ URL | LTスライド | 参加者数 | 日付 | 曜日 | 時間 |\n\
|---:|:---:|:---|:---|:---:|:---|:---|:---|:---|:---|---:|:---:|:---:|:---:|\n";

/// Column index of `connpass URL` in a data row.
const SOURCE_URL_COLUMN: usize = 7;

/// Append-only markdown table of harvested events. Rows are never mutated;
/// an incremental run appends whole batches, a rebuild rewrites the file
/// from scratch. Ids are assigned here so the stored sequence stays
/// contiguous from 1 with no gaps.
pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the table header if the file is absent or blank; otherwise a
    /// no-op.
    pub fn ensure_header(&self) -> io::Result<()> {
        if self.path.exists() && !fs::read_to_string(&self.path)?.trim().is_empty() {
            return Ok(());
        }
        self.create_parent_dirs()?;
        fs::write(&self.path, TABLE_HEADER)
    }

    /// `max(id) + 1` over existing rows, or 1 for an empty/absent table.
    pub fn next_id(&self) -> io::Result<u32> {
        if !self.path.exists() {
            return Ok(1);
        }
        let mut max_id = 0;
        for line in fs::read_to_string(&self.path)?.lines() {
            if !line.starts_with('|') {
                continue;
            }
            let cells = split_row_cells(line);
            let Some(id) = cells.first().and_then(|cell| cell.parse::<u32>().ok()) else {
                continue;
            };
            max_id = max_id.max(id);
        }
        Ok(max_id + 1)
    }

    /// Every `source_url` currently stored, for O(1) dedup membership checks.
    pub fn existing_source_urls(&self) -> io::Result<HashSet<String>> {
        let mut urls = HashSet::new();
        if !self.path.exists() {
            return Ok(urls);
        }
        for line in fs::read_to_string(&self.path)?.lines() {
            if !line.starts_with('|') {
                continue;
            }
            let cells = split_row_cells(line);
            if let Some(url) = cells.get(SOURCE_URL_COLUMN) {
                if url.starts_with("http") {
                    urls.insert(url.clone());
                }
            }
        }
        Ok(urls)
    }

    /// Append `rows` as one buffered write, numbering them `start_id`,
    /// `start_id + 1`, … in the given order. Existing lines are never
    /// touched.
    pub fn append_rows(&self, rows: &[EventRecord], start_id: u32) -> io::Result<()> {
        let mut buffer = String::new();
        for (offset, row) in rows.iter().enumerate() {
            buffer.push_str(&format_row(start_id + offset as u32, row));
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(buffer.as_bytes())
    }

    /// Destructively replace the whole table: header plus `rows` renumbered
    /// from 1. Used by rebuild only.
    pub fn rewrite_all(&self, rows: &[EventRecord]) -> io::Result<()> {
        self.create_parent_dirs()?;
        let mut buffer = String::from(TABLE_HEADER);
        for (offset, row) in rows.iter().enumerate() {
            buffer.push_str(&format_row(1 + offset as u32, row));
        }
        fs::write(&self.path, buffer)
    }

    fn create_parent_dirs(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Flatten newlines and escape literal pipes so a cell can never break the
/// row structure.
fn escape_cell(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', " ")
        .replace('|', "&#124;")
        .trim()
        .to_string()
}

fn unescape_cell(text: &str) -> String {
    text.replace("&#124;", "|")
}

fn format_cell_links(urls: &[String]) -> String {
    urls.join("<br>")
}

pub fn format_row(id: u32, row: &EventRecord) -> String {
    let tweet_cell = escape_cell(&format_cell_links(&row.tweet_urls));
    let slide_cell = escape_cell(&format_cell_links(&row.slide_urls));
    let cells = [
        id.to_string(),
        escape_cell(&row.vol),
        escape_cell(&row.event_type),
        escape_cell(&row.title),
        escape_cell(row.mode.label()),
        escape_cell(&row.venue_name),
        escape_cell(&row.address),
        escape_cell(&row.source_url),
        tweet_cell,
        slide_cell,
        row.participants.to_string(),
        row.date.clone(),
        escape_cell(&row.weekday),
        escape_cell(&row.time_range),
    ];
    format!("| {} |\n", cells.join(" | "))
}

/// Split a table line into trimmed, unescaped cells, dropping the empty
/// leading/trailing pieces produced by the outer pipes.
pub fn split_row_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| unescape_cell(cell.trim()))
        .collect()
}
