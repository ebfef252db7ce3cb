use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::ParseError;
use crate::links::normalize_candidate;
use crate::types::{DraftRecord, EventMode};

static DATE_WITH_WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4})/([0-9]{2})/([0-9]{2})\([^)]*\)").unwrap());
static DATE_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4})/([0-9]{2})/([0-9]{2})").unwrap());

// Example: 2015/02/23(月) 19:00 ～ 22:00
static TIME_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[0-9]{4}/[0-9]{2}/[0-9]{2}\(([^)]+)\)\s*([0-9]{1,2}:[0-9]{2})\s*(?:～|〜|-)\s*([0-9]{1,2}:[0-9]{2})",
    )
    .unwrap()
});
// Fallback: only weekday + start time.
static TIME_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]{4}/[0-9]{2}/[0-9]{2}\(([^)]+)\)\s*([0-9]{1,2}:[0-9]{2})").unwrap()
});

// "参加者（60人）" on the tab, with half/full-width bracket variants.
static PARTICIPANT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"参加者（\s*([0-9]+)\s*人）",
        r"参加者（\s*([0-9]+)\s*名）",
        r"参加者\s*[（(]\s*([0-9]+)\s*(?:人|名)\s*[）)]",
        r"参加者一覧（\s*([0-9]+)\s*(?:人|名)）",
        r"参加者一覧\s*[（(]\s*([0-9]+)\s*(?:人|名)\s*[）)]",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static ANCHOR_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a\s+[^>]*href="([^"]+)""#).unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap());
static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:^|[\s(\[{])((?:www\.)?(?:togetter\.com|posfie\.com|speakerdeck\.com|slideshare\.net|www\.slideshare\.net|docs\.google\.com)/[^\s"'<>]+)"#,
    )
    .unwrap()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static VOL_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)vol\.?\s*([0-9]+)",
        r"(?:^|[^\w])#\s*([0-9]+)\b",
        r"第\s*([0-9]+)\s*(?:回|回目)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

const ONLINE_KEYWORDS: &[&str] = &[
    "オンライン",
    "Zoom",
    "Teams",
    "Google Meet",
    "YouTube",
    "配信",
    "ウェビナー",
];

/// Knobs for the participants strategy chain. An override short-circuits the
/// page patterns (used after re-parsing the participation sub-page);
/// `allow_missing_participants` degrades an unknown count to 0 for offline
/// best-effort parsing of archived snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseOptions {
    pub participants_override: Option<u32>,
    pub allow_missing_participants: bool,
}

/// Convert one event detail page into a draft record. Pure: no network, so
/// the extraction rules can be exercised and swapped without touching
/// crawl/dedup/cache logic. Each field runs an ordered first-match-wins
/// strategy list; only title, date, and participants can fail the page.
pub fn parse_event_page(
    html: &str,
    url: &str,
    opts: &ParseOptions,
) -> Result<DraftRecord, ParseError> {
    let doc = Html::parse_document(html);

    let title = extract_title(&doc).ok_or(ParseError::TitleNotFound)?;
    let (event_type, vol) = infer_type_and_vol(&title);
    let date = extract_date(html).ok_or(ParseError::DateNotFound)?;
    let (weekday, time_range) = extract_weekday_and_time_range(html);

    let participants = match opts.participants_override {
        Some(count) => count,
        None => match extract_participants(html) {
            Some(count) => count,
            None if opts.allow_missing_participants => 0,
            None => return Err(ParseError::ParticipantsNotFound),
        },
    };

    let (venue_name, address) = extract_venue_and_address(&doc);
    let mode = infer_mode(&venue_name, &address);
    let links = extract_candidate_links(html);

    Ok(DraftRecord {
        vol,
        event_type,
        title,
        mode,
        venue_name,
        address,
        source_url: url.to_string(),
        links,
        participants,
        date,
        weekday,
        time_range,
    })
}

/// Strip tags, control characters, and runs of whitespace from rendered text.
fn clean_text(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, "");
    without_tags
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    for element in doc.select(&selector) {
        let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

fn extract_title(doc: &Html) -> Option<String> {
    first_text(doc, "div.current_event_title").or_else(|| first_text(doc, "title"))
}

fn extract_date(html: &str) -> Option<String> {
    let captures = DATE_WITH_WEEKDAY_RE
        .captures(html)
        .or_else(|| DATE_BARE_RE.captures(html))?;
    Some(format!("{}/{}/{}", &captures[1], &captures[2], &captures[3]))
}

/// Weekday and time range live in the same date-adjacent text. Full range
/// first, start-only second, otherwise both empty (not fatal).
fn extract_weekday_and_time_range(html: &str) -> (String, String) {
    let html = html.replace("&nbsp;", " ").replace("&#160;", " ");

    if let Some(captures) = TIME_RANGE_RE.captures(&html) {
        let weekday = clean_text(&captures[1]);
        let time_range = format!("{}~{}", &captures[2], &captures[3]);
        return (weekday, time_range);
    }
    if let Some(captures) = TIME_START_RE.captures(&html) {
        let weekday = clean_text(&captures[1]);
        return (weekday, format!("{}~", &captures[2]));
    }
    (String::new(), String::new())
}

/// Participant count from the page, or `Some(0)` for events whose
/// registration is tracked outside the site. `None` means genuinely unknown.
pub fn extract_participants(html: &str) -> Option<u32> {
    for pattern in PARTICIPANT_RES.iter() {
        if let Some(captures) = pattern.captures(html) {
            if let Ok(count) = captures[1].parse::<u32>() {
                return Some(count);
            }
        }
    }
    // Registration handled outside the site: the count is legitimately zero.
    if html.contains("当サイト以外で申し込み") || html.contains("申し込み不要") {
        return Some(0);
    }
    None
}

fn extract_venue_and_address(doc: &Html) -> (String, String) {
    let venue_name = first_text(doc, "p.place_name").unwrap_or_default();
    let address = first_text(doc, "p.adr").unwrap_or_default();
    (venue_name, address)
}

/// Derive how the event is held from venue/address keyword membership.
pub fn infer_mode(venue_name: &str, address: &str) -> EventMode {
    let venue = venue_name.trim();
    let address = address.trim();
    let combined = format!("{venue} {address}");

    let is_online = ONLINE_KEYWORDS.iter().any(|k| combined.contains(k));

    if venue == "未定" && address.is_empty() {
        return EventMode::Undetermined;
    }
    if is_online && !address.is_empty() && address != "オンライン" {
        return EventMode::Hybrid;
    }
    if is_online || venue == "オンライン" || address == "オンライン" {
        return EventMode::Online;
    }
    if !address.is_empty() {
        return EventMode::Onsite;
    }
    EventMode::Undetermined
}

/// Derive the event category and a `vol.N` series label from the title.
pub fn infer_type_and_vol(title: &str) -> (String, String) {
    let mut vol = String::new();
    for pattern in VOL_RES.iter() {
        if let Some(captures) = pattern.captures(title) {
            vol = format!("vol.{}", &captures[1]);
            break;
        }
    }

    let lowered = title.to_lowercase();
    let event_type = if lowered.contains("lunch time input") {
        "Lunch Time Input"
    } else if lowered.contains("lt") && (title.contains("大会") || lowered.contains("lt大会")) {
        "LT大会"
    } else if title.contains("ハンズオン") {
        "ハンズオン"
    } else {
        "本体"
    };

    (event_type.to_string(), vol)
}

/// Pull candidate URLs from anchor tags, plain text, and known-host bare
/// strings, normalized and de-duplicated preserving first-seen order.
pub fn extract_candidate_links(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    let anchor_hrefs = ANCHOR_HREF_RE
        .captures_iter(html)
        .map(|c| c[1].to_string());
    let text_urls = URL_RE.find_iter(html).map(|m| m.as_str().to_string());
    let bare_urls = BARE_URL_RE.captures_iter(html).map(|c| c[1].to_string());

    for raw in anchor_hrefs.chain(text_urls).chain(bare_urls) {
        let Some(normalized) = normalize_candidate(&raw) else {
            continue;
        };
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT_PAGE: &str = r#"
        <html>
        <head><title>LT大会 vol.5 - connpass</title></head>
        <body>
        <div class="current_event_title"><a href="/event/12345/">LT大会 vol.5</a></div>
        <p>2024/03/10(日)&nbsp;19:00 ～ 21:00</p>
        <p class="place_name">未定</p>
        <p class="adr"></p>
        <p>参加方法は申し込み不要です。</p>
        <p><a href="https://togetter.com/li/777">まとめ</a></p>
        <p>資料: speakerdeck.com/someone/lt5</p>
        </body>
        </html>
    "#;

    #[test]
    fn parses_draft_from_fixture_page() {
        let draft = parse_event_page(
            EVENT_PAGE,
            "https://example.connpass.com/event/12345/",
            &ParseOptions::default(),
        )
        .unwrap();

        assert_eq!(draft.title, "LT大会 vol.5");
        assert_eq!(draft.vol, "vol.5");
        assert_eq!(draft.event_type, "LT大会");
        assert_eq!(draft.date, "2024/03/10");
        assert_eq!(draft.weekday, "日");
        assert_eq!(draft.time_range, "19:00~21:00");
        assert_eq!(draft.participants, 0);
        assert_eq!(draft.mode, EventMode::Undetermined);
        assert_eq!(draft.venue_name, "未定");
        assert_eq!(draft.address, "");
        assert!(draft.links.contains(&"https://togetter.com/li/777".to_string()));
        assert!(
            draft
                .links
                .contains(&"https://speakerdeck.com/someone/lt5".to_string())
        );
    }

    #[test]
    fn title_falls_back_to_document_title() {
        let html = r#"<html><head><title> IoT勉強会 #12 </title></head>
            <body><p>2023/11/01(水) 19:30 〜 21:30</p><p>参加者（60人）</p></body></html>"#;
        let draft = parse_event_page(html, "https://x/e/1/", &ParseOptions::default()).unwrap();
        assert_eq!(draft.title, "IoT勉強会 #12");
        assert_eq!(draft.vol, "vol.12");
        assert_eq!(draft.participants, 60);
        assert_eq!(draft.time_range, "19:30~21:30");
    }

    #[test]
    fn missing_title_is_fatal() {
        let err = parse_event_page("<html><body></body></html>", "u", &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::TitleNotFound));
    }

    #[test]
    fn missing_date_is_fatal() {
        let err = parse_event_page(
            "<html><head><title>t</title></head><body>参加者（3人）</body></html>",
            "u",
            &ParseOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::DateNotFound));
    }

    #[test]
    fn unknown_participants_fatal_unless_allowed() {
        let html =
            "<html><head><title>t</title></head><body>2024/01/05(金) 18:00</body></html>";
        let err = parse_event_page(html, "u", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::ParticipantsNotFound));

        let opts = ParseOptions {
            allow_missing_participants: true,
            ..Default::default()
        };
        let draft = parse_event_page(html, "u", &opts).unwrap();
        assert_eq!(draft.participants, 0);
        assert_eq!(draft.time_range, "18:00~");
        assert_eq!(draft.weekday, "金");
    }

    #[test]
    fn participants_override_wins() {
        let html = "<html><head><title>t</title></head><body>2024/01/05</body></html>";
        let opts = ParseOptions {
            participants_override: Some(42),
            ..Default::default()
        };
        let draft = parse_event_page(html, "u", &opts).unwrap();
        assert_eq!(draft.participants, 42);
        assert_eq!(draft.time_range, "");
        assert_eq!(draft.weekday, "");
    }

    #[test]
    fn participant_pattern_variants() {
        assert_eq!(extract_participants("参加者（12人）"), Some(12));
        assert_eq!(extract_participants("参加者 (34名)"), Some(34));
        assert_eq!(extract_participants("参加者一覧（5 人）"), Some(5));
        assert_eq!(extract_participants("当サイト以外で申し込み"), Some(0));
        assert_eq!(extract_participants("nothing here"), None);
    }

    #[test]
    fn mode_inference_table() {
        assert_eq!(infer_mode("未定", ""), EventMode::Undetermined);
        assert_eq!(infer_mode("オンライン", ""), EventMode::Online);
        assert_eq!(infer_mode("某会議室", "オンライン"), EventMode::Online);
        assert_eq!(
            infer_mode("Zoom開催", "東京都港区1-2-3"),
            EventMode::Hybrid
        );
        assert_eq!(infer_mode("某会議室", "東京都港区1-2-3"), EventMode::Onsite);
        assert_eq!(infer_mode("", ""), EventMode::Undetermined);
    }

    #[test]
    fn type_and_vol_inference() {
        assert_eq!(
            infer_type_and_vol("LT大会 vol.5"),
            ("LT大会".to_string(), "vol.5".to_string())
        );
        assert_eq!(
            infer_type_and_vol("Lunch Time Input #3"),
            ("Lunch Time Input".to_string(), "vol.3".to_string())
        );
        assert_eq!(
            infer_type_and_vol("はじめてのハンズオン 第2回"),
            ("ハンズオン".to_string(), "vol.2".to_string())
        );
        assert_eq!(
            infer_type_and_vol("もくもく会"),
            ("本体".to_string(), String::new())
        );
    }

    #[test]
    fn candidate_links_dedupe_and_normalize() {
        let html = r##"
            <a href="https://togetter.com/li/1">a</a>
            <a href="#top">skip</a>
            <a href="javascript:void(0)">skip</a>
            text link https://togetter.com/li/1 again
            bare (speakerdeck.com/u/deck) mention
        "##;
        let links = extract_candidate_links(html);
        assert_eq!(
            links,
            [
                "https://togetter.com/li/1".to_string(),
                "https://speakerdeck.com/u/deck".to_string(),
            ]
        );
    }
}
