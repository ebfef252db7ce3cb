//! Fixture HTML through parse → classify → store, without touching the
//! network: the same path the crawler takes for one event page.

use std::fs;

use connpass_harvest::links::split_links;
use connpass_harvest::parse::{ParseOptions, parse_event_page};
use connpass_harvest::store::EventStore;
use connpass_harvest::types::EventMode;

const EVENT_PAGE: &str = r#"
<html>
<head><title>LT大会 vol.5 - connpass</title></head>
<body>
<div class="current_event_title"><a href="/event/555/">LT大会 vol.5</a></div>
<p>2024/03/10(日)&nbsp;19:00 ～ 21:00</p>
<p class="place_name">未定</p>
<p>このイベントは申し込み不要です。</p>
<div class="description">
  <p>前回のまとめ: <a href="https://togetter.com/li/123">togetter</a></p>
  <p>画像 <a href="https://images.togetter.com/banner.png">banner</a></p>
  <p>資料1 <a href="https://docs.google.com/presentation/d/abc">slides</a></p>
  <p>資料2 <a href="https://docs.google.com/document/d/def">doc</a></p>
  <p>資料3 speakerdeck.com/someone/lt5</p>
  <p>重複 https://togetter.com/li/123</p>
</div>
</body>
</html>
"#;

#[tokio::test]
async fn event_page_becomes_a_classified_record() {
    let url = "https://example.connpass.com/event/555/";
    let draft = parse_event_page(EVENT_PAGE, url, &ParseOptions::default()).unwrap();

    assert_eq!(draft.title, "LT大会 vol.5");
    assert_eq!(draft.vol, "vol.5");
    assert_eq!(draft.event_type, "LT大会");
    assert_eq!(draft.mode, EventMode::Undetermined);
    assert_eq!(draft.participants, 0);
    assert_eq!(draft.date, "2024/03/10");
    assert_eq!(draft.weekday, "日");
    assert_eq!(draft.time_range, "19:00~21:00");

    let (tweet_urls, slide_urls) = split_links(&draft.links, None).await;
    assert_eq!(tweet_urls, ["https://togetter.com/li/123"]);
    assert_eq!(
        slide_urls,
        [
            "https://docs.google.com/presentation/d/abc",
            "https://speakerdeck.com/someone/lt5",
        ]
    );

    let record = draft.into_record(tweet_urls, slide_urls);
    assert_eq!(record.source_url, url);

    let dir = tempfile::tempdir().unwrap();
    let store = EventStore::new(dir.path().join("events.md"));
    store.ensure_header().unwrap();
    store.append_rows(&[record], store.next_id().unwrap()).unwrap();

    let content = fs::read_to_string(store.path()).unwrap();
    let row = content.lines().find(|l| l.starts_with("| 1 |")).unwrap();
    assert!(row.contains("LT大会 vol.5"));
    assert!(row.contains("未定"));
    assert!(row.contains("https://togetter.com/li/123"));
    assert!(row.contains(
        "https://docs.google.com/presentation/d/abc<br>https://speakerdeck.com/someone/lt5"
    ));

    assert_eq!(store.next_id().unwrap(), 2);
    assert!(
        store
            .existing_source_urls()
            .unwrap()
            .contains("https://example.connpass.com/event/555/")
    );
}

#[tokio::test]
async fn participation_sub_page_markup_feeds_the_same_patterns() {
    // Main page without a count, sub-page with one: the orchestrator
    // re-parses with an override pulled from the participation tab.
    let main_page = r#"
        <html><head><title>IoT LT vol.7</title></head>
        <body><p>2023/06/14(水) 19:00 ～ 21:00</p></body></html>
    "#;
    let err = parse_event_page(main_page, "u", &ParseOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        connpass_harvest::ParseError::ParticipantsNotFound
    ));

    let sub_page = "<html><body>参加者一覧（88人）</body></html>";
    let participants = connpass_harvest::parse::extract_participants(sub_page).unwrap();

    let opts = ParseOptions {
        participants_override: Some(participants),
        ..Default::default()
    };
    let draft = parse_event_page(main_page, "u", &opts).unwrap();
    assert_eq!(draft.participants, 88);
}
