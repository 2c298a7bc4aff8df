use std::sync::Arc;

use famshield_common::{KeywordCategory, KeywordEntry, ManualClock, ScreenNode, Severity};
use famshield_filter::{
    extract_text, ContentScanner, DetectionHandler, KeywordStore, ScannerConfig, TextMatcher,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorder {
    detections: Mutex<Vec<(String, String, String)>>,
}

impl DetectionHandler for Recorder {
    fn on_detection(&self, entry: &KeywordEntry, app_id: &str, text: &str) {
        self.detections.lock().push((entry.keyword.clone(), app_id.to_string(), text.to_string()));
    }
}

fn chat_screen() -> ScreenNode {
    let mut header = ScreenNode::with_text("Neznámý kontakt");
    header.content_description = Some("Chat header".into());

    ScreenNode::with_children(vec![
        header,
        ScreenNode::with_children(vec![
            ScreenNode::with_text("Ahoj, kolik ti je?"),
            ScreenNode::with_text("Nikomu to neříkej, je to naše tajemství"),
            ScreenNode::with_text("Pošli nahou fotku"),
        ]),
    ])
}

#[tokio::test]
async fn test_grooming_chat_detected_with_full_text() {
    let recorder = Arc::new(Recorder::default());
    let scanner = Arc::new(ContentScanner::new(
        ScannerConfig::default(),
        Arc::new(KeywordStore::with_defaults()),
        recorder.clone(),
        Arc::new(ManualClock::new(1_700_000_000_000, 5_000)),
    ));

    let entry = scanner
        .process_snapshot(Some(chat_screen()), Some("com.whatsapp"))
        .expect("scan should be scheduled")
        .await
        .unwrap()
        .expect("keyword should match");

    assert_eq!(entry.keyword, "nikomu to neříkej");
    assert_eq!(entry.category, KeywordCategory::Grooming);

    let detections = recorder.detections.lock();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].1, "com.whatsapp");
    assert_eq!(detections[0].2, extract_text(&chat_screen(), 500));
}

#[test]
fn test_synced_list_with_overlapping_keywords() {
    let keywords = vec![
        KeywordEntry::new("tráva", KeywordCategory::Drugs, Severity::Medium),
        KeywordEntry::new("prodám trávu", KeywordCategory::Drugs, Severity::High),
    ];
    let matcher = TextMatcher::new(keywords.iter().map(|k| k.keyword.as_str()));

    assert_eq!(matcher.find_first("PRODÁM TRÁVU levně"), Some("prodám trávu"));
    assert_eq!(matcher.find_first("tráva je zelená"), Some("tráva"));
}
