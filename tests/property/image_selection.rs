//! Property-based tests for frame image selection

use frameproxy::frame::document::extract_image_url;
use proptest::prelude::*;

fn page(head: &str) -> String {
    format!("<!DOCTYPE html><html><head>{}</head><body></body></html>", head)
}

fn meta(property: &str, content: &str) -> String {
    format!("<meta property=\"{}\" content=\"{}\">", property, content)
}

/// Test that a primary image tag wins wherever the og fallback appears
#[test]
fn test_primary_tag_wins_over_fallback() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                "[a-z]{1,12}",
                prop_oneof![Just("fc:frame:image"), Just("of:image")],
                any::<bool>(),
                0u32..1000,
            ),
            |(name, primary_key, fallback_first, version)| {
                let primary = format!("https://img.example.com/{}.png?v={}", name, version);
                let fallback = "https://og.example.com/cover.jpg".to_string();

                let head = if fallback_first {
                    meta("og:image", &fallback) + &meta(primary_key, &primary)
                } else {
                    meta(primary_key, &primary) + &meta("og:image", &fallback)
                };

                let selected = extract_image_url(&page(&head)).unwrap();
                assert_eq!(
                    selected,
                    Some(format!("https://img.example.com/{}.png", name))
                );
                Ok(())
            },
        )
        .unwrap();
}

/// Test that documents without image tags select nothing
#[test]
fn test_no_image_tags_selects_nothing() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&"[a-z ]{0,40}", |title| {
            let head = format!("<title>{}</title><meta name=\"description\" content=\"x\">", title);
            assert_eq!(extract_image_url(&page(&head)).unwrap(), None);
            Ok(())
        })
        .unwrap();
}
