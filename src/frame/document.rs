//! Frame document parsing and image selection
//!
//! Only the direct element children of `<head>` are scanned. A primary image tag
//! (`fc:frame:image`, `of:image`) wins outright and ends the scan; otherwise the first
//! `og:image` is used. The chosen URL must pass the target validator and end in a
//! recognized image file form, or the document is treated as having no image.

use crate::error::FrameError;
use crate::frame::validate::is_valid_target_url;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Tags that win outright, in no particular order among themselves
pub const PRIMARY_IMAGE_KEYS: [&str; 2] = ["fc:frame:image", "of:image"];

/// Tags used only when no primary tag is present
pub const FALLBACK_IMAGE_KEYS: [&str; 1] = ["og:image"];

static DOCTYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!doctype[^>]*>").expect("doctype pattern is valid"));

static HEAD_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head[\s>]").expect("head pattern is valid"));

// The extension must end the path; only a query or fragment may follow it.
static IMAGE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(https?://[^/?#]+/[^?#]*\.(?:jpeg|jpg|png|gif))(?:[?#].*)?$")
        .expect("image file pattern is valid")
});

/// A `<meta>` element found directly under `<head>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaTag {
    pub property: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
}

impl MetaTag {
    fn matches_any(&self, keys: &[&str]) -> bool {
        [&self.property, &self.name]
            .into_iter()
            .flatten()
            .any(|key| keys.contains(&key.as_str()))
    }
}

/// Parse a frame document and collect the `<meta>` children of its head
///
/// Doctype-like declarations are stripped first. A document without a `<head>` tag
/// is not a frame.
pub fn parse_head_meta(html: &str) -> Result<Vec<MetaTag>, FrameError> {
    let stripped = DOCTYPE.replace_all(html, "");
    if !HEAD_TAG.is_match(&stripped) {
        return Err(FrameError::InvalidFrameContent(
            "Document has no head".to_string(),
        ));
    }

    let document = Html::parse_document(&stripped);
    let head_selector = Selector::parse("head")
        .map_err(|e| FrameError::Internal(format!("Invalid head selector: {}", e)))?;
    let head = document
        .select(&head_selector)
        .next()
        .ok_or_else(|| FrameError::InvalidFrameContent("Document has no head".to_string()))?;

    Ok(head
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name().eq_ignore_ascii_case("meta"))
        .map(|el| MetaTag {
            property: el.value().attr("property").map(str::to_string),
            name: el.value().attr("name").map(str::to_string),
            content: el.value().attr("content").map(str::to_string),
        })
        .collect())
}

/// Pick the image tag's content per primary/fallback precedence
///
/// Returns the raw `content` of the winning tag, before validation.
pub fn select_image_content(tags: &[MetaTag]) -> Option<&str> {
    let mut fallback: Option<&MetaTag> = None;
    for tag in tags {
        if tag.matches_any(&PRIMARY_IMAGE_KEYS) {
            return tag.content.as_deref();
        }
        if fallback.is_none() && tag.matches_any(&FALLBACK_IMAGE_KEYS) {
            fallback = Some(tag);
        }
    }
    fallback.and_then(|tag| tag.content.as_deref())
}

/// Trim a URL to its image file form (`.../a.png?v=1` -> `.../a.png`)
pub fn trim_to_image_file(url: &str) -> Option<&str> {
    IMAGE_FILE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Image URL selected from a set of head meta tags, if one survives validation
pub fn select_image_url(tags: &[MetaTag]) -> Option<String> {
    let content = select_image_content(tags)?;
    if !is_valid_target_url(content) {
        return None;
    }
    trim_to_image_file(content)
        .filter(|trimmed| is_valid_target_url(trimmed))
        .map(str::to_string)
}

/// Parse `html` and select its image URL
///
/// `Ok(None)` means the document is a frame without a usable image.
pub fn extract_image_url(html: &str) -> Result<Option<String>, FrameError> {
    let tags = parse_head_meta(html)?;
    Ok(select_image_url(&tags))
}
