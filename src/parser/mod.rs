pub mod html;
pub mod markdown;

use url::Url;

use crate::db::BadgeRow;

/// A badge occurrence as written in the markup, before host derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBadge {
    pub image_url: String,
    pub target_url: String,
    pub alt_text: String,
}

/// Two-pass extraction: structured markdown walk, then raw HTML scan.
/// Results are concatenated in that order; a fragment both passes recognize
/// yields two occurrences, deduplication happens downstream.
pub fn extract_badges(content: &str) -> Vec<RawBadge> {
    let mut badges = markdown::extract(content);
    badges.extend(html::extract(content));
    badges
}

/// Extract one repository's README into persistable badge rows.
pub fn process_readme(repo_name: &str, content: &str) -> Vec<BadgeRow> {
    extract_badges(content)
        .into_iter()
        .enumerate()
        .map(|(i, b)| BadgeRow {
            repo_name: repo_name.to_string(),
            position: i as i64,
            host_image: host_of(&b.image_url),
            host_target: host_of(&b.target_url),
            alt_text: b.alt_text,
            image_url: b.image_url,
            target_url: b.target_url,
        })
        .collect()
}

/// Host component of a URL, empty when it does not parse as an absolute URL.
pub fn host_of(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}
