use std::sync::LazyLock;

use regex::Regex;

use super::RawBadge;

// Anchor wrapping an image, href first on the anchor and src first on the
// image, alt captured only when it immediately follows src. Whitespace
// (including newlines) may separate the tags.
static BADGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<a\s+href="([^"]+)"[^>]*>\s*<img\s+src="([^"]+)"(?:\s+alt="([^"]*)")?[^>]*>\s*</a>"#,
    )
    .unwrap()
});

/// Fallback pass: scan the raw text for anchor/image pairs the structured
/// pass cannot see.
pub fn extract(content: &str) -> Vec<RawBadge> {
    BADGE_RE
        .captures_iter(content)
        .map(|caps| RawBadge {
            target_url: caps[1].to_string(),
            image_url: caps[2].to_string(),
            alt_text: caps
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment() {
        let badges = extract(r#"<a href="http://t"><img src="http://i" alt="A"></a>"#);
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].target_url, "http://t");
        assert_eq!(badges[0].image_url, "http://i");
        assert_eq!(badges[0].alt_text, "A");
    }

    #[test]
    fn missing_alt_is_empty() {
        let badges = extract(r#"<a href="http://t"><img src="http://i"></a>"#);
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].alt_text, "");
    }

    #[test]
    fn extra_attributes_tolerated() {
        let html = r#"<a href="http://t" target="_blank" rel="noopener"><img src="http://i" alt="A" width="120"></a>"#;
        let badges = extract(html);
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].alt_text, "A");
    }

    #[test]
    fn alt_captured_only_directly_after_src() {
        // An attribute between src and alt pushes alt into the tail the
        // matcher ignores.
        let html = r#"<a href="http://t"><img src="http://i" width="20" alt="A"></a>"#;
        let badges = extract(html);
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].alt_text, "");
    }

    #[test]
    fn whitespace_and_newlines_between_tags() {
        let html = "<a href=\"http://t\">\n  <img src=\"http://i\" alt=\"A\"/>\n</a>";
        let badges = extract(html);
        assert_eq!(badges.len(), 1);
        assert_eq!(badges[0].image_url, "http://i");
    }

    #[test]
    fn intervening_element_breaks_match() {
        let html = r#"<a href="http://t"><span><img src="http://i"></span></a>"#;
        assert!(extract(html).is_empty());
    }

    #[test]
    fn multiple_fragments_in_order() {
        let html = r#"
            <a href="http://t1"><img src="http://i1" alt="one"></a>
            <a href="http://t2"><img src="http://i2" alt="two"></a>
        "#;
        let badges = extract(html);
        assert_eq!(badges.len(), 2);
        assert_eq!(badges[0].alt_text, "one");
        assert_eq!(badges[1].alt_text, "two");
    }

    #[test]
    fn href_must_lead_the_anchor() {
        let html = r#"<a class="badge" href="http://t"><img src="http://i"></a>"#;
        assert!(extract(html).is_empty());
    }
}
