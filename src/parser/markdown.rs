use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use super::RawBadge;

/// Structured pass: walk the markdown event stream and emit one occurrence
/// per image sitting directly inside a link.
///
/// Direct children only: an image wrapped in emphasis or any other inline
/// container inside the link is not a badge. Images nested in another image's
/// description belong to that description's alt text, not to the link.
pub fn extract(content: &str) -> Vec<RawBadge> {
    let mut badges = Vec::new();

    // Destination of the link we are inside, depth of inline containers
    // opened since the link started, and the badge whose alt text is being
    // collected (with the count of images nested inside its description).
    let mut link: Option<String> = None;
    let mut depth = 0u32;
    let mut capture: Option<RawBadge> = None;
    let mut nested_images = 0u32;

    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::Link { dest_url, .. }) => {
                if capture.is_none() {
                    link = Some(dest_url.to_string());
                    depth = 0;
                }
            }
            Event::End(TagEnd::Link) => {
                if capture.is_none() {
                    link = None;
                }
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                if capture.is_some() {
                    nested_images += 1;
                } else if let Some(target) = &link {
                    if depth == 0 {
                        capture = Some(RawBadge {
                            image_url: dest_url.to_string(),
                            target_url: target.clone(),
                            alt_text: String::new(),
                        });
                        nested_images = 0;
                    }
                }
            }
            Event::End(TagEnd::Image) => {
                if let Some(badge) = capture.take() {
                    if nested_images > 0 {
                        nested_images -= 1;
                        capture = Some(badge);
                    } else {
                        badges.push(badge);
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(badge) = capture.as_mut() {
                    badge.alt_text.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(badge) = capture.as_mut() {
                    badge.alt_text.push(' ');
                }
            }
            Event::Start(_) => {
                if capture.is_none() && link.is_some() {
                    depth += 1;
                }
            }
            Event::End(_) => {
                if capture.is_none() && link.is_some() {
                    depth = depth.saturating_sub(1);
                }
            }
            _ => {}
        }
    }

    badges
}
