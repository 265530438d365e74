pub mod aggregate;
pub mod canonical;
pub mod rules;

/// Lowercased, slash-free form of a name. Used for fallback badge ids and
/// report file names.
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace('/', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_replaces_slashes() {
        assert_eq!(slugify("Acme/Widget"), "acme-widget");
        assert_eq!(
            slugify("https://img.shields.io/badge/x"),
            "https:--img.shields.io-badge-x"
        );
        assert_eq!(slugify(""), "");
    }
}
