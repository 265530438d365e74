use url::Url;

/// Rewrite a badge image URL into its org/repo-agnostic canonical form.
///
/// The first case-insensitive occurrence of `org` becomes `{ORG}`, then the
/// first occurrence of `repo` in the rewritten string and everything after it
/// becomes `{REPO}/*`. A `token` query parameter is stripped afterwards.
/// Substitution order matters when one name is a substring of the other; the
/// org replacement always runs first and the repo search sees its output.
pub fn canonicalize(image_url: &str, org: &str, repo: &str) -> String {
    let mut pattern = image_url.to_string();

    if !org.is_empty() {
        if let Some(idx) = find_ci(&pattern, org) {
            pattern.replace_range(idx..idx + org.len(), "{ORG}");
        }
    }
    if !repo.is_empty() {
        if let Some(idx) = find_ci(&pattern, repo) {
            pattern.truncate(idx);
            pattern.push_str("{REPO}/*");
        }
    }

    strip_token_param(&pattern)
}

/// Byte offset of the first case-insensitive occurrence of `needle`.
/// ASCII-only folding keeps offsets valid in the original string.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Remove a `token` query parameter, dropping the query entirely when it was
/// the only one. Strings that do not parse as URLs pass through untouched.
/// Rewriting is plain string surgery: round-tripping through Url would
/// percent-encode the placeholder braces.
fn strip_token_param(pattern: &str) -> String {
    if Url::parse(pattern).is_err() {
        return pattern.to_string();
    }

    let (head, fragment) = match pattern.find('#') {
        Some(i) => (&pattern[..i], Some(&pattern[i..])),
        None => (pattern, None),
    };
    let Some(q_start) = head.find('?') else {
        return pattern.to_string();
    };
    let (base, query) = head.split_at(q_start);
    let query = &query[1..];

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| pair.split('=').next().unwrap_or(pair) != "token")
        .collect();
    if kept.len() == query.split('&').count() {
        return pattern.to_string();
    }

    let mut out = base.to_string();
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    if let Some(frag) = fragment {
        out.push_str(frag);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_and_repo_substituted() {
        let url = "https://github.com/acme/widget/actions/workflows/ci.yml/badge.svg";
        assert_eq!(
            canonicalize(url, "acme", "widget"),
            "https://github.com/{ORG}/{REPO}/*"
        );
    }

    #[test]
    fn repo_substitution_swallows_the_suffix() {
        let url = "https://codecov.io/gh/acme/widget/branch/main/graph/badge.svg";
        assert_eq!(
            canonicalize(url, "acme", "widget"),
            "https://codecov.io/gh/{ORG}/{REPO}/*"
        );
    }

    #[test]
    fn match_is_case_insensitive() {
        let url = "https://github.com/Acme/Widget/workflows/CI/badge.svg";
        assert_eq!(
            canonicalize(url, "acme", "widget"),
            "https://github.com/{ORG}/{REPO}/*"
        );
        let url = "https://github.com/ACME/x.svg";
        assert_eq!(canonicalize(url, "acme", "widget"), "https://github.com/{ORG}/x.svg");
    }

    #[test]
    fn absent_names_leave_url_alone() {
        let url = "https://img.shields.io/badge/License-MIT-blue.svg";
        assert_eq!(canonicalize(url, "acme", "widget"), url);
    }

    #[test]
    fn empty_names_never_substitute() {
        let url = "https://img.shields.io/badge/x.svg";
        assert_eq!(canonicalize(url, "", ""), url);
    }

    #[test]
    fn stable_across_calls() {
        let url = "https://codecov.io/gh/acme/widget/badge.svg?token=S";
        let first = canonicalize(url, "acme", "widget");
        let second = canonicalize(url, "acme", "widget");
        assert_eq!(first, second);
    }

    #[test]
    fn token_param_stripped_others_kept() {
        assert_eq!(
            canonicalize("https://svc/badge.svg?token=SECRET&x=1", "acme", "widget"),
            "https://svc/badge.svg?x=1"
        );
        assert_eq!(
            canonicalize("https://svc/badge.svg?x=1&token=SECRET", "acme", "widget"),
            "https://svc/badge.svg?x=1"
        );
    }

    #[test]
    fn lone_token_drops_the_query() {
        assert_eq!(
            canonicalize("https://svc/badge.svg?token=SECRET", "acme", "widget"),
            "https://svc/badge.svg"
        );
        assert_eq!(
            canonicalize("https://svc/badge.svg?token", "acme", "widget"),
            "https://svc/badge.svg"
        );
    }

    #[test]
    fn token_in_fragment_is_not_a_query_param() {
        let url = "https://svc/badge.svg#frag?token=1";
        assert_eq!(canonicalize(url, "acme", "widget"), url);
    }

    #[test]
    fn fragment_survives_stripping() {
        assert_eq!(
            canonicalize("https://svc/b.svg?token=S&x=1#frag", "acme", "widget"),
            "https://svc/b.svg?x=1#frag"
        );
    }

    #[test]
    fn unparseable_url_passes_through() {
        let url = "not a url ?token=x";
        assert_eq!(canonicalize(url, "acme", "widget"), url);
    }

    #[test]
    fn org_overlapping_the_host_stays_order_dependent() {
        // "shield" sits inside the host name; the substitution rewrites the
        // host rather than skipping it. Accepted behavior, not repaired.
        assert_eq!(
            canonicalize("https://img.shields.io/badge/x.svg", "shield", "widget"),
            "https://img.{ORG}s.io/badge/x.svg"
        );
    }

    #[test]
    fn repo_inside_org_segment_consumed_by_org_first() {
        // org "widget-tools" contains repo "widget"; after the org pass the
        // repo text is gone, so the repo pass finds nothing.
        let url = "https://github.com/widget-tools/x.svg";
        assert_eq!(
            canonicalize(url, "widget-tools", "widget"),
            "https://github.com/{ORG}/x.svg"
        );
    }
}
