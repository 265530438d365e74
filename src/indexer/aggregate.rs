use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::db::DocumentRecord;

use super::canonical::canonicalize;
use super::rules::{Classification, CompiledRules};

/// Accumulated record for one distinct canonical pattern.
#[derive(Debug, Clone, Serialize)]
pub struct BadgeAggregate {
    pub id: String,
    pub name: String,
    pub category: String,
    pub pattern: String,
    pub sample_image: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub placeholder: String,
    pub repos: Vec<String>,
}

/// Accumulator for the cross-document fold. Entries keep first-seen order;
/// `by_pattern` indexes into them.
#[derive(Default)]
pub struct BadgeIndex {
    entries: Vec<BadgeAggregate>,
    by_pattern: HashMap<String, usize>,
}

impl BadgeIndex {
    /// Record one occurrence. The first sighting of a pattern fixes its
    /// classification and sample image (the rule placeholder wins over the
    /// concrete image when configured); later sightings only append the repo.
    pub fn record(&mut self, pattern: &str, image_url: &str, cls: &Classification, repo: &str) {
        let idx = match self.by_pattern.get(pattern) {
            Some(&i) => i,
            None => {
                let sample = if cls.placeholder.is_empty() {
                    image_url.to_string()
                } else {
                    cls.placeholder.clone()
                };
                self.entries.push(BadgeAggregate {
                    id: cls.id.clone(),
                    name: cls.name.clone(),
                    category: cls.category.clone(),
                    pattern: pattern.to_string(),
                    sample_image: sample,
                    placeholder: cls.placeholder.clone(),
                    repos: Vec::new(),
                });
                self.by_pattern.insert(pattern.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[idx];
        if !entry.repos.iter().any(|r| r == repo) {
            entry.repos.push(repo.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[BadgeAggregate] {
        &self.entries
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoSummary {
    pub name: String,
    pub badge_count: usize,
    /// Ids in badge order, duplicates preserved when several badges resolve
    /// to the same rule.
    pub badge_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub name: String,
    pub badges: Vec<BadgeAggregate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub org: String,
    pub total_repos: usize,
    pub total_badges: usize,
    pub repos_with_badges: usize,
    pub repos_without_badges: usize,
    pub unique_badges: usize,
    pub last_updated: String,
    pub repositories: Vec<RepoSummary>,
    pub categories: Vec<CategoryGroup>,
}

/// Fold every document's badges into per-repo summaries and category groups.
/// Sequential by design: the pattern map is shared mutable state.
pub fn aggregate(
    docs: &[DocumentRecord],
    rules: &CompiledRules,
    org: &str,
    last_updated: &str,
) -> Dashboard {
    let mut index = BadgeIndex::default();
    let mut repositories = Vec::with_capacity(docs.len());
    let mut total_badges = 0usize;
    let mut with_badges = 0usize;

    for doc in docs {
        let mut badge_ids = Vec::with_capacity(doc.badges.len());
        for badge in &doc.badges {
            let pattern = canonicalize(&badge.image_url, org, &doc.name);
            let cls = rules.classify(&pattern);
            index.record(&pattern, &badge.image_url, &cls, &doc.name);
            badge_ids.push(cls.id);
        }

        total_badges += doc.badges.len();
        if !doc.badges.is_empty() {
            with_badges += 1;
        }
        repositories.push(RepoSummary {
            name: doc.name.clone(),
            badge_count: doc.badges.len(),
            badge_ids,
        });
    }

    repositories.sort_by(|a, b| a.name.cmp(&b.name));

    Dashboard {
        org: org.to_string(),
        total_repos: docs.len(),
        total_badges,
        repos_with_badges: with_badges,
        repos_without_badges: docs.len() - with_badges,
        unique_badges: index.len(),
        last_updated: last_updated.to_string(),
        repositories,
        categories: group_by_category(&index),
    }
}

/// Categories ascending with "Unknown" forced last; badges within a category
/// by descending repo count, first-seen order breaking ties.
fn group_by_category(index: &BadgeIndex) -> Vec<CategoryGroup> {
    let mut by_cat: BTreeMap<&str, Vec<BadgeAggregate>> = BTreeMap::new();
    for entry in index.entries() {
        by_cat.entry(&entry.category).or_default().push(entry.clone());
    }

    let mut groups = Vec::with_capacity(by_cat.len());
    let mut unknown = None;
    for (name, mut badges) in by_cat {
        badges.sort_by(|a, b| b.repos.len().cmp(&a.repos.len()));
        let group = CategoryGroup {
            name: name.to_string(),
            badges,
        };
        if group.name == "Unknown" {
            unknown = Some(group);
        } else {
            groups.push(group);
        }
    }
    if let Some(group) = unknown {
        groups.push(group);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BadgeRow;
    use crate::indexer::rules::{BadgeRule, RuleSet};

    fn doc(name: &str, image_urls: &[&str]) -> DocumentRecord {
        DocumentRecord {
            name: name.to_string(),
            url: format!("https://github.com/acme/{}", name),
            default_branch: "main".to_string(),
            readme_found: !image_urls.is_empty(),
            badges: image_urls
                .iter()
                .enumerate()
                .map(|(i, u)| BadgeRow {
                    repo_name: name.to_string(),
                    position: i as i64,
                    alt_text: String::new(),
                    image_url: u.to_string(),
                    target_url: "https://example.com".to_string(),
                    host_image: String::new(),
                    host_target: String::new(),
                })
                .collect(),
        }
    }

    fn rules(defs: &[(&str, &str, &str, &str)]) -> CompiledRules {
        CompiledRules::compile(&RuleSet {
            badges: defs
                .iter()
                .map(|(id, pattern, name, category)| BadgeRule {
                    id: id.to_string(),
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                    category: category.to_string(),
                    placeholder: None,
                })
                .collect(),
        })
    }

    #[test]
    fn same_badge_across_repos_dedupes_to_one_aggregate() {
        let docs = vec![
            doc("widget", &["https://codecov.io/gh/acme/widget/badge.svg"]),
            doc("gadget", &["https://codecov.io/gh/acme/gadget/badge.svg"]),
        ];
        let rules = rules(&[("cov", "https://codecov.io/gh/{ORG}/{REPO}/*", "Codecov", "Coverage")]);

        let dash = aggregate(&docs, &rules, "acme", "");
        assert_eq!(dash.unique_badges, 1);
        assert_eq!(dash.total_badges, 2);
        let badge = &dash.categories[0].badges[0];
        assert_eq!(badge.pattern, "https://codecov.io/gh/{ORG}/{REPO}/*");
        assert_eq!(badge.repos, vec!["widget", "gadget"]);
    }

    #[test]
    fn repo_listed_once_per_aggregate() {
        let docs = vec![doc(
            "widget",
            &[
                "https://codecov.io/gh/acme/widget/badge.svg",
                "https://codecov.io/gh/acme/widget/badge.svg",
            ],
        )];
        let rules = rules(&[("cov", "https://codecov.io/gh/{ORG}/{REPO}/*", "Codecov", "Coverage")]);

        let dash = aggregate(&docs, &rules, "acme", "");
        assert_eq!(dash.total_badges, 2);
        assert_eq!(dash.categories[0].badges[0].repos, vec!["widget"]);
        // The per-repo summary keeps both ids.
        assert_eq!(dash.repositories[0].badge_ids, vec!["cov", "cov"]);
    }

    #[test]
    fn unknown_category_sorts_last() {
        let docs = vec![doc(
            "widget",
            &[
                "https://bsvc/badge.svg",
                "https://asvc/badge.svg",
                "https://mystery/badge.svg",
            ],
        )];
        let rules = rules(&[
            ("b", "https://bsvc/*", "B Badge", "B"),
            ("a", "https://asvc/*", "A Badge", "A"),
        ]);

        let dash = aggregate(&docs, &rules, "acme", "");
        let names: Vec<&str> = dash.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "Unknown"]);
    }

    #[test]
    fn badges_in_category_sorted_by_repo_count() {
        let docs = vec![
            doc("one", &["https://svc/x.svg", "https://svc/y.svg"]),
            doc("two", &["https://svc/y.svg"]),
            doc("three", &["https://svc/y.svg"]),
        ];
        let rules = rules(&[
            ("x", "https://svc/x.svg", "X", "Build"),
            ("y", "https://svc/y.svg", "Y", "Build"),
        ]);

        let dash = aggregate(&docs, &rules, "acme", "");
        let badges = &dash.categories[0].badges;
        assert_eq!(badges[0].id, "y");
        assert_eq!(badges[0].repos.len(), 3);
        assert_eq!(badges[1].id, "x");
    }

    #[test]
    fn first_seen_classification_and_sample_stick() {
        let mut set = RuleSet::default();
        set.badges.push(BadgeRule {
            id: "cov".to_string(),
            pattern: "https://codecov.io/*".to_string(),
            name: "Codecov".to_string(),
            category: "Coverage".to_string(),
            placeholder: Some("https://placeholder/codecov.svg".to_string()),
        });
        let rules = CompiledRules::compile(&set);

        let docs = vec![
            doc("widget", &["https://codecov.io/gh/acme/widget/badge.svg"]),
            doc("gadget", &["https://codecov.io/gh/acme/gadget/badge.svg"]),
        ];
        let dash = aggregate(&docs, &rules, "acme", "");
        let badge = &dash.categories[0].badges[0];
        // Placeholder overrides the first concrete image.
        assert_eq!(badge.sample_image, "https://placeholder/codecov.svg");
        assert_eq!(badge.repos.len(), 2);
    }

    #[test]
    fn sample_falls_back_to_first_image() {
        let docs = vec![
            doc("widget", &["https://mystery/one.svg"]),
            doc("gadget", &["https://mystery/one.svg"]),
        ];
        let rules = rules(&[]);
        let dash = aggregate(&docs, &rules, "acme", "");
        assert_eq!(dash.categories[0].badges[0].sample_image, "https://mystery/one.svg");
    }

    #[test]
    fn totals_and_repo_ordering() {
        let docs = vec![
            doc("zeta", &["https://svc/x.svg"]),
            doc("alpha", &[]),
        ];
        let rules = rules(&[]);
        let dash = aggregate(&docs, &rules, "acme", "June 1, 2026 12:00 UTC");

        assert_eq!(dash.total_repos, 2);
        assert_eq!(dash.total_badges, 1);
        assert_eq!(dash.repos_with_badges, 1);
        assert_eq!(dash.repos_without_badges, 1);
        assert_eq!(dash.unique_badges, 1);
        assert_eq!(dash.last_updated, "June 1, 2026 12:00 UTC");
        assert_eq!(dash.repositories[0].name, "alpha");
        assert_eq!(dash.repositories[0].badge_count, 0);
        assert_eq!(dash.repositories[1].name, "zeta");
    }

    #[test]
    fn org_and_repo_collapse_in_the_fold() {
        // Same badge shape, different repo names: one aggregate.
        let docs = vec![
            doc("widget", &["https://github.com/acme/widget/actions/workflows/ci.yml/badge.svg"]),
            doc("gadget", &["https://github.com/acme/gadget/actions/workflows/rust.yml/badge.svg"]),
        ];
        let rules = rules(&[("gha", "https://github.com/{ORG}/{REPO}/*", "Actions", "Build")]);
        let dash = aggregate(&docs, &rules, "acme", "");
        assert_eq!(dash.unique_badges, 1);
        assert_eq!(dash.categories[0].badges[0].pattern, "https://github.com/{ORG}/{REPO}/*");
        assert_eq!(dash.categories[0].badges[0].repos, vec!["widget", "gadget"]);
    }
}
