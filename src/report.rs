use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{self, DocumentRecord};
use crate::indexer::aggregate::{self, BadgeAggregate, Dashboard};
use crate::indexer::canonical::canonicalize;
use crate::indexer::rules::{self, CompiledRules};
use crate::indexer::slugify;

#[derive(Serialize)]
struct RepoPage {
    name: String,
    url: String,
    default_branch: String,
    readme_found: bool,
    badge_count: usize,
    badges: Vec<RepoPageBadge>,
}

#[derive(Serialize)]
struct RepoPageBadge {
    id: String,
    name: String,
    category: String,
    pattern: String,
    alt_text: String,
    image_url: String,
    target_url: String,
}

#[derive(Serialize)]
struct BadgePage {
    id: String,
    name: String,
    category: String,
    pattern: String,
    sample_image: String,
    repo_count: usize,
    repos: Vec<BadgePageRepo>,
}

#[derive(Serialize)]
struct BadgePageRepo {
    name: String,
    image_url: String,
    target_url: String,
}

/// Aggregate everything in the store and write the JSON report tree:
/// index.json, repos/<name>.json, badges/<id>.json.
pub fn write_reports(conn: &Connection, rules_path: &Path, out_dir: &Path) -> Result<Dashboard> {
    let set = rules::load_rules(rules_path);
    let compiled = CompiledRules::compile(&set);
    if compiled.is_empty() {
        warn!("No usable classification rules, every badge will be Unknown");
    } else {
        info!("{} classification rules active", compiled.len());
    }

    let org = db::get_meta(conn, "org")?.unwrap_or_default();
    let last_crawled = db::get_meta(conn, "last_crawled")?;
    let last_updated = format_timestamp(last_crawled.as_deref());

    let docs = db::fetch_documents(conn)?;
    let dashboard = aggregate::aggregate(&docs, &compiled, &org, &last_updated);

    let repos_dir = out_dir.join("repos");
    let badges_dir = out_dir.join("badges");
    fs::create_dir_all(&repos_dir)
        .with_context(|| format!("creating {}", repos_dir.display()))?;
    fs::create_dir_all(&badges_dir)
        .with_context(|| format!("creating {}", badges_dir.display()))?;

    write_json(&out_dir.join("index.json"), &dashboard)?;

    for doc in &docs {
        let page = repo_page(doc, &compiled, &org);
        write_json(&repos_dir.join(format!("{}.json", slugify(&doc.name))), &page)?;
    }

    for group in &dashboard.categories {
        for badge in &group.badges {
            let page = badge_page(badge, &docs, &org);
            write_json(&badges_dir.join(format!("{}.json", badge.id)), &page)?;
        }
    }

    info!(
        "Report written: {} repos, {} badge pages",
        docs.len(),
        dashboard.unique_badges
    );
    Ok(dashboard)
}

fn repo_page(doc: &DocumentRecord, rules: &CompiledRules, org: &str) -> RepoPage {
    let badges = doc
        .badges
        .iter()
        .map(|b| {
            let pattern = canonicalize(&b.image_url, org, &doc.name);
            let cls = rules.classify(&pattern);
            RepoPageBadge {
                id: cls.id,
                name: cls.name,
                category: cls.category,
                pattern,
                alt_text: b.alt_text.clone(),
                image_url: b.image_url.clone(),
                target_url: b.target_url.clone(),
            }
        })
        .collect::<Vec<_>>();

    RepoPage {
        name: doc.name.clone(),
        url: doc.url.clone(),
        default_branch: doc.default_branch.clone(),
        readme_found: doc.readme_found,
        badge_count: badges.len(),
        badges,
    }
}

/// One page per aggregate: for each referencing repo, the concrete badge
/// instance is recovered by re-canonicalizing that repo's badges until the
/// pattern matches.
fn badge_page(agg: &BadgeAggregate, docs: &[DocumentRecord], org: &str) -> BadgePage {
    let mut repos = Vec::with_capacity(agg.repos.len());
    for doc in docs {
        if !agg.repos.iter().any(|r| r == &doc.name) {
            continue;
        }
        for badge in &doc.badges {
            if canonicalize(&badge.image_url, org, &doc.name) == agg.pattern {
                repos.push(BadgePageRepo {
                    name: doc.name.clone(),
                    image_url: badge.image_url.clone(),
                    target_url: badge.target_url.clone(),
                });
                break;
            }
        }
    }

    BadgePage {
        id: agg.id.clone(),
        name: agg.name.clone(),
        category: agg.category.clone(),
        pattern: agg.pattern.clone(),
        sample_image: agg.sample_image.clone(),
        repo_count: repos.len(),
        repos,
    }
}

/// Render an RFC 3339 crawl timestamp like "August 21, 2026 16:45 UTC".
fn format_timestamp(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "Unknown".to_string();
    };
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&chrono::Utc)
            .format("%B %-d, %Y %H:%M UTC")
            .to_string(),
        Err(_) => "Unknown".to_string(),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing report")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
