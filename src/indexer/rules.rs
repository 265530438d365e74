use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One configured badge pattern. File order is precedence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeRule {
    pub id: String,
    pub pattern: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    pub badges: Vec<BadgeRule>,
}

/// Load rules from a JSON file. A missing or malformed file degrades to an
/// empty set; every pattern then classifies to the Unknown fallback.
pub fn load_rules(path: &Path) -> RuleSet {
    match try_load(path) {
        Ok(set) => set,
        Err(e) => {
            warn!("Using empty rule set: {:#}", e);
            RuleSet::default()
        }
    }
}

fn try_load(path: &Path) -> Result<RuleSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading rule config {}", path.display()))?;
    let set: RuleSet = serde_json::from_str(&raw)
        .with_context(|| format!("parsing rule config {}", path.display()))?;
    Ok(set)
}

/// Outcome of classifying one canonical pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub id: String,
    pub name: String,
    pub category: String,
    pub placeholder: String,
}

struct CompiledRule {
    rule: BadgeRule,
    matcher: Regex,
}

/// Rule set with every template compiled to an anchored regex, evaluated
/// in order, first match wins.
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
}

impl CompiledRules {
    /// Compile every rule, preserving order. A template that fails to
    /// compile is dropped, not fatal.
    pub fn compile(set: &RuleSet) -> Self {
        let rules = set
            .badges
            .iter()
            .filter_map(|rule| match compile_template(&rule.pattern) {
                Ok(matcher) => Some(CompiledRule {
                    rule: rule.clone(),
                    matcher,
                }),
                Err(e) => {
                    warn!("Skipping rule '{}': {}", rule.id, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify a canonical pattern. Exhausting the rules yields the Unknown
    /// fallback with an id derived from the pattern itself, so the id is
    /// never empty.
    pub fn classify(&self, pattern: &str) -> Classification {
        for entry in &self.rules {
            if entry.matcher.is_match(pattern) {
                return Classification {
                    id: entry.rule.id.clone(),
                    name: entry.rule.name.clone(),
                    category: entry.rule.category.clone(),
                    placeholder: entry.rule.placeholder.clone().unwrap_or_default(),
                };
            }
        }

        let mut id = super::slugify(pattern);
        if id.is_empty() {
            id = "unknown".to_string();
        }
        Classification {
            id,
            name: "Unknown".to_string(),
            category: "Unknown".to_string(),
            placeholder: String::new(),
        }
    }
}

/// Template to anchored regex: literals escaped, `{ORG}` and `{REPO}` match
/// one path segment, `*` matches any run of characters.
fn compile_template(template: &str) -> Result<Regex, regex::Error> {
    let expanded = regex::escape(template)
        .replace(r"\{ORG\}", "[^/]+")
        .replace(r"\{REPO\}", "[^/]+")
        .replace(r"\*", ".*");
    Regex::new(&format!("^{}$", expanded))
}
