use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::db::RepoRow;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("badge_scan/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: usize = 100;

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    html_url: String,
    default_branch: Option<String>,
    private: bool,
}

/// Thin GitHub REST client. Reads an optional token from GITHUB_TOKEN;
/// unauthenticated requests work but hit the 60/hour rate limit quickly.
pub struct GithubClient {
    http: reqwest::Client,
    token: Option<String>,
}

impl GithubClient {
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        if token.is_none() {
            warn!("GITHUB_TOKEN not set, using unauthenticated requests");
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { http, token })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// List an organization's repositories, 100 per page until a short page.
    /// Private repositories are skipped unless `include_private` is set.
    pub async fn list_org_repos(&self, org: &str, include_private: bool) -> Result<Vec<RepoRow>> {
        let mut repos = Vec::new();
        let mut page = 1usize;
        loop {
            let url = format!(
                "{}/orgs/{}/repos?per_page={}&page={}",
                API_BASE, org, PER_PAGE, page
            );
            let resp = self
                .get(&url)
                .send()
                .await
                .with_context(|| format!("listing repositories for {}", org))?;
            let status = resp.status();
            if !status.is_success() {
                anyhow::bail!("GitHub returned {} for {}", status, url);
            }
            let body = resp.text().await.context("reading repository list")?;
            let batch: Vec<ApiRepo> =
                serde_json::from_str(&body).context("decoding repository list")?;
            let batch_len = batch.len();

            for r in batch {
                if r.private && !include_private {
                    continue;
                }
                repos.push(RepoRow {
                    name: r.name,
                    url: r.html_url,
                    default_branch: r.default_branch.unwrap_or_else(|| "main".to_string()),
                    private: r.private,
                });
            }

            if batch_len < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(repos)
    }

    /// Fetch a repository README as raw text. A 404 means the repository has
    /// no README and maps to Ok(None).
    pub async fn fetch_readme(&self, org: &str, repo: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{}/{}/readme", API_BASE, org, repo);
        let resp = self
            .get(&url)
            .header("Accept", "application/vnd.github.raw")
            .send()
            .await
            .with_context(|| format!("fetching README for {}/{}", org, repo))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("GitHub returned {} for {}", status, url);
        }
        let body = resp.text().await.context("reading README body")?;
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_list_decodes_github_shape() {
        let body = r#"[
            {"name": "widget", "html_url": "https://github.com/acme/widget",
             "default_branch": "main", "private": false, "fork": false},
            {"name": "secret", "html_url": "https://github.com/acme/secret",
             "default_branch": "master", "private": true}
        ]"#;
        let repos: Vec<ApiRepo> = serde_json::from_str(body).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "widget");
        assert_eq!(repos[0].default_branch.as_deref(), Some("main"));
        assert!(repos[1].private);
    }

    #[test]
    fn missing_default_branch_tolerated() {
        let body = r#"[{"name": "w", "html_url": "https://github.com/acme/w", "private": false}]"#;
        let repos: Vec<ApiRepo> = serde_json::from_str(body).unwrap();
        assert!(repos[0].default_branch.is_none());
    }
}
