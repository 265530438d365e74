use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::ReadmeRow;
use crate::github::GithubClient;

const CONCURRENCY: usize = 10;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub missing: usize,
    pub errors: usize,
}

/// Fetch READMEs concurrently, saving each result to DB as it arrives.
pub async fn fetch_readmes_streaming(
    conn: &Connection,
    client: GithubClient,
    org: &str,
    repos: Vec<(i64, String)>,
) -> Result<FetchStats> {
    let client = Arc::new(client);
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = repos.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ReadmeRow>(CONCURRENCY * 2);

    // Spawn all fetch tasks
    for (repo_id, name) in repos {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let org = org.to_string();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            match fetch_with_retry(&client, &org, repo_id, &name).await {
                Ok(row) => {
                    let _ = tx.send(row).await;
                }
                Err(e) => {
                    warn!("Task failed for {}: {}", name, e);
                    // Send error row so we still mark as visited
                    let _ = tx
                        .send(ReadmeRow {
                            repo_id,
                            name,
                            content: None,
                            found: false,
                            error: Some(e.to_string()),
                            latency_ms: None,
                        })
                        .await;
                }
            }
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    // Receive and save each result immediately
    let mut ok = 0usize;
    let mut missing = 0usize;
    let mut errors = 0usize;

    // Prepare statements once, reuse for each row
    let mut insert_stmt = conn.prepare(
        "INSERT OR REPLACE INTO readmes (repo_id, name, content, found, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut update_stmt = conn.prepare(
        "UPDATE repos SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else if row.found {
            ok += 1;
        } else {
            missing += 1;
        }

        // Save immediately
        save_one(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Fetched {} READMEs ({} ok, {} missing, {} errors)",
        total, ok, missing, errors
    );

    Ok(FetchStats {
        total,
        ok,
        missing,
        errors,
    })
}

/// Save a single fetch result to DB using pre-prepared statements.
fn save_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &ReadmeRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.repo_id, row.name, row.content, row.found, row.error, row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.repo_id])?;
    Ok(())
}

async fn fetch_with_retry(
    client: &GithubClient,
    org: &str,
    repo_id: i64,
    name: &str,
) -> Result<ReadmeRow> {
    for attempt in 0..=MAX_RETRIES {
        let row = fetch_one(client, org, repo_id, name).await;

        let should_retry = match &row.error {
            Some(e) if e.contains("403") || e.contains("429") || e.contains("rate") => true,
            Some(e) if e.contains("500") || e.contains("502") || e.contains("503") => true,
            _ => false,
        };

        if !should_retry || attempt == MAX_RETRIES {
            return Ok(row);
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
            name,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
    }

    Ok(fetch_one(client, org, repo_id, name).await)
}

async fn fetch_one(client: &GithubClient, org: &str, repo_id: i64, name: &str) -> ReadmeRow {
    let start = Instant::now();
    let result = client.fetch_readme(org, name).await;
    let elapsed = start.elapsed().as_millis() as i64;

    match result {
        Ok(Some(content)) => ReadmeRow {
            repo_id,
            name: name.to_string(),
            content: Some(content),
            found: true,
            error: None,
            latency_ms: Some(elapsed),
        },
        Ok(None) => ReadmeRow {
            repo_id,
            name: name.to_string(),
            content: None,
            found: false,
            error: None,
            latency_ms: Some(elapsed),
        },
        Err(e) => ReadmeRow {
            repo_id,
            name: name.to_string(),
            content: None,
            found: false,
            error: Some(format!("{:#}", e)),
            latency_ms: Some(elapsed),
        },
    }
}
