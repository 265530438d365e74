use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS repos (
            id             INTEGER PRIMARY KEY,
            name           TEXT UNIQUE NOT NULL,
            url            TEXT NOT NULL,
            default_branch TEXT NOT NULL DEFAULT 'main',
            private        BOOLEAN NOT NULL DEFAULT 0,
            visited        BOOLEAN NOT NULL DEFAULT 0,
            visited_at     TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_repos_visited ON repos(visited);

        CREATE TABLE IF NOT EXISTS readmes (
            id           INTEGER PRIMARY KEY,
            repo_id      INTEGER NOT NULL UNIQUE REFERENCES repos(id),
            name         TEXT NOT NULL,
            content      TEXT,
            found        BOOLEAN NOT NULL DEFAULT 0,
            error        TEXT,
            latency_ms   INTEGER,
            processed_at TEXT,
            fetched_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_readmes_name ON readmes(name);

        CREATE TABLE IF NOT EXISTS badges (
            id          INTEGER PRIMARY KEY,
            repo_name   TEXT NOT NULL,
            position    INTEGER NOT NULL,
            alt_text    TEXT NOT NULL DEFAULT '',
            image_url   TEXT NOT NULL,
            target_url  TEXT NOT NULL,
            host_image  TEXT NOT NULL DEFAULT '',
            host_target TEXT NOT NULL DEFAULT '',
            UNIQUE(repo_name, position)
        );
        CREATE INDEX IF NOT EXISTS idx_badges_repo ON badges(repo_name);

        CREATE TABLE IF NOT EXISTS crawl_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Repositories ──

pub struct RepoRow {
    pub name: String,
    pub url: String,
    pub default_branch: String,
    pub private: bool,
}

pub fn insert_repos(conn: &Connection, repos: &[RepoRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO repos (name, url, default_branch, private)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in repos {
            count += stmt.execute(rusqlite::params![
                r.name, r.url, r.default_branch, r.private
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, name FROM repos WHERE visited = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, name FROM repos WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Fetching ──

pub struct ReadmeRow {
    pub repo_id: i64,
    pub name: String,
    pub content: Option<String>,
    pub found: bool,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

// ── Processing ──

pub struct StoredReadme {
    pub readme_id: i64,
    pub repo_name: String,
    pub content: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredReadme>> {
    let sql = format!(
        "SELECT id, name, content
         FROM readmes
         WHERE found = 1 AND content IS NOT NULL AND processed_at IS NULL
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredReadme {
                readme_id: row.get(0)?,
                repo_name: row.get(1)?,
                content: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct BadgeRow {
    pub repo_name: String,
    pub position: i64,
    pub alt_text: String,
    pub image_url: String,
    pub target_url: String,
    pub host_image: String,
    pub host_target: String,
}

pub fn save_badges(conn: &Connection, rows: &[BadgeRow], readme_ids: &[i64]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut insert = tx.prepare(
            "INSERT OR REPLACE INTO badges
             (repo_name, position, alt_text, image_url, target_url, host_image, host_target)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for b in rows {
            insert.execute(rusqlite::params![
                b.repo_name, b.position, b.alt_text, b.image_url, b.target_url,
                b.host_image, b.host_target,
            ])?;
        }

        let mut mark = tx.prepare(
            "UPDATE readmes SET processed_at = datetime('now') WHERE id = ?1",
        )?;
        for id in readme_ids {
            mark.execute(rusqlite::params![id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Reporting ──

pub struct DocumentRecord {
    pub name: String,
    pub url: String,
    pub default_branch: String,
    pub readme_found: bool,
    pub badges: Vec<BadgeRow>,
}

/// All repositories with their badges in extraction order, sorted by name.
pub fn fetch_documents(conn: &Connection) -> Result<Vec<DocumentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT r.name, r.url, r.default_branch, COALESCE(rm.found, 0)
         FROM repos r
         LEFT JOIN readmes rm ON rm.repo_id = r.id
         ORDER BY r.name",
    )?;
    let mut docs = stmt
        .query_map([], |row| {
            Ok(DocumentRecord {
                name: row.get(0)?,
                url: row.get(1)?,
                default_branch: row.get(2)?,
                readme_found: row.get(3)?,
                badges: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT repo_name, position, alt_text, image_url, target_url, host_image, host_target
         FROM badges
         ORDER BY repo_name, position",
    )?;
    let badges = stmt
        .query_map([], |row| {
            Ok(BadgeRow {
                repo_name: row.get(0)?,
                position: row.get(1)?,
                alt_text: row.get(2)?,
                image_url: row.get(3)?,
                target_url: row.get(4)?,
                host_image: row.get(5)?,
                host_target: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_name: std::collections::HashMap<String, Vec<BadgeRow>> =
        std::collections::HashMap::new();
    for b in badges {
        by_name.entry(b.repo_name.clone()).or_default().push(b);
    }
    for doc in &mut docs {
        if let Some(rows) = by_name.remove(&doc.name) {
            doc.badges = rows;
        }
    }
    Ok(docs)
}

// ── Crawl metadata ──

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM crawl_meta WHERE key = ?1")?;
    let mut rows = stmt.query_map([key], |row| row.get(0))?;
    match rows.next() {
        Some(v) => Ok(Some(v?)),
        None => Ok(None),
    }
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO crawl_meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

// ── Overview ──

pub struct HostOverviewRow {
    pub host: String,
    pub badge_count: i64,
    pub repo_count: i64,
}

pub fn fetch_host_overview(conn: &Connection, limit: usize) -> Result<Vec<HostOverviewRow>> {
    let sql = format!(
        "SELECT host_image, COUNT(*), COUNT(DISTINCT repo_name)
         FROM badges
         WHERE host_image != ''
         GROUP BY host_image
         ORDER BY COUNT(*) DESC, host_image
         LIMIT {}",
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(HostOverviewRow {
                host: row.get(0)?,
                badge_count: row.get(1)?,
                repo_count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub repos: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub readmes_found: usize,
    pub missing: usize,
    pub errors: usize,
    pub processed: usize,
    pub badges: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let repos: usize = conn.query_row("SELECT COUNT(*) FROM repos", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM repos WHERE visited = 1", [], |r| r.get(0))?;
    let readmes_found: usize =
        conn.query_row("SELECT COUNT(*) FROM readmes WHERE found = 1", [], |r| r.get(0))?;
    let missing: usize = conn.query_row(
        "SELECT COUNT(*) FROM readmes WHERE found = 0 AND error IS NULL",
        [],
        |r| r.get(0),
    )?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM readmes WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let processed: usize = conn.query_row(
        "SELECT COUNT(*) FROM readmes WHERE processed_at IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let badges: usize = conn.query_row("SELECT COUNT(*) FROM badges", [], |r| r.get(0))?;
    Ok(Stats {
        repos,
        visited,
        unvisited: repos - visited,
        readmes_found,
        missing,
        errors,
        processed,
        badges,
    })
}
