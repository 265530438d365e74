mod db;
mod github;
mod indexer;
mod parser;
mod report;
mod scraper;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "badge_scan", about = "GitHub organization README badge scanner")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, default_value = "data/badges.sqlite")]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an organization and its repository list
    Init {
        /// GitHub organization to scan
        #[arg(short, long)]
        org: String,
        /// Include private repositories
        #[arg(long)]
        private: bool,
    },
    /// Fetch READMEs for unvisited repositories
    Scrape {
        /// Max repositories to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract badges from fetched READMEs
    Process {
        /// Max READMEs to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// List + fetch + extract in one pipeline
    Run {
        /// GitHub organization to scan
        #[arg(short, long)]
        org: String,
        /// Include private repositories
        #[arg(long)]
        private: bool,
    },
    /// Aggregate badges and write the JSON report pages
    Report {
        /// Badge classification rules file
        #[arg(long, default_value = "badges.json")]
        rules: PathBuf,
        /// Output directory for report pages
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
    /// Show crawl statistics
    Stats,
    /// Most common badge image hosts
    Overview {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let Cli { db: db_path, command } = Cli::parse();

    let result = match command {
        Commands::Init { org, private } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let client = github::GithubClient::from_env()?;
            println!("Listing repositories for {}...", org);
            let repos = client.list_org_repos(&org, private).await?;
            let inserted = db::insert_repos(&conn, &repos)?;
            db::set_meta(&conn, "org", &org)?;
            println!(
                "Inserted {} new repositories ({} total listed)",
                inserted,
                repos.len()
            );
            Ok(())
        }
        Commands::Scrape { limit } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let Some(org) = db::get_meta(&conn, "org")? else {
                println!("No organization registered. Run 'init' first.");
                return Ok(());
            };
            let repos = db::fetch_unvisited(&conn, limit)?;
            if repos.is_empty() {
                println!("No unvisited repositories. Run 'init' first or all READMEs are fetched.");
                return Ok(());
            }
            let client = github::GithubClient::from_env()?;
            println!("Fetching {} READMEs (streaming to DB)...", repos.len());
            let stats = scraper::fetch_readmes_streaming(&conn, client, &org, repos).await?;
            db::set_meta(&conn, "last_crawled", &chrono::Utc::now().to_rfc3339())?;
            println!(
                "Done: {} fetched ({} ok, {} missing, {} errors).",
                stats.total, stats.ok, stats.missing, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let readmes = db::fetch_unprocessed(&conn, limit)?;
            if readmes.is_empty() {
                println!("No unprocessed READMEs. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} READMEs...", readmes.len());
            let counts = process_readmes(&conn, &readmes)?;
            counts.print();
            Ok(())
        }
        Commands::Run { org, private } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let client = github::GithubClient::from_env()?;

            // Phase 1: repository inventory
            println!("Pipeline: listing repositories for {}...", org);
            let repos = client.list_org_repos(&org, private).await?;
            let inserted = db::insert_repos(&conn, &repos)?;
            db::set_meta(&conn, "org", &org)?;
            println!(
                "Inserted {} new repositories ({} total listed)",
                inserted,
                repos.len()
            );

            let pending = db::fetch_unvisited(&conn, None)?;
            if pending.is_empty() {
                println!("Nothing to fetch (all repositories already visited).");
                return Ok(());
            }

            // Phase 2: fetch (streaming to DB)
            let t_fetch = Instant::now();
            println!("Fetching {} READMEs (streaming to DB)...", pending.len());
            let stats = scraper::fetch_readmes_streaming(&conn, client, &org, pending).await?;
            db::set_meta(&conn, "last_crawled", &chrono::Utc::now().to_rfc3339())?;
            println!(
                "Fetched {} READMEs ({} ok, {} missing, {} errors) in {:.1}s",
                stats.total,
                stats.ok,
                stats.missing,
                stats.errors,
                t_fetch.elapsed().as_secs_f64()
            );

            // Phase 3: extract
            let t_process = Instant::now();
            let readmes = db::fetch_unprocessed(&conn, None)?;
            if readmes.is_empty() {
                println!("Nothing to process (no READMEs found).");
                return Ok(());
            }
            println!("Processing {} READMEs...", readmes.len());
            let counts = process_readmes(&conn, &readmes)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Report { rules, output } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let dashboard = report::write_reports(&conn, &rules, &output)?;
            print_dashboard(&dashboard);
            println!("\nReport written to {}/", output.display());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Repos:     {}", s.repos);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("READMEs:   {}", s.readmes_found);
            println!("Missing:   {}", s.missing);
            println!("Errors:    {}", s.errors);
            println!("Processed: {}", s.processed);
            println!("Badges:    {}", s.badges);
            Ok(())
        }
        Commands::Overview { limit } => {
            let conn = db::connect(&db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_host_overview(&conn, limit)?;
            if rows.is_empty() {
                println!("No badges extracted yet. Run 'process' first.");
                return Ok(());
            }

            println!("{:>3} | {:<32} | {:>6} | {:>5}", "#", "Image host", "Badges", "Repos");
            println!("{}", "-".repeat(56));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<32} | {:>6} | {:>5}",
                    i + 1,
                    truncate(&r.host, 32),
                    r.badge_count,
                    r.repo_count
                );
            }
            println!("\n{} hosts", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct ProcessCounts {
    readmes: usize,
    with_badges: usize,
    badges: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Extracted {} badges from {} READMEs ({} had none).",
            self.badges,
            self.readmes,
            self.readmes - self.with_badges,
        );
    }
}

fn process_readmes(
    conn: &rusqlite::Connection,
    readmes: &[db::StoredReadme],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(readmes.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        readmes: 0,
        with_badges: 0,
        badges: 0,
    };

    for chunk in readmes.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|r| parser::process_readme(&r.repo_name, &r.content))
            .collect();

        let mut rows = Vec::new();
        let mut readme_ids = Vec::with_capacity(chunk.len());
        for (readme, badges) in chunk.iter().zip(results) {
            readme_ids.push(readme.readme_id);
            counts.readmes += 1;
            if !badges.is_empty() {
                counts.with_badges += 1;
            }
            counts.badges += badges.len();
            rows.extend(badges);
        }

        db::save_badges(conn, &rows, &readme_ids)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn print_dashboard(d: &indexer::aggregate::Dashboard) {
    let org = if d.org.is_empty() { "(unknown)" } else { &d.org };
    println!("Organization: {}", org);
    println!(
        "Repositories: {} ({} with badges, {} without)",
        d.total_repos, d.repos_with_badges, d.repos_without_badges
    );
    println!(
        "Badges:       {} total, {} unique patterns",
        d.total_badges, d.unique_badges
    );
    println!("Last crawled: {}", d.last_updated);

    if d.categories.is_empty() {
        return;
    }
    println!(
        "\n{:<16} | {:<28} | {:<24} | {:>5}",
        "Category", "Badge", "ID", "Repos"
    );
    println!("{}", "-".repeat(82));
    for cat in &d.categories {
        for badge in &cat.badges {
            println!(
                "{:<16} | {:<28} | {:<24} | {:>5}",
                truncate(&cat.name, 16),
                truncate(&badge.name, 28),
                truncate(&badge.id, 24),
                badge.repos.len()
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
