mod db;
mod error;
mod manuscript;
mod model;
mod pages;
mod parser;
mod settings;
mod thesaurus;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::info;

use manuscript::{Manuscript, SearchQuery};
use model::{MarginPosition, Property, Version};
use parser::extract::context::{scan_entry, ContextLocator, ContextRow};
use settings::Settings;
use thesaurus::Thesaurus;

#[derive(Parser)]
#[command(name = "ms_object", about = "Manuscript entry assembly and term extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble entries from the page files and store them
    Build {
        /// Only store these identities (default: all)
        #[arg(long, num_args = 1..)]
        entries: Vec<String>,
    },
    /// Locate the context of tagged terms in stored entries
    Context {
        /// tc, tcn or tl (default: all three)
        #[arg(short, long)]
        version: Option<Version>,
        /// Property name, e.g. material (default: all semantic categories)
        #[arg(short, long)]
        property: Option<Property>,
    },
    /// Report missing versions, unbalanced markup and term count mismatches
    Check,
    /// Entries having terms of a property
    Search {
        #[arg(short, long)]
        property: Property,
        /// Terms that must all occur in one version (default: any term)
        #[arg(short, long)]
        term: Vec<String>,
    },
    /// Entries with a margin note containing a term
    Margins {
        #[arg(short, long)]
        version: Version,
        #[arg(short, long)]
        term: String,
        /// e.g. left-top, bottom
        #[arg(long)]
        position: Option<MarginPosition>,
    },
    /// Term frequencies of one property and the entries holding each term, as JSON
    Terms {
        #[arg(short, long)]
        property: Property,
        #[arg(short, long, default_value = "tl")]
        version: Version,
    },
    /// Write all entries as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Stored entries overview table
    Overview {
        /// Filter by category (e.g. "casting")
        #[arg(short, long)]
        category: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show database statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = settings::load()?;
    info!(data_dir = %settings.data_dir.display(), db = %settings.db_path.display(), "settings loaded");

    let result = match cli.command {
        Commands::Build { entries } => {
            let Some(loaded) = load_manuscript(&settings)? else {
                return Ok(());
            };
            let ms = if entries.is_empty() {
                loaded.manuscript
            } else {
                loaded.manuscript.filter(&entries)
            };
            if ms.is_empty() {
                println!("No entries to store.");
                return Ok(());
            }
            let conn = open_db(&settings)?;
            let run = db::start_run(&conn, loaded.pages, loaded.failed)?;
            let saved = db::save_entries(&conn, run, ms.entries())?;
            println!(
                "Saved {} entries from {} pages ({} failed).",
                saved, loaded.pages, loaded.failed
            );
            Ok(())
        }
        Commands::Context { version, property } => {
            let conn = open_db(&settings)?;
            let stored = db::stored_identities(&conn)?;
            if stored.is_empty() {
                println!("No entries stored. Run 'build' first.");
                return Ok(());
            }
            let Some(loaded) = load_manuscript(&settings)? else {
                return Ok(());
            };
            let ms = loaded.manuscript.filter(&stored);

            let versions = version.map_or_else(|| Version::ALL.to_vec(), |v| vec![v]);
            let properties = property.map_or_else(|| Property::CONTEXTUAL.to_vec(), |p| vec![p]);
            let rows = scan_contexts(&ms, &versions, &properties, settings.context_window);
            let located = rows.iter().filter(|r| r.located).count();
            let ambiguous = rows.iter().filter(|r| r.ambiguous).count();
            let saved = db::save_contexts(&conn, &rows)?;
            println!(
                "Saved {} context rows ({} located, {} not found, {} ambiguous).",
                saved,
                located,
                rows.len() - located,
                ambiguous
            );
            Ok(())
        }
        Commands::Check => {
            let Some(loaded) = load_manuscript(&settings)? else {
                return Ok(());
            };
            let report = loaded.manuscript.consistency_report();
            for issue in &report {
                if !issue.missing.is_empty() {
                    println!("{}: no {} version", issue.identity, join_versions(&issue.missing));
                }
                if !issue.unbalanced.is_empty() {
                    println!("{}: unbalanced tags in {}", issue.identity, join_versions(&issue.unbalanced));
                }
                for m in &issue.mismatched {
                    println!(
                        "{}: unequal {} counts (tc {}, tcn {}, tl {})",
                        issue.identity, m.property, m.counts.tc, m.counts.tcn, m.counts.tl
                    );
                }
            }
            println!(
                "\n{} of {} entries have issues.",
                report.len(),
                loaded.manuscript.len()
            );
            Ok(())
        }
        Commands::Search { property, term } => {
            let Some(loaded) = load_manuscript(&settings)? else {
                return Ok(());
            };
            let query = if term.is_empty() {
                SearchQuery::new().any(property)
            } else {
                SearchQuery::new().terms(property, term)
            };
            print_identities(&loaded.manuscript.search(&query));
            Ok(())
        }
        Commands::Margins { version, term, position } => {
            let Some(loaded) = load_manuscript(&settings)? else {
                return Ok(());
            };
            print_identities(&loaded.manuscript.search_margins(version, &term, position));
            Ok(())
        }
        Commands::Terms { property, version } => {
            let Some(loaded) = load_manuscript(&settings)? else {
                return Ok(());
            };
            let stats = loaded.manuscript.term_frequencies(property, version);
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Export { out } => {
            let Some(loaded) = load_manuscript(&settings)? else {
                return Ok(());
            };
            let json = serde_json::to_string_pretty(&loaded.manuscript.to_json())?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {} entries to {}", loaded.manuscript.len(), path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
        Commands::Overview { category, limit } => {
            let conn = open_db(&settings)?;
            let rows = db::fetch_overview(&conn, category.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No entries found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<12} | {:<6} | {:<32} | {:<24} | {:>6} | {:>5} | {:>4} | {:<7}",
                "#", "Entry", "Folio", "Title (tl)", "Categories", "Length", "Terms", "Marg", "Missing"
            );
            println!("{}", "-".repeat(121));

            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<12} | {:<6} | {:<32} | {:<24} | {:>6} | {:>5} | {:>4} | {:<7}",
                    i + 1,
                    truncate(&r.identity, 12),
                    model::folio_display(&r.folio),
                    truncate(&r.title, 32),
                    truncate(&r.categories, 24),
                    r.length,
                    r.terms,
                    r.margins,
                    r.missing
                );
            }

            println!("\n{} entries", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:       {}", s.runs);
            println!("Last run:   {}", s.last_run.as_deref().unwrap_or("-"));
            println!("Entries:    {}", s.entries);
            println!("Incomplete: {}", s.incomplete);
            println!("Unbalanced: {}", s.unbalanced);
            println!("Terms:      {}", s.terms);
            println!("Margins:    {}", s.margins);
            println!("Contexts:   {}", s.contexts);
            println!("Not found:  {}", s.unlocated);
            println!("Ambiguous:  {}", s.ambiguous);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct Loaded {
    manuscript: Manuscript,
    pages: usize,
    failed: usize,
}

/// Read, parse and assemble every page, then apply the thesaurus if one is
/// configured. `None` when there are no page files.
fn load_manuscript(settings: &Settings) -> anyhow::Result<Option<Loaded>> {
    let pages = pages::load_pages(&settings.data_dir)?;
    if pages.is_empty() {
        println!("No page files under {}.", settings.data_dir.display());
        return Ok(None);
    }

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages ({per_sec})")?
            .progress_chars("#>-"),
    );
    let (manuscript, failures) = parser::build_manuscript(&pages, || pb.inc(1));
    pb.finish_and_clear();

    let manuscript = match &settings.thesaurus {
        Some(path) => manuscript.with_thesaurus(&Thesaurus::load(path)?),
        None => manuscript,
    };
    Ok(Some(Loaded {
        manuscript,
        pages: pages.len(),
        failed: failures.len(),
    }))
}

fn scan_contexts(
    ms: &Manuscript,
    versions: &[Version],
    properties: &[Property],
    window: usize,
) -> Vec<ContextRow> {
    versions
        .iter()
        .flat_map(|&version| {
            let locator = ContextLocator::for_version(version, window);
            ms.entries()
                .par_iter()
                .flat_map_iter(|e| scan_entry(e, &locator, properties))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn open_db(settings: &Settings) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn join_versions(versions: &[Version]) -> String {
    versions.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
}

fn print_identities(ids: &[String]) {
    for id in ids {
        println!("{id}");
    }
    println!("\n{} entries", ids.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
