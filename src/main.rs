mod capture;
mod card;
mod classify;
mod config;
mod enrich;
mod labels;
mod loader;
mod normalize;
mod record;
mod section;
mod shell;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::card::CardView;
use crate::config::Config;
use crate::loader::DataSource;
use crate::record::Category;
use crate::section::{SectionState, SectionView, SortOrder, ViewMode, ALL};
use crate::shell::Shell;

#[derive(Parser)]
#[command(name = "ai_radar", about = "Curated AI resource lists from CSV files")]
struct Cli {
    /// Config file (default: $RADAR_CONFIG or ./radar.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Data directory or base URL, overrides the config
    #[arg(long, global = true)]
    data: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the card lists of every populated section
    Show {
        /// Only this category
        #[arg(short, long)]
        category: Option<Category>,
        /// Global search term
        #[arg(short, long)]
        search: Option<String>,
        /// Subcategory or tag to filter by
        #[arg(short, long)]
        filter: Option<String>,
        /// Default, A-Z, Z-A, Subcategory, Vendor, Country
        #[arg(long, default_value = "Default")]
        sort: SortOrder,
        /// grid or list
        #[arg(long, default_value = "grid")]
        view: ViewMode,
        /// Viewport width; sections start collapsed below 768
        #[arg(long, default_value_t = 1280)]
        width: u32,
        /// Open sections that start collapsed
        #[arg(long)]
        expand: bool,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Facet pills and counts for one section
    Facets {
        #[arg(short, long)]
        category: Category,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Record counts per category
    Stats,
    /// Export a category's full collection as CSV
    Export {
        #[arg(short, long)]
        category: Category,
        /// Output file (default: <Title>_export.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Screenshot rows without an image and record image_url in the CSV
    Capture {
        /// Only the named target (e.g. tools, blogs)
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Label generic links and add part anchors in a show-notes page
    Enrich {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data = data;
    }

    let result = match cli.command {
        Commands::Show { category, search, filter, sort, view, width, expand, json } => {
            let mut shell = load_shell(&config, category).await?;
            if let Some(term) = search {
                shell.set_search(term);
            }
            for c in Category::ALL {
                let state = SectionState::for_viewport(c, width).with_sort(sort).with_view(view);
                let mut state = match &filter {
                    Some(label) => state.with_filter(label.clone()),
                    None => state.clear_filter(),
                };
                if expand && state.collapsed {
                    state = state.toggle_collapsed();
                }
                shell.set_state(state);
            }
            let sections = shell.sections();
            if sections.is_empty() {
                println!("Nothing to show.");
                return Ok(());
            }
            let public = config.public_dir.as_deref();
            if json {
                print_json(&sections, public)?;
            } else {
                for (_, v) in &sections {
                    print_section(v, public);
                }
            }
            Ok(())
        }
        Commands::Facets { category, search } => {
            let mut shell = load_shell(&config, Some(category)).await?;
            if let Some(term) = search {
                shell.set_search(term);
            }
            match shell.view(category) {
                Some(v) => {
                    println!("{:<32} {:>5}", format!("{} (all)", ALL), v.all_count);
                    for f in &v.facets {
                        println!("{:<32} {:>5}", truncate(&f.label, 32), f.count);
                    }
                }
                None => println!("No records in {}.", category),
            }
            Ok(())
        }
        Commands::Stats => {
            let shell = load_shell(&config, None).await?;
            let nav = shell.nav_items();
            for item in &nav {
                println!("{:<12} {:>5}", item.label, item.count);
            }
            let total: usize = nav.iter().map(|n| n.count).sum();
            println!("{}", "-".repeat(18));
            println!("{:<12} {:>5}", "Total", total);
            Ok(())
        }
        Commands::Export { category, out } => {
            let shell = load_shell(&config, Some(category)).await?;
            let csv = section::export_csv(shell.records(category))?;
            let out = out.unwrap_or_else(|| PathBuf::from(section::export_file_name(category)));
            std::fs::write(&out, csv).with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Exported {} records to {}", shell.records(category).len(), out.display());
            Ok(())
        }
        Commands::Capture { target } => {
            let shooter = capture::ChromeScreenshotter::new(&config.capture);
            let targets: Vec<_> = config
                .capture
                .targets
                .iter()
                .filter(|t| target.as_deref().map_or(true, |name| t.name == name))
                .collect();
            if targets.is_empty() {
                println!("No capture targets match.");
                return Ok(());
            }
            let mut total = capture::CaptureReport::default();
            for t in targets {
                match capture::capture_target(&shooter, t).await {
                    Ok(r) => {
                        total.rows += r.rows;
                        total.captured += r.captured;
                        total.existing += r.existing;
                        total.skipped += r.skipped;
                        total.failed += r.failed;
                    }
                    Err(e) => warn!("Target {} failed: {:#}", t.name, e),
                }
            }
            println!(
                "Done: {} rows ({} captured, {} existing, {} skipped, {} failed).",
                total.rows, total.captured, total.existing, total.skipped, total.failed
            );
            Ok(())
        }
        Commands::Enrich { file } => {
            let report = enrich::enrich_file(&file, &config.enrich).await?;
            println!(
                "Assigned {} part ids, relabelled {} of {} generic links.",
                report.part_ids, report.rewritten, report.candidates
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_duration(elapsed));
    }

    result
}

async fn load_shell(config: &Config, only: Option<Category>) -> Result<Shell> {
    let source: DataSource = config.source();
    let files = config.dataset_files(only)?;
    let datasets = loader::load_all(&source, files).await;
    Ok(Shell::from_datasets(datasets))
}

fn print_json(sections: &[(Category, SectionView<'_>)], public: Option<&Path>) -> Result<()> {
    let out: Vec<_> = sections
        .iter()
        .map(|(c, v)| {
            let cards: Vec<CardView> = v.records.iter().map(|r| CardView::from_record(r, public)).collect();
            serde_json::json!({
                "id": c.id(),
                "title": c.title(),
                "state": v.state,
                "all_count": v.all_count,
                "facets": v.facets,
                "custom_tag": v.custom_tag,
                "sort_choices": v.sort_choices,
                "cards": cards,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_section(v: &SectionView<'_>, public: Option<&Path>) {
    let category = v.state.category;
    println!("\n== {} ({}) ==", category.title(), v.all_count);
    if v.state.collapsed {
        println!("(collapsed, {} items)", v.records.len());
        return;
    }

    if v.shows_filter_bar() {
        let mut pills = vec![format!("{} ({})", ALL, v.all_count)];
        pills.extend(v.facets.iter().map(|f| format!("{} ({})", f.label, f.count)));
        if let Some(tag) = &v.custom_tag {
            pills.push(format!("#{} x", tag));
        }
        println!("{}", pills.join(" | "));
    }

    let cards: Vec<CardView> = v.records.iter().map(|r| CardView::from_record(r, public)).collect();
    match v.state.view_mode {
        ViewMode::List => {
            for (i, c) in cards.iter().enumerate() {
                let link = c.links.first().map(|l| l.href.as_str()).unwrap_or("-");
                println!("{:>3}. {:<32} {}", i + 1, truncate(&c.title, 32), link);
            }
        }
        ViewMode::Grid => {
            println!(
                "{:>3} | {:<28} | {:<18} | {:<4} | {:<30} | {}",
                "#", "Title", "By", "Flag", "Tags", "Link"
            );
            println!("{}", "-".repeat(110));
            for (i, c) in cards.iter().enumerate() {
                let by = c.meta.first().map(|(_, v)| v.as_str()).unwrap_or("");
                let tags = c.tags.iter().map(|t| t.label.as_str()).collect::<Vec<_>>().join(", ");
                let link = c.links.first().map(|l| l.href.as_str()).unwrap_or("-");
                println!(
                    "{:>3} | {:<28} | {:<18} | {:<4} | {:<30} | {}",
                    i + 1,
                    truncate(&c.title, 28),
                    truncate(by, 18),
                    c.flag_glyph().unwrap_or(""),
                    truncate(&tags, 30),
                    link
                );
            }
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
