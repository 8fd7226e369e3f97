//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use sitedesk_core::GroundingService;
use sitedesk_shared::{
    AppConfig, Outcome, config_file_path, index_db_path, init_config, load_config,
    load_config_from,
};
use sitedesk_storage::{SnapshotSummary, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteDesk — website retrieval and booking availability for a business chatbot.
#[derive(Parser)]
#[command(
    name = "sitedesk",
    version,
    about = "Index a business website and report free booking slots as chatbot grounding.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.sitedesk/sitedesk.toml).
    #[arg(long, env = "SITEDESK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Manage the website index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show the pages most relevant to a query.
    Search {
        /// Free-text query.
        query: String,

        /// Number of pages to return (overrides index.top_k).
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show free booking slots.
    Availability {
        /// Days to look ahead, starting today (overrides calendar.default_days_ahead).
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Print the grounding context the chatbot would receive for a query.
    Ask {
        /// Free-text query.
        query: String,

        /// Days to look ahead for booking queries.
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Index subcommands.
#[derive(Subcommand)]
pub(crate) enum IndexAction {
    /// Build the index unless a usable snapshot exists.
    Build,
    /// Crawl and embed the site again, replacing the snapshot.
    Rebuild,
    /// List stored snapshots.
    Status,
    /// Delete the configured business's snapshot.
    Clear,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitedesk=info",
        1 => "sitedesk=debug",
        _ => "sitedesk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Index { action } => {
            let config = resolve_config(config_path.as_ref())?;
            match action {
                IndexAction::Build => cmd_index_build(&config, false).await,
                IndexAction::Rebuild => cmd_index_build(&config, true).await,
                IndexAction::Status => cmd_index_status(&config).await,
                IndexAction::Clear => cmd_index_clear(&config).await,
            }
        }
        Command::Search { query, top_k } => {
            let mut config = resolve_config(config_path.as_ref())?;
            if let Some(k) = top_k {
                config.index.top_k = k;
            }
            cmd_search(&config, &query).await
        }
        Command::Availability { days } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_availability(&config, days).await
        }
        Command::Ask { query, days } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_ask(&config, &query, days).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(force).await,
            ConfigAction::Show => {
                let config = resolve_config(config_path.as_ref())?;
                cmd_config_show(&config).await
            }
        },
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_index_build(config: &AppConfig, force: bool) -> Result<()> {
    let service = GroundingService::open(config).await?;
    let profile = service.profile();

    info!(business_id = %profile.id, site = %profile.site_url, force, "indexing website");

    let spinner = spinner(&format!("Indexing {}", profile.site_url))?;
    let snapshot = if force {
        service.index().rebuild(profile).await
    } else {
        service.index().get_or_build(profile).await
    };
    spinner.finish_and_clear();

    let embedded = snapshot.pages.iter().filter(|p| !p.vector.is_empty()).count();

    println!();
    println!("  Index ready for {}", profile.name);
    println!("  Site:       {}", snapshot.root_url);
    println!("  Pages:      {} ({embedded} embedded)", snapshot.pages.len());
    println!("  Model:      {}", snapshot.embedding_model);
    println!("  Dimensions: {}", snapshot.dimensions);
    println!("  Built:      {}", snapshot.built_at.format("%Y-%m-%d %H:%M UTC"));
    println!();

    Ok(())
}

async fn cmd_index_status(config: &AppConfig) -> Result<()> {
    let db_path = index_db_path(config)?;
    let Some(snapshots) = stored_snapshots(&db_path).await? else {
        println!("No index database at {}", db_path.display());
        return Ok(());
    };
    if snapshots.is_empty() {
        println!("No snapshots stored in {}", db_path.display());
        return Ok(());
    }

    println!(
        "{:<16} {:>6} {:>6}  {:<24} {:<17} ROOT",
        "BUSINESS", "PAGES", "DIMS", "MODEL", "BUILT (UTC)"
    );
    for s in snapshots {
        println!(
            "{:<16} {:>6} {:>6}  {:<24} {:<17} {}",
            s.business_id,
            s.page_count,
            s.dimensions,
            s.embedding_model,
            s.built_at.format("%Y-%m-%d %H:%M"),
            s.root_url
        );
    }
    Ok(())
}

/// Snapshot metadata from an existing database, opened read-only.
/// `None` when the database does not exist yet.
async fn stored_snapshots(db_path: &Path) -> Result<Option<Vec<SnapshotSummary>>> {
    if !db_path.exists() {
        return Ok(None);
    }
    let storage = Storage::open_readonly(db_path).await?;
    Ok(Some(storage.list_snapshots().await?))
}

async fn cmd_index_clear(config: &AppConfig) -> Result<()> {
    let profile = config.business_profile()?;
    let storage = Storage::open(&index_db_path(config)?).await?;
    if storage.delete_snapshot(&profile.id).await? {
        println!("Deleted snapshot for '{}'", profile.id);
    } else {
        println!("No snapshot stored for '{}'", profile.id);
    }
    Ok(())
}

async fn cmd_search(config: &AppConfig, query: &str) -> Result<()> {
    let service = GroundingService::open(config).await?;

    let spinner = spinner("Searching")?;
    let outcome = service.find_relevant_pages(query).await;
    spinner.finish_and_clear();

    match outcome {
        Outcome::Available(hits) if hits.is_empty() => println!("No relevant pages."),
        Outcome::Available(hits) => {
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.score, hit.title);
                println!("   {}", hit.url);
            }
        }
        Outcome::Unavailable { reason } => {
            return Err(eyre!("retrieval unavailable: {reason}"));
        }
    }
    Ok(())
}

async fn cmd_availability(config: &AppConfig, days: Option<u32>) -> Result<()> {
    let service = GroundingService::open(config).await?;
    match service.availability(days).await {
        Outcome::Available(text) => println!("{text}"),
        Outcome::Unavailable { reason } => {
            return Err(eyre!("availability unavailable: {reason}"));
        }
    }
    Ok(())
}

async fn cmd_ask(config: &AppConfig, query: &str, days: Option<u32>) -> Result<()> {
    let service = GroundingService::open(config).await?;

    let spinner = spinner("Gathering context")?;
    let grounding = service.ground(query, days).await;
    spinner.finish_and_clear();

    if let Outcome::Unavailable { reason } = &grounding.pages {
        eprintln!("warning: page retrieval unavailable ({reason})");
    }
    print!("{}", grounding.to_context());
    Ok(())
}

async fn cmd_config_init(force: bool) -> Result<()> {
    let path = config_file_path()?;
    if path.exists() && !force {
        return Err(eyre!(
            "config already exists at '{}'. Use --force to overwrite",
            path.display()
        ));
    }
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}
