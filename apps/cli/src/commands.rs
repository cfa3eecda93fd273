//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use dragnet_engine::lifecycle::LifecycleEngine;
use dragnet_engine::pipeline::{HarvestPipeline, ProgressReporter};
use dragnet_engine::scheduler::{Scheduler, SchedulerConfig};
use dragnet_engine::sweeps::Sweeps;
use dragnet_engine::SetMatcher;
use dragnet_shared::{
    AppConfig, KeywordClass, PostId, RunOutcome, RunSummary, StorageBackend, init_config,
    load_config, load_config_from, resolve_db_path, validate_responder_token,
};
use dragnet_source::{Fetcher, HttpFetcher, HttpResponder};
use dragnet_storage::Store;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Dragnet — harvest relevant posts and manage their lifecycle.
#[derive(Parser)]
#[command(
    name = "dragnet",
    version,
    about = "Harvest posts from configured channels and manage their lifecycle.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the config file (defaults to ~/.dragnet/dragnet.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Run one harvest pass now and print its summary.
    Run,

    /// Run the scheduler until interrupted (ctrl-c).
    Daemon,

    /// Show schedule settings and post counts by status.
    Status,

    /// Claim a pending post for a worker.
    Assign {
        /// Post ID (UUID).
        post_id: String,

        /// Worker claiming the post.
        worker: String,
    },

    /// Mark an assigned post resolved by its worker.
    Resolve {
        /// Post ID (UUID).
        post_id: String,

        /// Worker resolving the post.
        worker: String,
    },

    /// Publish a reply to an assigned post and resolve it.
    Reply {
        /// Post ID (UUID).
        post_id: String,

        /// Worker posting the reply.
        worker: String,

        /// Reply text.
        text: String,
    },

    /// Keyword list management.
    Keywords {
        /// Keywords subcommand.
        #[command(subcommand)]
        action: KeywordsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Keywords subcommands.
#[derive(Subcommand)]
pub(crate) enum KeywordsAction {
    /// Load the seed lists from config into the store.
    Seed,
    /// Add one keyword to a class (primary or secondary).
    Add {
        /// Keyword class: primary or secondary.
        class: String,

        /// The term to add.
        word: String,
    },
    /// List all keywords for the configured tenant.
    List,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
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
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run => cmd_run(config_path).await,
        Command::Daemon => cmd_daemon(config_path).await,
        Command::Status => cmd_status(config_path).await,
        Command::Assign { post_id, worker } => cmd_assign(config_path, &post_id, &worker).await,
        Command::Resolve { post_id, worker } => cmd_resolve(config_path, &post_id, &worker).await,
        Command::Reply {
            post_id,
            worker,
            text,
        } => cmd_reply(config_path, &post_id, &worker, &text).await,
        Command::Keywords { action } => match action {
            KeywordsAction::Seed => cmd_keywords_seed(config_path).await,
            KeywordsAction::Add { class, word } => {
                cmd_keywords_add(config_path, &class, &word).await
            }
            KeywordsAction::List => cmd_keywords_list(config_path).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared construction
// ---------------------------------------------------------------------------

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_store(config: &AppConfig) -> Result<Arc<Store>> {
    let db_path = resolve_db_path(config)?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("cannot create {}: {e}", parent.display()))?;
    }
    let store = match config.storage.backend {
        StorageBackend::Libsql => Store::open(&db_path).await?,
    };
    Ok(Arc::new(store))
}

/// Wire the pipeline and sweeps against one shared store.
async fn build_engine(config: &AppConfig) -> Result<(Arc<Store>, Arc<HarvestPipeline>, Arc<Sweeps>)> {
    let store = open_store(config).await?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.harvest)?);
    let matcher = Arc::new(SetMatcher::new(store.clone(), config.keywords.tenant.clone()));
    let pipeline = Arc::new(HarvestPipeline::new(
        config,
        store.clone(),
        fetcher,
        matcher,
    )?);
    let lifecycle = Arc::new(LifecycleEngine::new(store.clone()));
    let sweeps = Arc::new(Sweeps::new(config, store.clone(), lifecycle));
    Ok((store, pipeline, sweeps))
}

fn parse_post_id(raw: &str) -> Result<PostId> {
    raw.parse()
        .map_err(|e| eyre!("invalid post id '{raw}': {e}"))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Pipeline progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let (_store, pipeline, _sweeps) = build_engine(&config).await?;

    info!(
        sources = config.harvest.sources.len(),
        "starting one-shot harvest run"
    );

    let reporter = CliProgress::new();
    let result = pipeline.run(&reporter).await;
    reporter.finish();

    let summary = result?;
    print_summary(&summary);
    Ok(())
}

async fn cmd_daemon(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let (_store, pipeline, sweeps) = build_engine(&config).await?;

    let mut scheduler = Scheduler::new(SchedulerConfig::from_app(&config), pipeline, sweeps);
    scheduler.start();

    println!(
        "Dragnet daemon running (harvest every {}h). Press ctrl-c to stop.",
        config.harvest.interval_hours
    );

    // One pass right away; the schedule takes over from here.
    match scheduler.trigger_now().await {
        RunOutcome::Completed { summary } => info!(
            fetched = summary.fetched,
            saved = summary.saved,
            "initial harvest pass complete"
        ),
        RunOutcome::Skipped { reason } => info!(reason, "initial harvest pass skipped"),
        RunOutcome::Failed { error } => warn!(error, "initial harvest pass failed"),
    }

    tokio::signal::ctrl_c().await?;
    println!();
    info!("interrupt received");
    scheduler.shutdown().await;
    Ok(())
}

async fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let store = open_store(&config).await?;

    let total = store.count_posts().await?;
    let counts = store.status_counts().await?;
    let (primary, secondary) = store.keyword_counts(&config.keywords.tenant).await?;

    let sources = if config.harvest.sources.is_empty() {
        "(none)".to_string()
    } else {
        config.harvest.sources.join(", ")
    };

    println!();
    println!("  Harvest every: {}h", config.harvest.interval_hours);
    println!("  Sources:       {sources}");
    println!("  Capacity:      {} posts max", config.storage.max_posts);
    println!("  Keywords:      {primary} primary, {secondary} secondary");
    println!();
    println!("  Posts stored:  {total}");
    for (status, count) in counts {
        println!("    {:<9} {count}", status.as_str());
    }
    println!();
    Ok(())
}

async fn cmd_assign(config_path: Option<&Path>, post_id: &str, worker: &str) -> Result<()> {
    let config = load_app_config(config_path)?;
    let store = open_store(&config).await?;
    let lifecycle = LifecycleEngine::new(store);

    let id = parse_post_id(post_id)?;
    let post = lifecycle.assign(id, worker).await?;
    println!("Assigned \"{}\" to {worker}", post.title);
    Ok(())
}

async fn cmd_resolve(config_path: Option<&Path>, post_id: &str, worker: &str) -> Result<()> {
    let config = load_app_config(config_path)?;
    let store = open_store(&config).await?;
    let lifecycle = LifecycleEngine::new(store);

    let id = parse_post_id(post_id)?;
    let post = lifecycle.mark_resolved(id, worker).await?;
    println!("Resolved \"{}\"", post.title);
    Ok(())
}

async fn cmd_reply(
    config_path: Option<&Path>,
    post_id: &str,
    worker: &str,
    text: &str,
) -> Result<()> {
    let config = load_app_config(config_path)?;

    // Fail on missing credentials before touching the store.
    let token = validate_responder_token(&config)?;
    let base_url = if config.responder.base_url.is_empty() {
        &config.harvest.base_url
    } else {
        &config.responder.base_url
    };
    let responder = HttpResponder::new(base_url, &config.harvest.user_agent, token)?;

    let store = open_store(&config).await?;
    let lifecycle = LifecycleEngine::new(store);

    let id = parse_post_id(post_id)?;
    let post = lifecycle.reply_and_resolve(&responder, id, worker, text).await?;
    println!("Reply posted, \"{}\" resolved", post.title);
    Ok(())
}

async fn cmd_keywords_seed(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let store = open_store(&config).await?;

    let added = store.seed_keywords(&config.keywords).await?;
    println!(
        "Seeded {added} new keywords into tenant '{}'",
        config.keywords.tenant
    );
    Ok(())
}

async fn cmd_keywords_add(config_path: Option<&Path>, class: &str, word: &str) -> Result<()> {
    let parsed_class: KeywordClass = class
        .parse()
        .map_err(|_| eyre!("invalid class '{class}': expected 'primary' or 'secondary'"))?;

    let config = load_app_config(config_path)?;
    let store = open_store(&config).await?;

    let added = store
        .add_keyword(word, parsed_class, &config.keywords.tenant)
        .await?;
    if added {
        println!("Added {parsed_class} keyword '{}'", word.trim().to_lowercase());
    } else {
        println!("Keyword '{}' already present", word.trim().to_lowercase());
    }
    Ok(())
}

async fn cmd_keywords_list(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let store = open_store(&config).await?;

    let keywords = store.list_keywords(&config.keywords.tenant).await?;
    if keywords.is_empty() {
        println!("No keywords for tenant '{}'", config.keywords.tenant);
        return Ok(());
    }

    for keyword in keywords {
        let flag = if keyword.enabled { "" } else { " (disabled)" };
        println!("  {:<9} {}{flag}", keyword.class.as_str(), keyword.word);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output formatting
// ---------------------------------------------------------------------------

fn print_summary(summary: &RunSummary) {
    let elapsed = (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0;

    println!();
    println!("  Harvest run complete!");
    println!("  Fetched:    {}", summary.fetched);
    println!("  Saved:      {}", summary.saved);
    println!("  Duplicates: {}", summary.duplicates_skipped);
    println!("  Filtered:   {}", summary.filtered_out);
    println!("  Evicted:    {}", summary.evicted);
    if summary.sources_failed > 0 {
        println!("  Failed:     {} source(s)", summary.sources_failed);
    }
    if summary.filters_bypassed {
        println!("  Filters:    BYPASSED");
    }
    println!("  Time:       {elapsed:.1}s");
    println!();
}
