//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use oppsync_bus::HttpEventBus;
use oppsync_core::{ChangePublisher, EnrichmentPipeline, ProcessOutcome, ProgressReporter};
use oppsync_crm::HubSpotClient;
use oppsync_shared::{
    AppConfig, WebhookEvent, WebhookPayload, expand_home, init_config, load_config,
    load_config_from, validate_access_token,
};
use oppsync_storage::{FsObjectStore, LibsqlMarkerStore, MemoryObjectStore, ObjectStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// oppsync: CRM deals in, opportunity records and creation events out.
#[derive(Parser)]
#[command(
    name = "oppsync",
    version,
    about = "Enrich CRM deal webhooks into opportunity records and publish them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.oppsync/oppsync.toml).
    #[arg(long, global = true, env = "OPPSYNC_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Enrich one webhook event and store the resulting record.
    Process {
        /// Webhook JSON file, or `-` for stdin.
        input: String,
    },

    /// Enrich one webhook event and print the record without storing it.
    Render {
        /// Webhook JSON file, or `-` for stdin.
        input: String,
    },

    /// Run one publisher cycle.
    Publish,

    /// Run the publisher periodically until Ctrl-C.
    Watch {
        /// Seconds between cycles (defaults to `publisher.interval_secs`).
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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
        0 => "oppsync=info",
        1 => "oppsync=debug",
        _ => "oppsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `render` output stays pipeable.
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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Process { input } => cmd_process(config_path, &input).await,
        Command::Render { input } => cmd_render(config_path, &input).await,
        Command::Publish => cmd_publish(config_path).await,
        Command::Watch { interval } => cmd_watch(config_path, interval).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Read a webhook payload (bare or bus-wrapped) from a file or stdin.
fn read_event(input: &str) -> Result<WebhookEvent> {
    let raw = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read webhook from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).wrap_err_with(|| format!("failed to read '{input}'"))?
    };

    let payload: WebhookPayload =
        serde_json::from_str(&raw).map_err(|e| eyre!("invalid webhook payload in '{input}': {e}"))?;
    Ok(payload.into_event())
}

fn crm_client(config: &AppConfig) -> Result<HubSpotClient> {
    let token = validate_access_token(config)?;
    Ok(HubSpotClient::from_config(&config.crm, &token)?)
}

async fn object_store(config: &AppConfig) -> Result<FsObjectStore> {
    let root = expand_home(&config.store.root)?;
    let store = FsObjectStore::open(root).await?;
    Ok(store.with_page_size(config.store.list_page_size))
}

async fn change_publisher(config: &AppConfig) -> Result<ChangePublisher> {
    let store = object_store(config).await?;
    let markers = LibsqlMarkerStore::open(&expand_home(&config.publisher.markers_db)?).await?;
    let bus = HttpEventBus::from_config(&config.bus)?;

    Ok(ChangePublisher::new(
        Arc::new(store),
        Arc::new(markers),
        Arc::new(bus),
        config,
    ))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_process(config_path: Option<&Path>, input: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let event = read_event(input)?;

    let crm = crm_client(&config)?;
    let store = object_store(&config).await?;
    let pipeline = EnrichmentPipeline::new(Arc::new(crm), Arc::new(store), &config);

    info!(input, "processing webhook event");

    let reporter = CliProgress::new();
    let outcome = pipeline.process_event(&event, &reporter).await;
    reporter.finish();
    let outcome = outcome?;

    println!("{}", outcome.key);
    Ok(())
}

async fn cmd_render(config_path: Option<&Path>, input: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let event = read_event(input)?;

    let crm = crm_client(&config)?;
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
    let pipeline = EnrichmentPipeline::new(Arc::new(crm), store, &config);

    let record = pipeline.build_opportunity(&event).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_publish(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let publisher = change_publisher(&config).await?;

    let summary = publisher.publish_new_records().await?;

    println!();
    println!("  Listed:    {}", summary.listed);
    println!("  Skipped:   {}", summary.already_published);
    println!("  Published: {}", summary.published.len());
    println!("  Failed:    {}", summary.failed.len());
    for (key, reason) in &summary.failed {
        println!("    {key}: {reason}");
    }
    println!();

    if !summary.failed.is_empty() {
        return Err(eyre!(
            "{} record(s) could not be published; they will be retried next cycle",
            summary.failed.len()
        ));
    }
    Ok(())
}

async fn cmd_watch(config_path: Option<&Path>, interval: Option<u64>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let interval_secs = interval.unwrap_or(config.publisher.interval_secs).max(1);
    let publisher = change_publisher(&config).await?;

    info!(
        prefix = publisher.prefix(),
        interval_secs, "watching for new records (Ctrl-C to stop)"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let cycles = publisher
        .run_loop(Duration::from_secs(interval_secs), shutdown)
        .await;
    info!(cycles, "publisher stopped");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &ProcessOutcome) {
        self.spinner.finish_and_clear();
    }
}
