//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use ticketforge_core::{
    ConsolidateConfig, KbConsolidator, MetricsLedger, ProgressReporter, RunSummary,
    TicketGenConfig, TicketGenerator,
};
use ticketforge_ollama::{GenerationOptions, OllamaClient};
use ticketforge_shared::{AppConfig, SamplingConfig, init_config, load_config};
use ticketforge_storage::{KbTable, TicketTable, read_tickets};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TicketForge — synthesize IT support tickets and consolidate them into KB articles.
#[derive(Parser)]
#[command(
    name = "ticketforge",
    version,
    about = "Generate a labeled ITSM ticket corpus and knowledge-base articles with a local model.",
    long_about = None,
)]
pub(crate) struct Cli {
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
    /// Generate synthetic incident tickets into a CSV table.
    Generate {
        /// Total number of tickets to generate.
        #[arg(short, long)]
        total: Option<u32>,

        /// Tickets requested per model call.
        #[arg(short, long)]
        batch_size: Option<u32>,

        /// Output CSV path (defaults to <output_dir>/synthetic_tickets_<model>.csv).
        #[arg(short, long)]
        out: Option<String>,

        /// Model override for this run.
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Consolidate a ticket table into KB articles plus an annotated ticket table.
    Consolidate {
        /// Input ticket CSV (defaults to the `generate` output path).
        #[arg(long)]
        tickets: Option<String>,

        /// Output CSV for KB articles (defaults to <output_dir>/kb_articles.csv).
        #[arg(long)]
        out_kb: Option<String>,

        /// Output CSV for annotated tickets
        /// (defaults to <output_dir>/synthetic_tickets_with_kb.csv).
        #[arg(long)]
        out_tickets: Option<String>,

        /// Model override for this run.
        #[arg(short, long)]
        model: Option<String>,

        /// Cap on representative tickets per consolidation prompt.
        #[arg(long)]
        max_per_prompt: Option<u32>,
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
        0 => "ticketforge=info",
        1 => "ticketforge=debug",
        _ => "ticketforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Generate {
            total,
            batch_size,
            out,
            model,
        } => cmd_generate(total, batch_size, out.as_deref(), model.as_deref()).await,
        Command::Consolidate {
            tickets,
            out_kb,
            out_tickets,
            model,
            max_per_prompt,
        } => {
            cmd_consolidate(
                tickets.as_deref(),
                out_kb.as_deref(),
                out_tickets.as_deref(),
                model.as_deref(),
                max_per_prompt,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

async fn cmd_generate(
    total: Option<u32>,
    batch_size: Option<u32>,
    out: Option<&str>,
    model: Option<&str>,
) -> Result<()> {
    let config = load_config()?;

    let model = model
        .map(String::from)
        .unwrap_or_else(|| config.ollama.ticket_model.clone());
    let total = total.unwrap_or(config.defaults.total_tickets);
    let batch_size = batch_size.unwrap_or(config.defaults.tickets_per_call);

    let out_path = match out {
        Some(p) => PathBuf::from(p),
        None => default_tickets_path(&config, &model),
    };

    info!(
        model,
        total,
        batch_size,
        out = %out_path.display(),
        "starting ticket generation"
    );

    let client = OllamaClient::new(
        &config.ollama.base_url,
        model.clone(),
        Duration::from_secs(config.ollama.timeout_secs),
    )?;

    let gen_config = TicketGenConfig {
        model,
        total_tickets: total,
        tickets_per_call: batch_size,
        options: GenerationOptions::from(&config.sampling),
    };
    let generator = TicketGenerator::new(&client, gen_config)?;

    let mut table = TicketTable::append_to(&out_path)?;
    let mut ledger = MetricsLedger::new();
    let mut rng = rng_for(&config.sampling);
    let reporter = CliProgress::new();

    let report = generator
        .run(&mut table, &mut ledger, &mut rng, &reporter)
        .await?;
    reporter.finish();

    println!();
    if report.aborted {
        println!("  Generation aborted early; previously written batches are preserved.");
    } else {
        println!("  Ticket generation finished!");
    }
    println!("  Requested: {}", report.requested);
    println!("  Generated: {}", report.generated);
    println!(
        "  Batches:   {}/{}",
        report.batches_completed, report.batches_total
    );
    println!("  Output:    {}", out_path.display());
    print_metrics(report.metrics.as_ref());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Consolidate
// ---------------------------------------------------------------------------

async fn cmd_consolidate(
    tickets: Option<&str>,
    out_kb: Option<&str>,
    out_tickets: Option<&str>,
    model: Option<&str>,
    max_per_prompt: Option<u32>,
) -> Result<()> {
    let config = load_config()?;

    let model = model
        .map(String::from)
        .unwrap_or_else(|| config.ollama.kb_model.clone());
    let max_per_prompt =
        max_per_prompt.unwrap_or(config.defaults.max_tickets_per_prompt) as usize;

    let tickets_path = match tickets {
        Some(p) => PathBuf::from(p),
        None => default_tickets_path(&config, &config.ollama.ticket_model),
    };
    let kb_path = match out_kb {
        Some(p) => PathBuf::from(p),
        None => PathBuf::from(&config.defaults.output_dir).join("kb_articles.csv"),
    };
    let annotated_path = match out_tickets {
        Some(p) => PathBuf::from(p),
        None => {
            PathBuf::from(&config.defaults.output_dir).join("synthetic_tickets_with_kb.csv")
        }
    };

    info!(
        model,
        tickets = %tickets_path.display(),
        kb = %kb_path.display(),
        annotated = %annotated_path.display(),
        "starting KB consolidation"
    );

    let loaded = read_tickets(&tickets_path)?;

    let client = OllamaClient::new(
        &config.ollama.base_url,
        model.clone(),
        Duration::from_secs(config.ollama.timeout_secs),
    )?;

    let consolidator = KbConsolidator::new(
        &client,
        ConsolidateConfig {
            model,
            max_tickets_per_prompt: max_per_prompt,
            options: GenerationOptions::from(&config.kb_sampling),
        },
    );

    let mut kb_table = KbTable::create(&kb_path)?;
    let mut annotated = TicketTable::create(&annotated_path)?;
    let mut ledger = MetricsLedger::new();
    let mut rng = rng_for(&config.kb_sampling);
    let reporter = CliProgress::new();

    let report = consolidator
        .run(
            loaded,
            &mut kb_table,
            &mut annotated,
            &mut ledger,
            &mut rng,
            &reporter,
        )
        .await?;
    reporter.finish();

    println!();
    println!("  KB consolidation finished!");
    println!("  Tickets:   {}", report.tickets);
    println!("  Groups:    {}", report.groups);
    println!("  Articles:  {}", report.articles_written);
    println!("  Skipped:   {}", report.groups_skipped);
    println!("  Annotated: {}", report.tickets_annotated);
    println!("  KB table:  {}", kb_path.display());
    println!("  Tickets:   {}", annotated_path.display());
    print_metrics(report.metrics.as_ref());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Default ticket table path: `<output_dir>/synthetic_tickets_<model>.csv`.
fn default_tickets_path(config: &AppConfig, model: &str) -> PathBuf {
    PathBuf::from(&config.defaults.output_dir)
        .join(format!("synthetic_tickets_{}.csv", sanitize_model(model)))
}

/// Make a model name filesystem-safe (`llama3.1:8b-instruct` → `llama3.1-8b-instruct`).
fn sanitize_model(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// RNG for a run: seeded from the sampling seed for reproducibility,
/// from entropy when no seed is configured.
fn rng_for(sampling: &SamplingConfig) -> StdRng {
    match sampling.seed {
        Some(seed) => StdRng::seed_from_u64(seed as u64),
        None => StdRng::from_entropy(),
    }
}

fn print_metrics(metrics: Option<&RunSummary>) {
    if let Some(m) = metrics {
        println!("  Calls:     {}", m.num_calls);
        println!(
            "  Tokens:    {} generated / {} prompt",
            m.total_eval_tokens, m.total_prompt_tokens
        );
        println!(
            "  Rate:      {:.1} tokens/call, {:.1} tokens/s",
            m.avg_eval_tokens_per_call, m.avg_tokens_per_second
        );
        println!("  Time:      {:.1}s", m.wall_time.as_secs_f64());
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
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
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_completed(&self, current: usize, total: usize, generated: usize) {
        self.spinner.set_message(format!(
            "Generating [batch {current}/{total}] {generated} tickets written"
        ));
    }

    fn group_consolidated(&self, current: usize, total: usize, key: &str) {
        self.spinner.set_message(format!(
            "Consolidating [{current}/{total}] {key}"
        ));
    }
}
