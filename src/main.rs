#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use docflow::app_config::{self, Config, GenerationBackend};
use docflow::app_controller::Controller;
use docflow::bootstrap::RequestType;
use docflow::database::models::RunState;
use docflow::workflow::UploadEvent;

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum CliBackend {
    Ollama,
    Anthropic,
}

impl From<CliBackend> for GenerationBackend {
    fn from(cli_backend: CliBackend) -> Self {
        match cli_backend {
            CliBackend::Ollama => GenerationBackend::Ollama,
            CliBackend::Anthropic => GenerationBackend::Anthropic,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRequestType {
    Create,
    Update,
    Delete,
}

impl From<CliRequestType> for RequestType {
    fn from(request: CliRequestType) -> Self {
        match request {
            CliRequestType::Create => RequestType::Create,
            CliRequestType::Update => RequestType::Update,
            CliRequestType::Delete => RequestType::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BootstrapTarget {
    /// Start-run and invoke-task grants
    Grant,
    /// Workflow id in the dispatcher environment
    Env,
    All,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a run for every record of an upload event file
    Dispatch {
        /// JSON file holding `{"records": [{"bucket": ..., "key": ...}]}`
        #[arg(value_name = "EVENT_FILE")]
        event_path: PathBuf,
    },

    /// Translate one stored document in the foreground
    Translate {
        /// Object key, URL-decoded
        #[arg(value_name = "KEY")]
        key: String,

        /// Bucket holding the document (defaults to the documents bucket)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Load a TMX file into the translation memory
    IngestTmx {
        #[arg(value_name = "KEY")]
        key: String,

        /// Bucket holding the TMX file (defaults to the TMX bucket)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Reconcile permission grants and the dispatcher environment
    Bootstrap {
        #[arg(value_enum, default_value = "create")]
        request: CliRequestType,

        #[arg(short = 'o', long, value_enum, default_value = "all")]
        only: BootstrapTarget,
    },

    /// List recorded runs, newest first
    Runs {
        /// Only runs in this state (started, validating, translating, combining, notifying, completed, failed)
        #[arg(short, long)]
        state: Option<String>,

        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Generate shell completions for docflow
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// docflow - document translation workflow
#[derive(Parser, Debug)]
#[command(name = "docflow")]
#[command(version)]
#[command(about = "Translate uploaded documents section by section with translation-memory context")]
#[command(long_about = "docflow validates uploaded documents, translates their sections in parallel with
context from a translation memory, merges the result and optionally e-mails a download link.

EXAMPLES:
    docflow bootstrap create                    # Grant permissions and inject the workflow id
    docflow ingest-tmx glossary.tmx             # Fill the translation memory
    docflow dispatch upload-event.json          # Start one run per uploaded record
    docflow translate reports/q3.txt            # Translate a single document in the foreground
    docflow runs --state failed                 # Show failed runs
    docflow completions bash > docflow.bash     # Generate bash completions

CONFIGURATION:
    Configuration is stored in docflow.json by default. If the file doesn't exist,
    a default one is created. TMX_BUCKET_NAME, DOCUMENTS_BUCKET_NAME, EMBEDDING_MODEL,
    TRANSLATION_MODEL, SEARCH_COLLECTION_NAME, ENABLE_EMAIL_NOTIFICATIONS and
    SENDER_EMAIL override the file.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "docflow.json", global = true)]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    /// Generation backend to use
    #[arg(long, value_enum, global = true)]
    backend: Option<CliBackend>,

    /// Translation model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and marker for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "❌ "),
            Level::Warn => ("\x1B[1;33m", "🚧 "),
            Level::Info => ("\x1B[1;32m", " "),
            Level::Debug => ("\x1B[1;36m", "🔍 "),
            Level::Trace => ("\x1B[1;35m", "📋 "),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, marker) = Self::style_for_level(record.level());
            let _ = writeln!(std::io::stderr(), "{}{} {} {}\x1B[0m", colour, now, marker, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "docflow", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(cmd_log_level) = &cli.log_level {
        log::set_max_level(level_filter(&cmd_log_level.clone().into()));
    }

    let config = load_config(&cli)?;
    if cli.log_level.is_none() {
        log::set_max_level(level_filter(&config.log_level));
    }

    let controller = Controller::with_config(config)?;
    run_command(&controller, cli.command).await
}

/// Load the configuration file, creating a default one when missing
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let config_path = &cli.config_path;
    let mut config = if Path::new(config_path).exists() {
        let file = File::open(config_path).with_context(|| format!("Failed to open config file: {}", config_path))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| format!("Failed to parse config file: {}", config_path))?
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        let config_json =
            serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", config_path))?;
        config
    };

    config.apply_env_overrides();

    if let Some(backend) = &cli.backend {
        config.models.backend = backend.clone().into();
    }
    if let Some(model) = &cli.model {
        config.models.translation_model = model.clone();
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_command(controller: &Controller, command: Commands) -> Result<()> {
    let storage = &controller.config().storage;

    match command {
        Commands::Dispatch { event_path } => {
            let file = File::open(&event_path).with_context(|| format!("Failed to open event file: {:?}", event_path))?;
            let event: UploadEvent = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse event file: {:?}", event_path))?;

            let report = controller.dispatch(&event).await?;
            info!("{} of {} records started a run", report.started(), report.outcomes.len());
            if report.failed() > 0 {
                return Err(anyhow!("{} records could not be dispatched", report.failed()));
            }
        }
        Commands::Translate { key, bucket } => {
            let bucket = bucket.unwrap_or_else(|| storage.documents_bucket.clone());
            let combined = controller.translate(&bucket, &key).await?;
            println!("{}/{}", combined.bucket, combined.key);
        }
        Commands::IngestTmx { key, bucket } => {
            let bucket = bucket.unwrap_or_else(|| storage.tmx_bucket.clone());
            let report = controller.ingest_tmx(&bucket, &key).await?;
            info!("Stored {} of {} translation units from {}", report.stored, report.units, key);
        }
        Commands::Bootstrap { request, only } => {
            let request = RequestType::from(request);
            let outcomes = match only {
                BootstrapTarget::Grant => vec![controller.grant(request).await],
                BootstrapTarget::Env => vec![controller.inject_env(request).await],
                BootstrapTarget::All => controller.bootstrap(request).await,
            };

            for outcome in &outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
            if outcomes.iter().any(|outcome| !outcome.is_success()) {
                return Err(anyhow!("Bootstrap {:?} did not complete", request));
            }
        }
        Commands::Runs { state, limit } => {
            let state = state.map(|s| s.parse::<RunState>()).transpose()?;
            for run in controller.list_runs(state, limit).await? {
                println!(
                    "{}  {:<11} {}/{}  {}/{} sections{}",
                    run.id,
                    run.state.to_string(),
                    run.bucket,
                    run.object_key,
                    run.translated_count,
                    run.section_count,
                    run.failure_reason.map(|r| format!("  ({})", r)).unwrap_or_default()
                );
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
