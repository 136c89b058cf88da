//! gptctx - ask a chat model about selected project files

use clap::{Parser, Subcommand};
use colored::*;
use gpt_with_context::{
    config::{Config, ConfigManager},
    llm::{Chat, OpenAiFactory},
    session::{Session, SessionDeps},
    state::{ApiKeyResolver, FileSecretStore, JsonFileStore, KeySource},
    ui::{format_selection, ConsoleChat, ConsoleNotifier, Inbound, StreamPrinter},
    utils::{
        errors::AppError,
        fs::{FsReader, WalkSearch},
        path::WorkspaceContext,
    },
    Result,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Select project files with glob patterns and ask a chat model about them
#[derive(Parser)]
#[command(name = "gptctx")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// List the selected files with line and character counts
    Files {
        /// Comma-separated include patterns (persisted for the workspace)
        #[arg(short, long)]
        include: Option<String>,
        /// Comma-separated exclude patterns (persisted for the workspace)
        #[arg(short, long)]
        exclude: Option<String>,
    },
    /// Ask one question about the selected files and exit
    Ask {
        /// The question to ask
        question: String,
    },
    /// Interactive chat mode (default)
    Chat,
    /// Manage the stored OpenAI API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Show the effective configuration
    Config {
        /// Change the chat model and save the configuration
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
enum KeyAction {
    /// Store an API key
    Set { key: String },
    /// Remove the stored API key
    Clear,
    /// Show where the API key comes from
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".bright_red().bold(), e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config_manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path)?,
        None => ConfigManager::new()?,
    };

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config_manager.config().logging.level.clone());
    init_logging(&log_level)?;

    info!("Starting gptctx v{}", gpt_with_context::VERSION);

    match cli.command.clone().unwrap_or(Commands::Chat) {
        Commands::Files { include, exclude } => list_files(&cli, config_manager.config(), include, exclude).await,
        Commands::Ask { question } => run_single_question(&cli, config_manager.config(), question).await,
        Commands::Chat => run_interactive_mode(&cli, config_manager.config()).await,
        Commands::Key { action } => handle_key_command(config_manager.config(), action).await,
        Commands::Config { model } => {
            if let Some(model) = model {
                config_manager.set_model(model)?;
                info!("Model set to {}", config_manager.config().model);
            }
            show_config(&config_manager)
        }
    }
}

/// Initialize logging on stderr so answers on stdout stay clean
fn init_logging(log_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(log_level).map_err(|e| AppError::validation("log_level", format!("Invalid log level: {}", e)))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::unknown(format!("Failed to set logger: {}", e)))?;

    Ok(())
}

/// Print the selection, optionally replacing the persisted pattern texts
async fn list_files(cli: &Cli, config: &Config, include: Option<String>, exclude: Option<String>) -> Result<()> {
    let session = build_session(cli, config)?;

    if let Some(include) = include {
        session.include_text().set_value(include).await?;
    }
    if let Some(exclude) = exclude {
        session.exclude_text().set_value(exclude).await?;
    }
    session.refresh().await?;

    let metas = session.metas().get_value();
    print!("{}", format_selection(&metas));
    println!();
    Ok(())
}

/// Ask one question and stream the answer to stdout
async fn run_single_question(cli: &Cli, config: &Config, question: String) -> Result<()> {
    let session = build_session(cli, config)?;
    session.refresh().await?;

    let printer = Arc::new(Mutex::new(StreamPrinter::new()));
    let stream_printer = Arc::clone(&printer);
    let subscription = session.chat().subscribe(move |chat: &Option<Arc<Chat>>| {
        if let Some(chat) = chat {
            stream_printer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .print(chat);
        }
    });

    let result = session.ask(&question).await;
    session.chat().unsubscribe(subscription);
    result?;
    println!();
    Ok(())
}

/// Run interactive chat mode
async fn run_interactive_mode(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting interactive mode");

    let session = Arc::new(build_session(cli, config)?);
    session.handle(Inbound::Refresh).await;

    let mut chat = ConsoleChat::new(session);
    chat.run().await?;

    info!("gptctx shutdown complete");
    Ok(())
}

async fn handle_key_command(config: &Config, action: KeyAction) -> Result<()> {
    let keys = ApiKeyResolver::new(Arc::new(FileSecretStore::new(secrets_path(config)?)));

    match action {
        KeyAction::Set { key } => {
            keys.store(&key).await?;
            println!("{}", "OpenAI API key saved".bright_green());
        }
        KeyAction::Clear => {
            keys.clear().await?;
            println!("{}", "OpenAI API key cleared".bright_green());
        }
        KeyAction::Status => match keys.resolve().await? {
            Some((_, KeySource::Environment)) => println!("API key set from ${}", keys.env_var()),
            Some((_, KeySource::SecretStore)) => println!("API key set in the secret store"),
            None => println!("OpenAI API key is not set"),
        },
    }

    Ok(())
}

fn show_config(config_manager: &ConfigManager) -> Result<()> {
    let content = toml::to_string_pretty(config_manager.config())
        .map_err(|e| gpt_with_context::ConfigError::SerializeError { source: e })?;

    println!("# {}", config_manager.config_path().display());
    print!("{}", content);
    Ok(())
}

fn secrets_path(config: &Config) -> Result<PathBuf> {
    config
        .secrets_file
        .clone()
        .or_else(FileSecretStore::default_path)
        .ok_or_else(|| AppError::not_found("config directory"))
}

/// Wire a session for the workspace from the configuration
fn build_session(cli: &Cli, config: &Config) -> Result<Session> {
    let root = match &cli.workdir {
        Some(workdir) => workdir.clone(),
        None => std::env::current_dir()?,
    };
    let workspace = WorkspaceContext::new(&root)?;
    info!("Working directory: {}", workspace.root().display());

    let state_dir = config
        .state_dir
        .clone()
        .or_else(JsonFileStore::default_state_dir)
        .ok_or_else(|| AppError::not_found("data directory"))?;
    let store = JsonFileStore::for_workspace(state_dir, &workspace)?;

    let providers = OpenAiFactory::new(config.completion_params())
        .with_base_url(config.api_base_url.clone())
        .with_http_config(config.http_config());

    Ok(Session::new(SessionDeps {
        root: workspace.root().to_path_buf(),
        config: config.clone(),
        store: Arc::new(store),
        keys: ApiKeyResolver::new(Arc::new(FileSecretStore::new(secrets_path(config)?))),
        search: Arc::new(WalkSearch::new(workspace.root())),
        reader: Arc::new(FsReader),
        providers: Arc::new(providers),
        notifier: Arc::new(ConsoleNotifier),
    }))
}
