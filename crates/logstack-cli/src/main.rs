mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_DECLARATION_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use logstack_core::{install_signal_handler, Orchestrator};
use logstack_schema::{ExecutorBackend, OrchestratorConfig, CONFIG_FILE_NAME};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "logstack",
    version,
    about = "Provision search, dashboard and OAuth resources for a log stack"
)]
struct Cli {
    /// Path to the logstack store directory.
    #[arg(long, default_value = "~/.local/share/logstack")]
    store: String,

    /// Path to the orchestrator config (defaults to <store>/logstack.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Declare every resource in a TOML declaration file.
    Declare {
        /// Path to the declaration file.
        file: PathBuf,
    },
    /// Provision a declared resource.
    Provision {
        /// Resource id.
        id: String,
        /// Block until a dispatched background stage has finished.
        #[arg(long, default_value_t = false)]
        wait: bool,
        /// Skip the confirmation prompt.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Create a search index on its server.
    CreateIndex {
        /// Index resource id.
        id: String,
    },
    /// Retire an active index or abandon a dispatched stage.
    Cancel {
        /// Resource id.
        id: String,
    },
    /// Delete a retiring index from its server.
    DeleteIndex {
        /// Index resource id.
        id: String,
        /// Skip the confirmation prompt.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Poll a pending background job once and update the resource.
    Reconcile {
        /// Resource id.
        id: String,
    },
    /// Wait for a pending background job, then reconcile.
    Wait {
        /// Resource id.
        id: String,
    },
    /// List all resources.
    List,
    /// Show one resource record.
    Inspect {
        /// Resource id.
        id: String,
    },
    /// Print the canonical log index schema for an index id.
    IndexTemplate {
        /// Index id to put in the schema.
        index_id: String,
    },
    /// Manage vault secrets.
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Run diagnostic checks on the system and store.
    Doctor,
}

#[derive(Debug, Subcommand)]
enum SecretAction {
    /// Store a secret read from stdin.
    Set {
        /// Secret reference, as used in declarations.
        reference: String,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LOGSTACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let store_path = expand_tilde(&cli.store);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| store_path.join(CONFIG_FILE_NAME));
    let json = cli.json;

    let result =
        load_config(&config_path).and_then(|config| run(cli.command, &store_path, config, json));

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("declaration error:")
                || msg.starts_with("failed to read declaration")
                || msg.starts_with("failed to parse declaration")
            {
                EXIT_DECLARATION_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn load_config(path: &Path) -> Result<OrchestratorConfig, String> {
    OrchestratorConfig::load_or_default(path)
        .map_err(|e| format!("config error in {}: {e}", path.display()))
}

fn run(
    command: Commands,
    store_path: &Path,
    config: OrchestratorConfig,
    json: bool,
) -> Result<u8, String> {
    match &command {
        Commands::IndexTemplate { index_id } => {
            return commands::index_template::run(index_id, json);
        }
        Commands::Doctor => return commands::doctor::run(store_path, &config, json),
        _ => {}
    }

    let needs_executor = matches!(
        command,
        Commands::Provision { .. } | Commands::Wait { .. } | Commands::Reconcile { .. }
    );
    if needs_executor
        && config.executor.backend == ExecutorBackend::Ansible
        && std::env::var("LOGSTACK_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = logstack_runner::check_ansible_prereqs();
        if !missing.is_empty() {
            return Err(logstack_runner::format_missing(&missing));
        }
    }

    tracing::debug!(
        "store {} with {:?} executor and {:?} vault",
        store_path.display(),
        config.executor.backend,
        config.vault.backend
    );
    let orch = Orchestrator::from_config(store_path, config).map_err(commands::core_err)?;

    match command {
        Commands::Declare { file } => commands::declare::run(&orch, &file, json),
        Commands::Provision { id, wait, yes } => {
            commands::provision::run(&orch, &id, wait, yes, json)
        }
        Commands::CreateIndex { id } => commands::create_index::run(&orch, &id, json),
        Commands::Cancel { id } => commands::cancel::run(&orch, &id, json),
        Commands::DeleteIndex { id, yes } => commands::delete_index::run(&orch, &id, yes, json),
        Commands::Reconcile { id } => commands::reconcile::run(&orch, &id, json),
        Commands::Wait { id } => commands::wait::run(&orch, &id, json),
        Commands::List => commands::list::run(&orch, json),
        Commands::Inspect { id } => commands::inspect::run(&orch, &id, json),
        Commands::Secret {
            action: SecretAction::Set { reference },
        } => commands::secret::run_set(&orch, &reference, json),
        Commands::IndexTemplate { .. } | Commands::Doctor => Ok(commands::EXIT_SUCCESS),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
