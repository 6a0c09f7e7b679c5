//! Persona Council - multi-persona collaboration engine
//!
//! This is the main entry point for the `persona-council` binary. Data
//! commands print JSON on stdout; logs and errors go to stderr.

mod cli;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use persona_council::collaboration::{
    AnalysisProvider, Classifier, KeywordClassifier, Orchestrator, TemplateProvider,
};
use persona_council::config::{self, AppConfig};
use persona_council::error::{Error, ErrorResponse, Result};
use persona_council::logging;
use persona_council::network::{ReqwestTransport, RetryClient};
use persona_council::persona::{PersonaRepository, PersonaStore};
use persona_council::sync::{ConfigSynchronizer, RemoteConfigSync};
use persona_council::tools::{Tool, ToolService};
use persona_council::version;

use crate::cli::{Cli, Commands, ConfigSubcommand, ConfigsSubcommand};

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(resp) = run(cli) {
        eprint!("{}", resp.format_for_terminal());
        std::process::exit(resp.exit_code);
    }
}

fn run(cli: Cli) -> std::result::Result<(), ErrorResponse> {
    // For commands that don't need full logging, use simple setup
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN).map_err(|e| ErrorResponse::from(&e))?;
            return handle_config_command(cli.config.as_deref(), subcommand.clone())
                .map_err(|e| ErrorResponse::from(&e));
        }
        _ => {}
    }

    let config = AppConfig::load(cli.config.as_deref()).map_err(|e| ErrorResponse::from(&e))?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)
        .map_err(|e| ErrorResponse::from(&e))?;

    let build = version::build_info();
    debug!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting Persona Council"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("persona-council")
        .build()
        .map_err(|e| {
            ErrorResponse::from(&Error::Internal(format!(
                "Failed to create async runtime: {}",
                e
            )))
        })?;

    runtime.block_on(async_main(config, cli))
}

/// Everything a data command needs, wired from configuration
struct Council {
    service: ToolService,
    sync: Arc<RemoteConfigSync>,
}

fn build_council(config: &AppConfig, personas_file: Option<&str>) -> Result<Council> {
    let transport = Arc::new(ReqwestTransport::new()?);
    let client = RetryClient::new(transport, config.client_config());

    let local = match personas_file {
        Some(path) => load_local_personas(Path::new(path))?,
        None => Vec::new(),
    };
    let repository = Arc::new(PersonaRepository::with_local(
        client.clone(),
        config.repository_config(),
        local,
    ));

    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());
    let provider: Arc<dyn AnalysisProvider> = Arc::new(TemplateProvider::new(classifier.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        repository.clone() as Arc<dyn PersonaStore>,
        provider,
        classifier,
        config.collaboration_config()?,
        config.collaboration.history_size,
    ));

    let mut sync = RemoteConfigSync::new(client, config.state_path());
    if let Some(ref credential) = config.sync.credential {
        sync = sync.with_credential(credential.clone());
    }
    if let Some(ref base) = config.sync.api_base_url {
        sync = sync.with_api_base_url(base.clone());
    }
    let sync = Arc::new(sync);

    // The last synchronized config is the local set unless a personas file was given
    if personas_file.is_none() {
        restore_synced_personas(&repository, sync.as_ref());
    }
    if config.repository.warm_up {
        repository.spawn_warm_up();
    }

    Ok(Council {
        service: ToolService::new(
            repository,
            orchestrator,
            sync.clone() as Arc<dyn ConfigSynchronizer>,
        ),
        sync,
    })
}

/// Apply the persisted current config, if any; a rejected one is only logged
fn restore_synced_personas(repository: &PersonaRepository, sync: &dyn ConfigSynchronizer) {
    let Some(current) = sync.current_config() else {
        return;
    };
    match repository.update_from_config(&current) {
        Ok(count) => info!(config = %current.id, count, "Synchronized config restored"),
        Err(e) => warn!(config = %current.id, error = %e, "Synchronized config ignored"),
    }
}

/// Read a JSON array of persona records
fn load_local_personas(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let records: Vec<Value> = serde_json::from_str(&content)?;
    info!(path = %path.display(), count = records.len(), "Local persona file read");
    Ok(records)
}

async fn async_main(config: AppConfig, cli: Cli) -> std::result::Result<(), ErrorResponse> {
    let council =
        build_council(&config, cli.personas.as_deref()).map_err(|e| ErrorResponse::from(&e))?;

    let (tool, args) = match cli.command {
        Commands::Summon { name } => (Tool::SummonPersona, json!({ "persona_name": name })),
        Commands::List { category, source } => (
            Tool::ListPersonas,
            json!({ "category": category, "source": source }),
        ),
        Commands::Search { query } => (Tool::SearchPersonas, json!({ "query": query })),
        Commands::Collaborate { query, persona_ids, mode } => (
            Tool::StartCollaboration,
            json!({ "query": query, "persona_ids": persona_ids, "mode": mode }),
        ),
        Commands::Configs { subcommand } => match subcommand {
            ConfigsSubcommand::List => (Tool::ListPersonaConfigs, json!({})),
            ConfigsSubcommand::Download { id } => {
                (Tool::DownloadPersonaConfig, json!({ "config_id": id }))
            }
            ConfigsSubcommand::Status => {
                return print_json(&council.sync.sync_status())
                    .map_err(|e| ErrorResponse::from(&e));
            }
        },
        Commands::Stats { tool } => (Tool::GetToolStats, json!({ "tool_name": tool })),
        Commands::Version | Commands::Config { .. } => {
            // Already handled before the runtime started
            unreachable!();
        }
    };

    let value = council.service.call(tool.as_str(), args).await?;
    print_json(&value).map_err(|e| ErrorResponse::from(&e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handle config subcommands
fn handle_config_command(config_path: Option<&str>, subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = AppConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg.redacted())?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate => {
            AppConfig::load(config_path)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
