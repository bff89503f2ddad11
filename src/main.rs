mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use output::UserOutput;
use std::sync::Arc;
use swap_orchestrator::engine::{CommandEngine, Engine, ENGINE_BINARY};
use swap_orchestrator::config::SETTINGS_FILE_NAME;
use swap_orchestrator::{BuyRequest, Context, Error as SwapError, Network, Parser as SettingsParser, Settings};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let out = output::CliOutput;
        if let Some(swap_error) = e.downcast_ref::<SwapError>() {
            out.error(&format!("Error: {}", swap_error));
            if let Some(suggestion) = swap_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            out.error(&format!("Error: {:#}", e));
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Commands that need no settings ────────────────────────────────
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(cli.log_file.as_deref())?;

    let settings = load_settings(&cli)?;
    let engine: Arc<dyn Engine> = Arc::new(CommandEngine::new(settings.binary(ENGINE_BINARY)));
    let (ctx, _lock) = Context::open(settings)?;
    let out = output::CliOutput;

    match cli.command {
        Commands::Buy {
            seller,
            xmr_address,
            refund_address,
            account,
        } => {
            let request = BuyRequest {
                xmr_address,
                counterparty: seller,
                refund_address,
                account_index: account,
            };
            commands::run_buy(ctx, engine, request, &out).await
        }
        Commands::Resume { swap_id } => commands::run_resume(ctx, engine, &swap_id, &out).await,
        Commands::CancelRefund { swap_id, root_key } => {
            commands::run_cancel_refund(ctx, engine, &swap_id, &root_key, &out).await
        }
        Commands::History { json } => commands::run_history(ctx, engine, json, &out).await,
        Commands::Sellers { rendezvous, json } => {
            commands::run_sellers(ctx, engine, rendezvous.as_deref(), json, &out).await
        }
        Commands::Maker => commands::run_maker(ctx, &out).await,
        Commands::Price => commands::run_price(ctx, &out).await,
        Commands::KillOrphans => commands::run_kill_orphans(ctx, &out).await,
        Commands::Completions { .. } => unreachable!("handled before settings are loaded"),
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let parser = SettingsParser::new();
    let mut settings = match &cli.config {
        Some(path) => parser.load_settings(path)?,
        None => match &cli.data_dir {
            Some(dir) => parser.load_or_default(dir.join(SETTINGS_FILE_NAME))?,
            None => parser.load_or_default(SettingsParser::default_settings_path())?,
        },
    };
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = data_dir.clone();
    }
    if cli.testnet {
        settings.network = Network::Testnet;
    }
    std::fs::create_dir_all(&settings.data_dir)?;
    tracing::debug!(
        "Network {}, data directory {}",
        settings.network.dir_name(),
        settings.data_dir.display()
    );
    Ok(settings)
}

fn init_tracing(log_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}
