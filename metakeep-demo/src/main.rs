//! MetaKeep demo CLI.
//!
//! Connects, switches chains, signs and disconnects through the MetaKeep
//! connector or a plain injected wallet, printing every host event it
//! observes.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use metakeep_connector::prelude::*;
use metakeep_demo::injected::local_wallet;
use metakeep_demo::{DemoConfig, FileStorage, InjectedConnector, WalletModal};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// MetaKeep wallet connector demo
#[derive(Parser)]
#[command(name = "metakeep-demo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory for persistent host storage
    #[arg(long, env = "METAKEEP_DEMO_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Connector to act on (`metaKeep` or `injected`)
    #[arg(long, default_value = CONNECTOR_ID, global = true)]
    connector: String,

    #[command(flatten)]
    key: KeyArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Key material for the local wallet backend
#[derive(Args)]
struct KeyArgs {
    /// Private key (hex)
    #[arg(long, env = "DEMO_PRIVATE_KEY", hide_env_values = true, global = true)]
    private_key: Option<String>,

    /// BIP39 mnemonic
    #[arg(long, env = "DEMO_MNEMONIC", hide_env_values = true, global = true)]
    mnemonic: Option<String>,

    /// BIP39 passphrase for the mnemonic
    #[arg(long, env = "DEMO_PASSPHRASE", hide_env_values = true, global = true)]
    passphrase: Option<String>,

    /// HD derivation index
    #[arg(long, default_value_t = 0, global = true)]
    index: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connector status
    Status,

    /// Connect the wallet
    Connect {
        /// Chain to connect on
        #[arg(long)]
        chain_id: Option<u64>,
    },

    /// Switch the connected wallet to another chain
    Switch {
        /// Target chain id
        chain_id: u64,
    },

    /// Sign a message with the connected account
    Sign {
        /// Message text
        message: String,
    },

    /// Disconnect the wallet
    Disconnect,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "metakeep_demo={level},metakeep_connector={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

fn build_sdk(key: &KeyArgs) -> anyhow::Result<LocalKeySdk> {
    let builder = match (&key.mnemonic, &key.private_key) {
        (Some(mnemonic), _) => {
            let builder = LocalKeySdk::builder().mnemonic(mnemonic).index(key.index);
            match &key.passphrase {
                Some(passphrase) => builder.passphrase(passphrase),
                None => builder,
            }
        }
        (None, Some(private_key)) => LocalKeySdk::builder().private_key(private_key),
        (None, None) => bail!("set DEMO_PRIVATE_KEY or DEMO_MNEMONIC (or pass --private-key)"),
    };
    Ok(builder.build()?)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = DemoConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let storage = FileStorage::open(config.storage_path())
        .await
        .with_context(|| format!("failed to open {}", config.storage_path().display()))?;
    let host = HostContext::new(vec![Chain::polygon_amoy(), Chain::polygon()], Arc::new(storage))
        .with_session(MemoryStorage::shared());

    let mut params = MetaKeepParameters::new()
        .app_id(&config.app_id)
        .environment(config.environment)
        .rpc_url_for(137, "https://polygon-bor-rpc.publicnode.com");
    if let Some(user) = config.user() {
        params = params.user(user);
    }
    let sdk = build_sdk(&cli.key)?;
    let wallet = local_wallet(&sdk, &host.chains).await?;
    let metakeep = MetaKeepConnector::new(params, host.clone(), Arc::new(sdk));
    let injected = InjectedConnector::new(host.clone(), wallet);

    let mut modal = WalletModal::new(&config.modal_project_id, host);
    modal.register(Arc::new(metakeep));
    modal.register(Arc::new(injected));
    modal.on_events(|event| match serde_json::to_string(event) {
        Ok(json) => println!("event: {json}"),
        Err(e) => tracing::warn!("unprintable event: {e}"),
    });
    tracing::debug!(
        project = modal.project_id(),
        connectors = modal.connectors().len(),
        "modal ready"
    );
    modal.setup().await;

    let id = cli.connector.as_str();
    match cli.command {
        Commands::Status => {
            for status in modal.status().await {
                println!("{status}");
            }
        }
        Commands::Connect { chain_id } => {
            let args = ConnectArgs {
                chain_id,
                is_reconnecting: false,
            };
            let connection = modal.connect(id, args).await?;
            println!("connected: {connection:?}");
        }
        Commands::Switch { chain_id } => {
            require_session(&modal, id).await?;
            let chain = modal.connector(id)?.switch_chain(chain_id).await?;
            println!("switched to {} ({})", chain.name, chain.id);
        }
        Commands::Sign { message } => {
            require_session(&modal, id).await?;
            let provider = modal.connector(id)?.get_provider().await?;
            let signature = provider.get_signer().sign_message(message.as_bytes()).await?;
            println!("{signature}");
        }
        Commands::Disconnect => {
            modal.disconnect(id).await?;
            println!("disconnected");
        }
    }

    Ok(())
}

async fn require_session(modal: &WalletModal, id: &str) -> anyhow::Result<()> {
    match modal.restore(id).await? {
        Some(_) => Ok(()),
        None => bail!("{id} is not connected; run `metakeep-demo --connector {id} connect` first"),
    }
}
