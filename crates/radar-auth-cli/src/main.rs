/*
[INPUT]:  CLI arguments, YAML/env configuration, OS shutdown signals
[OUTPUT]: Wallet sign-in, session status and sign-out against the auth backend
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, subcommands, or shutdown handling
*/

mod cli;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use console::style;
use radar_auth::{
    AuthClient, AuthState, AuthStateMachine, EntitlementsSnapshot, EvmWalletSigner,
    FileSessionStore, SessionStore, WalletSigner,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use radar_auth_cli::{NoWalletSigner, PromptingSigner, default_session_path, load_auth_config};

#[derive(Parser, Debug)]
#[command(name = "radar-auth", version, about = "Wallet sign-in for SNE Radar")]
struct Cli {
    /// YAML configuration file; RADAR_AUTH_* variables override it
    #[arg(long = "config", value_name = "PATH", global = true)]
    config_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: String,
    /// Write logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,
    #[arg(long = "session-file", value_name = "PATH", global = true)]
    session_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a configuration file interactively
    Init {
        #[arg(long, value_name = "PATH", default_value = "radar-auth.yaml")]
        output: PathBuf,
    },
    /// Sign in with a local key
    Login {
        /// Environment variable holding the hex private key
        #[arg(long = "private-key-env", value_name = "VAR", default_value = "RADAR_AUTH_PRIVATE_KEY")]
        private_key_env: String,
        /// Sign without asking for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Show the stored session
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show features and limits for the stored session
    Entitlements {
        #[arg(long)]
        json: bool,
    },
    /// End the stored session
    Logout,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    state: &'static str,
    address: Option<String>,
    tier: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _log_guard = init_tracing(&args.log_level, args.log_file.as_deref())?;

    if let Command::Init { output } = args.command {
        return cli::init::run_init(output);
    }

    let config = load_auth_config(args.config_path.as_deref()).context("load config")?;
    let session_path = match args.session_file {
        Some(path) => path,
        None => default_session_path()?,
    };
    info!(
        base_url = %config.base_url,
        session_file = %session_path.display(),
        "starting radar-auth"
    );

    let client = AuthClient::new(config).context("build auth client")?;
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&session_path));

    match args.command {
        Command::Init { .. } => Ok(()),
        Command::Login {
            private_key_env,
            yes,
        } => {
            let key = std::env::var(&private_key_env)
                .with_context(|| format!("environment variable {private_key_env} is not set"))?;
            let wallet = EvmWalletSigner::new(&key).context("load private key")?;
            let signer: Arc<dyn WalletSigner> = Arc::new(PromptingSigner::new(wallet, yes));
            login(AuthStateMachine::new(client, signer, store)).await
        }
        Command::Status { json } => {
            let machine = AuthStateMachine::new(client, Arc::new(NoWalletSigner::default()), store);
            machine.boot().await.context("restore session")?;
            print_status(&machine.state(), &machine.entitlements(), json)
        }
        Command::Entitlements { json } => {
            let machine = AuthStateMachine::new(client, Arc::new(NoWalletSigner::default()), store);
            machine.boot().await.context("restore session")?;
            print_entitlements(&machine.entitlements(), json)
        }
        Command::Logout => {
            let machine = AuthStateMachine::new(client, Arc::new(NoWalletSigner::default()), store);
            machine.boot().await.context("restore session")?;
            machine.sign_out().await.context("sign out")?;
            println!("{}", style("Signed out").green());
            Ok(())
        }
    }
}

async fn login(machine: Arc<AuthStateMachine>) -> Result<()> {
    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());
    {
        let machine = machine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            machine.shutdown();
        });
    }
    let listener = machine.spawn_signer_listener();

    let restored = machine.boot().await.context("restore session")?;
    let address = machine.connect(None).await.context("connect wallet")?;

    let session = match restored {
        Some(session) if session.address == address => {
            println!("{}", style("Already signed in").dim());
            session
        }
        _ => machine.sign_in().await.context("sign in")?,
    };

    println!("{}", style("SUCCESS!").bold().green());
    println!("Address: {}", style(&session.address).cyan());
    println!("Tier:    {}", style(session.tier).cyan());

    machine.shutdown();
    if let Err(err) = listener.await {
        warn!(error = %err, "signer listener ended abnormally");
    }
    Ok(())
}

fn print_status(state: &AuthState, entitlements: &EntitlementsSnapshot, json: bool) -> Result<()> {
    let report = StatusReport {
        state: state.name(),
        address: state.address().map(|address| address.to_string()),
        tier: entitlements.tier.to_string(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match &report.address {
        Some(address) => println!(
            "{} {} ({})",
            style(report.state).bold(),
            style(address).cyan(),
            report.tier
        ),
        None => println!("{}", style(report.state).bold()),
    }
    Ok(())
}

fn print_entitlements(snapshot: &EntitlementsSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    println!("{} {}", style("Tier:").bold(), style(snapshot.tier).cyan());
    println!("{}", style("Features:").bold());
    for feature in &snapshot.features {
        println!("  {feature}");
    }
    println!("{}", style("Limits:").bold());
    for (name, value) in &snapshot.limits {
        if *value == EntitlementsSnapshot::UNLIMITED {
            println!("  {name}: unlimited");
        } else {
            println!("  {name}: {value}");
        }
    }
    Ok(())
}

fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow!(err))
            .context("initialize tracing subscriber")?;
        return Ok(None);
    };

    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .context("log file path must name a file")?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("create log directory {}", directory.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(Some(guard))
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
