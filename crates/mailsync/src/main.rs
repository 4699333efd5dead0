//! `mailsync` - synchronize IMAP and POP3 folders into a local cache

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mailsync_core::{
    CancellationFlag, ImapStore, Pop3Store, RemoteStore, Scheme, ServerSettings, SqliteBackend,
    SyncEvent, Synchronizer, settings,
};
use mailsync_net::{TransportConfig, TrustPolicy};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{AccountConfig, AppConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize the configured accounts
    Sync {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only synchronize this account
        #[arg(short, long)]
        account: Option<String>,
    },
    /// Convert server settings between URI and JSON form
    Uri {
        #[command(subcommand)]
        action: UriAction,
    },
}

#[derive(Subcommand, Debug)]
enum UriAction {
    /// Print the settings encoded in a server URI as JSON
    Decode {
        /// Server URI
        uri: String,
    },
    /// Print the server URI for settings given as JSON
    Encode {
        /// Server settings as JSON
        json: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailsync=info,mailsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sync { config, account } => {
            let path = config.unwrap_or_else(AppConfig::default_path);
            run_sync(&path, account.as_deref()).await
        }
        Command::Uri { action } => run_uri(action),
    }
}

fn run_uri(action: UriAction) -> anyhow::Result<()> {
    match action {
        UriAction::Decode { uri } => {
            let server = settings::decode(&uri)?;
            println!("{}", serde_json::to_string_pretty(&server)?);
        }
        UriAction::Encode { json } => {
            let server: ServerSettings =
                serde_json::from_str(&json).context("Invalid server settings")?;
            println!("{}", settings::encode(&server));
        }
    }
    Ok(())
}

async fn run_sync(path: &std::path::Path, account: Option<&str>) -> anyhow::Result<()> {
    let app_config = AppConfig::load(path).await?;
    if app_config.accounts.is_empty() {
        bail!("No accounts configured in {}", path.display());
    }

    let cancel = CancellationFlag::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            ctrl_c.cancel();
        }
    });

    let mut failures = 0usize;
    let mut matched = false;
    for account_config in app_config.select(account) {
        matched = true;
        if let Err(e) = sync_account(account_config, &cancel).await {
            warn!("Account {} failed: {e:#}", account_config.name);
            failures += 1;
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    if !matched {
        bail!("No account named {}", account.unwrap_or_default());
    }
    if failures > 0 {
        bail!("{failures} account(s) failed to synchronize");
    }
    Ok(())
}

async fn sync_account(account: &AccountConfig, cancel: &CancellationFlag) -> anyhow::Result<()> {
    let server = settings::decode(&account.server_uri)
        .with_context(|| format!("Invalid server URI for {}", account.name))?;

    let trust = if account.accept_invalid_certificates {
        TrustPolicy::AcceptInvalidCertificates
    } else {
        TrustPolicy::WebPki
    };
    let transport = TransportConfig::builder().trust(trust).build();

    let backend = open_backend(&account.name).await?;
    let synchronizer = Synchronizer::new(backend);

    info!(
        "Synchronizing {} ({} {})",
        account.name,
        server.scheme.as_str(),
        server.host
    );

    match server.scheme {
        Scheme::Imap => {
            let mut store = ImapStore::new(server, transport);
            if let Some(token) = &account.oauth_token {
                store = store.with_access_token(token.as_str());
            }
            sync_folders(&synchronizer, &store, account, cancel).await
        }
        Scheme::Pop3 => {
            let mut store = Pop3Store::new(server, transport);
            if let Some(token) = &account.oauth_token {
                store = store.with_access_token(token.as_str());
            }
            sync_folders(&synchronizer, &store, account, cancel).await
        }
    }
}

async fn sync_folders<S: RemoteStore>(
    synchronizer: &Synchronizer<SqliteBackend>,
    store: &S,
    account: &AccountConfig,
    cancel: &CancellationFlag,
) -> anyhow::Result<()> {
    let sink = print_event;
    let mut failed = Vec::new();

    for folder in &account.folders {
        cancel.check()?;
        if let Err(e) = synchronizer
            .sync(store, folder, &account.sync, &sink, cancel)
            .await
        {
            warn!("Folder {folder} failed: {e}");
            failed.push(folder.as_str());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        bail!("Failed folders: {}", failed.join(", "))
    }
}

/// Opens the per-account cache under the data directory.
async fn open_backend(account: &str) -> anyhow::Result<SqliteBackend> {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsync")
        .join(account);

    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let db_path = data_dir.join("cache.db");
    let backend = SqliteBackend::new(db_path.to_str().unwrap_or("cache.db"))
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    Ok(backend)
}

#[allow(clippy::needless_pass_by_value)]
fn print_event(event: SyncEvent) {
    match event {
        SyncEvent::Started { folder } => println!("{folder}: started"),
        SyncEvent::HeadersProgress {
            folder,
            done,
            total,
        } => println!("{folder}: listed {done}/{total}"),
        SyncEvent::NewMessage { folder, uid } => println!("{folder}: new message {uid}"),
        SyncEvent::FlagsChanged { folder, uid } => println!("{folder}: flags changed on {uid}"),
        SyncEvent::Removed { folder, uid } => println!("{folder}: removed {uid}"),
        SyncEvent::UidValidityChanged { folder, old, new } => {
            println!("{folder}: UID validity changed from {old} to {new}, cache cleared");
        }
        SyncEvent::Finished { folder, total, new } => {
            println!("{folder}: done, {new} new of {total}");
        }
        SyncEvent::Failed { folder, message } => println!("{folder}: failed, {message}"),
    }
}
