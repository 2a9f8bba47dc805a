//! Outpost - keeps troop outing data available offline.
//!
//! Headless host for the outpost core library. It owns the sign-in token,
//! runs the background sync scheduler against the API server, and can
//! precache the application shell and answer requests from it.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use outpost_core::api::ApiError;
use outpost_core::sync::SyncObserver;
use outpost_core::worker::{
    on_activate, on_fetch, on_install, CacheStorage, ClientRegistry, FetchOutcome, HttpNetwork,
    Method, Request,
};
use outpost_core::{
    ApiClient, AuthSnapshot, Config, GateInputs, MirrorStore, Notifier, SyncScheduler, TokenStore,
};

// ============================================================================
// Constants
// ============================================================================

/// How often the sync daemon re-checks server reachability
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Environment overrides, checked before the config file and keyring
const ENV_TOKEN: &str = "OUTPOST_TOKEN";
const ENV_API_URL: &str = "OUTPOST_API_URL";
const ENV_APP_ORIGIN: &str = "OUTPOST_APP_ORIGIN";

const USAGE: &str = "\
Usage: outpost <command>

Commands:
  login          Store an API token in the system keyring
  logout         Remove the stored API token
  sync           Keep the offline mirror in sync until interrupted
  status         Show what the offline mirror holds
  precache       Install and activate the application shell cache
  fetch <path>   Answer a GET for <path> the way the offline worker would";

/// Initialize the tracing subscriber for logging.
///
/// Always logs to stderr; with `log_dir` set, also writes a daily rolling log
/// file there. The returned guard must be held until exit to flush the file.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "outpost.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;

    let log_dir = if command == "sync" {
        Some(config.cache_dir()?.join("logs"))
    } else {
        None
    };
    let _guard = init_tracing(log_dir.as_deref());

    match command.as_str() {
        "login" => login(config).await,
        "logout" => logout(),
        "sync" => run_sync(&config).await,
        "status" => status(&config),
        "precache" => precache(&config).await,
        "fetch" => {
            let path = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("fetch requires a path, e.g. `outpost fetch /`"))?;
            fetch(&config, path).await
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

// ============================================================================
// Auth
// ============================================================================

fn api_base_url(config: &Config) -> String {
    std::env::var(ENV_API_URL).unwrap_or_else(|_| config.api_base_url().to_string())
}

fn load_token() -> Result<Option<String>> {
    if let Ok(token) = std::env::var(ENV_TOKEN) {
        if !token.trim().is_empty() {
            return Ok(Some(token));
        }
    }
    TokenStore::load()
}

async fn login(mut config: Config) -> Result<()> {
    let token = rpassword::prompt_password("API token: ").context("Failed to read token")?;
    let token = token.trim();
    if token.is_empty() {
        bail!("No token entered");
    }

    let client = ApiClient::new(api_base_url(&config))?.with_token(Arc::new(token.to_string()));
    let user = client
        .fetch_current_user()
        .await
        .context("Token was not accepted by the server")?;

    TokenStore::store(token)?;
    config.last_username = Some(user.display_name().to_string());
    config.save()?;

    info!(user = %user.display_name(), role = %user.role, "Signed in");
    println!("Signed in as {} ({})", user.display_name(), user.role);
    if !user.is_admin() {
        println!("Background sync only runs for admin accounts.");
    }
    Ok(())
}

fn logout() -> Result<()> {
    TokenStore::delete()?;
    println!("Signed out");
    Ok(())
}

/// Work out the auth capability the sync gate sees.
///
/// When the server cannot be reached the mirrored user stands in, so a
/// restart while offline still knows who is signed in.
async fn resolve_auth(client: &ApiClient, mirror: &MirrorStore) -> AuthSnapshot {
    if !client.has_token() {
        return AuthSnapshot::signed_out();
    }

    match client.fetch_current_user().await {
        Ok(user) => AuthSnapshot::for_user(&user),
        Err(ApiError::Unauthorized) => {
            warn!("Stored token was rejected, run `outpost login` again");
            AuthSnapshot::signed_out()
        }
        Err(e) => {
            if e.is_connectivity() {
                info!(error = %e, "Server unreachable, using mirrored user");
            } else {
                warn!(error = %e, "Could not resolve current user");
            }
            match mirror.read_user() {
                Ok(Some(cached)) => AuthSnapshot::for_user(&cached.data),
                _ => AuthSnapshot::loading(),
            }
        }
    }
}

// ============================================================================
// Sync
// ============================================================================

async fn run_sync(config: &Config) -> Result<()> {
    let mut client = ApiClient::new(api_base_url(config))?;
    if let Some(token) = load_token()? {
        client.set_token(token);
    }
    let mirror = MirrorStore::open(config.mirror_dir()?)?;
    let notifier = Notifier::new();

    let scheduler = SyncScheduler::new(
        client.clone(),
        mirror.clone(),
        Arc::new(notifier.clone()) as Arc<dyn SyncObserver>,
    );

    let mut online = client.probe().await;
    let mut auth = resolve_auth(&client, &mirror).await;
    info!(online = online, signed_in = auth.is_signed_in, admin = auth.is_admin(), "Sync daemon starting");
    scheduler.mount(GateInputs::new(auth, online));
    println!("Sync {} (Ctrl+C to stop)", scheduler.phase());

    let mut toasts = notifier.subscribe();
    let mut probe = tokio::time::interval(PROBE_INTERVAL);
    probe.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = toasts.changed() => {
                if changed.is_err() {
                    break;
                }
                let message = toasts.borrow_and_update().clone();
                if let Some(message) = message {
                    println!("{}", message);
                }
            }
            _ = probe.tick() => {
                let now_online = client.probe().await;
                // Coming back online is the chance to confirm who is signed in
                if now_online && (!online || !auth.is_loaded) {
                    auth = resolve_auth(&client, &mirror).await;
                }
                if now_online != online {
                    info!(online = now_online, "Connectivity changed");
                }
                online = now_online;

                let before = scheduler.phase();
                scheduler.update(GateInputs::new(auth, online));
                if scheduler.phase() != before {
                    println!("Sync {}", scheduler.phase());
                }
            }
        }
    }

    scheduler.unmount();
    notifier.unmount();
    info!("Sync daemon stopped");
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let mirror = MirrorStore::open(config.mirror_dir()?)?;
    let summary = mirror.summary()?;

    println!("User:        {}", summary.user.as_deref().unwrap_or("-"));
    match summary.outing_count {
        Some(count) => println!("Outings:     {}", count),
        None => println!("Outings:     -"),
    }
    println!("Rosters:     {}", summary.roster_count);
    println!("Last synced: {}", summary.last_synced());
    Ok(())
}

// ============================================================================
// Offline Worker
// ============================================================================

fn app_origin(config: &Config) -> String {
    std::env::var(ENV_APP_ORIGIN).unwrap_or_else(|_| config.app_origin().to_string())
}

async fn precache(config: &Config) -> Result<()> {
    let path = config.worker_cache_path()?;
    let mut storage = CacheStorage::load(&path)?;
    let network = HttpNetwork::new(app_origin(config))?;
    let version = config.cache_version();
    let manifest = config.asset_manifest()?;

    let installed = on_install(&mut storage, &network, version, &manifest)
        .await
        .with_context(|| format!("Failed to install cache {}", version))?;

    // No browser views exist here, so there is nothing to claim
    let mut clients = ClientRegistry::new();
    let activated = on_activate(&mut storage, version, &mut clients)?;
    storage.save(&path)?;

    println!("Cached {} assets as {}", installed.cached, installed.version);
    if !activated.purged.is_empty() {
        println!("Removed old caches: {}", activated.purged.join(", "));
    }
    Ok(())
}

async fn fetch(config: &Config, path: &str) -> Result<()> {
    let storage = CacheStorage::load(&config.worker_cache_path()?)?;
    let network = HttpNetwork::new(app_origin(config))?;
    let request = Request::new(Method::Get, path);

    match on_fetch(&storage, config.cache_version(), &network, &request).await {
        FetchOutcome::Respond { response, source } => {
            println!(
                "{} {} from {:?} ({} bytes)",
                response.status,
                request.url,
                source,
                response.body.len()
            );
            Ok(())
        }
        FetchOutcome::Passthrough => {
            println!("{} not intercepted", request.url);
            Ok(())
        }
        FetchOutcome::NoResponse => bail!("{} unavailable: offline and no cached shell", request.url),
    }
}
