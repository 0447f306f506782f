use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use dashgate::arbiter::Navigator;
use dashgate::cache::{KeyValueStore, LibSqlStore, LocalStateCache, MemoryStore};
use dashgate::config::GuardConfig;
use dashgate::guard::{AccessGuard, ValidationOutcome};
use dashgate::status::{BackendConfig, HttpStatusClient};
use dashgate::sync::spawn_cross_tab_sync;

/// Navigator stand-in for the rendering layer: prints replace-navigations.
struct LoggingNavigator;

#[async_trait]
impl Navigator for LoggingNavigator {
    async fn replace(&self, path: &str) {
        println!("  -> replace-navigate to {path}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let guard_config = GuardConfig::default();
    let mut backend_config = BackendConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export DASHGATE_API_URL=https://api.example.com");
        std::process::exit(1);
    });
    backend_config.query_timeout = guard_config.query_timeout;

    let user = std::env::var("DASHGATE_USER").unwrap_or_else(|_| "default".to_string());

    eprintln!("dashgate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", backend_config.base_url);
    eprintln!("   User: {user}");

    // ── Store ────────────────────────────────────────────────────────────
    let store: Arc<dyn KeyValueStore> = match std::env::var("DASHGATE_DB_PATH") {
        Ok(path) => {
            eprintln!("   Store: {path}");
            Arc::new(LibSqlStore::new_local(std::path::Path::new(&path)).await?)
        }
        Err(_) => {
            eprintln!("   Store: in-memory (set DASHGATE_DB_PATH to persist)");
            Arc::new(MemoryStore::new())
        }
    };
    let cache = Arc::new(LocalStateCache::new(Arc::clone(&store)));

    // ── Guard ────────────────────────────────────────────────────────────
    let status = Arc::new(HttpStatusClient::new(backend_config)?);
    let guard = AccessGuard::new(
        user,
        guard_config,
        status,
        cache,
        Arc::new(LoggingNavigator),
    );
    let sync_handle = spawn_cross_tab_sync(Arc::clone(&guard), Arc::clone(&store));

    eprintln!("   Type a route path (e.g. /twitter-dashboard) and press Enter. /quit to exit.\n");

    // ── Route loop ───────────────────────────────────────────────────────
    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let route = line.trim().to_string();
        if route.is_empty() {
            eprint!("> ");
            continue;
        }
        if route == "/quit" {
            break;
        }

        match guard.validate(&route).await {
            ValidationOutcome::Decided(decision) => {
                if decision.allow {
                    println!(
                        "  allowed ({}) platform={} account={:?}",
                        decision.reason.label(),
                        decision.platform,
                        decision.account.as_ref().map(|a| &a.account_holder),
                    );
                } else {
                    println!(
                        "  blocked ({}) redirect={:?} remaining={:?}",
                        decision.reason.label(),
                        decision.redirect_to,
                        decision.remaining,
                    );
                }
            }
            other => println!("  {}", other.label()),
        }
        eprint!("> ");
    }

    sync_handle.abort();
    Ok(())
}
