use anyhow::{Context, Result};
use axum::Router;
use lfs_batch::{
    config::AppConfig,
    routes,
    services::{
        link_issuer::{LinkPolicy, SignedLinkIssuer},
        storage_service::{ContentStore, MetaStore},
    },
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        addr = %cfg.addr(),
        public_url = %cfg.public_url,
        storage_dir = %cfg.storage_dir,
        link_ttl = ?cfg.link_ttl,
        batch_concurrency = cfg.batch_concurrency,
        batch_timeout = ?cfg.batch_timeout,
        "Starting lfs-batch"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // SQLx will not create the database file on its own
    let db_path_obj = Path::new(db_path);
    if let Some(parent) = db_path_obj.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    if let Err(e) = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(db_path)
    {
        tracing::warn!("Failed to open database file manually: {}", e);
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );
    let meta = MetaStore::new(db);

    // --- Handle migration mode ---
    if migrate {
        let applied = meta.migrate().await?;
        tracing::info!("Database migration complete ({} statements).", applied);
        return Ok(()); // exit after migration
    }

    // --- Link signing ---
    let secret = match cfg.link_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!(
                "LFS_BATCH_LINK_SECRET not set; using a random secret, links will not survive a restart"
            );
            format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
        }
    };
    let links = SignedLinkIssuer::new(LinkPolicy {
        base_url: cfg.public_url.clone(),
        secret: secret.into_bytes(),
        ttl: cfg.link_ttl,
    })?;

    // --- Initialize core service ---
    let content = ContentStore::new(&cfg.storage_dir);
    let state = AppState::new(
        meta,
        content,
        links,
        cfg.batch_concurrency,
        cfg.batch_timeout,
    );
    let shutdown = state.shutdown.clone();

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested; cancelling in-flight batches");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
