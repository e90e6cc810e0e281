use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base URL written into issued links.
    pub public_url: String,
    /// HMAC key for link signatures. `None` means "generate one at startup".
    pub link_secret: Option<String>,
    /// Link lifetime; `None` issues links that never expire.
    pub link_ttl: Option<Duration>,
    pub batch_concurrency: usize,
    pub batch_timeout: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Git LFS batch API server")]
pub struct Args {
    /// Host to bind to (overrides LFS_BATCH_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LFS_BATCH_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object content is stored (overrides LFS_BATCH_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides LFS_BATCH_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Externally reachable base URL for issued links (overrides LFS_BATCH_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Link lifetime in seconds, 0 for non-expiring links (overrides LFS_BATCH_LINK_TTL_SECS)
    #[arg(long)]
    pub link_ttl_secs: Option<u64>,

    /// Objects evaluated concurrently per batch (overrides LFS_BATCH_CONCURRENCY)
    #[arg(long)]
    pub batch_concurrency: Option<usize>,

    /// Seconds a batch may take before it is abandoned (overrides LFS_BATCH_TIMEOUT_SECS)
    #[arg(long)]
    pub batch_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("LFS_BATCH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("LFS_BATCH_PORT", 8080)?;
        let env_storage =
            env::var("LFS_BATCH_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("LFS_BATCH_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/lfs.db".into());
        let env_public_url = env::var("LFS_BATCH_PUBLIC_URL").ok();
        let env_ttl = env_parse("LFS_BATCH_LINK_TTL_SECS", 900u64)?;
        let env_concurrency = env_parse("LFS_BATCH_CONCURRENCY", 16usize)?;
        let env_timeout = env_parse("LFS_BATCH_TIMEOUT_SECS", 30u64)?;
        let link_secret = env::var("LFS_BATCH_LINK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        // --- Merge ---
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or(env_public_url)
            .unwrap_or_else(|| format!("http://{}:{}", host, port));
        let ttl_secs = args.link_ttl_secs.unwrap_or(env_ttl);

        let cfg = Self {
            host,
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: public_url.trim_end_matches('/').to_string(),
            link_secret,
            link_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            batch_concurrency: args.batch_concurrency.unwrap_or(env_concurrency).max(1),
            batch_timeout: Duration::from_secs(
                args.batch_timeout_secs.unwrap_or(env_timeout).max(1),
            ),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
