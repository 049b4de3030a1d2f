//! catalog-ingest - bulk product ingestion service
//!
//! Startup order: parse arguments, load TOML, apply overrides, initialize
//! tracing, resolve the root folder, open the database, serve.

use anyhow::Result;
use catalog_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use catalog_ingest::attachments::DiskAttachmentSink;
use catalog_ingest::config::{ConfigOverrides, ServiceConfig};
use catalog_ingest::db::init_database_pool;
use catalog_ingest::kinds::ProductKind;
use catalog_ingest::pipeline::{FailurePolicy, IngestEngine};
use catalog_ingest::store::SqliteRecordStore;
use catalog_ingest::{build_router, AppState};

const MODULE_NAME: &str = "catalog-ingest";

/// Command-line arguments; each one can also be set through its environment variable
#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(about = "Bulk product ingestion service")]
#[command(version)]
struct Args {
    /// TOML config file (default: ~/.config/catalog/catalog-ingest.toml)
    #[arg(short, long, env = "CATALOG_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database and uploads
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long, env = "CATALOG_PORT")]
    port: Option<u16>,

    /// Database file (default: <root>/catalog.db)
    #[arg(long, env = "CATALOG_DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// Attachment directory (default: <root>/uploads)
    #[arg(long, env = "CATALOG_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Collection prefix in indexed field names
    #[arg(long, env = "CATALOG_COLLECTION")]
    collection: Option<String>,

    /// Default failure policy (continue-on-error or all-or-nothing)
    #[arg(long, env = "CATALOG_FAILURE_POLICY")]
    failure_policy: Option<FailurePolicy>,

    /// Concurrent inserts under continue-on-error
    #[arg(long, env = "CATALOG_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Total milliseconds to retry a write while the database is locked
    #[arg(long, env = "CATALOG_MAX_LOCK_WAIT_MS")]
    max_lock_wait_ms: Option<u64>,

    /// Image reference stored for products submitted without one
    #[arg(long, env = "CATALOG_PLACEHOLDER_IMAGE")]
    placeholder_image: Option<String>,

    /// Accepted attachment MIME prefix (empty accepts any type)
    #[arg(long, env = "CATALOG_ALLOWED_CONTENT_PREFIX")]
    allowed_content_prefix: Option<String>,

    /// Request body limit in bytes for multipart submissions
    #[arg(long, env = "CATALOG_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CATALOG_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let toml_config: ServiceConfig = match &config_path {
        Some(path) => load_toml_config(path)?,
        None => ServiceConfig::default(),
    };

    let config = toml_config.with_overrides(ConfigOverrides {
        port: args.port,
        database_path: args.database_path,
        upload_dir: args.upload_dir,
        collection: args.collection,
        failure_policy: args.failure_policy,
        max_concurrency: args.max_concurrency,
        max_lock_wait_ms: args.max_lock_wait_ms,
        placeholder_image: args.placeholder_image,
        allowed_content_prefix: args.allowed_content_prefix,
        max_body_bytes: args.max_body_bytes,
        log_level: args.log_level,
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting catalog-ingest v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .with_toml_root(config.root_folder.clone())
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = config.database_path.clone().unwrap_or_else(|| initializer.database_path());
    let upload_dir = config.upload_dir.clone().unwrap_or_else(|| initializer.upload_dir());
    info!("Database path: {}", db_path.display());
    info!("Upload directory: {}", upload_dir.display());

    let pool = match init_database_pool(&db_path).await {
        Ok(pool) => {
            info!("Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e);
        }
    };

    let ingest = &config.ingest;
    let store = Arc::new(SqliteRecordStore::new(pool, ingest.max_lock_wait_ms));
    let engine = Arc::new(IngestEngine::new(
        ingest,
        Arc::new(ProductKind::new(ingest.placeholder_image.clone())),
        store.clone(),
        Arc::new(DiskAttachmentSink::new(upload_dir)),
    ));
    info!(
        collection = %ingest.collection,
        policy = %ingest.failure_policy,
        max_concurrency = ingest.max_concurrency,
        "Ingest pipeline ready"
    );

    let state = AppState::new(engine, store, ingest.max_body_bytes);
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("catalog-ingest listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
