//! Inventory intake service.
//!
//! Products are photographed at a receiving desk, optionally run through a
//! vision model to read name, brand and barcode, and stored with sequential IDs
//! minted from a batch prefix (`A1`, `A2`, ...). Photos live in a content folder
//! next to the SQLite database; the batch counter lives in a small JSON file.

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod auth;
pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod images;
pub mod models;
pub mod vision;

use crate::auth::SessionStore;
use crate::batch::BatchCounter;
use crate::config::Settings;
use crate::db::DbPool;
use crate::images::ImageStore;
use crate::vision::VisionAdapter;

pub struct AppState {
    pub pool: DbPool,
    pub batch: BatchCounter,
    pub images: ImageStore,
    pub vision: VisionAdapter,
    pub sessions: SessionStore,
    pub auth_enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("database: {0}")]
    Database(#[from] db::PoolError),

    #[error("batch counter: {0}")]
    Batch(#[from] batch::BatchError),

    #[error("content folder: {0}")]
    Storage(#[from] std::io::Error),

    #[error("admin account: {0}")]
    Admin(#[from] error::AppError),
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> Result<Self, StartupError> {
        let pool = db::init_pool(&settings.database)?;
        let batch = BatchCounter::open(&settings.storage.batch_file, settings.batch.on_corrupt)?;
        let images = ImageStore::new(&settings.storage.upload_dir)?;

        let vision = VisionAdapter::from_settings(&settings.vision, settings.vision_api_key());
        if !vision.is_configured() {
            info!("no vision API key found; barcode and AI analysis are disabled");
        }

        if settings.auth.enabled {
            auth::seed_admin(
                &pool,
                &settings.auth.admin_username,
                settings.auth.admin_password.as_deref(),
            )?;
        }

        Ok(AppState {
            pool,
            batch,
            images,
            vision,
            sessions: SessionStore::default(),
            auth_enabled: settings.auth.enabled,
        })
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,actix_web=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Any origin may call the API, but browsers never attach the session cookie
/// cross-origin; other origins authenticate with the Bearer token.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600)
}

pub async fn start_server(settings: Settings) -> std::io::Result<()> {
    let app_state = AppState::from_settings(&settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let app_state = web::Data::new(app_state);
    let max_payload = settings.server.max_payload_bytes;
    let address = settings.bind_address();

    info!("Starting HTTP server on http://{}", address);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors())
            .app_data(app_state.clone())
            .app_data(handlers::json_config(max_payload))
            .app_data(web::PayloadConfig::new(max_payload))
            .configure(handlers::configure)
    })
    .bind(address)?
    .run()
    .await
}
