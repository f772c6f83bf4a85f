use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{extract::DefaultBodyLimit, http::HeaderName, routing::get, Router};
use std::time::Duration;
use thiserror::Error;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod domain;
pub mod file_reply;
mod handlers;
pub mod identity;
pub mod listing;
pub mod locator;
pub mod notice;
pub mod pipeline;
pub mod sqlite;
pub mod thumbnail;
pub mod vision;

use crate::config::{Config, ConfigError};
use crate::domain::BlobStore;
use crate::identity::DEFAULT_PRINCIPAL_HEADER;
use crate::locator::BlobLocator;
use crate::sqlite::{Mode, Sqlite, StoreError};
use crate::vision::{AnnotateError, Annotator, Unconfigured, VisionClient};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_UPLOAD_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database {} cannot be created: {source}", .path.display())]
    Database { path: PathBuf, source: StoreError },
    #[error(transparent)]
    Vision(#[from] AnnotateError),
    #[error("public URL '{0}' cannot be used as a base for blob locations")]
    PublicUrl(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything a request needs: where the database lives, the vision
/// service and how to address stored blobs.
#[derive(Clone)]
pub struct AppState {
    db: Arc<PathBuf>,
    annotator: Arc<dyn Annotator>,
    locator: Arc<BlobLocator>,
    principal_header: HeaderName,
}

impl AppState {
    pub fn new(db: PathBuf, annotator: Arc<dyn Annotator>, locator: BlobLocator) -> Self {
        Self {
            db: Arc::new(db),
            annotator,
            locator: Arc::new(locator),
            principal_header: HeaderName::from_static(DEFAULT_PRINCIPAL_HEADER),
        }
    }

    #[must_use]
    pub fn with_principal_header(mut self, header: HeaderName) -> Self {
        self.principal_header = header;
        self
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_photos,
        handlers::upload_photo,
        handlers::get_photo,
        handlers::get_blob,
    ),
    components(schemas(
        kernel::Gallery,
        kernel::DisplayRecord,
        kernel::PhotoDetails,
        kernel::UploadReport,
        kernel::UploadStep,
    )),
    tags(
        (name = "photos", description = "Photo album: listing and captioned uploads"),
        (name = "blobs", description = "Stored originals and thumbnails"),
    )
)]
struct ApiDoc;

pub async fn run() -> Result<(), ServerError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "server=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Start init
    let db = config.database_path();
    Sqlite::open(&db, Mode::ReadWrite)
        .and_then(|s| s.new_database())
        .map_err(|source| ServerError::Database {
            path: db.clone(),
            source,
        })?;

    let annotator: Arc<dyn Annotator> = match &config.vision {
        Some(vision) => Arc::new(VisionClient::new(&vision.endpoint, &vision.subscription_key)?),
        None => {
            tracing::warn!("VISION_ENDPOINT is not set, uploads will not be captioned");
            Arc::new(Unconfigured)
        }
    };
    let locator = BlobLocator::new(&config.public_url)
        .ok_or_else(|| ServerError::PublicUrl(config.public_url.clone()))?;

    let state = AppState::new(db, annotator, locator)
        .with_principal_header(config.principal_header.clone());

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(socket).await?;
    tracing::debug!("listening on {socket}, blobs served as {}", config.public_url);

    axum::serve(listener, create_routes(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/photos",
            get(handlers::list_photos).post(handlers::upload_photo),
        )
        .route("/api/photos/:name", get(handlers::get_photo))
        .route("/blobs/:container/:name", get(handlers::get_blob))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_SIZE))
                .into_inner(),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
