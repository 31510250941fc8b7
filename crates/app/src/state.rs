//! Application state
//!
//! Opens the store and wires the services the daemon runs.

use std::sync::Arc;

use confer_core::{ConferenceLifecycle, Database, SessionRegistry};
use confer_net::{ConnectionHub, HttpTranslator, Translator, Unconfigured};

use crate::config::{AppConfig, ConfigError};

/// Startup errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] confer_core::Error),

    #[error(transparent)]
    Net(#[from] confer_net::Error),
}

/// Services shared by the daemon
pub struct AppState {
    pub lifecycle: Arc<ConferenceLifecycle<Database>>,
    pub hub: Arc<ConnectionHub>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let db_path = config.database_path()?;

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(confer_core::Error::from)?;
        }

        let db = Database::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "Database opened");

        Self::with_database(db, config)
    }

    /// Wire services over an already opened store
    pub fn with_database(db: Database, config: &AppConfig) -> Result<Self, AppError> {
        let registry = Arc::new(SessionRegistry::new(db));
        let lifecycle = Arc::new(
            ConferenceLifecycle::new(registry)
                .with_code_attempts(config.conference.code_max_attempts),
        );
        let hub = Arc::new(ConnectionHub::new(
            translator(config)?,
            config.translation.timeout(),
        ));

        Ok(Self {
            lifecycle,
            hub,
        })
    }
}

fn translator(config: &AppConfig) -> Result<Arc<dyn Translator>, AppError> {
    match &config.translation.api_url {
        Some(url) => {
            tracing::info!(url = %url, "Translation backend configured");
            Ok(Arc::new(HttpTranslator::new(
                url.clone(),
                config.translation.api_key.clone(),
                config.translation.timeout(),
            )?))
        }
        None => {
            tracing::warn!("No translation backend configured, translations use the fallback marker");
            Ok(Arc::new(Unconfigured))
        }
    }
}
