//! HTTP server and shared application state

pub mod http;

pub use http::run;

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::{Args, StoreBackend};
use crate::db::{Collections, DocumentStore, MemoryStore, MongoClient};
use crate::notify::{self, MailOutbox, NotificationListener};
use crate::services::{events, Services};
use crate::types::{ApiError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub collections: Collections,
    pub services: Services,
    pub started_at: Instant,
}

impl AppState {
    /// Build every service over `store`
    pub fn new(args: Args, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let secret = args
            .jwt_secret()
            .ok_or_else(|| ApiError::Config("JWT_SECRET is required in production mode".into()))?;
        let jwt = JwtValidator::new(secret, args.jwt_expiry_seconds, args.refresh_expiry_seconds)?;

        let collections = Collections::new(store);
        let services = Services::new(collections.clone(), &args, jwt);

        Ok(Self {
            args,
            collections,
            services,
            started_at: Instant::now(),
        })
    }

    /// Create indexes and the configured bootstrap administrator
    pub async fn prepare(&self) -> Result<()> {
        self.collections.ensure_indexes().await?;

        if let (Some(email), Some(password)) = (
            &self.args.bootstrap_admin_email,
            &self.args.bootstrap_admin_password,
        ) {
            if self.services.auth.bootstrap_admin(email, password).await? {
                info!("Bootstrap administrator {} created", email);
            }
        }
        Ok(())
    }

    /// Start the event listeners and the mail worker
    pub fn spawn_workers(&self) -> Result<Vec<tokio::task::JoinHandle<()>>> {
        let mailer = notify::mailer_from_args(&self.args)?;
        let (outbox, mail_worker) = MailOutbox::start(mailer, self.args.mail_queue_size);

        let listener = Arc::new(NotificationListener::new(
            self.collections.clone(),
            Arc::clone(&self.services.notifications),
            Some(outbox),
        ));

        Ok(vec![
            mail_worker,
            notify::spawn_notification_listener(listener, &self.services.events),
            events::spawn_logging_listener(Arc::clone(&self.services.events)),
        ])
    }
}

/// Open the configured store. In dev mode an unreachable MongoDB falls back
/// to the memory store.
pub async fn connect_store(args: &Args) -> Result<Arc<dyn DocumentStore>> {
    match args.store_backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Mongo => match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => Ok(Arc::new(client)),
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, using memory store): {}", e);
                Ok(Arc::new(MemoryStore::new()))
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                Err(e)
            }
        },
    }
}
