//! Configuration for Muster
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Persistence backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// MongoDB (production)
    Mongo,
    /// Process memory, lost on restart (development and tests)
    Memory,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Muster - volunteer organization backend
#[derive(Parser, Debug, Clone)]
#[command(name = "muster")]
#[command(about = "Volunteer organization backend: departments, missions, shifts and participation")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Persistence backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "mongo")]
    pub store_backend: StoreBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "muster")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Access token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Refresh token expiry in seconds (default 7 days)
    #[arg(long, env = "REFRESH_EXPIRY_SECONDS", default_value = "604800")]
    pub refresh_expiry_seconds: u64,

    /// Enable development mode (insecure JWT secret, memory store fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Include internal error detail in 500 responses
    #[arg(long, env = "APP_DEBUG", default_value = "false")]
    pub debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Directory holding uploaded document files
    #[arg(long, env = "STORAGE_DIR", default_value = "./storage/documents")]
    pub storage_dir: PathBuf,

    /// Maximum decoded size of an uploaded document
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: usize,

    /// Webhook that relays outgoing mail as JSON (mail is only logged when unset)
    #[arg(long, env = "MAIL_WEBHOOK_URL")]
    pub mail_webhook_url: Option<String>,

    /// Sender address stamped on outgoing mail
    #[arg(long, env = "MAIL_FROM", default_value = "noreply@muster.local")]
    pub mail_from: String,

    /// Outgoing mail queue capacity
    #[arg(long, env = "MAIL_QUEUE_SIZE", default_value = "256")]
    pub mail_queue_size: usize,

    /// Page size when a list request does not specify one
    #[arg(long, env = "DEFAULT_PAGE_SIZE", default_value = "15")]
    pub default_page_size: u32,

    /// Upper bound on requested page sizes
    #[arg(long, env = "MAX_PAGE_SIZE", default_value = "100")]
    pub max_page_size: u32,

    /// Email of a system administrator created at startup when no user has it
    #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL")]
    pub bootstrap_admin_email: Option<String>,

    /// Password for the bootstrap administrator
    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD")]
    pub bootstrap_admin_password: Option<String>,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some("dev-only-insecure-secret-not-for-production".to_string()),
            (None, false) => None,
        }
    }

    /// Clamp a requested page size to the configured bounds
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if let Some(ref secret) = self.jwt_secret {
            if secret.len() < 32 {
                return Err("JWT_SECRET must be at least 32 characters".to_string());
            }
        }

        if self.jwt_expiry_seconds == 0 || self.refresh_expiry_seconds == 0 {
            return Err("Token expiry must be greater than zero".to_string());
        }

        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err("DEFAULT_PAGE_SIZE must be between 1 and MAX_PAGE_SIZE".to_string());
        }

        if self.bootstrap_admin_email.is_some() != self.bootstrap_admin_password.is_some() {
            return Err(
                "BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together".to_string(),
            );
        }

        Ok(())
    }

    /// Arguments for tests and embedded use: memory store, dev secret
    pub fn for_testing(storage_dir: PathBuf) -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            store_backend: StoreBackend::Memory,
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db: "muster_test".to_string(),
            jwt_secret: Some("test-secret-that-is-at-least-32-characters-long".to_string()),
            jwt_expiry_seconds: 3600,
            refresh_expiry_seconds: 7 * 24 * 3600,
            dev_mode: true,
            debug: true,
            log_level: "debug".to_string(),
            log_format: LogFormat::Text,
            storage_dir,
            max_upload_bytes: 1024 * 1024,
            mail_webhook_url: None,
            mail_from: "noreply@muster.test".to_string(),
            mail_queue_size: 16,
            default_page_size: 15,
            max_page_size: 100,
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["muster"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_production_requires_secret() {
        let args = parse(&[]);
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", "0123456789abcdef0123456789abcdef"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_dev_mode_secret_fallback() {
        let args = parse(&["--dev-mode", "--store-backend", "memory"]);
        assert!(args.validate().is_ok());
        assert!(args.jwt_secret().is_some());
        assert_eq!(args.store_backend, StoreBackend::Memory);
    }

    #[test]
    fn test_short_secret_rejected() {
        let args = parse(&["--jwt-secret", "short"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_page_size_clamped() {
        let args = parse(&["--dev-mode"]);
        assert_eq!(args.page_size(None), 15);
        assert_eq!(args.page_size(Some(0)), 1);
        assert_eq!(args.page_size(Some(1000)), 100);
    }

    #[test]
    fn test_bootstrap_admin_needs_both_fields() {
        let args = parse(&["--dev-mode", "--bootstrap-admin-email", "admin@example.org"]);
        assert!(args.validate().is_err());
    }
}
