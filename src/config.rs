use crate::batch::DEFAULT_BATCH_SIZE;
use crate::core::{AuditError, Result};

pub const BATCH_SIZE_ENV: &str = "DOCAUDIT_BATCH_SIZE";
pub const APP_NAME_ENV: &str = "DOCAUDIT_APP_NAME";

/// Audit engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Maximum number of keys or documents per store round-trip
    pub batch_size: usize,

    /// Application name recorded on tracing spans
    pub app_name: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            app_name: "docaudit".to_string(),
        }
    }
}

impl AuditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the application name
    pub fn app_name(mut self, app_name: &str) -> Self {
        self.app_name = app_name.to_string();
        self
    }

    /// Defaults overridden by `DOCAUDIT_BATCH_SIZE` and `DOCAUDIT_APP_NAME`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(BATCH_SIZE_ENV) {
            let batch_size = raw.trim().parse::<usize>().map_err(|_| {
                AuditError::Config(format!(
                    "{} must be a positive integer, got '{}'",
                    BATCH_SIZE_ENV, raw
                ))
            })?;
            config = config.batch_size(batch_size);
        }
        if let Some(app_name) = lookup(APP_NAME_ENV) {
            config = config.app_name(&app_name);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AuditError::Config("batch_size must be at least 1".to_string()));
        }
        if self.app_name.trim().is_empty() {
            return Err(AuditError::Config("app_name must not be empty".to_string()));
        }
        Ok(())
    }
}
