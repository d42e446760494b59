//! Database configuration.

use std::path::PathBuf;

/// Configuration for a [`crate::MessageDatabase`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Index entries fetched per cursor page.
    pub scan_batch_size: usize,
    /// Database file used by [`crate::MessageDatabase::open_sqlite_default`].
    pub sqlite_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            scan_batch_size: 64,
            sqlite_path: None,
        }
    }
}

impl DatabaseConfig {
    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        // A zero page would never make progress.
        self.scan_batch_size = size.max(1);
        self
    }

    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_builders() {
        let config = DatabaseConfig::default();
        assert_eq!(config.scan_batch_size, 64);
        assert!(config.sqlite_path.is_none());

        let config = DatabaseConfig::default()
            .with_scan_batch_size(0)
            .with_sqlite_path("/tmp/sms.db");
        assert_eq!(config.scan_batch_size, 1);
        assert_eq!(config.sqlite_path, Some(PathBuf::from("/tmp/sms.db")));
    }
}
