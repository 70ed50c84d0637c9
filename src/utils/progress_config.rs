// src/utils/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;
use std::time::Duration;

/// Configuration for progress tracking during a batch run
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-document spinners under the batch bar
    pub detailed: bool,
    /// Whether to show memory usage in progress messages
    pub show_memory: bool,
    /// Whether to show database connection pool statistics
    pub show_db_connection_stats: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: false,
            show_memory: true,
            show_db_connection_stats: true,
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_flag("PROGRESS_ENABLED", defaults.enabled),
            detailed: env_flag("PROGRESS_DETAILED", defaults.detailed),
            show_memory: env_flag("PROGRESS_SHOW_MEMORY", defaults.show_memory),
            show_db_connection_stats: env_flag(
                "PROGRESS_SHOW_DB_CONNECTIONS",
                defaults.show_db_connection_stats,
            ),
        }
    }

    /// Create a MultiProgress instance if progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    /// Adds the top-level bar counting processed documents.
    pub fn document_bar(&self, mp: &MultiProgress, total: u64) -> ProgressBar {
        let pb = mp.add(ProgressBar::new(total));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb
    }

    /// Adds a spinner for one document in flight, if detailed progress is on.
    pub fn document_spinner(&self, mp: &MultiProgress, document_id: &str) -> Option<ProgressBar> {
        if !self.should_show_detailed() {
            return None;
        }
        let pb = mp.add(ProgressBar::new_spinner());
        if let Ok(style) =
            ProgressStyle::default_spinner().template("  {spinner:.blue} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("Document {}", document_id));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }

    pub fn should_show_db_connection_stats(&self) -> bool {
        self.enabled && self.show_db_connection_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(!config.detailed);
        assert!(config.show_memory);
        assert!(config.show_db_connection_stats);
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_SHOW_MEMORY", "false");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert!(!config.show_memory);
        assert!(config.show_db_connection_stats);

        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_SHOW_MEMORY");
    }

    #[test]
    fn test_multi_progress_creation() {
        let mut config = ProgressConfig::default();

        config.enabled = true;
        assert!(config.create_multi_progress().is_some());

        config.enabled = false;
        assert!(config.create_multi_progress().is_none());
    }

    #[test]
    fn test_should_show_methods() {
        let mut config = ProgressConfig::default();
        config.detailed = true;
        assert!(config.should_show_detailed());
        assert!(config.should_show_memory());
        assert!(config.should_show_db_connection_stats());

        config.enabled = false;
        assert!(!config.should_show_detailed());
        assert!(!config.should_show_memory());
        assert!(!config.should_show_db_connection_stats());
    }

    #[test]
    fn test_document_spinner_only_when_detailed() {
        let mp = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let mut config = ProgressConfig::default();
        assert!(config.document_spinner(&mp, "DOC-1").is_none());

        config.detailed = true;
        let spinner = config.document_spinner(&mp, "DOC-1").unwrap();
        assert_eq!(spinner.message(), "Document DOC-1");
        spinner.finish_and_clear();
    }
}
