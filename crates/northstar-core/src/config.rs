use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{NorthstarError, Result};

/// Longest query accepted by the orchestrator, in characters.
pub const MAX_QUERY_CHARS: usize = 2000;

/// Top-level configuration for the NorthStar agent.
///
/// Loaded from `~/.northstar/config.toml` by default. Each section corresponds
/// to one pipeline stage or backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NorthstarConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl NorthstarConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NorthstarConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or is invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        check_unit("router.min_confidence", self.router.min_confidence)?;
        check_unit("router.heuristic_threshold", self.router.heuristic_threshold)?;
        check_unit("context.relevance_threshold", self.context.relevance_threshold)?;

        check_timeout("router.timeout_ms", self.router.timeout_ms)?;
        check_timeout("retrieval.call_timeout_ms", self.retrieval.call_timeout_ms)?;
        check_timeout("context.search_timeout_ms", self.context.search_timeout_ms)?;
        check_timeout("synthesis.timeout_ms", self.synthesis.timeout_ms)?;
        check_timeout("storage.persist_timeout_ms", self.storage.persist_timeout_ms)?;

        if self.synthesis.retry_count > 1 {
            return Err(NorthstarError::Config(format!(
                "synthesis.retry_count must be 0 or 1, got {}",
                self.synthesis.retry_count
            )));
        }
        if self.context.top_k == 0 {
            return Err(NorthstarError::Config(
                "context.top_k must be at least 1".to_string(),
            ));
        }
        if self.context.max_chars < MAX_QUERY_CHARS {
            return Err(NorthstarError::Config(format!(
                "context.max_chars must be at least {}, got {}",
                MAX_QUERY_CHARS, self.context.max_chars
            )));
        }
        if self.synthesis.primary_model_id.trim().is_empty() {
            return Err(NorthstarError::Config(
                "synthesis.primary_model_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unit(field: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(NorthstarError::Config(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

fn check_timeout(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        Err(NorthstarError::Config(format!("{} must be positive", field)))
    } else {
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the conversation database, records and documents.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// API server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.northstar/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Intent router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Model-produced intents below this confidence are discarded.
    pub min_confidence: f32,
    /// Heuristic rows below this confidence are ignored.
    pub heuristic_threshold: f32,
    /// Timeout for the classification call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            heuristic_threshold: 0.5,
            timeout_ms: 2_000,
        }
    }
}

/// Retrieval coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Per-call ceiling in milliseconds; slower calls become "unavailable".
    pub call_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 3_000,
        }
    }
}

/// Context augmenter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Passages requested from semantic search.
    pub top_k: usize,
    /// Passages scoring below this are discarded.
    pub relevance_threshold: f32,
    /// Character budget for the whole bundle.
    pub max_chars: usize,
    /// Prior turns carried into the bundle.
    pub history_turns: usize,
    /// Timeout for the search call in milliseconds.
    pub search_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            relevance_threshold: 0.2,
            max_chars: 6_000,
            history_turns: 6,
            search_timeout_ms: 3_000,
        }
    }
}

/// Model selection for the synthesis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub primary_model_id: String,
    pub fallback_model_id: String,
    /// Timeout for each generation attempt in milliseconds.
    pub timeout_ms: u64,
    /// Fallback attempts after the primary fails (0 or 1).
    pub retry_count: u8,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            primary_model_id: "llama3.1:8b".to_string(),
            fallback_model_id: "llama3.2:3b".to_string(),
            timeout_ms: 15_000,
            retry_count: 1,
        }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of an Ollama-compatible server, e.g. `http://localhost:11434`.
    /// Generation is disabled when unset.
    pub endpoint: Option<String>,
}

/// Storage locations, relative to `general.data_dir` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub conversation_db: String,
    pub records_dir: String,
    pub documents_dir: String,
    /// Timeout for conversation store calls in milliseconds.
    pub persist_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            conversation_db: "conversations.db".to_string(),
            records_dir: "records".to_string(),
            documents_dir: "documents".to_string(),
            persist_timeout_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = NorthstarConfig::default();
        assert_eq!(config.general.port, 3040);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.synthesis.retry_count, 1);
        assert_eq!(config.context.top_k, 5);
        assert!(config.generation.endpoint.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[general]
port = 8080
log_level = "debug"

[synthesis]
primary_model_id = "big"
fallback_model_id = "small"
timeout_ms = 5000

[generation]
endpoint = "http://localhost:11434"
"#,
        );
        let config = NorthstarConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.synthesis.primary_model_id, "big");
        assert_eq!(config.synthesis.fallback_model_id, "small");
        assert_eq!(config.synthesis.timeout_ms, 5000);
        assert_eq!(
            config.generation.endpoint.as_deref(),
            Some("http://localhost:11434")
        );
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[context]\nmax_chars = 9000\n");
        let config = NorthstarConfig::load(file.path()).unwrap();
        assert_eq!(config.context.max_chars, 9000);
        assert_eq!(config.context.top_k, 5);
        assert_eq!(config.router.timeout_ms, 2000);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = NorthstarConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.port, 3040);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nport = ");
        assert!(NorthstarConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = create_temp_config("[synthesis]\nretry_count = 3\n");
        let err = NorthstarConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("retry_count"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = NorthstarConfig::default();
        config.context.history_turns = 2;
        config.save(&path).unwrap();

        let reloaded = NorthstarConfig::load(&path).unwrap();
        assert_eq!(reloaded.context.history_turns, 2);
    }

    // ---- validate ----

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = NorthstarConfig::default();
        config.context.relevance_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = NorthstarConfig::default();
        config.retrieval.call_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retrieval.call_timeout_ms"));
    }

    #[test]
    fn test_validate_budget_below_query_ceiling() {
        let mut config = NorthstarConfig::default();
        config.context.max_chars = MAX_QUERY_CHARS - 1;
        assert!(config.validate().is_err());
        config.context.max_chars = MAX_QUERY_CHARS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_top_k() {
        let mut config = NorthstarConfig::default();
        config.context.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_count_zero_allowed() {
        let mut config = NorthstarConfig::default();
        config.synthesis.retry_count = 0;
        assert!(config.validate().is_ok());
    }
}
