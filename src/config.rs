//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Upper bound on a single AI capability call.
    pub extraction_timeout: Duration,
    /// Upper bound on a single task-creation call.
    pub task_bridge_timeout: Duration,
    /// Normalized-text prefix length fed into the fingerprint hash.
    pub fingerprint_prefix_chars: usize,
    /// Per-message body truncation when building extraction prompts.
    pub max_message_chars: usize,
    /// How often the binary sweeps for threads whose extraction failed.
    pub retry_interval: Duration,
    /// Maximum threads reprocessed per sweep.
    pub retry_batch_size: usize,
    /// Ranking weights.
    pub ranking: RankingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/comm-intel.db"),
            extraction_timeout: Duration::from_secs(30),
            task_bridge_timeout: Duration::from_secs(30),
            fingerprint_prefix_chars: 64,
            max_message_chars: 2000,
            retry_interval: Duration::from_secs(300), // 5 minutes
            retry_batch_size: 25,
            ranking: RankingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build a config from `COMM_INTEL_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("COMM_INTEL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let extraction_timeout = env_parse("COMM_INTEL_EXTRACTION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.extraction_timeout);

        let task_bridge_timeout = env_parse("COMM_INTEL_TASK_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.task_bridge_timeout);

        let fingerprint_prefix_chars = env_parse("COMM_INTEL_FINGERPRINT_PREFIX")?
            .unwrap_or(defaults.fingerprint_prefix_chars);
        if fingerprint_prefix_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "COMM_INTEL_FINGERPRINT_PREFIX".into(),
                message: "must be greater than zero".into(),
            });
        }

        let max_message_chars =
            env_parse("COMM_INTEL_MAX_MESSAGE_CHARS")?.unwrap_or(defaults.max_message_chars);

        let retry_interval = env_parse("COMM_INTEL_RETRY_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry_interval);

        let retry_batch_size =
            env_parse("COMM_INTEL_RETRY_BATCH")?.unwrap_or(defaults.retry_batch_size);

        Ok(Self {
            db_path,
            extraction_timeout,
            task_bridge_timeout,
            fingerprint_prefix_chars,
            max_message_chars,
            retry_interval,
            retry_batch_size,
            ranking: defaults.ranking,
        })
    }
}

/// Weights used by the confidence policy.
#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Multiplier applied to the confidence weight (High=3, Medium=2, Low=1).
    pub confidence_scale: f64,
    pub deadline_weight: f64,
    pub commitment_weight: f64,
    pub action_item_weight: f64,
    /// Score added per day of item age.
    pub age_weight_per_day: f64,
    /// Ceiling on the age contribution.
    pub age_cap: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            confidence_scale: 10.0,
            deadline_weight: 3.0,
            commitment_weight: 2.0,
            action_item_weight: 1.0,
            age_weight_per_day: 0.5,
            age_cap: 5.0,
        }
    }
}

/// Read and parse an optional environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
