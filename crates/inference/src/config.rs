use common::{RetryPolicy, env_or, env_string_or};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Asset name of the garment model manifest.
    pub garment_model: String,
    /// Asset name of the feature extractor; `None` skips loading it.
    pub feature_model: Option<String>,
    pub feature_input_size: u32,
    /// Upper bound on how long callers queue behind model loading.
    pub ready_timeout: Duration,
    pub fetch_retry: RetryPolicy,
    /// Seed for the fallback classifier's weights.
    pub fallback_seed: u64,
}

impl ClassifierConfig {
    /// Load configuration from environment variables with sensible defaults.
    /// An empty `FEATURE_MODEL` disables the feature extractor.
    pub fn from_env() -> Self {
        let garment_model = env_string_or("GARMENT_MODEL", "garment/model.json");
        let feature_model = Some(env_string_or("FEATURE_MODEL", "features/model.json"))
            .filter(|name| !name.trim().is_empty());

        let fetch_retry = RetryPolicy::new(
            env_or("ASSET_FETCH_RETRIES", 3),
            Duration::from_millis(env_or("ASSET_FETCH_BASE_DELAY_MS", 50)),
        );

        Self {
            garment_model,
            feature_model,
            feature_input_size: env_or("FEATURE_INPUT_SIZE", 224),
            ready_timeout: Duration::from_millis(env_or("READY_TIMEOUT_MS", 30_000)),
            fetch_retry,
            fallback_seed: env_or("FALLBACK_SEED", 0x5eed),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            garment_model: "garment/model.json".to_string(),
            feature_model: None,
            feature_input_size: 224,
            ready_timeout: Duration::from_secs(30),
            fetch_retry: RetryPolicy::default(),
            fallback_seed: 0x5eed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn reads_overrides_from_env() {
        unsafe {
            env::set_var("GARMENT_MODEL", "g/model.json");
            env::set_var("FEATURE_MODEL", "");
            env::set_var("READY_TIMEOUT_MS", "250");
            env::set_var("ASSET_FETCH_RETRIES", "5");
        }

        let config = ClassifierConfig::from_env();
        assert_eq!(config.garment_model, "g/model.json");
        assert_eq!(config.feature_model, None);
        assert_eq!(config.ready_timeout, Duration::from_millis(250));
        assert_eq!(config.fetch_retry.max_attempts, 5);

        unsafe {
            env::remove_var("GARMENT_MODEL");
            env::remove_var("FEATURE_MODEL");
            env::remove_var("READY_TIMEOUT_MS");
            env::remove_var("ASSET_FETCH_RETRIES");
        }

        let config = ClassifierConfig::from_env();
        assert_eq!(config.feature_model.as_deref(), Some("features/model.json"));
        assert_eq!(config.feature_input_size, 224);
    }
}
