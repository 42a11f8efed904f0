use common::{Environment, env_or, env_string_or};
use inference::ClassifierConfig;
use preprocess::SamplerConfig;
use schema::DominantColor;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: Environment,
    /// Base directory model asset names are resolved against.
    pub model_dir: PathBuf,
    pub classifier: ClassifierConfig,
    pub max_concurrency: usize,
    pub sampler: SamplerConfig,
    pub placeholder_color: DominantColor,
    pub output_dir: PathBuf,
    pub otel_endpoint: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let environment = Environment::from_env();

        let placeholder_color = env_string_or("PLACEHOLDER_COLOR", "#808080")
            .parse()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid PLACEHOLDER_COLOR, using #808080");
                DominantColor::PLACEHOLDER
            });

        let sampler = SamplerConfig {
            sample_stride: env_or("COLOR_SAMPLE_STRIDE", 10usize).max(1),
            ..SamplerConfig::default()
        };

        let otel_endpoint = std::env::var("OTEL_ENDPOINT")
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty());

        Self {
            environment,
            model_dir: PathBuf::from(env_string_or("MODEL_DIR", "./models")),
            classifier: ClassifierConfig::from_env(),
            max_concurrency: env_or("MAX_CONCURRENCY", 4usize).max(1),
            sampler,
            placeholder_color,
            output_dir: PathBuf::from(env_string_or("OUTPUT_DIR", "./wardrobe")),
            otel_endpoint,
        }
    }

    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            model_dir: PathBuf::from("./models"),
            classifier: ClassifierConfig::default(),
            max_concurrency: 4,
            sampler: SamplerConfig::default(),
            placeholder_color: DominantColor::PLACEHOLDER,
            output_dir: PathBuf::from("./wardrobe"),
            otel_endpoint: None,
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
    fn from_env_reads_overrides() {
        unsafe {
            env::set_var("MAX_CONCURRENCY", "0");
            env::set_var("PLACEHOLDER_COLOR", "#112233");
            env::set_var("COLOR_SAMPLE_STRIDE", "3");
            env::set_var("OTEL_ENDPOINT", "");
        }

        let config = PipelineConfig::from_env();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.placeholder_color, DominantColor::new(0x11, 0x22, 0x33));
        assert_eq!(config.sampler.sample_stride, 3);
        assert_eq!(config.otel_endpoint, None);

        unsafe {
            env::set_var("PLACEHOLDER_COLOR", "grey");
        }
        assert_eq!(
            PipelineConfig::from_env().placeholder_color,
            DominantColor::PLACEHOLDER
        );

        unsafe {
            env::remove_var("MAX_CONCURRENCY");
            env::remove_var("PLACEHOLDER_COLOR");
            env::remove_var("COLOR_SAMPLE_STRIDE");
            env::remove_var("OTEL_ENDPOINT");
        }
        assert_eq!(PipelineConfig::from_env().max_concurrency, 4);
    }
}
