use serde::Deserialize;

/// Main configuration for the catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Image storage configuration
    #[serde(default)]
    pub images: ImageConfig,
    /// Stream buffering configuration
    #[serde(default)]
    pub streams: StreamConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format ("pretty" or "json")
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Prometheus metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Image storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Directory uploaded images are written to
    #[serde(default = "default_image_dir")]
    pub dir: String,
    /// Maximum accumulated upload size in bytes (1 MiB default)
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

/// Buffer sizes for the streamed operations
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Search match channel capacity
    #[serde(default = "default_search_buffer")]
    pub search_buffer: usize,
    /// Rating response channel capacity
    #[serde(default = "default_rating_buffer")]
    pub rating_buffer: usize,
}

// Default value functions
fn default_service_name() -> String {
    "catalog-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_image_dir() -> String {
    "images".to_string()
}

fn default_max_image_bytes() -> usize {
    1 << 20 // 1 MiB
}

fn default_search_buffer() -> usize {
    16
}

fn default_rating_buffer() -> usize {
    16
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/catalog").required(false))
            .add_source(config::File::with_name("/etc/catalog/catalog").required(false))
            // Override with environment variables
            // CATALOG__SERVER__PORT -> server.port
            .add_source(
                config::Environment::with_prefix("CATALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            dir: default_image_dir(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            search_buffer: default_search_buffer(),
            rating_buffer: default_rating_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_max_image_bytes(), 1048576);
        assert_eq!(default_port(), 8080);
        assert_eq!(default_search_buffer(), 16);
    }

    #[test]
    fn test_empty_config_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.service.name, "catalog-service");
        assert_eq!(config.images.max_image_bytes, 1 << 20);
        assert!(config.server.cors_enabled);
    }
}
