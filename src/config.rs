use thiserror::Error;

use crate::share::QrBounds;
use crate::tokens::issuer::MAX_TTL_DAYS;
use crate::tokens::TtlBounds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub links: LinkConfig,
    pub node: NodeConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    /// Holds the redb file and the `photos/` directory
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Origin that shared links point at, e.g. `https://punch.example.org`
    pub public_base_url: String,
    pub qr: QrBounds,
    pub ttl: TtlBounds,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub prune_interval_seconds: u64,
    /// Delete tokens this many days after they expire. `None` keeps them forever.
    pub retention_days: Option<u32>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            qr: QrBounds::default(),
            ttl: TtlBounds::default(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            prune_interval_seconds: 3600,
            retention_days: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let defaults = LinkConfig::default();
        let public_base_url =
            std::env::var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url);

        let ttl = TtlBounds {
            default_days: env_parse("LINK_DEFAULT_TTL_DAYS").unwrap_or(defaults.ttl.default_days),
            max_days: env_parse("LINK_MAX_TTL_DAYS").unwrap_or(defaults.ttl.max_days),
            min_days: env_parse("LINK_MIN_TTL_DAYS").unwrap_or(defaults.ttl.min_days),
        };

        let qr = QrBounds {
            default_px: env_parse("QR_DEFAULT_SIZE_PX").unwrap_or(defaults.qr.default_px),
            max_px: env_parse("QR_MAX_SIZE_PX").unwrap_or(defaults.qr.max_px),
            min_px: env_parse("QR_MIN_SIZE_PX").unwrap_or(defaults.qr.min_px),
        };

        let retention = RetentionConfig {
            prune_interval_seconds: env_parse("PRUNE_INTERVAL_SECONDS")
                .unwrap_or(RetentionConfig::default().prune_interval_seconds),
            retention_days: env_parse("LINK_RETENTION_DAYS"),
        };

        let config = Config {
            links: LinkConfig {
                public_base_url,
                qr,
                ttl,
            },
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            retention,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = &self.links.public_base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "PUBLIC_BASE_URL must be an http(s) origin, got {base:?}"
            )));
        }
        if base.contains('?') || base.contains('#') {
            return Err(ConfigError::ValidationError(
                "PUBLIC_BASE_URL must not carry a query or fragment".to_string(),
            ));
        }

        let ttl = &self.links.ttl;
        if ttl.min_days == 0 || ttl.min_days > ttl.max_days {
            return Err(ConfigError::ValidationError(format!(
                "link TTL bounds must satisfy 1 <= min <= max, got {}..={}",
                ttl.min_days, ttl.max_days
            )));
        }
        if ttl.max_days > MAX_TTL_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "LINK_MAX_TTL_DAYS must be at most {MAX_TTL_DAYS}, got {}",
                ttl.max_days
            )));
        }

        let qr = &self.links.qr;
        if qr.min_px == 0 || qr.min_px > qr.max_px {
            return Err(ConfigError::ValidationError(format!(
                "QR size bounds must satisfy 1 <= min <= max, got {}..={}",
                qr.min_px, qr.max_px
            )));
        }

        if self.retention.retention_days.is_some() && self.retention.prune_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "PRUNE_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }

        if !base.starts_with("https://") {
            tracing::warn!(
                public_base_url = %base,
                "Shared links are served over plain HTTP; the secret travels in the URL."
            );
        }

        Ok(())
    }

    /// Directory holding uploaded photo files
    pub fn photos_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.node.data_dir).join("photos")
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::test_config;

    #[test]
    fn test_default_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_base() {
        let mut config = test_config();
        config.links.public_base_url = "ftp://files".to_string();
        assert!(config.validate().is_err());

        config.links.public_base_url = "https://x.example/?a=1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut config = test_config();
        config.links.ttl.min_days = 400;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.links.qr.max_px = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unbounded_max_ttl() {
        let mut config = test_config();
        config.links.ttl.max_days = 100_000_000;
        assert!(config.validate().is_err());

        config.links.ttl.max_days = crate::tokens::issuer::MAX_TTL_DAYS;
        assert!(config.validate().is_ok());
    }
}
