//! Player configuration.
//!
//! A [`PlayerConfig`] can be built in code, through [`PlayerConfigBuilder`],
//! or loaded from TOML. Every field has a default, so a config file only
//! needs the keys it changes:
//!
//! ```toml
//! progress_interval_ms = 500
//! default_aspect_mode = "aspect_fill"
//!
//! [request_headers]
//! Authorization = "Bearer abc123"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crossplay_core::SerialQueueConfig;

use crate::backend::RequestHeaders;
use crate::error::{MediaError, Result};
use crate::surface::AspectMode;

/// Configuration for a [`VideoPlayer`](crate::VideoPlayer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Interval between progress notifications, in milliseconds.
    pub progress_interval_ms: u64,
    /// Name of the thread that serializes player operations.
    pub dispatch_thread_name: String,
    /// Name of the thread that composes timelines.
    pub compose_thread_name: String,
    /// Aspect mode a new player starts with.
    pub default_aspect_mode: AspectMode,
    /// Headers sent with every asset request.
    pub request_headers: RequestHeaders,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 250,
            dispatch_thread_name: "crossplay-dispatch".to_string(),
            compose_thread_name: "crossplay-compose".to_string(),
            default_aspect_mode: AspectMode::AspectFit,
            request_headers: RequestHeaders::new(),
        }
    }
}

impl PlayerConfig {
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::new()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MediaError::Config(format!("read config {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| MediaError::Config(e.to_string()))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub(crate) fn dispatch_queue(&self) -> SerialQueueConfig {
        SerialQueueConfig::with_name(self.dispatch_thread_name.clone())
    }

    pub(crate) fn compose_queue(&self) -> SerialQueueConfig {
        SerialQueueConfig::with_name(self.compose_thread_name.clone())
    }

    fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            return Err(MediaError::Config(
                "progress_interval_ms must be greater than zero".into(),
            ));
        }
        if self.dispatch_thread_name.trim().is_empty() || self.compose_thread_name.trim().is_empty() {
            return Err(MediaError::Config("thread names must not be empty".into()));
        }
        Ok(())
    }
}

/// Builder for [`PlayerConfig`].
#[derive(Debug, Default)]
pub struct PlayerConfigBuilder {
    config: PlayerConfig,
}

impl PlayerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interval between progress notifications. Rounded to whole
    /// milliseconds, never below one.
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval_ms = (interval.as_millis() as u64).max(1);
        self
    }

    pub fn dispatch_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.dispatch_thread_name = name.into();
        self
    }

    pub fn compose_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.compose_thread_name = name.into();
        self
    }

    pub fn default_aspect_mode(mut self, mode: AspectMode) -> Self {
        self.config.default_aspect_mode = mode;
        self
    }

    /// Add one request header.
    pub fn request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.request_headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> PlayerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.progress_interval(), Duration::from_millis(250));
        assert_eq!(config.default_aspect_mode, AspectMode::AspectFit);
        assert!(config.request_headers.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PlayerConfig::from_toml_str(
            r#"
            progress_interval_ms = 500
            default_aspect_mode = "aspect_fill"

            [request_headers]
            Authorization = "Bearer abc123"
            "#,
        )
        .unwrap();

        assert_eq!(config.progress_interval_ms, 500);
        assert_eq!(config.default_aspect_mode, AspectMode::AspectFill);
        assert_eq!(
            config.request_headers.get("Authorization").map(String::as_str),
            Some("Bearer abc123")
        );
        assert_eq!(config.dispatch_thread_name, "crossplay-dispatch");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            PlayerConfig::from_toml_str("progress_interval_ms = \"fast\""),
            Err(MediaError::Config(_))
        ));
        assert!(matches!(
            PlayerConfig::from_toml_str("progress_interval_ms = 0"),
            Err(MediaError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "compose_thread_name = \"my-composer\"").unwrap();

        let config = PlayerConfig::load(file.path()).unwrap();
        assert_eq!(config.compose_thread_name, "my-composer");
        assert_eq!(config.compose_queue().name, "my-composer");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlayerConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, MediaError::Config(msg) if msg.contains("absent.toml")));
    }

    #[test]
    fn test_builder_and_round_trip() {
        let config = PlayerConfig::builder()
            .progress_interval(Duration::from_micros(10))
            .default_aspect_mode(AspectMode::None)
            .request_header("X-Client", "crossplay")
            .build();
        assert_eq!(config.progress_interval_ms, 1);

        let text = config.to_toml_string().unwrap();
        assert_eq!(PlayerConfig::from_toml_str(&text).unwrap(), config);
    }
}
