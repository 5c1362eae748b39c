//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use kvrt_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_path(dir.path().join("kvrt.sock"))
///     .max_message_bytes(512)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.daemon.socket_path = path.as_ref().to_string_lossy().into_owned();
        self
    }

    pub fn max_message_bytes(mut self, bytes: usize) -> Self {
        self.config.daemon.max_message_bytes = bytes;
        self
    }

    pub fn response_buffer_bytes(mut self, bytes: usize) -> Self {
        self.config.client.response_buffer_bytes = bytes;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    /// Render the configuration as TOML, for tests that go through a file.
    pub fn to_toml(&self) -> String {
        toml::to_string(&self.config).expect("AppConfig serializes to TOML")
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
