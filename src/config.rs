use crate::defaults;
use crate::demux::{DemuxConfig, SpeakerPolicy};
use crate::error::{ColloquyError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub demux: DemuxSettings,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Upstream generator (Messages API) configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_url: String,
    pub api_version: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

/// Demultiplexer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemuxSettings {
    pub same_speaker: SpeakerPolicy,
    pub max_speaker_id_len: usize,
}

/// Session server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub socket: Option<PathBuf>,
    pub transcript_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::API_URL.to_string(),
            api_version: defaults::API_VERSION.to_string(),
            model: defaults::MODEL.to_string(),
            max_tokens: defaults::MAX_TOKENS,
            timeout_secs: defaults::TIMEOUT_SECS,
            api_key_env: defaults::API_KEY_ENV.to_string(),
        }
    }
}

impl Default for DemuxSettings {
    fn default() -> Self {
        Self {
            same_speaker: SpeakerPolicy::Split,
            max_speaker_id_len: defaults::MAX_SPEAKER_ID_LEN,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl From<&DemuxSettings> for DemuxConfig {
    fn from(settings: &DemuxSettings) -> Self {
        DemuxConfig {
            same_speaker: settings.same_speaker,
            max_speaker_id_len: settings.max_speaker_id_len,
        }
    }
}

impl ServerConfig {
    /// Configured socket path, or the per-user default.
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(default_socket_path)
    }
}

/// Default socket path based on XDG_RUNTIME_DIR or a per-uid fallback in /tmp.
pub fn default_socket_path() -> PathBuf {
    if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR")
        && !xdg_runtime.is_empty()
    {
        PathBuf::from(xdg_runtime).join(defaults::SOCKET_NAME)
    } else {
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/colloquy-{}.sock", uid))
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ColloquyError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ColloquyError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ColloquyError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - COLLOQUY_MODEL → upstream.model
    /// - COLLOQUY_API_URL → upstream.api_url
    /// - COLLOQUY_SAME_SPEAKER → demux.same_speaker
    /// - COLLOQUY_LOG → logging.level
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("COLLOQUY_MODEL")
            && !model.is_empty()
        {
            self.upstream.model = model;
        }

        if let Ok(url) = std::env::var("COLLOQUY_API_URL")
            && !url.is_empty()
        {
            self.upstream.api_url = url;
        }

        if let Ok(policy) = std::env::var("COLLOQUY_SAME_SPEAKER")
            && !policy.is_empty()
        {
            match policy.parse() {
                Ok(policy) => self.demux.same_speaker = policy,
                Err(e) => tracing::warn!(error = %e, "Ignoring COLLOQUY_SAME_SPEAKER"),
            }
        }

        if let Ok(level) = std::env::var("COLLOQUY_LOG")
            && !level.is_empty()
        {
            self.logging.level = level;
        }

        self
    }

    /// Reject values that would make sessions impossible.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| {
            Err(ColloquyError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.upstream.max_tokens == 0 {
            return invalid("upstream.max_tokens", "must be greater than 0");
        }
        if self.upstream.timeout_secs == 0 {
            return invalid("upstream.timeout_secs", "must be greater than 0");
        }
        if self.upstream.api_url.trim().is_empty() {
            return invalid("upstream.api_url", "must not be empty");
        }
        if self.demux.max_speaker_id_len == 0 {
            return invalid("demux.max_speaker_id_len", "must be greater than 0");
        }
        Ok(())
    }

    /// The effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ColloquyError::ConfigParse {
            message: e.to_string(),
        })
    }

    pub fn demux_config(&self) -> DemuxConfig {
        DemuxConfig::from(&self.demux)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/colloquy/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("colloquy")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_colloquy_env() {
        remove_env("COLLOQUY_MODEL");
        remove_env("COLLOQUY_API_URL");
        remove_env("COLLOQUY_SAME_SPEAKER");
        remove_env("COLLOQUY_LOG");
    }

    fn write_temp(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.upstream.model, "claude-sonnet-4-5");
        assert_eq!(config.upstream.api_version, "2023-06-01");
        assert_eq!(config.upstream.max_tokens, 4096);
        assert_eq!(config.upstream.timeout_secs, 120);
        assert_eq!(config.upstream.api_key_env, "ANTHROPIC_API_KEY");

        assert_eq!(config.demux.same_speaker, SpeakerPolicy::Split);
        assert_eq!(config.demux.max_speaker_id_len, 64);

        assert_eq!(config.server.socket, None);
        assert_eq!(config.server.transcript_dir, None);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_temp(
            r#"
            [upstream]
            api_url = "http://localhost:8080/v1/messages"
            model = "claude-opus-4-1"
            max_tokens = 2048
            timeout_secs = 30
            api_key_env = "MY_KEY"

            [demux]
            same_speaker = "merge"
            max_speaker_id_len = 32

            [server]
            socket = "/run/user/1000/debates.sock"
            transcript_dir = "/var/lib/colloquy"

            [logging]
            level = "debug"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.upstream.api_url, "http://localhost:8080/v1/messages");
        assert_eq!(config.upstream.model, "claude-opus-4-1");
        assert_eq!(config.upstream.max_tokens, 2048);
        assert_eq!(config.upstream.timeout_secs, 30);
        assert_eq!(config.upstream.api_key_env, "MY_KEY");
        assert_eq!(config.demux.same_speaker, SpeakerPolicy::Merge);
        assert_eq!(config.demux.max_speaker_id_len, 32);
        assert_eq!(
            config.server.socket_path(),
            PathBuf::from("/run/user/1000/debates.sock")
        );
        assert_eq!(
            config.server.transcript_dir,
            Some(PathBuf::from("/var/lib/colloquy"))
        );
        assert_eq!(config.logging.level, "debug");

        let demux = config.demux_config();
        assert_eq!(demux.same_speaker, SpeakerPolicy::Merge);
        assert_eq!(demux.max_speaker_id_len, 32);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let temp_file = write_temp(
            r#"
            [upstream]
            model = "claude-haiku-4-5"
        "#,
        );

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.upstream.model, "claude-haiku-4-5");
        assert_eq!(config.upstream.max_tokens, 4096);
        assert_eq!(config.demux, DemuxSettings::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let temp_file = write_temp("[demux]\nsame_speaker = \"join\"\n");
        assert!(matches!(
            Config::load(temp_file.path()),
            Err(ColloquyError::Config(_))
        ));
    }

    #[test]
    fn test_env_override_model_and_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_colloquy_env();

        set_env("COLLOQUY_MODEL", "claude-haiku-4-5");
        set_env("COLLOQUY_API_URL", "http://127.0.0.1:9/v1/messages");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.upstream.model, "claude-haiku-4-5");
        assert_eq!(config.upstream.api_url, "http://127.0.0.1:9/v1/messages");
        assert_eq!(config.logging.level, "info"); // Not overridden

        clear_colloquy_env();
    }

    #[test]
    fn test_env_override_policy_and_log() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_colloquy_env();

        set_env("COLLOQUY_SAME_SPEAKER", "merge");
        set_env("COLLOQUY_LOG", "trace");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.demux.same_speaker, SpeakerPolicy::Merge);
        assert_eq!(config.logging.level, "trace");

        clear_colloquy_env();
    }

    #[test]
    fn test_env_override_invalid_policy_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_colloquy_env();

        set_env("COLLOQUY_SAME_SPEAKER", "sometimes");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.demux.same_speaker, SpeakerPolicy::Split);

        clear_colloquy_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_colloquy_env();

        set_env("COLLOQUY_MODEL", "");
        let config = Config::default().with_env_overrides();

        // Empty string should not override default
        assert_eq!(config.upstream.model, "claude-sonnet-4-5");

        clear_colloquy_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_temp(
            r#"
            [upstream
            model = "broken
        "#,
        );

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(ColloquyError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.upstream.max_tokens = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("upstream.max_tokens"));

        let mut config = Config::default();
        config.demux.max_speaker_id_len = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upstream.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_roundtrips() {
        let mut config = Config::default();
        config.demux.same_speaker = SpeakerPolicy::Merge;
        config.server.transcript_dir = Some(PathBuf::from("/tmp/transcripts"));

        let dumped = config.to_toml().unwrap();
        assert!(dumped.contains("same_speaker = \"merge\""));
        let parsed: Config = toml::from_str(&dumped).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("colloquy"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_colloquy_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_missing_file_is_not_found_error() {
        let missing_path = Path::new("/tmp/nonexistent_colloquy_config_12345.toml");
        assert!(matches!(
            Config::load(missing_path),
            Err(ColloquyError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let temp_file = write_temp("[upstream\nmodel = \"broken\n");
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_socket_path_returns_valid_path() {
        let path = default_socket_path();
        let path_str = path.to_string_lossy();
        match std::env::var("XDG_RUNTIME_DIR") {
            Ok(dir) if !dir.is_empty() => assert!(path_str.ends_with("colloquy.sock")),
            _ => {
                let uid = unsafe { libc::getuid() };
                assert_eq!(path_str, format!("/tmp/colloquy-{}.sock", uid));
            }
        }
    }
}
