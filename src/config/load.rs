use std::{env, path::PathBuf};

use super::schema::Settings;

/// Configuration loading helpers.
///
/// `Settings::load` tries environment variables first (prefix `SDMUSIC__`), then an
/// optional config file and falls back to struct defaults.
impl Settings {
    /// Load settings from environment and optional config file.
    ///
    /// Values that fail [`validate`](Self::validate) are reported as
    /// `ConfigError::Message`.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("SDMUSIC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        settings.validate().map_err(::config::ConfigError::Message)?;
        Ok(settings)
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        let d = &self.decode;
        if d.wav_block_samples == 0 {
            return Err("decode.wav_block_samples must be >= 1".to_string());
        }
        if d.stream_output_samples == 0 {
            return Err("decode.stream_output_samples must be >= 1".to_string());
        }
        if d.mp3_input_buffer == 0 {
            return Err("decode.mp3_input_buffer must be >= 1".to_string());
        }
        if d.mp3_refill_threshold >= d.mp3_input_buffer {
            return Err("decode.mp3_refill_threshold must be < decode.mp3_input_buffer".to_string());
        }
        if self.playback.history_capacity == 0 {
            return Err("playback.history_capacity must be >= 1".to_string());
        }
        if self.library.cache_file_name.trim().is_empty() {
            return Err("library.cache_file_name must not be empty".to_string());
        }
        Ok(())
    }
}

/// Resolve the config path from `SDMUSIC_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("SDMUSIC_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/sdmusic/config.toml`
/// or `~/.config/sdmusic/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|d| d.join("sdmusic").join("config.toml"))
}
