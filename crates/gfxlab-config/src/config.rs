//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "gfxlab";
const CONFIG_FILE: &str = "config.ron";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window settings.
    pub window: WindowConfig,
    /// Rendering settings.
    pub render: RenderConfig,
    /// State-callback library binding.
    pub callbacks: CallbackConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width in pixels.
    pub width: u32,
    /// Window height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
}

/// Rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// RGBA clear color used by passes that clear a color channel.
    pub clear_color: [f32; 4],
    /// Pipeline description file (RON). `None` renders nothing.
    pub pipeline: Option<PathBuf>,
    /// Directory shader file names are resolved against.
    pub shader_dir: PathBuf,
    /// Directory image texture names are resolved against.
    pub texture_dir: PathBuf,
}

/// Which state-callback library to bind and which symbols to pull from it.
///
/// Each list is resolved in order; a name the library does not export is
/// skipped and leaves nothing bound for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CallbackConfig {
    /// Name of the callback library, `None` binds no callbacks.
    pub library: Option<String>,
    /// Symbols invoked once before the first frame.
    pub global_state_cbs: Vec<String>,
    /// Symbols invoked once per frame.
    pub per_frame_cbs: Vec<String>,
    /// Symbols invoked once per program draw group.
    pub per_program_cbs: Vec<String>,
    /// Symbols invoked once per geometry.
    pub per_geom_cbs: Vec<String>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "gfxlab_render=trace").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "gfxlab".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pipeline: None,
            shader_dir: PathBuf::from("shaders"),
            texture_dir: PathBuf::from("textures"),
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            library: None,
            global_state_cbs: vec!["set_global_states".to_string()],
            per_frame_cbs: vec!["set_per_frame_states".to_string()],
            per_program_cbs: vec!["set_per_program_states".to_string()],
            per_geom_cbs: vec!["set_per_geometry_states".to_string()],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform configuration directory for gfxlab (`<config_dir>/gfxlab`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Pipeline file path, resolved against `config_dir` when relative.
    pub fn pipeline_path(&self, config_dir: &Path) -> Option<PathBuf> {
        self.render.pipeline.as_ref().map(|path| {
            if path.is_relative() {
                config_dir.join(path)
            } else {
                path.clone()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("width: 800"));
        assert!(ron_str.contains("set_per_frame_states"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.callbacks.library = Some("lighting".to_string());
        config.render.pipeline = Some(PathBuf::from("deferred.ron"));
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(window: (width: 1024), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.callbacks, CallbackConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_default_callback_symbols() {
        let callbacks = CallbackConfig::default();
        assert!(callbacks.library.is_none());
        assert_eq!(callbacks.global_state_cbs, vec!["set_global_states"]);
        assert_eq!(callbacks.per_geom_cbs, vec!["set_per_geometry_states"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.window.width = 1920;
        config.window.height = 1080;
        config.callbacks.library = Some("nolight".to_string());

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.debug.log_level = "debug".to_string();
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().debug.log_level, "debug");
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_path_relative_to_config_dir() {
        let mut config = Config::default();
        assert!(config.pipeline_path(Path::new("/etc/gfxlab")).is_none());

        config.render.pipeline = Some(PathBuf::from("passes.ron"));
        assert_eq!(
            config.pipeline_path(Path::new("/etc/gfxlab")),
            Some(PathBuf::from("/etc/gfxlab/passes.ron"))
        );
    }
}
