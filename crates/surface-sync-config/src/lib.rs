use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use surface_sync_engine::SurfaceConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid surface-sync config in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// `[surface]`: timing and the characters used for synthetic tree content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSection {
    pub poll_interval_ms: u64,
    pub slug_filler: char,
    pub leaf_placeholder: char,
}

impl Default for SurfaceSection {
    fn default() -> Self {
        let engine = SurfaceConfig::default();
        Self {
            poll_interval_ms: engine.poll_interval_ms,
            slug_filler: engine.slug_filler,
            leaf_placeholder: engine.leaf_placeholder,
        }
    }
}

/// `[[sequences]]`: a regex matched against the text before the caret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Opened when no document is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub sequences: Vec<SequenceConfig>,
}

impl Config {
    /// `Ok(None)` when there is no file at `path`
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;

        // $VARS and ~ in the document path; left as written if expansion fails
        if let Some(document) = config.document_path.take() {
            config.document_path = Some(Self::expand_path(&document).unwrap_or(document));
        }
        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    /// `~/.config/surface-sync/config.toml`
    pub fn config_path() -> PathBuf {
        let dir = shellexpand::tilde("~/.config/surface-sync");
        Path::new(&*dir).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        shellexpand::full(&path.to_string_lossy())
            .ok()
            .map(|expanded| PathBuf::from(expanded.into_owned()))
    }
}
