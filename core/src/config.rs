use std::path::PathBuf;
use serde_derive::{Deserialize, Serialize};

const APP_NAME: &str = "swarmcore";
const DEFAULT_BLOCK_SIZE: usize = 0x4000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Malformed(#[from] serde_json::Error),

}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cache_path: PathBuf,
    pub log_path: PathBuf,
    pub default_block_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: cache_dir().join("progress.json"),
            log_path: config_dir().join("swarmcore.log"),
            default_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Config {

    // Resolves the config file under the OS config directory; writes
    // `Config::default()` there on first run, otherwise loads and returns
    // what's on disk as-is. Never errors on a missing OS directory: falls
    // back to the system temp directory instead.
    pub fn load() -> Result<Self> {
        let path = config_dir().join("config.json");

        if !path.exists() {
            let default = Self::default();
            default.write(&path)?;
            return Ok(default);
        }

        let raw = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    fn write(&self, path: &std::path::Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}
