use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/pollbot/config.toml";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub poll: Poll,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub command_prefix: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Poll {
    /// Role pinged when a time poll opens.  Falls back to a plain greeting if
    /// the invoking guild has no role with this name.
    pub target_role_name: String,
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(config)
    }
}
