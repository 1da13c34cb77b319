use crate::types::Mode;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// URL or path of the COVID statistics document.
    pub covid: String,
    /// URL or path of the population table (JSON, or CSV by extension).
    pub population: String,
    /// URL or path of the country boundaries (GeoJSON, or a local .shp).
    pub boundaries: String,
    /// Feature property holding the country code. Defaults to the feature id.
    pub join_property: Option<String>,
    #[serde(default = "default_name_property")]
    pub name_property: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    /// Toggle cycle; the first entry is the initial mode.
    pub modes: Vec<Mode>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory served at `/` next to the API.
    pub static_dir: PathBuf,
}

fn default_name_property() -> String {
    "name".to_string()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { modes: vec![Mode::Covid, Mode::Population] }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output"), min_zoom: 0, max_zoom: 3 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000, static_dir: PathBuf::from(".") }
    }
}

impl OutputConfig {
    pub fn tile_dir(&self) -> PathBuf {
        self.dir.join("tiles")
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.display.modes.is_empty() {
            bail!("display.modes must name at least one mode");
        }
        if self.output.min_zoom > self.output.max_zoom {
            bail!(
                "output.min_zoom ({}) is greater than output.max_zoom ({})",
                self.output.min_zoom,
                self.output.max_zoom
            );
        }
        // 4^z tiles per level, rasterised point by point
        if self.output.max_zoom > 8 {
            bail!("output.max_zoom must be at most 8, got {}", self.output.max_zoom);
        }
        Ok(())
    }
}
