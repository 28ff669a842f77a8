use std::fs;
use std::path::{Path, PathBuf};

use harvest_core::config::CrawlSettings;
use thiserror::Error;

/// Error type for settings operations
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Invalid settings: {0}")]
    Invalid(#[from] harvest_core::error::Error),
}

/// Result type for settings operations
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Settings file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
    /// YAML format, with the `yaml` feature
    Yaml,
}

impl SettingsFormat {
    /// Detect the format from a file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            match ext.as_str() {
                "toml" => Some(Self::Toml),
                "json" => Some(Self::Json),
                "yaml" | "yml" => Some(Self::Yaml),
                _ => None,
            }
        })
    }
}

/// Crawl settings loaded from a file.
///
/// Keys missing from the file keep their defaults. The loaded settings are
/// validated before they are handed out.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// The crawl settings
    pub crawl: CrawlSettings,

    /// Path to the settings file, if loaded from a file
    pub file_path: Option<PathBuf>,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = SettingsFormat::from_path(path)
            .ok_or_else(|| SettingsError::UnknownFormat(path.to_string_lossy().to_string()))?;

        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings = Self::parse(&contents, format)?;
        settings.file_path = Some(path.to_path_buf());
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse settings in the given format
    pub fn parse(contents: &str, format: SettingsFormat) -> Result<Self> {
        match format {
            SettingsFormat::Toml => Self::from_toml(contents),
            SettingsFormat::Json => Self::from_json(contents),
            SettingsFormat::Yaml => Self::from_yaml(contents),
        }
    }

    /// Load settings from TOML
    pub fn from_toml(contents: &str) -> Result<Self> {
        let crawl: CrawlSettings =
            toml::from_str(contents).map_err(|e| SettingsError::TomlParse(e.to_string()))?;
        Self::checked(crawl)
    }

    /// Load settings from JSON
    pub fn from_json(contents: &str) -> Result<Self> {
        let crawl: CrawlSettings = serde_json::from_str(contents)?;
        Self::checked(crawl)
    }

    /// Load settings from YAML
    pub fn from_yaml(_contents: &str) -> Result<Self> {
        #[cfg(feature = "yaml")]
        {
            let crawl: CrawlSettings = serde_yaml::from_str(_contents)
                .map_err(|e| SettingsError::YamlParse(e.to_string()))?;
            Self::checked(crawl)
        }

        #[cfg(not(feature = "yaml"))]
        {
            Err(SettingsError::YamlParse(
                "YAML support not enabled".to_string(),
            ))
        }
    }

    fn checked(crawl: CrawlSettings) -> Result<Self> {
        crawl.validate()?;
        Ok(Self {
            crawl,
            file_path: None,
        })
    }

    /// Save settings to a file, in the format its extension names
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let format = SettingsFormat::from_path(path)
            .ok_or_else(|| SettingsError::UnknownFormat(path.to_string_lossy().to_string()))?;

        let contents = match format {
            SettingsFormat::Toml => toml::to_string_pretty(&self.crawl)
                .map_err(|e| SettingsError::TomlParse(e.to_string()))?,
            SettingsFormat::Json => serde_json::to_string_pretty(&self.crawl)?,
            SettingsFormat::Yaml => {
                #[cfg(feature = "yaml")]
                {
                    serde_yaml::to_string(&self.crawl)
                        .map_err(|e| SettingsError::YamlParse(e.to_string()))?
                }

                #[cfg(not(feature = "yaml"))]
                {
                    return Err(SettingsError::YamlParse(
                        "YAML support not enabled".to_string(),
                    ));
                }
            }
        };

        fs::write(path, contents).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The crawl settings
    pub fn into_crawl_settings(self) -> CrawlSettings {
        self.crawl
    }
}
