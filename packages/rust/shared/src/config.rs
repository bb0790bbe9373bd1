//! Application configuration for folio.
//!
//! User config lives at `~/.folio/folio.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FolioError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "folio.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".folio";

// ---------------------------------------------------------------------------
// Config structs (matching folio.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chapter extraction settings.
    #[serde(default)]
    pub extract: ExtractConfig,
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Remove image references from chapter markdown.
    #[serde(default = "default_true")]
    pub strip_images: bool,

    /// Replace links into the book itself with their label text.
    #[serde(default = "default_true")]
    pub strip_internal_links: bool,

    /// Drop front/back matter, licenses, and note sections.
    #[serde(default = "default_true")]
    pub filter_boilerplate: bool,

    /// Chapters above this word count are split.
    #[serde(default = "default_max_chapter_words")]
    pub max_chapter_words: usize,

    /// Split segments below this word count are merged into a neighbour.
    #[serde(default = "default_min_section_words")]
    pub min_section_words: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            strip_images: true,
            strip_internal_links: true,
            filter_boilerplate: true,
            max_chapter_words: default_max_chapter_words(),
            min_section_words: default_min_section_words(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_chapter_words() -> usize {
    8000
}
fn default_min_section_words() -> usize {
    300
}

// ---------------------------------------------------------------------------
// Extract options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime extraction options — merged from config file + CLI flags.
///
/// Built once per run and passed by reference to every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Remove image markdown/HTML and orphaned link-reference definitions.
    pub strip_images: bool,
    /// Collapse non-http links to their label text.
    pub strip_internal_links: bool,
    /// Apply the boilerplate classifier before and after splitting.
    pub filter_boilerplate: bool,
    /// Word budget above which a chapter is split.
    pub max_chapter_words: usize,
    /// Segments below this size are merged into their neighbours.
    pub min_section_words: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ExtractOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            strip_images: config.extract.strip_images,
            strip_internal_links: config.extract.strip_internal_links,
            filter_boilerplate: config.extract.filter_boilerplate,
            max_chapter_words: config.extract.max_chapter_words,
            min_section_words: config.extract.min_section_words,
        }
    }
}

impl ExtractOptions {
    /// Check that the word budgets are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_chapter_words == 0 {
            return Err(FolioError::config("max_chapter_words must be positive"));
        }
        if self.min_section_words == 0 {
            return Err(FolioError::config("min_section_words must be positive"));
        }
        if self.min_section_words > self.max_chapter_words {
            return Err(FolioError::config(format!(
                "min_section_words ({}) exceeds max_chapter_words ({})",
                self.min_section_words, self.max_chapter_words
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.folio/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FolioError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.folio/folio.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FolioError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FolioError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FolioError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| FolioError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FolioError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
