//! Shared types, error model, and configuration for folio.
//!
//! This crate is the foundation depended on by all other folio crates.
//! It provides:
//! - [`FolioError`] — the unified error type, with a coarse [`ErrorCategory`]
//! - Domain types ([`BookMetadata`], [`ManifestItem`], [`TocEntry`], [`Chapter`], [`ExtractedBook`])
//! - Configuration ([`AppConfig`], [`ExtractOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExtractConfig, ExtractOptions, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{ErrorCategory, FolioError, Result};
pub use types::{
    BookMetadata, Chapter, ExtractedBook, ManifestItem, TocEntry, count_words, slugify,
};
