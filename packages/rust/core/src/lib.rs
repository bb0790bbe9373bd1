//! Chapter extraction pipeline for folio.
//!
//! Ties together the EPUB reader, navigation resolution, Markdown rendering,
//! title resolution, boilerplate filtering, and chapter splitting into
//! [`extract_book`].

pub mod boilerplate;
pub mod pipeline;
pub mod split;
pub mod toc;

pub use pipeline::{
    Extractor, ProgressReporter, SilentProgress, extract_book, extract_book_from_reader,
};
