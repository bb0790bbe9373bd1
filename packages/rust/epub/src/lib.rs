//! EPUB container access: archive entries, the package manifest, and the
//! navigation sources that describe chapter order and titles.

pub mod archive;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;
pub mod navigation;
pub mod package;
mod xml;

pub use archive::{EpubArchive, normalize_href, resolve_path};
pub use navigation::{
    LegacyNcxSource, NavDocumentSource, NavigationRegistry, NavigationSource, ResolvedToc,
};
pub use package::{Package, parse_container, parse_package};
