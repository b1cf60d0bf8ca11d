//! Metadata provider seam, tag reading, and list artwork preparation.

pub mod art;
pub mod provider;
pub mod tags;

pub use provider::{MetadataProvider, TagMetadataProvider};
