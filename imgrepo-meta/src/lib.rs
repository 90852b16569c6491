//! imgrepo-meta: Metadata generator for qcow2 image repositories
//!
//! This crate provides:
//! - Streaming SHA-256/SHA-512 checksums of disk images
//! - Artifact descriptors and their on-disk sidecars
//! - lago `repo.metadata` and virt-builder `index` generation
//! - All-or-nothing output of both documents

pub mod artifact;
pub mod builder;
pub mod checksum;
pub mod error;
pub mod index;
pub mod output;
pub mod repo;

pub use artifact::{ArtifactDescriptor, ImageArtifact};
pub use builder::{MetadataBuilder, RepoConfig, RepoDocuments, INDEX_FILE, REPO_METADATA_FILE};
pub use checksum::{compute_checksums, Checksums};
pub use error::{Error, Result};
pub use index::{IndexDocument, IndexEntry};
pub use repo::RepoMetadata;
