// src/filesystem/mod.rs

//! Filesystem collaborators for the update core
//!
//! This module provides:
//! - Path sanitization for untrusted manifest paths
//! - The state directory layout (pending deltas, staged content, install root)
//! - Content identification of on-disk files
//! - Best-effort extended attribute propagation

mod identify;
mod layout;
pub mod path;
pub mod xattrs;

pub use identify::{ContentIdentifier, FileIdentifier, MetadataPolicy};
pub use layout::StateLayout;
