// src/delta/mod.rs

//! Delta application against installed content
//!
//! Pending deltas are matched to installed files purely by content hash,
//! applied, verified, and published into the content-addressed staging
//! area. Nothing here touches the live install.
//!
//! # Architecture
//!
//! - **DeltaNameCodec**: decodes `SRC-TGT` artifact names
//! - **SourceResolver**: finds an installed file whose content verifies
//! - **DeltaPatchEngine**: patches, verifies and stages one delta
//! - **DeltaProcessor**: sweeps the delta directory, always deleting artifacts
//!
//! # Delta Format
//!
//! The default [`PatchApplier`] reads deltas created with zstd using the
//! old file as a dictionary:
//! ```text
//! delta = zstd_compress(new_content, dictionary=old_content)
//! ```

mod applier;
mod name;
mod processor;
mod resolver;

pub use applier::{DeltaPatchEngine, PatchApplier, ZstdDictPatcher};
pub use name::{DeltaName, DeltaNameCodec};
pub use processor::{ArtifactOutcome, DeltaProcessor, SweepReport};
pub use resolver::SourceResolver;
