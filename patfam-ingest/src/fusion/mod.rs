// Fusion - family resolution and field merging
//
// Normalized records → FamilyResolver (grouping) → MergeEngine (one canonical
// record per family). Both passes are synchronous and run only after every
// provider has finished.

pub mod family_resolver;
pub mod merge_engine;

pub use family_resolver::{FamilyResolver, Resolution};
pub use merge_engine::MergeEngine;
