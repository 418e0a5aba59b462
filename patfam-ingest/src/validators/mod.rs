//! Read-side validation of the assembled corpus

pub mod coverage_reporter;

pub use coverage_reporter::{
    load_canonical, parse_canonical, CanonicalReferenceEntry, CoverageReport, CoverageReporter,
    FoundEntry,
};
