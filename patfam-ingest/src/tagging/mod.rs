//! Rule-based component tagging against the configured taxonomy

pub mod component_tagger;

pub use component_tagger::ComponentTagger;
