//! fuzzlog-core: data model, configuration and string utilities shared by
//! the fuzz-log parsers and the reproduction generator.
//!
//! Nothing in this crate knows the grammar of a particular fuzzer's output.
//! It defines what a parsed run looks like ([`model::FuzzingResults`]), how
//! generation is configured ([`config::GeneratorConfig`]), and the pure
//! string transforms (address checksums, duration formatting, bracket
//! balancing) that both the parsers and report layers rely on.

pub mod address;
pub mod config;
pub mod duration;
pub mod error;
pub mod model;
pub mod text;

pub use config::{GeneratorConfig, VmOptions};
pub use error::FuzzlogError;
pub use model::{
    process_trace_logs, property_key, BrokenProperty, Fuzzer, FuzzingResults,
    PropertyAndSequence, Sequence, END_TRACE,
};
