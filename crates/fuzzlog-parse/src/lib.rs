//! fuzzlog-parse: per-tool log classifiers and Solidity reproduction
//! generation for Echidna, Medusa and Halmos output.
//!
//! Two entry points cover most callers:
//!
//! - [`process_logs`] streams a log through the tool's classifier and
//!   returns the run's [`FuzzingResults`].
//! - [`logs_to_functions`] extracts every broken property from a full log
//!   and renders one Foundry test function per property.

pub mod arrays;
pub mod calls;
pub mod classifier;
pub mod codegen;
pub mod echidna;
pub mod halmos;
pub mod medusa;
pub mod params;

use fuzzlog_core::{
    BrokenProperty, Fuzzer, FuzzingResults, FuzzlogError, GeneratorConfig, PropertyAndSequence,
};

pub use classifier::{parser_for, process_logs, sequence_for_property, ToolParser};
pub use codegen::generate_test_function;

/// Batch extraction of every broken property in `logs`.
pub fn extract_sequences(
    logs: &str,
    fuzzer: Fuzzer,
) -> Result<Vec<PropertyAndSequence>, FuzzlogError> {
    parser_for(fuzzer).extract(logs)
}

/// Render every broken property in `logs` as a test function, separated by
/// blank lines.
pub fn logs_to_functions(
    logs: &str,
    fuzzer: Fuzzer,
    config: &GeneratorConfig,
) -> Result<String, FuzzlogError> {
    let entries = extract_sequences(logs, fuzzer)?;
    if entries.is_empty() {
        return Ok(format!("// No failed properties found in {fuzzer} logs"));
    }
    log::info!("{fuzzer}: generating {} reproduction(s)", entries.len());
    Ok(entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| generate_test_function(entry, &config.identifier, idx, config.vm))
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Render a single streamed broken property.
#[must_use]
pub fn broken_property_to_function(
    fuzzer: Fuzzer,
    property: &BrokenProperty,
    index: usize,
    config: &GeneratorConfig,
) -> String {
    let entry = sequence_for_property(fuzzer, property);
    generate_test_function(&entry, &config.identifier, index, config.vm)
}

/// Render every broken property of an already-processed run.
#[must_use]
pub fn results_to_functions(
    fuzzer: Fuzzer,
    results: &FuzzingResults,
    config: &GeneratorConfig,
) -> Vec<String> {
    results
        .broken_properties
        .iter()
        .enumerate()
        .map(|(idx, prop)| broken_property_to_function(fuzzer, prop, idx, config))
        .collect()
}
