//! Halmos log grammar.
//!
//! Halmos prints the counterexample *before* the `[FAIL]` header that names
//! it, so the classifier feeds every line through a
//! [`scanner::CounterexampleScanner`] and records a broken property when a
//! header closes a captured block.
//!
//! Pass/fail counts come from tallying `[PASS]`, `[FAIL]` and `[TIMEOUT]`
//! lines; Halmos has no single authoritative summary across contracts.

mod scanner;

use std::sync::OnceLock;

use fuzzlog_core::duration::format_time_difference;
use fuzzlog_core::text::{cached_regex, strip_ansi};
use fuzzlog_core::{Fuzzer, FuzzingResults, FuzzlogError, PropertyAndSequence, END_TRACE};
use regex::Regex;

use crate::classifier::{push_unique, ToolParser};
use scanner::{scan_blocks, CounterexampleBlock, CounterexampleScanner};

const COUNTEREXAMPLE_MARKER: &str = "Counterexample:";

#[derive(Debug, Default)]
pub struct HalmosParser {
    scanner: CounterexampleScanner,
    elapsed_secs: f64,
}

impl HalmosParser {
    fn record_block(block: CounterexampleBlock, results: &mut FuzzingResults) {
        let Some(property) = block.property else {
            log::debug!("halmos: counterexample without a failing test header dropped");
            return;
        };
        if results.find_property(&property).is_some() {
            log::debug!("halmos: duplicate counterexample for {property} skipped");
            return;
        }
        results.append_to_property(&property, COUNTEREXAMPLE_MARKER);
        results.traces.push(COUNTEREXAMPLE_MARKER.to_string());
        for line in &block.lines {
            results.append_to_property(&property, line);
            results.traces.push(line.clone());
        }
        results.traces.push(END_TRACE.to_string());
        results.seal_property(&property);
    }

    fn apply_timing(&mut self, line: &str, results: &mut FuzzingResults) {
        static TIME: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(secs) = cached_regex(&TIME, r"time:\s*([\d.]+)s")
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        else {
            return;
        };
        self.elapsed_secs += secs;
        // Whole seconds only; fractional runs round down.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = self.elapsed_secs.floor() as u64;
        results.duration = format_time_difference(whole);
    }
}

impl ToolParser for HalmosParser {
    fn fuzzer(&self) -> Fuzzer {
        Fuzzer::Halmos
    }

    fn process_line(&mut self, line: &str, results: &mut FuzzingResults) {
        static RUNNING: OnceLock<Option<Regex>> = OnceLock::new();

        let line = strip_ansi(line);
        let trimmed = line.trim();

        if trimmed.contains("[PASS]") {
            results.passed += 1;
            results.results.push(trimmed.to_string());
        } else if trimmed.contains("[FAIL]") || trimmed.contains("[TIMEOUT]") {
            results.failed += 1;
            results.results.push(trimmed.to_string());
        } else if let Some(count) = cached_regex(&RUNNING, r"Running (\d+) tests")
            .and_then(|re| re.captures(trimmed))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        {
            results.number_of_tests += count;
        } else if trimmed.contains("Symbolic test result:") {
            self.apply_timing(trimmed, results);
        }

        if let Some(block) = self.scanner.feed(&line) {
            Self::record_block(block, results);
        }
    }

    fn finish(&mut self, results: &mut FuzzingResults) {
        if let Some(block) = self.scanner.finish() {
            Self::record_block(block, results);
        }
    }

    fn extract(&self, logs: &str) -> Result<Vec<PropertyAndSequence>, FuzzlogError> {
        let mut entries = Vec::new();
        for block in scan_blocks(logs) {
            if let Some(property) = block.property {
                push_unique(&mut entries, PropertyAndSequence::lines(property, block.lines));
            }
        }
        Ok(entries)
    }

    fn sequence_lines(&self, sequence: &str) -> Vec<String> {
        scan_blocks(sequence)
            .into_iter()
            .next()
            .map(|block| block.lines)
            .unwrap_or_default()
    }
}
