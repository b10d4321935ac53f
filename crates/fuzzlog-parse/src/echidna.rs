//! Echidna log grammar.
//!
//! ```text
//! [2024-05-01 10:00:41.17] [status] tests: 1/3, fuzzing: 50102/50000, cov: 1123, corpus: 9
//! check_balance(uint256): failed!💥
//!   Call sequence:
//!     CryticTester.deposit(100) from: 0x…10000 Time delay: 1 seconds Block delay: 2
//!     CryticTester.check_balance(7)
//!
//! Traces:
//! call CryticTester::check_balance(7) (src/Tester.sol:40)
//!
//! ```
//!
//! The `[status]` line is the source of the pass/fail counts. A trace runs
//! from `Call sequence` through the blank line that ends `Traces:`.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use fuzzlog_core::duration::{format_time_difference, parse_timestamp};
use fuzzlog_core::text::cached_regex;
use fuzzlog_core::{Fuzzer, FuzzingResults, FuzzlogError, PropertyAndSequence, END_TRACE};
use regex::Regex;

use crate::classifier::{mentions_no_transactions, push_unique, ToolParser};

const SEQUENCE_MARKER: &str = "Call sequence";
const TRACES_MARKER: &str = "Traces:";
const STATUS_MARKER: &str = "[status] tests:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum TraceState {
    #[default]
    Idle,
    Sequence,
    Traces,
}

#[derive(Debug, Default)]
pub struct EchidnaParser {
    state: TraceState,
    current_property: String,
    prev_line: String,
    trace_start: usize,
    awaiting_first_call: bool,
    first_timestamp: Option<NaiveDateTime>,
    last_timestamp: Option<NaiveDateTime>,
    progress: Option<String>,
}

impl EchidnaParser {
    fn begin_trace(&mut self, line: &str, results: &mut FuzzingResults) {
        self.current_property = failed_property(&self.prev_line).unwrap_or_default();
        self.state = TraceState::Sequence;
        self.trace_start = results.traces.len();
        self.awaiting_first_call = true;
        self.record(line, results);
    }

    fn trace_line(&mut self, line: &str, results: &mut FuzzingResults) {
        if self.awaiting_first_call {
            self.awaiting_first_call = false;
            if mentions_no_transactions(line) {
                self.discard_trace(results);
                return;
            }
        }
        match self.state {
            TraceState::Idle => {}
            TraceState::Sequence => {
                if line.contains(TRACES_MARKER) {
                    self.state = TraceState::Traces;
                }
                self.record(line, results);
            }
            TraceState::Traces => {
                if line.trim().is_empty() {
                    self.close_trace(results);
                } else {
                    self.record(line, results);
                }
            }
        }
    }

    fn record(&self, line: &str, results: &mut FuzzingResults) {
        results.traces.push(line.to_string());
        if !self.current_property.is_empty() {
            results.append_to_property(&self.current_property, line);
        }
    }

    fn close_trace(&mut self, results: &mut FuzzingResults) {
        if self.state == TraceState::Idle {
            return;
        }
        results.traces.push(END_TRACE.to_string());
        if !self.current_property.is_empty() {
            results.seal_property(&self.current_property);
        }
        self.state = TraceState::Idle;
        self.current_property.clear();
        self.awaiting_first_call = false;
    }

    fn discard_trace(&mut self, results: &mut FuzzingResults) {
        log::debug!(
            "echidna: empty call sequence for {:?}, property dropped",
            self.current_property
        );
        if !self.current_property.is_empty() {
            results.discard_property(&self.current_property);
        }
        results.traces.truncate(self.trace_start);
        self.state = TraceState::Idle;
        self.current_property.clear();
    }

    fn apply_status(&mut self, line: &str, results: &mut FuzzingResults) {
        static TESTS: OnceLock<Option<Regex>> = OnceLock::new();
        static COVERAGE: OnceLock<Option<Regex>> = OnceLock::new();
        static FUZZING: OnceLock<Option<Regex>> = OnceLock::new();

        if let Some(caps) =
            cached_regex(&TESTS, r"tests:\s*(\d+)/(\d+)").and_then(|re| re.captures(line))
        {
            let failed = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok());
            let total = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok());
            if let (Some(failed), Some(total)) = (failed, total) {
                results.failed = failed;
                results.number_of_tests = total;
                results.passed = total.saturating_sub(failed);
            }
        }
        if let Some(coverage) = cached_regex(&COVERAGE, r"cov:\s*(\d+)")
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            results.coverage = coverage;
        }
        if let Some(progress) = cached_regex(&FUZZING, r"fuzzing:\s*(\d+/\d+)")
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
        {
            self.progress = Some(progress.as_str().to_string());
        }
        self.refresh_duration(results);
    }

    fn refresh_duration(&self, results: &mut FuzzingResults) {
        if let (Some(first), Some(last)) = (self.first_timestamp, self.last_timestamp) {
            let elapsed = (last - first).num_seconds();
            if elapsed > 0 {
                results.duration = format_time_difference(elapsed.unsigned_abs());
                return;
            }
        }
        if let Some(progress) = &self.progress {
            results.duration = progress.clone();
        }
    }
}

impl ToolParser for EchidnaParser {
    fn fuzzer(&self) -> Fuzzer {
        Fuzzer::Echidna
    }

    fn process_line(&mut self, line: &str, results: &mut FuzzingResults) {
        if let Some(ts) = parse_timestamp(line) {
            self.first_timestamp.get_or_insert(ts);
            self.last_timestamp = Some(ts);
            // Worker output never belongs to a call sequence.
            self.close_trace(results);
        }
        let trimmed = line.trim();

        if is_result_line(trimmed) {
            self.close_trace(results);
            results.results.push(trimmed.to_string());
        } else if line.contains(STATUS_MARKER) {
            self.apply_status(line, results);
        } else if line.contains(SEQUENCE_MARKER) {
            self.close_trace(results);
            self.begin_trace(line, results);
        } else if self.state != TraceState::Idle {
            self.trace_line(line, results);
        }

        self.prev_line = trimmed.to_string();
    }

    fn finish(&mut self, results: &mut FuzzingResults) {
        self.close_trace(results);
        self.refresh_duration(results);
    }

    fn extract(&self, logs: &str) -> Result<Vec<PropertyAndSequence>, FuzzlogError> {
        let mut entries = Vec::new();
        for (idx, (header, body)) in call_blocks(logs).into_iter().enumerate() {
            let name = header.unwrap_or_else(|| format!("temp_{idx}"));
            push_unique(&mut entries, PropertyAndSequence::lines(name, body));
        }
        Ok(entries)
    }

    fn sequence_lines(&self, sequence: &str) -> Vec<String> {
        call_blocks(sequence)
            .into_iter()
            .next()
            .map(|(_, body)| body)
            .unwrap_or_default()
    }
}

fn is_result_line(line: &str) -> bool {
    line.contains(": passing") || line.contains(": failed!")
}

/// Property named by a `name: failed!` result line or a worker
/// `Test name falsified!` event.
fn failed_property(line: &str) -> Option<String> {
    static FALSIFIED: OnceLock<Option<Regex>> = OnceLock::new();

    if let Some((name, _)) = line.split_once(": failed!") {
        let name = name.trim();
        return (!name.is_empty()).then(|| name.to_string());
    }
    cached_regex(&FALSIFIED, r"\bTest (\S+) falsified!")
        .and_then(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `(failing property, call lines)` for every `Call sequence` block. Blocks
/// whose first line reports no transactions, and empty blocks, are skipped.
fn call_blocks(logs: &str) -> Vec<(Option<String>, Vec<String>)> {
    let lines: Vec<&str> = logs.lines().collect();
    let mut blocks = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        if !lines[idx].contains(SEQUENCE_MARKER) {
            idx += 1;
            continue;
        }
        let header = lines[..idx]
            .iter()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| failed_property(line));

        let mut body = Vec::new();
        let mut next = idx + 1;
        while let Some(line) = lines.get(next) {
            let trimmed = line.trim();
            if trimmed.is_empty()
                || trimmed.starts_with(TRACES_MARKER)
                || trimmed.contains(SEQUENCE_MARKER)
                || is_result_line(trimmed)
                || trimmed.contains(END_TRACE)
            {
                break;
            }
            body.push(trimmed.to_string());
            next += 1;
        }
        idx = next;

        if body.first().is_some_and(|first| mentions_no_transactions(first)) || body.is_empty() {
            continue;
        }
        blocks.push((header, body));
    }
    blocks
}
