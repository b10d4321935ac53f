//! Medusa log grammar.
//!
//! Summary lines (`fuzz: elapsed:`, `Test summary:`) are recognised
//! anywhere. Traces open at `Test for method "C.name(..)"` and close at the
//! assertion panic, at the blank line after a `[return (false)]`, or at the
//! property execution trace header.

use std::sync::OnceLock;

use fuzzlog_core::duration::capture_fuzzing_duration;
use fuzzlog_core::text::cached_regex;
use fuzzlog_core::{Fuzzer, FuzzingResults, FuzzlogError, PropertyAndSequence, END_TRACE};
use regex::Regex;

use crate::calls::parse_medusa_call;
use crate::classifier::{mentions_no_transactions, push_unique, ToolParser};

const ELAPSED_MARKER: &str = "fuzz: elapsed:";
const SUMMARY_MARKER: &str = "Test summary:";
const RESULTS_MARKER: &str = "Fuzzer stopped, test results follow below ...";
const TRACE_MARKER: &str = "Test for method";
const SEQUENCE_MARKER: &str = "[Call Sequence]";
const PASSED: &str = "[PASSED]";
const FAILED: &str = "[FAILED]";

#[derive(Debug, Default)]
pub struct MedusaParser {
    in_trace: bool,
    results_follow: bool,
    return_false: bool,
    after_sequence_marker: bool,
    current_property: String,
    trace_start: usize,
}

impl MedusaParser {
    fn begin_trace(&mut self, results: &FuzzingResults) {
        self.in_trace = true;
        self.return_false = false;
        self.after_sequence_marker = false;
        self.current_property.clear();
        self.trace_start = results.traces.len();
    }

    fn trace_line(&mut self, line: &str, results: &mut FuzzingResults) {
        if let Some(name) = method_name(line) {
            self.current_property = name;
        }

        if self.after_sequence_marker && mentions_no_transactions(line) {
            log::debug!(
                "medusa: empty call sequence for {:?}, property dropped",
                self.current_property
            );
            results.discard_property(&self.current_property);
            results.traces.truncate(self.trace_start);
            self.reset();
            return;
        }
        self.after_sequence_marker = line.contains(SEQUENCE_MARKER);

        results.traces.push(line.to_string());
        if !self.current_property.is_empty() {
            results.append_to_property(&self.current_property, line);
        }

        if line.contains("[return (false)]") {
            self.return_false = true;
        }

        if line.contains("panic: assertion failed") {
            results.traces.push(String::new());
            self.end_trace(results);
        } else if (self.return_false && line.trim().is_empty())
            || line.contains("Property Test Execution Trace")
        {
            self.end_trace(results);
        }
    }

    fn end_trace(&mut self, results: &mut FuzzingResults) {
        if !self.in_trace {
            return;
        }
        results.traces.push(END_TRACE.to_string());
        if !self.current_property.is_empty() {
            results.seal_property(&self.current_property);
            log::debug!("medusa: sealed trace for {}", self.current_property);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.in_trace = false;
        self.return_false = false;
        self.after_sequence_marker = false;
        self.current_property.clear();
    }
}

impl ToolParser for MedusaParser {
    fn fuzzer(&self) -> Fuzzer {
        Fuzzer::Medusa
    }

    fn process_line(&mut self, line: &str, results: &mut FuzzingResults) {
        if line.contains(ELAPSED_MARKER) {
            apply_elapsed(line, results);
        } else if line.contains(SUMMARY_MARKER) {
            apply_summary(line, results);
        } else if line.contains(RESULTS_MARKER) {
            self.results_follow = true;
        } else if line.contains(PASSED) || line.contains(FAILED) {
            if line.contains(FAILED) {
                self.end_trace(results);
            }
            if self.results_follow {
                results.push_unique_result(line.trim());
            }
        } else if line.contains(TRACE_MARKER) {
            self.end_trace(results);
            self.begin_trace(results);
            self.trace_line(line, results);
        } else if self.in_trace {
            self.trace_line(line, results);
        }
    }

    fn finish(&mut self, results: &mut FuzzingResults) {
        self.end_trace(results);
    }

    fn extract(&self, logs: &str) -> Result<Vec<PropertyAndSequence>, FuzzlogError> {
        let body = match logs.split_once(RESULTS_MARKER) {
            Some((_, after)) => after,
            None => logs,
        };
        let chunks: Vec<&str> = if body.contains(FAILED) {
            body.split(FAILED).skip(1).collect()
        } else {
            vec![body]
        };
        let chunks: Vec<&str> = chunks
            .into_iter()
            .map(|chunk| match chunk.find(PASSED) {
                Some(end) => &chunk[..end],
                None => chunk,
            })
            .filter(|chunk| !chunk.trim().is_empty())
            .collect();

        let headers: Vec<Option<String>> = chunks.iter().map(|chunk| method_name(chunk)).collect();
        let bodies: Vec<Vec<String>> = chunks.iter().map(|chunk| call_lines(chunk)).collect();
        if headers.len() != bodies.len() {
            return Err(FuzzlogError::MisalignedExtraction {
                headers: headers.len(),
                bodies: bodies.len(),
            });
        }

        let mut entries = Vec::new();
        let blocks = headers.into_iter().zip(bodies).zip(&chunks).enumerate();
        for (idx, ((header, calls), chunk)) in blocks {
            match (header, calls.is_empty()) {
                (header, false) => {
                    let name = header.unwrap_or_else(|| format!("temp_{idx}"));
                    push_unique(&mut entries, PropertyAndSequence::lines(name, calls));
                }
                (Some(_), true) if mentions_no_transactions(chunk) => {}
                (Some(name), true) => {
                    push_unique(&mut entries, PropertyAndSequence::unparsed(name, chunk.trim()));
                }
                (None, true) => {}
            }
        }
        Ok(entries)
    }

    fn sequence_lines(&self, sequence: &str) -> Vec<String> {
        call_lines(sequence)
    }
}

fn apply_elapsed(line: &str, results: &mut FuzzingResults) {
    static COVERAGE: OnceLock<Option<Regex>> = OnceLock::new();
    let after = line.split_once(ELAPSED_MARKER).map_or(line, |(_, rest)| rest);
    if let Some(duration) = capture_fuzzing_duration(after) {
        results.duration = duration;
    }
    if let Some(coverage) = cached_regex(&COVERAGE, r"coverage:\s*(\d+)")
        .and_then(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        results.coverage = coverage;
    }
}

fn apply_summary(line: &str, results: &mut FuzzingResults) {
    static PASSED_COUNT: OnceLock<Option<Regex>> = OnceLock::new();
    static FAILED_COUNT: OnceLock<Option<Regex>> = OnceLock::new();
    let count = |cell: &'static OnceLock<Option<Regex>>, pattern: &str| -> Option<usize> {
        cached_regex(cell, pattern)?
            .captures(line)?
            .get(1)?
            .as_str()
            .parse()
            .ok()
    };
    if let Some(passed) = count(&PASSED_COUNT, r"(\d+) test\(s\) passed") {
        results.passed = passed;
    }
    if let Some(failed) = count(&FAILED_COUNT, r"(\d+) test\(s\) failed") {
        results.failed = failed;
    }
    results.number_of_tests = results.passed + results.failed;
}

/// Bare method name from a `for method "C.name(..)"` header.
fn method_name(text: &str) -> Option<String> {
    static METHOD: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&METHOD, r#"for method ".*\.([A-Za-z_0-9]+)\(.*\)""#)?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

/// Trimmed call lines carrying a `(block=..)` annotation.
fn call_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.contains("(block="))
        .filter(|line| parse_medusa_call(line).is_some())
        .map(str::to_string)
        .collect()
}
