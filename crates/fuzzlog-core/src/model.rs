//! Parsed-run data model.
//!
//! A [`FuzzingResults`] is the accumulator a line classifier writes into
//! while it walks one log. Broken properties are keyed by their bare name
//! (see [`property_key`]) so a failure reported twice is only recorded once,
//! and a sequence that already carries [`END_TRACE`] is sealed: later lines
//! for the same property are dropped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FuzzlogError;

/// Sentinel appended to a trace (and to a property's sequence) when the
/// classifier sees the tool's end-of-trace marker.
pub const END_TRACE: &str = "---End Trace---";

// ---------------------------------------------------------------------------
// Fuzzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fuzzer {
    Echidna,
    Medusa,
    Halmos,
}

impl Fuzzer {
    pub const ALL: [Fuzzer; 3] = [Fuzzer::Echidna, Fuzzer::Medusa, Fuzzer::Halmos];

    /// Stable slug used on the command line and in serialized output.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Echidna => "echidna",
            Self::Medusa => "medusa",
            Self::Halmos => "halmos",
        }
    }

    /// Case-insensitive parse from slug.
    #[must_use]
    pub fn from_slug(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "echidna" => Some(Self::Echidna),
            "medusa" => Some(Self::Medusa),
            "halmos" => Some(Self::Halmos),
            _ => None,
        }
    }
}

impl fmt::Display for Fuzzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Fuzzer {
    type Err = FuzzlogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slug(s).ok_or_else(|| FuzzlogError::UnknownFuzzer(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Broken properties
// ---------------------------------------------------------------------------

/// Bare property name used for de-duplication: everything before the first
/// `(`, trimmed. `check(uint256)` and `check` share a key.
#[must_use]
pub fn property_key(name: &str) -> &str {
    name.find('(').map_or(name, |idx| &name[..idx]).trim()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenProperty {
    pub broken_property: String,
    pub sequence: String,
}

impl BrokenProperty {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            broken_property: name.into(),
            sequence: String::new(),
        }
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sequence.contains(END_TRACE)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        property_key(&self.broken_property)
    }
}

/// Sequence recovered for one broken property by a batch extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sequence {
    /// Ordered, recognized lines (parameter assignments and call statements).
    Lines(Vec<String>),
    /// Raw text that could not be broken into calls.
    Unparsed(String),
}

impl Sequence {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Lines(lines) => lines.is_empty(),
            Self::Unparsed(raw) => raw.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAndSequence {
    pub broken_property: String,
    pub sequence: Sequence,
}

impl PropertyAndSequence {
    #[must_use]
    pub fn lines(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            broken_property: name.into(),
            sequence: Sequence::Lines(lines),
        }
    }

    #[must_use]
    pub fn unparsed(name: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            broken_property: name.into(),
            sequence: Sequence::Unparsed(raw.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Fuzzing results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzingResults {
    pub duration: String,
    pub coverage: u64,
    pub failed: usize,
    pub passed: usize,
    pub number_of_tests: usize,
    pub results: Vec<String>,
    pub traces: Vec<String>,
    pub broken_properties: Vec<BrokenProperty>,
}

impl FuzzingResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<&BrokenProperty> {
        let key = property_key(name);
        self.broken_properties.iter().find(|prop| prop.key() == key)
    }

    /// Append one line to the named property's sequence, creating the
    /// property on first use. Returns `false` when the property is already
    /// sealed and the line was dropped.
    pub fn append_to_property(&mut self, name: &str, line: &str) -> bool {
        if property_key(name).is_empty() {
            return false;
        }
        let key = property_key(name).to_string();
        let idx = match self
            .broken_properties
            .iter()
            .position(|prop| prop.key() == key)
        {
            Some(idx) => idx,
            None => {
                self.broken_properties.push(BrokenProperty::new(name));
                self.broken_properties.len() - 1
            }
        };
        let prop = &mut self.broken_properties[idx];
        if prop.is_sealed() {
            return false;
        }
        prop.sequence.push_str(line);
        prop.sequence.push('\n');
        true
    }

    /// Terminate the property's sequence with [`END_TRACE`]. Sealing twice is
    /// a no-op.
    pub fn seal_property(&mut self, name: &str) {
        let key = property_key(name);
        if let Some(prop) = self
            .broken_properties
            .iter_mut()
            .find(|prop| prop.key() == key)
        {
            if !prop.is_sealed() {
                prop.sequence.push_str(END_TRACE);
                prop.sequence.push('\n');
            }
        }
    }

    /// Drop an unsealed property entirely. Sealed properties are kept.
    pub fn discard_property(&mut self, name: &str) {
        let key = property_key(name);
        self.broken_properties
            .retain(|prop| prop.key() != key || prop.is_sealed());
    }

    /// Push a result line unless an identical one is already recorded.
    pub fn push_unique_result(&mut self, line: &str) {
        if !self.results.iter().any(|existing| existing == line) {
            self.results.push(line.to_string());
        }
    }

    /// Raw trace lines grouped into one string per trace.
    #[must_use]
    pub fn grouped_traces(&self) -> Vec<String> {
        process_trace_logs(&self.traces)
    }
}

/// Group raw trace lines into one newline-joined string per trace, split at
/// every [`END_TRACE`] line. Groups that are empty after trimming are
/// dropped; a trailing group without a sentinel is kept.
#[must_use]
pub fn process_trace_logs(lines: &[String]) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in lines {
        if line.contains(END_TRACE) {
            let joined = current.join("\n");
            if !joined.trim().is_empty() {
                groups.push(joined);
            }
            current.clear();
        } else {
            current.push(line);
        }
    }
    let tail = current.join("\n");
    if !tail.trim().is_empty() {
        groups.push(tail);
    }
    groups
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fuzzer_slug_roundtrip() {
        for fuzzer in Fuzzer::ALL {
            assert_eq!(Fuzzer::from_slug(fuzzer.slug()), Some(fuzzer));
        }
        assert_eq!(Fuzzer::from_slug(" MEDUSA "), Some(Fuzzer::Medusa));
        let err = "foundry".parse::<Fuzzer>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown fuzzer \"foundry\"; valid fuzzers: [echidna medusa halmos]"
        );
    }

    #[test]
    fn property_key_strips_signature() {
        assert_eq!(property_key("check_xor(bool,bool)"), "check_xor");
        assert_eq!(property_key("  invariant_x  "), "invariant_x");
        assert_eq!(property_key("(weird)"), "");
    }

    #[test]
    fn sealed_property_rejects_further_lines() {
        let mut results = FuzzingResults::new();
        assert!(results.append_to_property("check(uint256)", "line one"));
        results.seal_property("check");
        results.seal_property("check(uint256)");
        assert!(!results.append_to_property("check(uint256)", "line two"));

        let prop = results.find_property("check").unwrap();
        assert_eq!(prop.sequence, "line one\n---End Trace---\n");
        assert_eq!(prop.sequence.matches(END_TRACE).count(), 1);
        assert_eq!(results.broken_properties.len(), 1);
    }

    #[test]
    fn empty_property_name_is_ignored() {
        let mut results = FuzzingResults::new();
        assert!(!results.append_to_property("", "line"));
        assert!(results.broken_properties.is_empty());
    }

    #[test]
    fn discard_keeps_sealed_properties() {
        let mut results = FuzzingResults::new();
        results.append_to_property("a", "x");
        results.seal_property("a");
        results.append_to_property("b", "y");
        results.discard_property("a");
        results.discard_property("b");
        assert_eq!(results.broken_properties.len(), 1);
        assert_eq!(results.broken_properties[0].broken_property, "a");
    }

    #[test]
    fn trace_groups_split_on_sentinel() {
        let lines: Vec<String> = ["a", "b", END_TRACE, "", END_TRACE, "c"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(process_trace_logs(&lines), vec!["a\nb", "c"]);
    }

    #[test]
    fn results_serialize_with_camel_case_keys() {
        let mut results = FuzzingResults::new();
        results.number_of_tests = 3;
        results.append_to_property("p", "l");
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["numberOfTests"], 3);
        assert_eq!(json["brokenProperties"][0]["brokenProperty"], "p");
    }
}
