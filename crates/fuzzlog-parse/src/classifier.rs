//! Per-tool log parsers behind one interface.
//!
//! A [`ToolParser`] is built fresh for every run: all "currently inside a
//! trace" state lives on the parser value, so two runs never share state.

use fuzzlog_core::{BrokenProperty, Fuzzer, FuzzingResults, FuzzlogError, PropertyAndSequence};

use crate::echidna::EchidnaParser;
use crate::halmos::HalmosParser;
use crate::medusa::MedusaParser;

pub trait ToolParser {
    fn fuzzer(&self) -> Fuzzer;

    /// Classify one line and update `results`.
    fn process_line(&mut self, line: &str, results: &mut FuzzingResults);

    /// End of input: seal whatever trace is still open.
    fn finish(&mut self, results: &mut FuzzingResults);

    /// Batch pass over a whole log: one entry per broken property, in order
    /// of first appearance.
    fn extract(&self, logs: &str) -> Result<Vec<PropertyAndSequence>, FuzzlogError>;

    /// Reproduction lines from a single property's streamed sequence.
    fn sequence_lines(&self, sequence: &str) -> Vec<String>;
}

#[must_use]
pub fn parser_for(fuzzer: Fuzzer) -> Box<dyn ToolParser> {
    match fuzzer {
        Fuzzer::Echidna => Box::<EchidnaParser>::default(),
        Fuzzer::Medusa => Box::<MedusaParser>::default(),
        Fuzzer::Halmos => Box::<HalmosParser>::default(),
    }
}

/// Run the streaming classifier over a full log.
#[must_use]
pub fn process_logs(logs: &str, fuzzer: Fuzzer) -> FuzzingResults {
    let mut parser = parser_for(fuzzer);
    let mut results = FuzzingResults::new();
    for line in logs.lines() {
        parser.process_line(line, &mut results);
    }
    parser.finish(&mut results);
    log::debug!(
        "{fuzzer}: {} passed, {} failed, {} broken properties",
        results.passed,
        results.failed,
        results.broken_properties.len()
    );
    results
}

/// Turn a streamed broken property into an extractor entry. Sequences with
/// no recognizable lines come back as [`fuzzlog_core::Sequence::Unparsed`].
#[must_use]
pub fn sequence_for_property(fuzzer: Fuzzer, property: &BrokenProperty) -> PropertyAndSequence {
    let lines = parser_for(fuzzer).sequence_lines(&property.sequence);
    if lines.is_empty() {
        PropertyAndSequence::unparsed(property.broken_property.clone(), property.sequence.clone())
    } else {
        PropertyAndSequence::lines(property.broken_property.clone(), lines)
    }
}

/// Keep the first entry per property key.
pub(crate) fn push_unique(entries: &mut Vec<PropertyAndSequence>, entry: PropertyAndSequence) {
    let key = fuzzlog_core::property_key(&entry.broken_property);
    if entries
        .iter()
        .any(|existing| fuzzlog_core::property_key(&existing.broken_property) == key)
    {
        log::debug!("duplicate property {:?} skipped", entry.broken_property);
        return;
    }
    entries.push(entry);
}

pub(crate) fn mentions_no_transactions(line: &str) -> bool {
    line.to_ascii_lowercase().contains("no transactions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzlog_core::Sequence;

    #[test]
    fn interleaved_runs_do_not_share_state() {
        let mut first = parser_for(Fuzzer::Echidna);
        let mut second = parser_for(Fuzzer::Echidna);
        let mut a = FuzzingResults::new();
        let mut b = FuzzingResults::new();

        first.process_line("check_a(uint256): failed!💥", &mut a);
        first.process_line("  Call sequence:", &mut a);
        second.process_line("echidna_ok: passing", &mut b);
        first.process_line("    CryticTester.poke(1)", &mut a);
        first.finish(&mut a);
        second.finish(&mut b);

        assert_eq!(a.broken_properties.len(), 1);
        assert!(a.broken_properties[0].is_sealed());
        assert!(b.broken_properties.is_empty());
        assert!(b.traces.is_empty());
        assert_eq!(first.fuzzer(), Fuzzer::Echidna);
    }

    #[test]
    fn unrecognized_sequence_is_unparsed() {
        let mut prop = BrokenProperty::new("check_x()");
        prop.sequence = "something went wrong\n---End Trace---\n".to_string();
        let entry = sequence_for_property(Fuzzer::Medusa, &prop);
        assert!(matches!(entry.sequence, Sequence::Unparsed(_)));
    }

    #[test]
    fn first_entry_per_key_wins() {
        let mut entries = Vec::new();
        push_unique(
            &mut entries,
            PropertyAndSequence::lines("check(uint256)", vec!["a".to_string()]),
        );
        push_unique(&mut entries, PropertyAndSequence::lines("check", vec!["b".to_string()]));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].broken_property, "check(uint256)");
    }
}
