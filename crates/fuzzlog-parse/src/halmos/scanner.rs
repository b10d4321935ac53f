use std::sync::OnceLock;

use fuzzlog_core::text::{cached_regex, matching_close, parens_balanced, strip_ansi};
use regex::Regex;

use crate::params::{is_reference, split_assignment, PARAM_PREFIX};

/// Parameters and top-level calls captured from one counterexample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CounterexampleBlock {
    pub property: Option<String>,
    pub lines: Vec<String>,
}

/// Incremental scanner over Halmos output. Feed it lines; it yields a block
/// every time a failure header (or the end of input) closes a captured
/// counterexample.
#[derive(Debug, Default)]
pub(crate) struct CounterexampleScanner {
    property: Option<String>,
    capturing: bool,
    seen_counterexample: bool,
    in_sequence: bool,
    call_indent: Option<usize>,
    params: Vec<String>,
    param_open: bool,
    calls: Vec<String>,
    pending_call: Option<String>,
}

impl CounterexampleScanner {
    pub fn feed(&mut self, raw: &str) -> Option<CounterexampleBlock> {
        static FAIL: OnceLock<Option<Regex>> = OnceLock::new();
        static ASSERTION: OnceLock<Option<Regex>> = OnceLock::new();

        let line = raw.trim();
        if let Some(name) = cached_regex(&FAIL, r"\[(?:FAIL|TIMEOUT)\]\s+(\S+)")
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
        {
            self.property = Some(name.as_str().to_string());
        } else if self.property.is_none() {
            if let Some(name) = cached_regex(&ASSERTION, r"Assertion failure detected in [\w$]+\.([\w$]+\([^)]*\))")
                .and_then(|re| re.captures(line))
                .and_then(|caps| caps.get(1))
            {
                self.property = Some(name.as_str().to_string());
            }
        }

        if is_end_marker(line) {
            return self.complete();
        }

        if let Some(rest) = counterexample_header(line) {
            if rest.starts_with('∅') {
                log::debug!("halmos: empty counterexample for {:?}", self.property);
                self.clear_capture();
            } else if self.seen_counterexample {
                self.capturing = false;
            } else {
                self.clear_capture();
                self.capturing = true;
                self.seen_counterexample = true;
            }
            return None;
        }

        if !self.capturing {
            return None;
        }

        if let Some(mut pending) = self.pending_call.take() {
            pending.push(' ');
            pending.push_str(line);
            if parens_balanced(&pending) {
                self.finish_call(&pending);
            } else {
                self.pending_call = Some(pending);
            }
            return None;
        }

        if line.starts_with("Sequence:") {
            self.in_sequence = true;
            self.param_open = false;
            return None;
        }

        if self.in_sequence || line.starts_with("CALL ") {
            self.param_open = false;
            if !line.starts_with("CALL ") {
                return None;
            }
            let indent = raw.len() - raw.trim_start().len();
            match self.call_indent {
                Some(top) if indent > top => return None,
                Some(_) => {}
                None => self.call_indent = Some(indent),
            }
            if parens_balanced(line) {
                self.finish_call(line);
            } else {
                self.pending_call = Some(line.to_string());
            }
            return None;
        }

        if let Some((name, _)) = split_assignment(line) {
            if is_reference(name) {
                self.params.push(line.to_string());
                self.param_open = true;
            } else {
                self.param_open = false;
            }
            return None;
        }

        if self.param_open && is_hex_fragment(line) {
            if let Some(last) = self.params.last_mut() {
                if last.ends_with('=') {
                    last.push(' ');
                }
                last.push_str(line);
            }
            return None;
        }

        self.param_open = false;
        None
    }

    /// Flush whatever is still captured at end of input.
    pub fn finish(&mut self) -> Option<CounterexampleBlock> {
        if self.capturing || !self.params.is_empty() || !self.calls.is_empty() {
            self.complete()
        } else {
            None
        }
    }

    fn finish_call(&mut self, joined: &str) {
        match extract_call_statement(joined) {
            Some(call) => self.calls.push(call),
            None => log::trace!("halmos: unparseable call skipped: {joined}"),
        }
    }

    fn complete(&mut self) -> Option<CounterexampleBlock> {
        if let Some(pending) = self.pending_call.take() {
            self.finish_call(&pending);
        }
        let has_params = self.params.iter().any(|p| p.starts_with(PARAM_PREFIX));
        let block = (has_params || !self.calls.is_empty()).then(|| {
            let mut lines = std::mem::take(&mut self.params);
            lines.append(&mut self.calls);
            CounterexampleBlock {
                property: self.property.clone(),
                lines,
            }
        });
        *self = Self::default();
        block
    }

    fn clear_capture(&mut self) {
        self.capturing = false;
        self.in_sequence = false;
        self.call_indent = None;
        self.params.clear();
        self.param_open = false;
        self.calls.clear();
        self.pending_call = None;
    }
}

fn is_end_marker(line: &str) -> bool {
    line.contains("[FAIL]") || line.contains("[TIMEOUT]") || line.contains("Symbolic test result:")
}

/// Text after the colon of a `Counterexample:` (or `Counterexample
/// (potentially invalid):`) header.
fn counterexample_header(line: &str) -> Option<&str> {
    if !line.starts_with("Counterexample") {
        return None;
    }
    let (_, rest) = line.split_once(':')?;
    Some(rest.trim())
}

fn is_hex_fragment(line: &str) -> bool {
    let digits = line.strip_prefix("0x").unwrap_or(line);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Normalise a (possibly re-joined) `CALL` line to
/// `CALL C::fn(args)`, keeping a `(caller: sym)` annotation.
pub(crate) fn extract_call_statement(line: &str) -> Option<String> {
    static HEAD: OnceLock<Option<Regex>> = OnceLock::new();
    static CALLER: OnceLock<Option<Regex>> = OnceLock::new();

    let start = line.find("CALL")?;
    let line = &line[start..];
    let caps = cached_regex(&HEAD, r"^CALL\s+((?:[\w$]+::)?[\w$]+)\(")?.captures(line)?;
    let open = caps.get(0)?.end() - 1;
    let close = matching_close(line, open)?;

    let mut statement = format!("CALL {}{}", &caps[1], &line[open..=close]);
    if let Some(caller) = cached_regex(&CALLER, r"\(caller:\s*([^)\s]+)\)")
        .and_then(|re| re.captures(&line[close + 1..]))
        .and_then(|caps| caps.get(1))
    {
        statement.push_str(&format!(" (caller: {})", caller.as_str()));
    }
    Some(statement)
}

/// Every counterexample block in a full log, in order.
pub(crate) fn scan_blocks(logs: &str) -> Vec<CounterexampleBlock> {
    let mut scanner = CounterexampleScanner::default();
    let mut blocks: Vec<CounterexampleBlock> = logs
        .lines()
        .filter_map(|line| scanner.feed(&strip_ansi(line)))
        .collect();
    blocks.extend(scanner.finish());
    blocks
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const WRAPPED: &str = "Counterexample:
    halmos_block_timestamp_depth1_6c7bfa9 = 0x8000000000000000
    halmos_msg_value_0x7fa9385be102ac3eac297483dd6233d62b3e1496_31225f5_36 =
0x00
    p_entropy_uint256_bf67ff6_37 = 0x00
    p_isManager_bool_27d3489_66 = 0x01
    p_manager_address_7f0b765_65 = 0x00
Sequence:
    CALL CryticToFoundry::switchActor(p_entropy_uint256_bf67ff6_37) (value:
halmos_msg_value_0x7fa9385be102ac3eac297483dd6233d62b3e1496_31225f5_36) (caller:
halmos_msg_sender_0x7fa9385be102ac3eac297483dd6233d62b3e1496_9282034_35)
        SLOAD  @1 →
0x0000000000000000000000000000000000000000000000000000000000000002
    CALL CryticToFoundry::setIsManager(Concat(p_manager_address_7f0b765_65,
p_isManager_bool_27d3489_66)) (value:
halmos_msg_value_0x7fa9385be102ac3eac297483dd6233d62b3e1496_e4ecfe0_64) (caller:
halmos_msg_sender_0x7fa9385be102ac3eac297483dd6233d62b3e1496_3c634f7_63)
        CALL 0xaaaa0002::onHook(p_manager_address_7f0b765_65)
        SLOAD  @f_sha3_512(Concat(0x000000000000000000000000, Extract(0x9f,
0x00, p_manager_address_7f0b765_65),
0x0000000000000000000000000000000000000000000000000000000000000009)) → 0x00
    ↩ RETURN 0x

[FAIL] invariant_isNeverManager() (paths: 90, time: 0.57s, bounds: [])";

    #[test]
    fn wrapped_calls_are_rejoined() {
        let blocks = scan_blocks(WRAPPED);
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.property.as_deref(), Some("invariant_isNeverManager()"));
        assert_eq!(
            block.lines,
            vec![
                "halmos_block_timestamp_depth1_6c7bfa9 = 0x8000000000000000",
                "halmos_msg_value_0x7fa9385be102ac3eac297483dd6233d62b3e1496_31225f5_36 = 0x00",
                "p_entropy_uint256_bf67ff6_37 = 0x00",
                "p_isManager_bool_27d3489_66 = 0x01",
                "p_manager_address_7f0b765_65 = 0x00",
                "CALL CryticToFoundry::switchActor(p_entropy_uint256_bf67ff6_37) (caller: halmos_msg_sender_0x7fa9385be102ac3eac297483dd6233d62b3e1496_9282034_35)",
                "CALL CryticToFoundry::setIsManager(Concat(p_manager_address_7f0b765_65, p_isManager_bool_27d3489_66)) (caller: halmos_msg_sender_0x7fa9385be102ac3eac297483dd6233d62b3e1496_3c634f7_63)",
            ]
        );
    }

    #[test]
    fn empty_counterexample_yields_nothing() {
        let blocks = scan_blocks("Counterexample: ∅\n[FAIL] check_nothing() (paths: 1, time: 0.01s, bounds: [])\n");
        assert!(blocks.is_empty());
    }

    #[test]
    fn only_first_counterexample_is_kept() {
        let log = "Counterexample:
    p_x_uint256_aa_00 = 0x01
Counterexample:
    p_x_uint256_aa_00 = 0x02
[FAIL] check_x(uint256) (paths: 2, time: 0.02s, bounds: [])";
        let blocks = scan_blocks(log);
        assert_eq!(blocks[0].lines, vec!["p_x_uint256_aa_00 = 0x01"]);
    }

    #[test]
    fn assertion_line_names_the_block() {
        let log = "Assertion failure detected in CryticToFoundry.invariant_a()
Counterexample:
    p_x_uint256_aa_00 = 0x01
Symbolic test result: 0 passed; 1 failed; time: 0.60s";
        let blocks = scan_blocks(log);
        assert_eq!(blocks[0].property.as_deref(), Some("invariant_a()"));
    }

    #[test]
    fn extract_call_statement_drops_value_annotation() {
        assert_eq!(
            extract_call_statement("CALL C::f(Concat(p_a, p_b)) (value: v) (caller: s)").unwrap(),
            "CALL C::f(Concat(p_a, p_b)) (caller: s)"
        );
        assert!(extract_call_statement("SLOAD @1").is_none());
    }
}
