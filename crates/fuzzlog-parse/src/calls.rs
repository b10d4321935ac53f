//! Call-statement parsing for the three log dialects.
//!
//! - Halmos: `CALL CryticToFoundry::setIsManager(Concat(p_a, p_b)) (caller: halmos_msg_sender_…)`
//! - Medusa: `1) CryticTester.deposit(uint256)(100) (block=2, time=3, value=0, sender=0x…)`
//! - Echidna: `CryticTester.deposit(100) from: 0x… Time delay: 1 seconds Block delay: 2`
//!
//! Argument lists are split with a bracket-balancing scan, and symbolic
//! wrappers (`Concat`, `Extract`) are unwrapped recursively.

use std::sync::OnceLock;

use fuzzlog_core::address::format_address;
use fuzzlog_core::text::{cached_regex, matching_close, split_top_level};
use regex::Regex;

use crate::params::is_reference;

/// How far a block number or timestamp moves before a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Set to this literal.
    Absolute(String),
    /// Move forward by this literal.
    Delta(String),
}

impl Advance {
    fn statement(&self, cheatcode: &str, current: &str) -> Option<String> {
        match self {
            Self::Absolute(value) => Some(format!("vm.{cheatcode}({value});")),
            Self::Delta(value) if value.trim_start_matches('0').is_empty() => None,
            Self::Delta(value) => Some(format!("vm.{cheatcode}({current} + {value});")),
        }
    }
}

/// Environment attached to one call: block/time movement, caller, value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallEnvironment {
    pub block: Option<Advance>,
    pub time: Option<Advance>,
    /// Concrete address, or a `halmos_msg_sender_*` symbol to resolve.
    pub sender: Option<String>,
    /// Non-zero call value, as printed.
    pub value: Option<String>,
}

impl CallEnvironment {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block.is_none() && self.time.is_none() && self.sender.is_none() && self.value.is_none()
    }

    #[must_use]
    pub fn roll_statement(&self) -> Option<String> {
        self.block.as_ref()?.statement("roll", "block.number")
    }

    #[must_use]
    pub fn warp_statement(&self) -> Option<String> {
        self.time.as_ref()?.statement("warp", "block.timestamp")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCall {
    pub contract: Option<String>,
    pub function: String,
    /// Raw argument tokens, wrappers already expanded.
    pub parameters: Vec<String>,
    pub env: CallEnvironment,
}

/// One reproduction step recovered from a sequence line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceStep {
    Call(ParsedCall),
    /// Block/time movement with no call (`*wait*` lines).
    Delay(CallEnvironment),
}

/// Dispatch on the line's dialect.
#[must_use]
pub fn parse_call(line: &str) -> Option<ParsedCall> {
    let line = line.trim();
    if line.starts_with("CALL") {
        parse_halmos_call(line)
    } else if line.contains("(block=") {
        parse_medusa_call(line)
    } else {
        parse_echidna_call(line)
    }
}

/// `*wait* Time delay: N seconds Block delay: M`.
#[must_use]
pub fn parse_delay(line: &str) -> Option<CallEnvironment> {
    let line = line.trim();
    if !line.starts_with("*wait*") {
        return None;
    }
    let env = echidna_environment(line);
    if env.block.is_none() && env.time.is_none() {
        return None;
    }
    Some(env)
}

#[must_use]
pub fn parse_halmos_call(line: &str) -> Option<ParsedCall> {
    static HEAD: OnceLock<Option<Regex>> = OnceLock::new();
    static CALLER: OnceLock<Option<Regex>> = OnceLock::new();
    let head = cached_regex(&HEAD, r"^CALL\s+(?:([\w$]+)::)?([\w$]+)\(")?;
    let caps = head.captures(line)?;
    let open = caps.get(0)?.end() - 1;
    let close = matching_close(line, open)?;

    let parameters = split_top_level(&line[open + 1..close])
        .iter()
        .flat_map(|arg| unwrap_symbolic(arg))
        .collect();

    let sender = cached_regex(&CALLER, r"\(caller:\s*([^)\s]+)\)")
        .and_then(|re| re.captures(&line[close + 1..]))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    Some(ParsedCall {
        contract: caps.get(1).map(|m| m.as_str().to_string()),
        function: caps.get(2)?.as_str().to_string(),
        parameters,
        env: CallEnvironment {
            sender,
            ..CallEnvironment::default()
        },
    })
}

#[must_use]
pub fn parse_medusa_call(line: &str) -> Option<ParsedCall> {
    let meta_start = line.rfind("(block=")?;
    let meta_end = matching_close(line, meta_start)?;
    let meta = &line[meta_start + 1..meta_end];

    let expr = strip_step_index(line[..meta_start].trim());
    let (contract, function, args) = parse_call_expression(expr)?;

    let mut env = CallEnvironment::default();
    for field in split_top_level(meta) {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "block" if !value.is_empty() => env.block = Some(Advance::Absolute(value.to_string())),
            "time" if !value.is_empty() => env.time = Some(Advance::Absolute(value.to_string())),
            "sender" if !value.is_empty() => env.sender = Some(format_address(value)),
            "value" if !value.trim_start_matches('0').is_empty() => {
                env.value = Some(value.to_string());
            }
            _ => {}
        }
    }

    Some(ParsedCall {
        contract,
        function,
        parameters: args,
        env,
    })
}

#[must_use]
pub fn parse_echidna_call(line: &str) -> Option<ParsedCall> {
    let line = line.trim();
    if line.starts_with("*wait*") {
        return None;
    }
    let (contract, function, args) = parse_call_expression(line)?;
    Some(ParsedCall {
        contract,
        function,
        parameters: args,
        env: echidna_environment(line),
    })
}

fn echidna_environment(line: &str) -> CallEnvironment {
    static FROM: OnceLock<Option<Regex>> = OnceLock::new();
    static TIME: OnceLock<Option<Regex>> = OnceLock::new();
    static BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    static VALUE: OnceLock<Option<Regex>> = OnceLock::new();

    // Only look past the call expression so string arguments cannot
    // masquerade as metadata.
    let tail = match line.find('(').and_then(|open| matching_close(line, open)) {
        Some(close) => &line[close + 1..],
        None => line,
    };
    let capture = |cell: &'static OnceLock<Option<Regex>>, pattern: &str| {
        cached_regex(cell, pattern)
            .and_then(|re| re.captures(tail))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    CallEnvironment {
        block: capture(&BLOCK, r"Block delay:\s*(\d+)").map(Advance::Delta),
        time: capture(&TIME, r"Time delay:\s*(\d+)").map(Advance::Delta),
        sender: capture(&FROM, r"from:\s*(0x[0-9a-fA-F]{1,40})\b")
            .map(|addr| format_address(&addr)),
        value: capture(&VALUE, r"Value:\s*(0x[0-9a-fA-F]+|\d+)")
            .filter(|value| !value.trim_start_matches("0x").trim_start_matches('0').is_empty()),
    }
}

/// `Contract.fn(args)` or `fn(args)`, optionally `fn(types)(args)`.
fn parse_call_expression(expr: &str) -> Option<(Option<String>, String, Vec<String>)> {
    static HEAD: OnceLock<Option<Regex>> = OnceLock::new();
    let head = cached_regex(&HEAD, r"^(?:([\w$]+)\.)?([\w$]+)\(")?;
    let caps = head.captures(expr)?;
    let first_open = caps.get(0)?.end() - 1;
    let first_close = matching_close(expr, first_open)?;

    let rest = &expr[first_close + 1..];
    let args_inner = if rest.starts_with('(') {
        let second_open = first_close + 1;
        let second_close = matching_close(expr, second_open)?;
        &expr[second_open + 1..second_close]
    } else {
        &expr[first_open + 1..first_close]
    };

    Some((
        caps.get(1).map(|m| m.as_str().to_string()),
        caps.get(2)?.as_str().to_string(),
        split_top_level(args_inner),
    ))
}

fn strip_step_index(expr: &str) -> &str {
    static INDEX: OnceLock<Option<Regex>> = OnceLock::new();
    match cached_regex(&INDEX, r"^\d+\)\s*").and_then(|re| re.find(expr)) {
        Some(m) => &expr[m.end()..],
        None => expr,
    }
}

/// Expand `Concat(...)` into its referenced symbols and `Extract(hi, lo, x)`
/// into `x`, at any nesting depth. Anything else is returned unchanged.
#[must_use]
pub fn unwrap_symbolic(expr: &str) -> Vec<String> {
    let expr = expr.trim();
    if let Some(inner) = wrapper_arguments(expr, "Concat") {
        let parts: Vec<String> = split_top_level(inner)
            .iter()
            .flat_map(|part| unwrap_symbolic(part))
            .collect();
        let references: Vec<String> = parts.iter().filter(|p| is_reference(p)).cloned().collect();
        return if references.is_empty() { parts } else { references };
    }
    if let Some(inner) = wrapper_arguments(expr, "Extract") {
        return split_top_level(inner)
            .last()
            .map(|operand| unwrap_symbolic(operand))
            .unwrap_or_default();
    }
    vec![expr.to_string()]
}

fn wrapper_arguments<'a>(expr: &'a str, wrapper: &str) -> Option<&'a str> {
    let rest = expr.strip_prefix(wrapper)?;
    if !rest.starts_with('(') {
        return None;
    }
    let open = wrapper.len();
    let close = matching_close(expr, open)?;
    if close != expr.len() - 1 {
        return None;
    }
    Some(&expr[open + 1..close])
}

/// Render a literal argument from a concrete trace: full-width addresses
/// get checksummed and bare hex words become `hex"..."` byte literals.
/// Tuples and arrays are rendered element by element.
#[must_use]
pub fn render_literal(token: &str) -> String {
    let token = token.trim();
    if let Some(close) = token.starts_with('(').then(|| matching_close(token, 0)).flatten() {
        if close == token.len() - 1 {
            return format!("({})", render_list(&token[1..close]));
        }
    }
    if let Some(close) = token.starts_with('[').then(|| matching_close(token, 0)).flatten() {
        if close == token.len() - 1 {
            return format!("[{}]", render_list(&token[1..close]));
        }
    }
    if token.starts_with("0x") || token.starts_with("0X") {
        return fuzzlog_core::address::checksum_address_literals(token);
    }
    if is_bare_hex_word(token) {
        return format!("hex\"{token}\"");
    }
    token.to_string()
}

fn render_list(inner: &str) -> String {
    split_top_level(inner)
        .iter()
        .map(|item| render_literal(item))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_bare_hex_word(token: &str) -> bool {
    token.len() >= 2
        && token.len() % 2 == 0
        && token.bytes().all(|b| b.is_ascii_hexdigit())
        && token.bytes().any(|b| matches!(b, b'a'..=b'f' | b'A'..=b'F'))
}
