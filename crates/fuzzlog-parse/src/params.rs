//! Counterexample parameter parsing and Solidity value rendering.
//!
//! Symbolic tools name their inputs `p_<name>_<type>_<hash>_<index>`, e.g.
//! `p_entropy_uint256_bf67ff6_37 = 0x00`. The type is recovered from the
//! name and the value is rendered as a literal of that type.

use std::fmt;
use std::sync::OnceLock;

use fuzzlog_core::address::format_address;
use fuzzlog_core::text::cached_regex;
use regex::Regex;

/// Prefix of fuzzer-chosen inputs.
pub const PARAM_PREFIX: &str = "p_";
/// Prefix of tool-internal symbols (msg.sender, block.timestamp, ...).
pub const HALMOS_PREFIX: &str = "halmos_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolType {
    Bool,
    Address,
    Uint(u16),
    Int(u16),
    FixedBytes(u8),
    Bytes,
    String,
}

impl SolType {
    /// Parse an ABI type name. `uint` and `int` alias their 256-bit forms.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw {
            "bool" => return Some(Self::Bool),
            "address" | "address payable" => return Some(Self::Address),
            "string" => return Some(Self::String),
            "bytes" => return Some(Self::Bytes),
            "uint" => return Some(Self::Uint(256)),
            "int" => return Some(Self::Int(256)),
            _ => {}
        }
        if let Some(bits) = raw.strip_prefix("uint") {
            return bits.parse().ok().filter(valid_int_width).map(Self::Uint);
        }
        if let Some(bits) = raw.strip_prefix("int") {
            return bits.parse().ok().filter(valid_int_width).map(Self::Int);
        }
        if let Some(size) = raw.strip_prefix("bytes") {
            return size
                .parse()
                .ok()
                .filter(|n: &u8| (1..=32).contains(n))
                .map(Self::FixedBytes);
        }
        None
    }

    /// Literal used for an unset variable or array slot.
    #[must_use]
    pub fn zero_value(self) -> String {
        match self {
            Self::Bool => "false".to_string(),
            Self::Address => "address(0)".to_string(),
            Self::Uint(_) | Self::Int(_) => "0".to_string(),
            Self::FixedBytes(n) => format!("bytes{n}(0)"),
            Self::Bytes | Self::String => "\"\"".to_string(),
        }
    }

    /// Needs a `memory` data location when declared as a local.
    #[must_use]
    pub fn is_reference_type(self) -> bool {
        matches!(self, Self::Bytes | Self::String)
    }

    /// `T name` or `T memory name`.
    #[must_use]
    pub fn local_declaration(self, name: &str) -> String {
        if self.is_reference_type() {
            format!("{self} memory {name}")
        } else {
            format!("{self} {name}")
        }
    }
}

fn valid_int_width(bits: &u16) -> bool {
    (8..=256).contains(bits) && bits % 8 == 0
}

impl fmt::Display for SolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Address => f.write_str("address"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
        }
    }
}

/// One `name = value` line from a counterexample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedParameter {
    /// Symbol exactly as the tool printed it.
    pub raw_name: String,
    /// Identifier-safe base name (`p_a_bool_x_00` → `a`).
    pub clean_name: String,
    pub sol_type: SolType,
    /// Hex payload without `0x`, or the literal text for non-hex values.
    pub value: String,
}

impl ParsedParameter {
    #[must_use]
    pub fn is_fuzz_input(&self) -> bool {
        self.raw_name.starts_with(PARAM_PREFIX)
    }

    #[must_use]
    pub fn is_length_helper(&self) -> bool {
        is_length_parameter(&self.raw_name)
    }

    /// Value as an integer, when it is one.
    #[must_use]
    pub fn numeric_value(&self) -> Option<u128> {
        parse_numeric(&self.value)
    }
}

/// A symbolic reference: `p_*` input or `halmos_*` internal symbol.
#[must_use]
pub fn is_reference(token: &str) -> bool {
    let token = token.trim();
    token.starts_with(PARAM_PREFIX) || token.starts_with(HALMOS_PREFIX)
}

/// Split `name = value` at the first `=`.
#[must_use]
pub fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once('=')?;
    Some((name.trim(), value.trim()))
}

/// Parse a counterexample assignment line whose left side is a reference.
#[must_use]
pub fn parse_parameter_line(line: &str) -> Option<ParsedParameter> {
    let (name, value) = split_assignment(line.trim())?;
    if !is_reference(name) {
        return None;
    }
    Some(ParsedParameter {
        raw_name: name.to_string(),
        clean_name: clean_parameter_name(name),
        sol_type: infer_type(name),
        value: strip_hex_prefix(value).to_string(),
    })
}

fn hash_suffix() -> Option<&'static Regex> {
    static HASH_SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&HASH_SUFFIX, r"_[A-Za-z0-9]+_\d+$")
}

fn type_suffix() -> Option<&'static Regex> {
    static TYPE_SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(
        &TYPE_SUFFIX,
        r"_(bool|address|string|bytes\d*|u?int\d*)$",
    )
}

/// Name with the `p_` prefix and `_<hash>_<index>` suffix removed.
fn base_symbol(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed.strip_prefix(PARAM_PREFIX).unwrap_or(trimmed);
    match hash_suffix() {
        Some(re) => re.replace(without_prefix, "").into_owned(),
        None => without_prefix.to_string(),
    }
}

/// Identifier-safe variable name for a parameter symbol.
#[must_use]
pub fn clean_parameter_name(raw: &str) -> String {
    let mut name = base_symbol(raw);
    if let Some(re) = type_suffix() {
        name = re.replace(&name, "").into_owned();
    }
    let name: String = name
        .chars()
        .filter(|ch| *ch != '[' && *ch != ']')
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    if name.is_empty() {
        "param".to_string()
    } else if name.starts_with(|ch: char| ch.is_ascii_digit()) {
        format!("v_{name}")
    } else {
        name
    }
}

/// Recover the Solidity type from a symbol name. Defaults to `uint256`.
#[must_use]
pub fn infer_type(raw: &str) -> SolType {
    let base = base_symbol(raw);
    if let Some(found) = type_suffix()
        .and_then(|re| re.captures(&base))
        .and_then(|caps| caps.get(1))
        .and_then(|m| SolType::parse(m.as_str()))
    {
        return found;
    }

    static EMBEDDED: OnceLock<Option<Regex>> = OnceLock::new();
    let embedded = cached_regex(
        &EMBEDDED,
        r"_(bool|address|string|bytes\d*|u?int\d+)(?:_|\[|$)",
    );
    if let Some(found) = embedded
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .and_then(|m| SolType::parse(m.as_str()))
    {
        return found;
    }
    SolType::Uint(256)
}

/// `p_<name>_length_…` (or nested `p_<name>[i]_length_…`).
#[must_use]
pub fn is_length_parameter(raw: &str) -> bool {
    raw.starts_with(PARAM_PREFIX) && base_symbol(raw).ends_with("_length")
}

/// Base name a length helper describes (`p_data_length_ab_00` → `data`).
#[must_use]
pub fn length_target(raw: &str) -> Option<String> {
    if !is_length_parameter(raw) {
        return None;
    }
    let base = base_symbol(raw);
    base.strip_suffix("_length").map(str::to_string)
}

/// Base name with the type segment removed, brackets kept
/// (`p_arr[0]_uint256_6e_00` → `arr[0]`).
#[must_use]
pub fn symbol_stem(raw: &str) -> String {
    let base = base_symbol(raw);
    match type_suffix() {
        Some(re) => re.replace(&base, "").into_owned(),
        None => base,
    }
}

#[must_use]
pub fn strip_hex_prefix(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Parse a hex payload (or a decimal literal) into an integer.
#[must_use]
pub fn parse_numeric(value: &str) -> Option<u128> {
    let trimmed = value.trim();
    if let Some(hex_digits) = trimmed.strip_prefix("0x") {
        return u128::from_str_radix(hex_digits, 16).ok();
    }
    u128::from_str_radix(trimmed, 16)
        .ok()
        .or_else(|| trimmed.parse().ok())
}

fn is_hex_payload(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn even_hex(payload: &str) -> String {
    if payload.len() % 2 == 1 {
        format!("0{payload}")
    } else {
        payload.to_string()
    }
}

/// Render the parameter's value as a Solidity expression of its type.
/// `byte_length` truncates dynamic `bytes`/`string` payloads.
#[must_use]
pub fn render_value(param: &ParsedParameter, byte_length: Option<usize>) -> String {
    let value = param.value.trim();
    match param.sol_type {
        SolType::Bool => {
            let digits = value.trim_start_matches('0');
            if digits == "1" || value.eq_ignore_ascii_case("true") {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        SolType::Address => {
            if is_hex_payload(value) {
                format_address(value)
            } else {
                format!("address(0) /* {value} */")
            }
        }
        SolType::Uint(_) => {
            if is_hex_payload(value) {
                format!("0x{value}")
            } else if value.is_empty() {
                "0".to_string()
            } else {
                value.to_string()
            }
        }
        SolType::Int(bits) => {
            if is_hex_payload(value) {
                format!("int{bits}(uint{bits}(0x{value}))")
            } else if value.is_empty() {
                "0".to_string()
            } else {
                value.to_string()
            }
        }
        SolType::FixedBytes(size) => {
            let width = usize::from(size) * 2;
            if !is_hex_payload(value) {
                return SolType::FixedBytes(size).zero_value();
            }
            let digits = if value.len() > width {
                &value[value.len() - width..]
            } else {
                value
            };
            format!("0x{digits:0>width$}")
        }
        SolType::Bytes | SolType::String => {
            if !is_hex_payload(value) {
                return "\"\"".to_string();
            }
            let mut payload = even_hex(value);
            if let Some(len) = byte_length {
                payload.truncate((len * 2).min(payload.len()));
            }
            if payload.is_empty() {
                return "\"\"".to_string();
            }
            if param.sol_type == SolType::String {
                format!("string(hex\"{payload}\")")
            } else {
                format!("hex\"{payload}\"")
            }
        }
    }
}

/// `T name = value;`
#[must_use]
pub fn render_declaration(
    param: &ParsedParameter,
    var_name: &str,
    byte_length: Option<usize>,
) -> String {
    format!(
        "{} = {};",
        param.sol_type.local_declaration(var_name),
        render_value(param, byte_length)
    )
}
