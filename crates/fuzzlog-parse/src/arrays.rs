//! Array reconstruction from flattened counterexample symbols.
//!
//! Dynamic arrays show up as one symbol per element plus a length symbol:
//!
//! ```text
//! p_arr[0]_uint256_6ee061f_00 = 0x05
//! p_arr[1]_uint256_0b1e4a2_01 = 0x07
//! p_arr_length_3493a6d_00     = 0x02
//! ```
//!
//! The element variables are declared individually by the generator; this
//! module groups them and emits `uint256[] memory arr_array = new
//! uint256[](2);` plus one assignment per index.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use fuzzlog_core::text::{cached_regex, sanitize_identifier};
use regex::Regex;

use crate::params::{ParsedParameter, SolType};

/// Longest array filled slot by slot. Longer arrays only get the slots the
/// counterexample names.
pub const MAX_ARRAY_SLOTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayGroup {
    /// Array name as it appears in the symbols (`arr`).
    pub name: String,
    pub element_type: SolType,
    pub length: usize,
    /// Index → declared element variable.
    pub elements: BTreeMap<usize, String>,
    /// Index → byte length for nested `bytes` elements.
    pub element_lengths: BTreeMap<usize, usize>,
}

impl ArrayGroup {
    fn new(name: &str, element_type: SolType) -> Self {
        Self {
            name: name.to_string(),
            element_type,
            length: 0,
            elements: BTreeMap::new(),
            element_lengths: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn variable_name(&self) -> String {
        format!("{}_array", sanitize_identifier(&self.name))
    }

    /// Declaration followed by one assignment per slot, or per recovered
    /// slot once the length exceeds [`MAX_ARRAY_SLOTS`].
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let var = self.variable_name();
        let ty = self.element_type;
        let mut lines = vec![format!("{ty}[] memory {var} = new {ty}[]({});", self.length)];

        if self.length > MAX_ARRAY_SLOTS {
            log::debug!(
                "array {} has length {}, assigning recovered slots only",
                self.name,
                self.length
            );
            lines.push(format!(
                "// NOTE: length {} exceeds {MAX_ARRAY_SLOTS}; unlisted slots keep their default",
                self.length
            ));
            let mut recovered: Vec<usize> = self
                .elements
                .keys()
                .chain(self.element_lengths.keys())
                .copied()
                .filter(|idx| *idx < self.length)
                .collect();
            recovered.sort_unstable();
            recovered.dedup();
            for idx in recovered {
                lines.push(self.assignment(&var, idx));
            }
            return lines;
        }

        for idx in 0..self.length {
            lines.push(self.assignment(&var, idx));
        }
        lines
    }

    fn assignment(&self, var: &str, idx: usize) -> String {
        let ty = self.element_type;
        let value = match (self.elements.get(&idx), self.element_lengths.get(&idx)) {
            (Some(element), _) => element.clone(),
            (None, Some(len)) if ty == SolType::Bytes => format!("new bytes({len})"),
            _ => ty.zero_value(),
        };
        format!("{var}[{idx}] = {value};")
    }
}

struct ArrayPatterns {
    element: &'static Regex,
    nested_length: &'static Regex,
    length: &'static Regex,
}

fn patterns() -> Option<ArrayPatterns> {
    static ELEMENT: OnceLock<Option<Regex>> = OnceLock::new();
    static NESTED: OnceLock<Option<Regex>> = OnceLock::new();
    static LENGTH: OnceLock<Option<Regex>> = OnceLock::new();
    Some(ArrayPatterns {
        element: cached_regex(
            &ELEMENT,
            r"^p_(.+?)\[(\d+)\]_(address|bool|string|bytes\d*|u?int\d*)_",
        )?,
        nested_length: cached_regex(&NESTED, r"^p_(.+?)\[(\d+)\]_length_")?,
        length: cached_regex(&LENGTH, r"^p_([^\[\]]+)_length_")?,
    })
}

/// Group array symbols. `declared` maps raw symbol → declared variable for
/// the element parameters. Groups come back in first-seen order.
#[must_use]
pub fn detect_array_groups(
    params: &[ParsedParameter],
    declared: &HashMap<String, String>,
) -> Vec<ArrayGroup> {
    let Some(patterns) = patterns() else {
        return Vec::new();
    };
    let mut groups: Vec<ArrayGroup> = Vec::new();
    let mut explicit_lengths: Vec<(String, usize)> = Vec::new();

    let bytes_names: Vec<String> = params
        .iter()
        .filter(|p| p.sol_type == SolType::Bytes || p.sol_type == SolType::String)
        .map(|p| crate::params::symbol_stem(&p.raw_name))
        .collect();

    for param in params {
        let raw = param.raw_name.as_str();
        if let Some(caps) = patterns.nested_length.captures(raw) {
            let (Some(name), Some(idx)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Ok(idx) = idx.as_str().parse::<usize>() else {
                continue;
            };
            let group = group_entry(&mut groups, name.as_str(), SolType::Bytes);
            group.length = group.length.max(idx.saturating_add(1));
            if let Some(len) = param.numeric_value().and_then(|n| usize::try_from(n).ok()) {
                group.element_lengths.insert(idx, len);
            }
        } else if let Some(caps) = patterns.element.captures(raw) {
            let (Some(name), Some(idx)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Ok(idx) = idx.as_str().parse::<usize>() else {
                continue;
            };
            let group = group_entry(&mut groups, name.as_str(), param.sol_type);
            group.length = group.length.max(idx.saturating_add(1));
            if let Some(var) = declared.get(raw) {
                group.elements.entry(idx).or_insert_with(|| var.clone());
            }
        } else if let Some(caps) = patterns.length.captures(raw) {
            let Some(name) = caps.get(1) else {
                continue;
            };
            if let Some(len) = param.numeric_value().and_then(|n| usize::try_from(n).ok()) {
                explicit_lengths.push((name.as_str().to_string(), len));
            }
        }
    }

    // A length helper is authoritative for element groups; for plain
    // `bytes`/`string` parameters it is a byte length, not an array.
    for (name, len) in &explicit_lengths {
        if let Some(group) = groups.iter_mut().find(|g| &g.name == name) {
            group.length = *len;
            group.elements.retain(|idx, _| idx < len);
        } else if !bytes_names.iter().any(|stem| stem == name) {
            let mut group = ArrayGroup::new(name, length_only_type(name));
            group.length = *len;
            groups.push(group);
        }
    }
    groups
}

fn group_entry<'a>(
    groups: &'a mut Vec<ArrayGroup>,
    name: &str,
    element_type: SolType,
) -> &'a mut ArrayGroup {
    let idx = match groups.iter().position(|g| g.name == name) {
        Some(idx) => idx,
        None => {
            groups.push(ArrayGroup::new(name, element_type));
            groups.len() - 1
        }
    };
    &mut groups[idx]
}

/// Element type for an array known only by its length helper.
fn length_only_type(name: &str) -> SolType {
    let lower = name.to_ascii_lowercase();
    if lower.contains("address") || lower.contains("keys") {
        SolType::Address
    } else if lower.contains("bool") {
        SolType::Bool
    } else {
        SolType::Uint(256)
    }
}
