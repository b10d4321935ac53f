//! Solidity reproduction-test generation.
//!
//! One function per broken property:
//!
//! ```text
//! function test_check_xor_bool_bool__run_0() public {
//!     // Counterexample for: check_xor(bool,bool)
//!     bool a = false;
//!     bool b = true;
//!
//!     check_xor(a, b);
//! }
//! ```
//!
//! Parameter lines become typed locals, array symbols become an array
//! construction block, and call lines are replayed in order with their
//! arguments resolved against the declared locals.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use fuzzlog_core::address::format_address;
use fuzzlog_core::text::{cached_regex, matching_close, sanitize_identifier, split_top_level};
use fuzzlog_core::{property_key, PropertyAndSequence, Sequence, VmOptions, END_TRACE};
use regex::Regex;

use crate::arrays::{detect_array_groups, ArrayGroup};
use crate::calls::{
    parse_call, parse_delay, render_literal, Advance, CallEnvironment, ParsedCall, SequenceStep,
};
use crate::params::{
    clean_parameter_name, is_reference, length_target, parse_parameter_line, render_declaration,
    symbol_stem, ParsedParameter, SolType, HALMOS_PREFIX, PARAM_PREFIX,
};

const INDENT: &str = "    ";

/// Identifiers a local must not shadow.
const RESERVED: &[&str] = &[
    "address", "bool", "string", "bytes", "byte", "uint", "int", "vm", "block", "msg", "tx", "this",
    "super", "now", "new", "delete", "return", "returns", "function", "memory", "storage",
    "calldata", "mapping", "struct", "enum", "event", "error", "emit", "type", "true", "false",
    "public", "private", "internal", "external", "payable", "view", "pure", "constant", "if",
    "else", "for", "while", "do", "break", "continue", "try", "catch", "assert", "require",
    "revert", "contract", "library", "interface", "modifier", "is", "using", "var", "let",
];

/// `test_<property>_<identifier>_<index>` with every non-word character
/// replaced by `_`.
#[must_use]
pub fn test_function_name(property: &str, identifier: &str, index: usize) -> String {
    format!(
        "test_{}_{}_{index}",
        sanitize_identifier(property),
        sanitize_identifier(identifier)
    )
}

/// Invariant-style properties get a trailing direct call after the replay.
#[must_use]
pub fn is_invariant_property(property: &str) -> bool {
    let key = property_key(property);
    key.to_ascii_lowercase().contains("invariant")
        || key.starts_with("echidna_")
        || key.starts_with("property_")
}

/// Placeholder for a property nothing could be reconstructed from. Still a
/// balanced, compilable function.
#[must_use]
pub fn unable_to_process(property: &str, function_name: &str) -> String {
    log::debug!("unable to reconstruct a reproduction for {property}");
    format!(
        "// NOTE: Unable to process {property}\n\
         function {function_name}() public {{\n\
         {INDENT}// Counterexample for: {property}\n}}"
    )
}

/// Render one reproduction function.
#[must_use]
pub fn generate_test_function(
    entry: &PropertyAndSequence,
    identifier: &str,
    index: usize,
    vm: VmOptions,
) -> String {
    let property = entry.broken_property.as_str();
    let name = test_function_name(property, identifier, index);
    let lines = match &entry.sequence {
        Sequence::Lines(lines) if !entry.sequence.is_empty() => lines,
        _ => return unable_to_process(property, &name),
    };

    let (params, steps) = classify(lines);
    let locals = Locals::declare(&params);
    let halmos = HalmosEnvironment::from_params(&params);

    let mut calls = Vec::new();
    let mut call_index = 0;
    for step in &steps {
        match step {
            SequenceStep::Delay(env) => calls.extend(environment_statements(env, vm)),
            SequenceStep::Call(call) => {
                call_index += 1;
                let env = halmos.merge(&call.env, call_index);
                calls.extend(environment_statements(&env, vm));
                calls.push(locals.render_call(call, &env));
            }
        }
    }

    if call_index == 0 {
        match locals.property_call(property) {
            Some(call) => calls.push(call),
            None if locals.is_empty() => return unable_to_process(property, &name),
            None => calls.push(format!(
                "// NOTE: could not reconstruct a call to {}",
                property_key(property)
            )),
        }
    } else if is_invariant_property(property) {
        let call = locals
            .property_call(property)
            .unwrap_or_else(|| format!("{}();", property_key(property)));
        calls.push(call);
    }

    let mut body = vec![format!("// Counterexample for: {property}")];
    let declarations = locals.declaration_lines();
    if !declarations.is_empty() {
        body.extend(declarations);
        body.push(String::new());
    }
    body.extend(calls);

    let mut out = format!("function {name}() public {{\n");
    for line in body {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(INDENT);
            out.push_str(&line);
            out.push('\n');
        }
    }
    out.push('}');
    out
}

/// Split sequence lines into parameters and replay steps, order kept.
fn classify(lines: &[String]) -> (Vec<ParsedParameter>, Vec<SequenceStep>) {
    let mut params = Vec::new();
    let mut steps = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.contains(END_TRACE) {
            continue;
        }
        if let Some(param) = parse_parameter_line(line) {
            params.push(param);
        } else if let Some(env) = parse_delay(line) {
            steps.push(SequenceStep::Delay(env));
        } else if let Some(call) = parse_call(line) {
            steps.push(SequenceStep::Call(call));
        } else {
            log::trace!("skipped sequence line: {line}");
        }
    }
    (params, steps)
}

fn environment_statements(env: &CallEnvironment, vm: VmOptions) -> Vec<String> {
    let mut out = Vec::new();
    if !vm.any() {
        return out;
    }
    if vm.roll {
        out.extend(env.roll_statement());
    }
    if vm.time {
        out.extend(env.warp_statement());
    }
    if vm.prank {
        if let Some(sender) = env.sender.as_deref().filter(|s| s.starts_with("0x")) {
            out.push(format!("vm.prank({sender});"));
        }
    }
    out
}

#[derive(Debug, Clone)]
struct Declared {
    raw: String,
    clean: String,
    var: String,
    ty: SolType,
    is_element: bool,
}

/// Declared locals plus the symbol → variable mapping used to resolve call
/// arguments.
#[derive(Debug, Default)]
struct Locals {
    declared: Vec<Declared>,
    declaration_lines: Vec<String>,
    groups: Vec<ArrayGroup>,
    /// Raw symbol or array name → variable.
    names: HashMap<String, String>,
}

impl Locals {
    fn declare(params: &[ParsedParameter]) -> Self {
        let byte_lengths: HashMap<String, usize> = params
            .iter()
            .filter_map(|p| {
                let target = length_target(&p.raw_name)?;
                let len = usize::try_from(p.numeric_value()?).ok()?;
                Some((target, len))
            })
            .collect();

        let mut locals = Self::default();
        let mut used: HashSet<String> = HashSet::new();
        for param in params {
            if !param.is_fuzz_input()
                || param.is_length_helper()
                || locals.names.contains_key(&param.raw_name)
            {
                continue;
            }
            let var = unique_name(&param.clean_name, &mut used);
            let stem = symbol_stem(&param.raw_name);
            let byte_length = byte_lengths.get(&stem).copied();
            locals
                .declaration_lines
                .push(render_declaration(param, &var, byte_length));
            locals.names.insert(param.raw_name.clone(), var.clone());
            locals.declared.push(Declared {
                raw: param.raw_name.clone(),
                clean: param.clean_name.clone(),
                var,
                ty: param.sol_type,
                is_element: stem.contains('['),
            });
        }

        locals.groups = detect_array_groups(params, &locals.names);
        for group in &locals.groups {
            locals.declaration_lines.extend(group.render());
            locals.names.insert(group.name.clone(), group.variable_name());
        }
        locals
    }

    fn is_empty(&self) -> bool {
        self.declaration_lines.is_empty()
    }

    fn declaration_lines(&self) -> Vec<String> {
        self.declaration_lines.clone()
    }

    fn render_call(&self, call: &ParsedCall, env: &CallEnvironment) -> String {
        let args: Vec<String> =
            call.parameters.iter().map(|arg| self.resolve_argument(arg)).collect();
        let mut line = format!("{}({});", call.function, args.join(", "));
        if let Some(value) = &env.value {
            line.push_str(&format!(" // value: {value}"));
        }
        line
    }

    /// Map a call argument to a declared local. Literals are rendered
    /// directly; unresolvable symbols are passed through.
    fn resolve_argument(&self, token: &str) -> String {
        let token = token.trim();
        if !is_reference(token) {
            return render_literal(token);
        }
        if let Some(var) = self.names.get(token) {
            return var.clone();
        }
        let stem = symbol_stem(token);
        if let Some(var) = self.names.get(&stem) {
            return var.clone();
        }
        let clean = clean_parameter_name(token);
        if let Some(found) = self.declared.iter().find(|d| d.clean == clean) {
            return found.var.clone();
        }
        let base = stem.split('[').next().unwrap_or(&stem);
        let by_prefix = [format!("{PARAM_PREFIX}{base}_"), format!("{PARAM_PREFIX}{base}[")];
        if let Some(found) = self
            .declared
            .iter()
            .find(|d| by_prefix.iter().any(|prefix| d.raw.starts_with(prefix.as_str())))
        {
            return found.var.clone();
        }
        log::trace!("unresolved call argument {token}");
        token.to_string()
    }

    /// Direct call to the property, arguments matched to locals by type and
    /// position.
    fn property_call(&self, property: &str) -> Option<String> {
        let (name, types) = parse_signature(property)?;
        let scalars: Vec<&Declared> = self.declared.iter().filter(|d| !d.is_element).collect();
        let mut used = vec![false; scalars.len()];
        let mut used_groups = vec![false; self.groups.len()];

        let mut take = |pred: &dyn Fn(&Declared) -> bool| -> Option<String> {
            let idx = scalars
                .iter()
                .enumerate()
                .position(|(idx, d)| !used[idx] && pred(*d))?;
            used[idx] = true;
            Some(scalars[idx].var.clone())
        };

        let mut args = Vec::with_capacity(types.len());
        for ty in &types {
            if let Some(element) = ty.strip_suffix("[]") {
                let found = self.groups.iter().enumerate().position(|(idx, g)| {
                    !used_groups[idx] && g.element_type.to_string() == element.trim()
                });
                match found {
                    Some(idx) => {
                        used_groups[idx] = true;
                        args.push(self.groups[idx].variable_name());
                    }
                    None => args.push(format!("new {}(0)", ty.trim())),
                }
            } else if let Some(sol) = SolType::parse(ty) {
                args.push(take(&|d: &Declared| d.ty == sol).unwrap_or_else(|| sol.zero_value()));
            } else {
                args.push(take(&|_: &Declared| true).unwrap_or_else(|| "0".to_string()));
            }
        }
        Some(format!("{name}({});", args.join(", ")))
    }
}

fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let base = if RESERVED.contains(&base) || SolType::parse(base).is_some() {
        format!("{base}_param")
    } else {
        base.to_string()
    };
    let mut candidate = base.clone();
    let mut n = 1;
    while used.contains(&candidate) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// `check(uint256,bool[])` → (`check`, [`uint256`, `bool[]`]).
fn parse_signature(property: &str) -> Option<(String, Vec<String>)> {
    let property = property.trim();
    let open = property.find('(')?;
    let close = matching_close(property, open)?;
    let name = property[..open].trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), split_top_level(&property[open + 1..close])))
}

/// Block/timestamp/sender symbols Halmos reports per call depth.
#[derive(Debug, Default)]
struct HalmosEnvironment {
    timestamps: BTreeMap<usize, String>,
    block_numbers: BTreeMap<usize, String>,
    /// Every `halmos_*` symbol's value.
    values: HashMap<String, String>,
}

impl HalmosEnvironment {
    fn from_params(params: &[ParsedParameter]) -> Self {
        static TIMESTAMP: OnceLock<Option<Regex>> = OnceLock::new();
        static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();

        let depth =
            |cell: &'static OnceLock<Option<Regex>>, pattern: &str, raw: &str| -> Option<usize> {
                cached_regex(cell, pattern)?.captures(raw)?.get(1)?.as_str().parse().ok()
            };

        let mut env = Self::default();
        for param in params.iter().filter(|p| p.raw_name.starts_with(HALMOS_PREFIX)) {
            env.values.insert(param.raw_name.clone(), param.value.clone());
            if param.value.is_empty() {
                continue;
            }
            let raw = param.raw_name.as_str();
            if let Some(k) = depth(&TIMESTAMP, r"^halmos_block_timestamp_depth(\d+)_", raw) {
                env.timestamps.insert(k, format!("0x{}", param.value));
            } else if let Some(k) = depth(&NUMBER, r"^halmos_block_number_depth(\d+)_", raw) {
                env.block_numbers.insert(k, format!("0x{}", param.value));
            }
        }
        env
    }

    /// Fill gaps in a call's own environment from the depth symbols and
    /// resolve a symbolic caller to a concrete address.
    fn merge(&self, call_env: &CallEnvironment, depth: usize) -> CallEnvironment {
        let mut env = call_env.clone();
        if env.block.is_none() {
            env.block = self.block_numbers.get(&depth).cloned().map(Advance::Absolute);
        }
        if env.time.is_none() {
            env.time = self.timestamps.get(&depth).cloned().map(Advance::Absolute);
        }
        env.sender = env.sender.as_deref().and_then(|sender| self.resolve_sender(sender));
        env
    }

    fn resolve_sender(&self, sender: &str) -> Option<String> {
        static EMBEDDED: OnceLock<Option<Regex>> = OnceLock::new();
        if !sender.starts_with(HALMOS_PREFIX) {
            return Some(sender.to_string());
        }
        if let Some(value) = self.values.get(sender).filter(|v| !v.is_empty()) {
            return Some(format_address(value));
        }
        cached_regex(&EMBEDDED, r"0x[0-9a-fA-F]{40}")
            .and_then(|re| re.find(sender))
            .map(|m| format_address(m.as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> PropertyAndSequence {
        PropertyAndSequence::lines("prop", raw.iter().map(|l| (*l).to_string()).collect())
    }

    fn named(name: &str, raw: &[&str]) -> PropertyAndSequence {
        PropertyAndSequence::lines(name, raw.iter().map(|l| (*l).to_string()).collect())
    }

    #[test]
    fn function_names_are_sanitized() {
        assert_eq!(
            test_function_name("check_xor(bool,bool)", "run", 0),
            "test_check_xor_bool_bool__run_0"
        );
        assert_eq!(test_function_name("echidna_ok", "", 3), "test_echidna_ok__3");
    }

    #[test]
    fn invariant_detection() {
        assert!(is_invariant_property("invariant_never_manager()"));
        assert!(is_invariant_property("echidna_solvent"));
        assert!(is_invariant_property("property_total_supply()"));
        assert!(!is_invariant_property("check_xor(bool,bool)"));
    }

    #[test]
    fn property_call_fallback_matches_types_positionally() {
        let out = generate_test_function(
            &named(
                "check_mixed(address,bool,uint256)",
                &[
                    "p_flag_bool_aa_00 = 0x01",
                    "p_who_address_bb_01 = 0x10000",
                    "p_n_uint256_cc_02 = 0x05",
                ],
            ),
            "r",
            0,
            VmOptions::default(),
        );
        assert!(out.contains("bool flag = true;"));
        assert!(out.contains("address who = 0x0000000000000000000000000000000000010000;"));
        assert!(out.contains("uint256 n = 0x05;"));
        assert!(out.contains("    check_mixed(who, flag, n);\n"));
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let out = generate_test_function(
            &lines(&[
                "p_amount_uint256_aa_00 = 0x01",
                "p_amount_uint256_bb_01 = 0x02",
                "CALL C::deposit(p_amount_uint256_aa_00)",
                "CALL C::deposit(p_amount_uint256_bb_01)",
            ]),
            "r",
            0,
            VmOptions::default(),
        );
        assert!(out.contains("uint256 amount = 0x01;"));
        assert!(out.contains("uint256 amount_1 = 0x02;"));
        assert!(out.contains("deposit(amount);\n    deposit(amount_1);"));
    }

    #[test]
    fn reserved_names_are_renamed() {
        let out = generate_test_function(
            &lines(&["p_block_uint256_aa_00 = 0x01", "CALL C::f(p_block_uint256_aa_00)"]),
            "r",
            0,
            VmOptions::default(),
        );
        assert!(out.contains("uint256 block_param = 0x01;"));
        assert!(out.contains("f(block_param);"));
    }

    #[test]
    fn halmos_environment_before_calls() {
        let out = generate_test_function(
            &named(
                "invariant_x()",
                &[
                    "halmos_block_timestamp_depth1_6c7bfa9 = 0x8000000000000000",
                    "p_entropy_uint256_bf67ff6_37 = 0x00",
                    "CALL CryticToFoundry::switchActor(p_entropy_uint256_bf67ff6_37) \
                     (caller: halmos_msg_sender_\
                     0x7fa9385be102ac3eac297483dd6233d62b3e1496_9282034_35)",
                ],
            ),
            "r",
            0,
            VmOptions::all(),
        );
        assert!(out.contains(concat!(
            "    vm.warp(0x8000000000000000);\n",
            "    vm.prank(0x7FA9385bE102ac3EAc297483Dd6233D62b3e1496);\n",
            "    switchActor(entropy);\n",
            "    invariant_x();\n",
        )));
    }

    #[test]
    fn vm_statements_follow_flags() {
        let entry = lines(&[
            "1) CryticTester.deposit(uint256)(5) \
             (block=2, time=7, gas=12500000, gasprice=1, value=0, sender=0x10000)",
        ]);
        let plain = generate_test_function(&entry, "r", 0, VmOptions::default());
        assert!(!plain.contains("vm."));
        let rolled = generate_test_function(
            &entry,
            "r",
            0,
            VmOptions {
                roll: true,
                time: false,
                prank: false,
            },
        );
        assert!(rolled.contains("    vm.roll(2);\n    deposit(5);\n"));
        assert!(!rolled.contains("vm.warp"));
    }

    #[test]
    fn echidna_delays_are_relative() {
        let out = generate_test_function(
            &lines(&[
                "CryticTester.deposit(100) from: 0x0000000000000000000000000000000000010000 \
                 Time delay: 3 seconds Block delay: 2",
                "*wait* Time delay: 5 seconds Block delay: 0",
                "CryticTester.check(0x00000000000000000000000000000000deadbeef)",
            ]),
            "r",
            0,
            VmOptions::all(),
        );
        assert!(out.contains(concat!(
            "    vm.roll(block.number + 2);\n",
            "    vm.warp(block.timestamp + 3);\n",
            "    vm.prank(0x0000000000000000000000000000000000010000);\n",
            "    deposit(100);\n",
        )));
        assert!(out.contains("    vm.warp(block.timestamp + 5);\n    check("));
        assert!(!out.contains("block.number + 0"));
    }

    #[test]
    fn unparsed_sequence_is_a_placeholder() {
        let out = generate_test_function(
            &PropertyAndSequence::unparsed("weird", "garbage"),
            "r",
            1,
            VmOptions::default(),
        );
        assert_eq!(
            out,
            concat!(
                "// NOTE: Unable to process weird\n",
                "function test_weird_r_1() public {\n",
                "    // Counterexample for: weird\n}",
            )
        );
    }

    #[test]
    fn declarations_without_signature_leave_a_note() {
        let entry = lines(&["p_x_uint256_aa_00 = 0x01"]);
        let out = generate_test_function(&entry, "r", 0, VmOptions::default());
        assert!(out.contains("uint256 x = 0x01;"));
        assert!(out.contains("// NOTE: could not reconstruct a call to prop"));
        assert_eq!(out.matches('{').count(), 1);
        assert_eq!(out.matches('}').count(), 1);
    }

    #[test]
    fn invariant_with_parameters_gets_typed_trailing_call() {
        let out = generate_test_function(
            &named(
                "invariant_bounded(uint256)",
                &["p_cap_uint256_aa_00 = 0x05", "CALL CryticToFoundry::poke()"],
            ),
            "r",
            0,
            VmOptions::default(),
        );
        assert!(out.ends_with("    poke();\n    invariant_bounded(cap);\n}"), "{out}");
    }

    #[test]
    fn empty_sequence_is_a_placeholder() {
        let out = generate_test_function(&named("check_x()", &[]), "r", 0, VmOptions::all());
        assert!(out.starts_with("// NOTE: Unable to process check_x()\n"));
    }

    #[test]
    fn oversized_array_output_stays_small() {
        let out = generate_test_function(
            &named(
                "check_arr(uint256[])",
                &["p_arr[0]_uint256_aa_00 = 0x01", "p_arr_length_bb_01 = 0x1000000"],
            ),
            "r",
            0,
            VmOptions::default(),
        );
        assert!(out.lines().count() < 16, "{out}");
        assert!(out.contains("// NOTE: length 16777216 exceeds 256"));
        assert!(out.contains("check_arr(arr_array);"));
    }
}
