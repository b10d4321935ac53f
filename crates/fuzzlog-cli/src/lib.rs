//! `fuzzlog` command-line front end.
//!
//! Commands read a whole log (file path or `-` for stdin) through a
//! [`LogSource`] so tests can drive them against in-memory logs.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fuzzlog_core::config::load_config;
use fuzzlog_core::{Fuzzer, FuzzingResults, FuzzlogError, GeneratorConfig};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Where log text and generator configuration come from.
pub trait LogSource {
    fn read_log(&self, path: &str) -> Result<String, String>;
    fn load_config(&self, explicit: Option<&Path>) -> Result<GeneratorConfig, String>;
}

/// Reads from the filesystem (or stdin for `-`) and loads configuration
/// from the usual file and `FUZZLOG_*` environment layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLogSource;

impl LogSource for FsLogSource {
    fn read_log(&self, path: &str) -> Result<String, String> {
        if path == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|err| format!("read stdin: {err}"))?;
            return Ok(buf);
        }
        std::fs::read_to_string(path)
            .map_err(FuzzlogError::from)
            .map_err(|err| format!("read {path}: {err}"))
    }

    fn load_config(&self, explicit: Option<&Path>) -> Result<GeneratorConfig, String> {
        let (cfg, used) = load_config(explicit).map_err(|err| err.to_string())?;
        if let Some(path) = used {
            log::debug!("loaded config from {}", path.display());
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLogSource {
    logs: BTreeMap<String, String>,
    configs: BTreeMap<PathBuf, String>,
    base_config: GeneratorConfig,
}

impl InMemoryLogSource {
    #[must_use]
    pub fn with_log(mut self, path: &str, content: &str) -> Self {
        self.logs.insert(path.to_string(), content.to_string());
        self
    }

    /// Register YAML served for an explicit `--config` path.
    #[must_use]
    pub fn with_config_file(mut self, path: &str, yaml: &str) -> Self {
        self.configs.insert(PathBuf::from(path), yaml.to_string());
        self
    }

    /// Configuration returned when no `--config` is given.
    #[must_use]
    pub fn with_base_config(mut self, config: GeneratorConfig) -> Self {
        self.base_config = config;
        self
    }
}

impl LogSource for InMemoryLogSource {
    fn read_log(&self, path: &str) -> Result<String, String> {
        self.logs
            .get(path)
            .cloned()
            .ok_or_else(|| format!("read {path}: no such file"))
    }

    fn load_config(&self, explicit: Option<&Path>) -> Result<GeneratorConfig, String> {
        let Some(path) = explicit else {
            return Ok(self.base_config.clone());
        };
        let Some(yaml) = self.configs.get(path) else {
            return Err(format!(
                "config: failed to load config file {}: no such file",
                path.display()
            ));
        };
        let cfg = GeneratorConfig::from_yaml_str(yaml).map_err(|err| err.to_string())?;
        cfg.validate().map_err(|err| format!("config: {err}"))?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help(&'static str),
    Version,
    Summary(SummaryArgs),
    Repro(ReproArgs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SummaryArgs {
    fuzzer: Fuzzer,
    path: String,
    json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReproArgs {
    fuzzer: Fuzzer,
    path: String,
    identifier: Option<String>,
    roll: bool,
    time: bool,
    prank: bool,
    stream: bool,
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    fuzzer: Fuzzer,
    #[serde(flatten)]
    results: &'a FuzzingResults,
}

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();
    run_with_source(&args, &FsLogSource, &mut out, &mut err)
}

pub fn run_for_test(args: &[&str], source: &dyn LogSource) -> CommandOutput {
    let owned_args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run_with_source(&owned_args, source, &mut stdout, &mut stderr);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

pub fn run_with_source(
    args: &[String],
    source: &dyn LogSource,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match execute(args, source, stdout) {
        Ok(()) => 0,
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            1
        }
    }
}

fn execute(args: &[String], source: &dyn LogSource, stdout: &mut dyn Write) -> Result<(), String> {
    match parse_args(args)? {
        Command::Help(text) => write!(stdout, "{text}").map_err(|err| err.to_string()),
        Command::Version => {
            writeln!(stdout, "fuzzlog {}", env!("CARGO_PKG_VERSION")).map_err(|err| err.to_string())
        }
        Command::Summary(parsed) => run_summary(&parsed, source, stdout),
        Command::Repro(parsed) => run_repro(&parsed, source, stdout),
    }
}

fn run_summary(
    parsed: &SummaryArgs,
    source: &dyn LogSource,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let logs = source.read_log(&parsed.path)?;
    let results = fuzzlog_parse::process_logs(&logs, parsed.fuzzer);

    if parsed.json {
        let report = SummaryReport {
            fuzzer: parsed.fuzzer,
            results: &results,
        };
        return write_json(stdout, &report);
    }

    let duration = if results.duration.is_empty() { "-" } else { results.duration.as_str() };
    writeln!(stdout, "Fuzzer:    {}", parsed.fuzzer).map_err(|err| err.to_string())?;
    writeln!(stdout, "Duration:  {duration}").map_err(|err| err.to_string())?;
    writeln!(stdout, "Coverage:  {}", results.coverage).map_err(|err| err.to_string())?;
    writeln!(
        stdout,
        "Tests:     {} ({} passed, {} failed)",
        results.number_of_tests, results.passed, results.failed
    )
    .map_err(|err| err.to_string())?;

    if results.broken_properties.is_empty() {
        writeln!(stdout, "Broken properties: none").map_err(|err| err.to_string())?;
        return Ok(());
    }
    writeln!(stdout, "Broken properties:").map_err(|err| err.to_string())?;
    for prop in &results.broken_properties {
        writeln!(stdout, "  - {}", prop.broken_property).map_err(|err| err.to_string())?;
    }
    Ok(())
}

fn run_repro(
    parsed: &ReproArgs,
    source: &dyn LogSource,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let mut config = source.load_config(parsed.config.as_deref())?;
    if let Some(identifier) = &parsed.identifier {
        config.identifier.clone_from(identifier);
    }
    config.vm.roll |= parsed.roll;
    config.vm.time |= parsed.time;
    config.vm.prank |= parsed.prank;
    config.validate()?;

    let fuzzer = parsed.fuzzer;
    let logs = source.read_log(&parsed.path)?;

    let rendered = if parsed.stream {
        let results = fuzzlog_parse::process_logs(&logs, fuzzer);
        let functions = fuzzlog_parse::results_to_functions(fuzzer, &results, &config);
        if functions.is_empty() {
            format!("// No failed properties found in {fuzzer} logs")
        } else {
            functions.join("\n\n")
        }
    } else {
        fuzzlog_parse::logs_to_functions(&logs, fuzzer, &config).map_err(|err| err.to_string())?
    };
    writeln!(stdout, "{rendered}").map_err(|err| err.to_string())
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some(first) = args.first() else {
        return Ok(Command::Help(HELP_TEXT));
    };
    let rest = &args[1..];
    match first.as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help(HELP_TEXT)),
        "-V" | "--version" | "version" => Ok(Command::Version),
        "summary" => parse_summary_args(rest),
        "repro" => parse_repro_args(rest),
        other => Err(format!("error: unknown command '{other}'\n\n{HELP_TEXT}")),
    }
}

fn parse_summary_args(args: &[String]) -> Result<Command, String> {
    let mut fuzzer = None;
    let mut json = false;
    let mut positionals = Vec::new();
    let mut index = 0usize;

    while let Some(token) = args.get(index) {
        match token.as_str() {
            "-h" | "--help" => return Ok(Command::Help(SUMMARY_HELP_TEXT)),
            "-f" | "--fuzzer" => {
                fuzzer = Some(parse_fuzzer(&take_value(args, index, "--fuzzer")?)?);
                index += 2;
            }
            "--json" => {
                json = true;
                index += 1;
            }
            "-" => {
                positionals.push(token.clone());
                index += 1;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("error: unknown argument for summary: '{flag}'"));
            }
            value => {
                positionals.push(value.to_string());
                index += 1;
            }
        }
    }

    let Some(fuzzer) = fuzzer else {
        return Err("error: --fuzzer is required".to_string());
    };
    Ok(Command::Summary(SummaryArgs {
        fuzzer,
        path: single_path(positionals)?,
        json,
    }))
}

fn parse_repro_args(args: &[String]) -> Result<Command, String> {
    let mut fuzzer = None;
    let mut identifier = None;
    let mut config = None;
    let (mut roll, mut time, mut prank, mut stream) = (false, false, false, false);
    let mut positionals = Vec::new();
    let mut index = 0usize;

    while let Some(token) = args.get(index) {
        match token.as_str() {
            "-h" | "--help" => return Ok(Command::Help(REPRO_HELP_TEXT)),
            "-f" | "--fuzzer" => {
                fuzzer = Some(parse_fuzzer(&take_value(args, index, "--fuzzer")?)?);
                index += 2;
            }
            "-i" | "--identifier" => {
                identifier = Some(take_value(args, index, "--identifier")?);
                index += 2;
            }
            "-c" | "--config" => {
                config = Some(PathBuf::from(take_value(args, index, "--config")?));
                index += 2;
            }
            "--roll" => {
                roll = true;
                index += 1;
            }
            "--time" => {
                time = true;
                index += 1;
            }
            "--prank" => {
                prank = true;
                index += 1;
            }
            "--vm" => {
                (roll, time, prank) = (true, true, true);
                index += 1;
            }
            "--stream" => {
                stream = true;
                index += 1;
            }
            "-" => {
                positionals.push(token.clone());
                index += 1;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("error: unknown argument for repro: '{flag}'"));
            }
            value => {
                positionals.push(value.to_string());
                index += 1;
            }
        }
    }

    let Some(fuzzer) = fuzzer else {
        return Err("error: --fuzzer is required".to_string());
    };
    Ok(Command::Repro(ReproArgs {
        fuzzer,
        path: single_path(positionals)?,
        identifier,
        roll,
        time,
        prank,
        stream,
        config,
    }))
}

fn parse_fuzzer(raw: &str) -> Result<Fuzzer, String> {
    raw.parse::<Fuzzer>().map_err(|err| format!("error: {err}"))
}

fn single_path(positionals: Vec<String>) -> Result<String, String> {
    match positionals.len() {
        0 => Err("error: log path required (use - for stdin)".to_string()),
        1 => Ok(positionals.into_iter().next().unwrap_or_default()),
        _ => Err("error: accepts at most 1 argument, received multiple".to_string()),
    }
}

fn take_value(args: &[String], index: usize, flag: &str) -> Result<String, String> {
    match args.get(index + 1) {
        Some(value) if !value.starts_with('-') || value == "-" => Ok(value.clone()),
        _ => Err(format!("error: flag needs an argument: {flag}")),
    }
}

fn write_json<T: Serialize>(stdout: &mut dyn Write, value: &T) -> Result<(), String> {
    serde_json::to_writer_pretty(&mut *stdout, value).map_err(|err| err.to_string())?;
    writeln!(stdout).map_err(|err| err.to_string())
}

const HELP_TEXT: &str = "\
Summarise fuzzer logs and generate Foundry reproductions.

Usage:
  fuzzlog <command> [flags]

Commands:
  summary   print run statistics and broken properties
  repro     print one Solidity test function per broken property

Flags:
  -h, --help      show help
  -V, --version   print version

Logging is controlled by FUZZLOG_LOG (default: warn).
";

const SUMMARY_HELP_TEXT: &str = "\
Print run statistics and broken properties.

Usage:
  fuzzlog summary --fuzzer <echidna|medusa|halmos> <log|->

Flags:
  -f, --fuzzer NAME   tool that produced the log
      --json          emit the full results as JSON
";

const REPRO_HELP_TEXT: &str = "\
Print one Solidity test function per broken property.

Usage:
  fuzzlog repro --fuzzer <echidna|medusa|halmos> <log|-> [flags]

Flags:
  -f, --fuzzer NAME       tool that produced the log
  -i, --identifier ID     suffix for generated function names
  -c, --config FILE       YAML generator config
      --roll              emit vm.roll for block changes
      --time              emit vm.warp for time changes
      --prank             emit vm.prank for callers
      --vm                all of --roll, --time and --prank
      --stream            render from the streaming classifier instead of batch extraction
";
