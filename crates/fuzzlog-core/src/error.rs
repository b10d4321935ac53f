use std::fmt;

use crate::model::Fuzzer;

#[derive(Debug, thiserror::Error)]
pub enum FuzzlogError {
    #[error("unknown fuzzer {0:?}; valid fuzzers: [{valid}]", valid = valid_fuzzers())]
    UnknownFuzzer(String),
    #[error("misaligned extraction: {headers} property headers for {bodies} sequence bodies")]
    MisalignedExtraction { headers: usize, bodies: usize },
    #[error("config: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(String),
}

fn valid_fuzzers() -> String {
    Fuzzer::ALL.map(Fuzzer::slug).join(" ")
}

impl FuzzlogError {
    pub fn config(message: impl fmt::Display) -> Self {
        Self::Config(message.to_string())
    }
}

impl From<std::io::Error> for FuzzlogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
