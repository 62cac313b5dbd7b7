mod case;
mod runner;
mod source;

pub use case::{ExpectedEvent, TestCase, TESTCASE_SCHEMA_V1};
pub use runner::{assert_case, run_case, RunReport};
pub use source::{read_test_case, read_units_xml_from_dir};

use std::path::PathBuf;

use thiserror::Error;

/// Failures while checking a suite against its test case.
#[derive(Debug, Error)]
pub enum SbToolError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("testcase {path} is not valid JSON: {source}")]
    ParseCase {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("testcase schema \"{found}\" is not supported (want \"{expected}\")")]
    InvalidSchemaVersion { expected: String, found: String },
    #[error("suite directory {path} holds no .unit.xml or .html units")]
    SourceEmpty { path: PathBuf },
    #[error(transparent)]
    Engine(#[from] sb_core::StepBlocksError),
    #[error("run did not finish within {max_steps} steps")]
    GuardExceeded { max_steps: usize },
    #[error("expected {expected} events but observed {actual}:\n{observed}")]
    EventCountMismatch {
        expected: usize,
        actual: usize,
        observed: String,
    },
    #[error("event #{index} differs: expected {expected}, observed {actual}")]
    EventMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("cannot render event as JSON: {0}")]
    EventSerialize(serde_json::Error),
}
