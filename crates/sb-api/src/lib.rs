use std::collections::BTreeMap;
use std::path::PathBuf;

use sb_compiler::{compile_suite_from_xml_map, parse_units_from_xml_map};
use sb_core::{CompiledSuite, StepBlocksError};
use sb_runtime::{ExpressionEvaluator, FlowEngine, FlowEngineOptions};

mod host;
mod run;

pub use host::{expand_placeholders, BasicHost};
pub use run::{resolve_entry_unit, run_unit, RunOptions, RunOutcome, RunReport, DEFAULT_MAX_STEPS};

pub struct CreateEngineFromXmlOptions {
    pub units_xml: BTreeMap<String, String>,
    pub data_dir: Option<PathBuf>,
    pub evaluator: Option<Box<dyn ExpressionEvaluator>>,
}

impl CreateEngineFromXmlOptions {
    pub fn new(units_xml: BTreeMap<String, String>) -> Self {
        Self {
            units_xml,
            data_dir: None,
            evaluator: None,
        }
    }
}

pub fn compile_units_from_xml_map(
    units_xml: &BTreeMap<String, String>,
) -> Result<CompiledSuite, StepBlocksError> {
    compile_suite_from_xml_map(units_xml)
}

pub fn create_engine_from_xml(
    options: CreateEngineFromXmlOptions,
) -> Result<FlowEngine, StepBlocksError> {
    let units = parse_units_from_xml_map(&options.units_xml)?;
    FlowEngine::new(FlowEngineOptions {
        units,
        data_dir: options.data_dir,
        evaluator: options.evaluator,
    })
}

/// Builds an engine and runs the entry unit with the reference host.
pub fn run_suite_from_xml(
    options: CreateEngineFromXmlOptions,
    run_options: &RunOptions,
) -> Result<(RunReport, Vec<String>), StepBlocksError> {
    let mut engine = create_engine_from_xml(options)?;
    let mut host = BasicHost::new();
    let report = run_unit(&mut engine, &mut host, run_options)?;
    Ok((report, host.take_echoes()))
}
