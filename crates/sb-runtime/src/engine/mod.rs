use std::path::PathBuf;

use sb_core::{CompiledSuite, GlobalAddress, ScriptUnit, StepBlocksError, Variables};

use crate::evaluator::ExpressionEvaluator;

mod branching;
mod bubbling;
mod callstack;
mod data_vars;
mod frame_stack;
mod lifecycle;
mod loops;
mod try_catch;

use bubbling::Bubbling;
use frame_stack::CallStack;

pub struct FlowEngineOptions {
    pub units: Vec<ScriptUnit>,
    /// Base directory for relative data file paths; defaults to each unit's directory.
    pub data_dir: Option<PathBuf>,
    pub evaluator: Option<Box<dyn ExpressionEvaluator>>,
}

impl FlowEngineOptions {
    pub fn new(units: Vec<ScriptUnit>) -> Self {
        Self {
            units,
            data_dir: None,
            evaluator: None,
        }
    }
}

/// Outcome of offering a failed command to the engine's try/catch handling.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDisposition {
    /// The engine redirected execution; the run continues.
    Handled,
    Unhandled(StepBlocksError),
}

/// One control-flow session over a compiled suite.
pub struct FlowEngine {
    suite: CompiledSuite,
    evaluator: Box<dyn ExpressionEvaluator>,
    data_dir: Option<PathBuf>,

    vars: Variables,
    call_stack: CallStack,
    nesting_level: i32,
    /// Deferred work, innermost last.
    bubblings: Vec<Bubbling>,
    pending_branch: Option<GlobalAddress>,
    exit_requested: bool,
    current: Option<GlobalAddress>,
}

#[cfg(test)]
pub(super) mod runtime_test_support {
    use super::*;
    pub(super) use sb_core::{Command, SbValue};

    use crate::host::{CommandHost, HostContext};

    pub(super) fn unit(name: &str, rows: &[(&str, &str, &str)]) -> ScriptUnit {
        ScriptUnit::new(
            name,
            rows.iter()
                .map(|(command, target, value)| Command::new(*command, *target, *value))
                .collect(),
        )
    }

    pub(super) fn engine_from_units(units: Vec<ScriptUnit>) -> FlowEngine {
        FlowEngine::new(FlowEngineOptions::new(units)).expect("engine should build")
    }

    /// `echo` records its evaluated target, `eval` evaluates silently, `fail` raises.
    #[derive(Debug, Default)]
    pub(super) struct RecordingHost {
        pub(super) echoes: Vec<String>,
    }

    impl CommandHost for RecordingHost {
        fn execute(&mut self, command: &Command, mut ctx: HostContext<'_>) -> Result<(), StepBlocksError> {
            match command.name.as_str() {
                "echo" => {
                    let value = ctx.evaluate(&command.target)?;
                    self.echoes.push(value.to_string());
                    Ok(())
                }
                "eval" => ctx.evaluate(&command.target).map(|_| ()),
                "fail" => Err(StepBlocksError::script(
                    "SCRIPT_COMMAND_FAILED",
                    command.target.clone(),
                )),
                other => Err(StepBlocksError::script(
                    "SCRIPT_UNKNOWN_COMMAND",
                    format!("Unknown command: {}", other),
                )),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) enum RunEnd {
        Finished,
        Exited,
    }

    pub(super) fn drive_engine(
        engine: &mut FlowEngine,
        host: &mut RecordingHost,
        entry: usize,
    ) -> Result<RunEnd, StepBlocksError> {
        engine.before_run()?;
        let first = GlobalAddress::new(entry, 0);
        let mut default = engine.suite().command_at(first).map(|_| first);
        for _ in 0..5_000usize {
            let Some(addr) = engine.compute_next_command(default) else {
                return Ok(RunEnd::Finished);
            };
            let command = engine
                .suite()
                .command_at(addr)
                .cloned()
                .expect("address should resolve");
            let result = if engine.handles(&command.name) {
                engine.execute(addr)
            } else {
                host.execute(&command, engine.host_context())
            };
            if let Err(error) = result {
                if let ErrorDisposition::Unhandled(error) = engine.handle_command_error(error) {
                    engine.abandon();
                    return Err(error);
                }
            }
            if engine.exit_requested() {
                engine.abandon();
                return Ok(RunEnd::Exited);
            }
            let next = addr.offset(1);
            default = engine.suite().command_at(next).map(|_| next);
        }
        panic!("flow should finish within the step limit");
    }

    pub(super) fn run_units(
        units: Vec<ScriptUnit>,
        preset: &[(&str, SbValue)],
    ) -> (Result<RunEnd, StepBlocksError>, Vec<String>, FlowEngine) {
        let mut engine = engine_from_units(units);
        for (name, value) in preset {
            engine.variables_mut().insert((*name).to_string(), value.clone());
        }
        let mut host = RecordingHost::default();
        let result = drive_engine(&mut engine, &mut host, 0);
        (result, host.echoes, engine)
    }
}

#[cfg(test)]
mod lifecycle_tests;
