use sb_core::{CompiledSuite, GlobalAddress, StepBlocksError};
use sb_runtime::{CommandHost, ErrorDisposition, FlowEngine};
use tracing::{debug, warn};

pub const DEFAULT_MAX_STEPS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Unit to start in; `main` when absent.
    pub entry_unit: Option<String>,
    pub max_steps: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            entry_unit: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Passed,
    /// Stopped by `exitTest`.
    Exited,
    Failed(StepBlocksError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub steps: usize,
}

pub fn resolve_entry_unit(
    suite: &CompiledSuite,
    explicit: Option<&str>,
) -> Result<usize, StepBlocksError> {
    if let Some(entry) = explicit {
        return suite.unit_index(entry).ok_or_else(|| {
            StepBlocksError::assertion(
                "API_ENTRY_UNIT_NOT_FOUND",
                format!("Entry unit \"{}\" is not registered.", entry),
            )
        });
    }
    suite.unit_index("main").ok_or_else(|| {
        StepBlocksError::assertion(
            "API_ENTRY_MAIN_NOT_FOUND",
            "Expected a unit with name=\"main\" as default entry.",
        )
    })
}

fn successor(engine: &FlowEngine, addr: GlobalAddress) -> Option<GlobalAddress> {
    let next = addr.offset(1);
    engine.suite().command_at(next).map(|_| next)
}

/// Host step loop: one command per step, flow commands to the engine, the rest
/// to `host`. Errors before the first step are returned; failures during the
/// run end up in the report.
pub fn run_unit(
    engine: &mut FlowEngine,
    host: &mut dyn CommandHost,
    options: &RunOptions,
) -> Result<RunReport, StepBlocksError> {
    engine.before_run()?;
    let entry = resolve_entry_unit(engine.suite(), options.entry_unit.as_deref())?;
    let first = GlobalAddress::new(entry, 0);
    let mut default = engine.suite().command_at(first).map(|_| first);
    let mut steps = 0usize;

    while let Some(addr) = engine.compute_next_command(default) {
        if steps >= options.max_steps {
            let error = StepBlocksError::assertion(
                "API_STEP_LIMIT",
                format!("Run exceeded max_steps={}.", options.max_steps),
            )
            .at_command(engine.command_ref(addr));
            engine.abandon();
            return Ok(RunReport {
                outcome: RunOutcome::Failed(error),
                steps,
            });
        }
        steps += 1;

        let result = match engine.suite().command_at(addr).cloned() {
            Some(command) if engine.handles(&command.name) => engine.execute(addr),
            Some(command) => host.execute(&command, engine.host_context()),
            None => engine.execute(addr),
        };
        if let Err(error) = result {
            if let ErrorDisposition::Unhandled(error) = engine.handle_command_error(error) {
                warn!(code = %error.code, command = ?error.command_ref, "run failed");
                engine.abandon();
                return Ok(RunReport {
                    outcome: RunOutcome::Failed(error),
                    steps,
                });
            }
        }

        if engine.exit_requested() {
            engine.abandon();
            return Ok(RunReport {
                outcome: RunOutcome::Exited,
                steps,
            });
        }
        default = successor(engine, addr);
    }

    debug!(steps, "run passed");
    Ok(RunReport {
        outcome: RunOutcome::Passed,
        steps,
    })
}
