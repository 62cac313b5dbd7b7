use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use sb_compiler::{compile_suite, format_command_ref, recompile, to_local};
use sb_core::{
    BlockDef, CommandKind, CompiledSuite, GlobalAddress, SbValue, ScriptUnit, StepBlocksError,
    Variables,
};
use tracing::{debug, info};

use super::frame_stack::{CallFrame, CallStack, StackFrame, TryPhase};
use super::{FlowEngine, FlowEngineOptions};
use crate::evaluator::RhaiEvaluator;
use crate::host::HostContext;
use crate::records::{JsonRecordReader, XmlRecordReader};

fn name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[a-zA-Z]\w*$").expect("name regex must compile"))
}

pub(super) fn validate_name(name: &str, desc: &str) -> Result<(), StepBlocksError> {
    if name_regex().is_match(name) {
        return Ok(());
    }
    Err(StepBlocksError::assertion(
        "ENGINE_NAME_INVALID",
        format!("Invalid character(s) in {} name: '{}'", desc, name),
    ))
}

impl FlowEngine {
    pub fn new(options: FlowEngineOptions) -> Result<Self, StepBlocksError> {
        let FlowEngineOptions {
            units,
            data_dir,
            evaluator,
        } = options;
        let suite = compile_suite(units)?;
        Ok(Self {
            suite,
            evaluator: evaluator.unwrap_or_else(|| Box::new(RhaiEvaluator::new())),
            data_dir,
            vars: Variables::new(),
            call_stack: CallStack::new(0),
            nesting_level: -1,
            bubblings: Vec::new(),
            pending_branch: None,
            exit_requested: false,
            current: None,
        })
    }

    /// Recompiles the suite and resets run state. Stored variables are left alone.
    pub fn before_run(&mut self) -> Result<(), StepBlocksError> {
        recompile(&mut self.suite)?;
        self.call_stack = CallStack::new(0);
        self.nesting_level = -1;
        self.bubblings.clear();
        self.pending_branch = None;
        self.exit_requested = false;
        self.current = None;
        Ok(())
    }

    /// Swaps in edited units; the next run starts from a fresh compile.
    pub fn replace_units(&mut self, units: Vec<ScriptUnit>) -> Result<(), StepBlocksError> {
        self.suite.units = units;
        self.before_run()
    }

    /// Resolves the address to run next: a pending branch wins over the host's default successor.
    pub fn compute_next_command(
        &mut self,
        default: Option<GlobalAddress>,
    ) -> Option<GlobalAddress> {
        let next = match self.pending_branch.take() {
            Some(branch) => {
                debug!(from = ?self.current, to = %branch, "branching");
                Some(branch)
            }
            None => default,
        };
        if self.current.is_none() {
            if let (Some(addr), Some(frame)) = (next, self.call_stack.top_mut()) {
                if frame.callee.is_none() {
                    frame.unit = addr.unit;
                }
            }
        }
        self.current = next;
        next
    }

    /// Whether `name` is executed by the engine rather than the host.
    pub fn handles(&self, name: &str) -> bool {
        matches!(CommandKind::parse(name), Some((_, false)))
    }

    pub fn execute(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        self.current = Some(addr);
        self.dispatch(addr)
            .map_err(|error| error.at_command(self.command_ref(addr)))
    }

    fn dispatch(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        to_local(&self.suite.units, addr)?;
        let command = self.suite.command_at(addr).cloned().ok_or_else(|| {
            StepBlocksError::address(
                "ADDRESS_OUT_OF_RANGE",
                format!("No command at address {}.", addr),
            )
        })?;
        let Some((kind, false)) = CommandKind::parse(&command.name) else {
            return Err(StepBlocksError::assertion(
                "ENGINE_COMMAND_UNKNOWN",
                format!("\"{}\" is not a flow command.", command.name),
            ));
        };
        debug!(addr = %addr, command = kind.as_str(), "executing flow command");

        let target = command.target.trim();
        let value = command.value.trim();
        match kind {
            CommandKind::Label => Ok(()),
            CommandKind::Goto => self.do_goto(addr, target),
            CommandKind::GotoIf => self.do_goto_if(addr, target, value),
            CommandKind::SkipNext => self.do_skip_next(addr, target),

            CommandKind::If => self.do_if(addr, target),
            CommandKind::ElseIf => self.do_else_if(addr, target),
            CommandKind::Else => self.do_else(addr),
            CommandKind::EndIf => self.do_end_if(addr),

            CommandKind::Try => self.do_try(addr),
            CommandKind::Catch => self.do_catch(addr),
            CommandKind::Finally => self.do_finally(addr),
            CommandKind::EndTry => self.do_end_try(addr),
            CommandKind::Throw => self.do_throw(target),

            CommandKind::While
            | CommandKind::For
            | CommandKind::Foreach
            | CommandKind::ForJson
            | CommandKind::ForXml => self.enter_loop(addr, kind, target, value),
            CommandKind::Break => self.do_break(addr, target),
            CommandKind::Continue => self.do_continue(addr, target),
            CommandKind::EndWhile
            | CommandKind::EndFor
            | CommandKind::EndForeach
            | CommandKind::EndForJson
            | CommandKind::EndForXml => self.iterate_loop(addr),

            CommandKind::Call => self.do_call(addr, target, value),
            CommandKind::Function | CommandKind::Script => self.do_function(addr),
            CommandKind::Return => self.return_from_function(addr, Some(target)),
            CommandKind::EndFunction | CommandKind::EndScript => {
                self.return_from_function(addr, None)
            }

            CommandKind::ExitTest => self.do_exit_test(addr),
            CommandKind::LoadJsonVars => self.load_vars(
                addr,
                target,
                value,
                "JSON object",
                Box::new(JsonRecordReader::default()),
            ),
            CommandKind::LoadXmlVars => self.load_vars(
                addr,
                target,
                value,
                "XML element",
                Box::new(XmlRecordReader::default()),
            ),
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Unwinds everything after a fatal error or exit, restoring saved variables.
    pub fn abandon(&mut self) {
        while self.call_stack.depth() > 1 {
            let Ok(frame) = self.call_stack.pop_call() else {
                break;
            };
            info!(function = %frame.name, unit = frame.unit, "function abandoned");
            self.discard_call_frame(frame);
        }
        let blocks = self
            .call_stack
            .active_block_stack_mut()
            .map(std::mem::take)
            .unwrap_or_default();
        for frame in blocks.into_iter().rev() {
            self.discard_block_frame(frame);
        }
        self.nesting_level = -1;
        self.bubblings.clear();
        self.pending_branch = None;
    }

    pub fn variables(&self) -> &Variables {
        &self.vars
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.vars
    }

    pub fn host_context(&mut self) -> HostContext<'_> {
        HostContext {
            vars: &mut self.vars,
            evaluator: self.evaluator.as_ref(),
        }
    }

    pub fn suite(&self) -> &CompiledSuite {
        &self.suite
    }

    pub fn command_ref(&self, addr: GlobalAddress) -> String {
        format_command_ref(&self.suite.units, addr)
    }

    pub fn current(&self) -> Option<GlobalAddress> {
        self.current
    }

    pub fn nesting_level(&self) -> i32 {
        self.nesting_level
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.depth()
    }

    pub fn is_bubbling(&self) -> bool {
        !self.bubblings.is_empty()
    }

    pub(super) fn branch(&mut self, addr: GlobalAddress) {
        self.pending_branch = Some(addr);
    }

    pub(super) fn branch_to(
        &mut self,
        addr: Option<GlobalAddress>,
        what: &str,
    ) -> Result<(), StepBlocksError> {
        let addr = addr.ok_or_else(|| {
            StepBlocksError::assertion(
                "ENGINE_BLOCK_MISSING",
                format!("No '{}' command to branch to.", what),
            )
        })?;
        self.branch(addr);
        Ok(())
    }

    pub(super) fn block_def(&self, addr: GlobalAddress) -> Result<BlockDef, StepBlocksError> {
        self.suite.block_at(addr).cloned().ok_or_else(|| {
            StepBlocksError::assertion(
                "ENGINE_BLOCK_MISSING",
                format!("No block definition for {}.", self.command_ref(addr)),
            )
        })
    }

    pub(super) fn evaluate(&mut self, expr: &str) -> Result<SbValue, StepBlocksError> {
        self.evaluator.evaluate(expr, &mut self.vars)
    }

    pub(super) fn eval_condition(&mut self, expr: &str) -> Result<bool, StepBlocksError> {
        Ok(self.evaluate(expr)?.is_truthy())
    }

    pub(super) fn active_blocks_mut(&mut self) -> Result<&mut Vec<StackFrame>, StepBlocksError> {
        self.call_stack.active_block_stack_mut().ok_or_else(|| {
            StepBlocksError::assertion("ENGINE_NO_FRAME", "No runtime frame available.")
        })
    }

    pub(super) fn missing_frame(&self, what: &str) -> StepBlocksError {
        StepBlocksError::assertion(
            "ENGINE_SCOPE_MISMATCH",
            format!("Expected an active {} block on the block stack.", what),
        )
    }

    /// The innermost active block must be the one opened at `expected`.
    pub(super) fn assert_active_scope(
        &self,
        expected: Option<GlobalAddress>,
    ) -> Result<(), StepBlocksError> {
        let active = self.call_stack.active_block_stack().last().map(StackFrame::addr);
        if active.is_some() && active == expected {
            return Ok(());
        }
        let detail = match active {
            Some(active) => format!(
                " unexpected command, active command was {}",
                self.command_ref(active)
            ),
            None => " unexpected command, no block is active".to_string(),
        };
        let here = self
            .current
            .map(|addr| self.command_ref(addr))
            .unwrap_or_default();
        Err(StepBlocksError::assertion(
            "ENGINE_SCOPE_MISMATCH",
            format!("{}{}", here, detail),
        ))
    }

    pub(super) fn discard_block_frame(&mut self, frame: StackFrame) {
        match frame {
            StackFrame::Loop(state) => {
                debug!(addr = %state.addr, "discarding loop frame");
                self.restore_loop_vars(state.saved_vars);
            }
            StackFrame::Try(state) => {
                if state.phase.is_some() {
                    self.nesting_level -= 1;
                }
                debug!(addr = %state.addr, nesting = self.nesting_level, "discarding try frame");
            }
            StackFrame::If(_) => {}
        }
    }

    pub(super) fn discard_call_frame(&mut self, mut frame: CallFrame) {
        let blocks = std::mem::take(&mut frame.block_stack);
        for block in blocks.into_iter().rev() {
            self.discard_block_frame(block);
        }
        if let Some(saved) = frame.saved_vars {
            self.vars = saved;
        }
    }

    pub(super) fn restore_loop_vars(&mut self, saved: BTreeMap<String, Option<SbValue>>) {
        for (name, value) in saved {
            match value {
                Some(value) => {
                    self.vars.insert(name, value);
                }
                None => {
                    self.vars.remove(&name);
                }
            }
        }
    }

    pub(super) fn top_try_phase(&self) -> Option<TryPhase> {
        match self.call_stack.active_block_stack().last() {
            Some(StackFrame::Try(state)) => state.phase,
            _ => None,
        }
    }

    /// Data file location: absolute paths as given, otherwise relative to the data
    /// directory or the directory of the running unit.
    pub(super) fn resolve_data_path(&self, addr: GlobalAddress, raw: &str) -> PathBuf {
        let raw = raw.strip_prefix("file://").unwrap_or(raw);
        let path = Path::new(raw);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        if let Some(dir) = &self.data_dir {
            return dir.join(path);
        }
        self.suite
            .units
            .get(addr.unit)
            .and_then(|unit| Path::new(&unit.path).parent())
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf())
    }
}
