use sb_core::{
    CommandKind, GlobalAddress, SbValue, StepBlocksError, Variables, INDEX_VAR,
};
use tracing::debug;

use super::frame_stack::{LoopPhase, LoopSpec, LoopState, StackFrame};
use super::lifecycle::validate_name;
use super::FlowEngine;
use crate::evaluator::ExpressionEvaluator;
use crate::helpers::text_split::split_top_level;
use crate::records::{JsonRecordReader, RecordReader, XmlRecordReader};

fn loop_invalid(message: impl Into<String>) -> StepBlocksError {
    StepBlocksError::assertion("ENGINE_LOOP_INVALID", message)
}

impl LoopSpec {
    fn initialize(
        &mut self,
        vars: &mut Variables,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<(), StepBlocksError> {
        match self {
            Self::For { init, .. } => {
                for stmt in init.iter() {
                    evaluator.evaluate(stmt, vars)?;
                }
            }
            Self::Foreach { var, values, index } => {
                *index = 0;
                if let Some(first) = values.first() {
                    vars.insert(var.clone(), first.clone());
                }
            }
            Self::While { .. } | Self::Records { .. } => {}
        }
        Ok(())
    }

    fn condition(
        &mut self,
        vars: &mut Variables,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<bool, StepBlocksError> {
        match self {
            Self::While { cond } | Self::For { cond, .. } => {
                Ok(evaluator.evaluate(cond, vars)?.is_truthy())
            }
            Self::Foreach { values, index, .. } => {
                vars.insert(INDEX_VAR.to_string(), SbValue::Number(*index as f64));
                Ok(*index < values.len())
            }
            Self::Records { reader } => {
                if reader.eof() {
                    return Ok(false);
                }
                reader.next(vars)?;
                Ok(true)
            }
        }
    }

    fn iterate(
        &mut self,
        vars: &mut Variables,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<(), StepBlocksError> {
        match self {
            Self::For { iterate, .. } => {
                for stmt in iterate.iter() {
                    evaluator.evaluate(stmt, vars)?;
                }
            }
            Self::Foreach { var, values, index } => {
                *index += 1;
                if let Some(value) = values.get(*index) {
                    vars.insert(var.clone(), value.clone());
                }
            }
            Self::While { .. } | Self::Records { .. } => {}
        }
        Ok(())
    }
}

impl FlowEngine {
    fn with_top_loop<T>(
        &mut self,
        run: impl FnOnce(&mut LoopState, &mut Variables, &dyn ExpressionEvaluator) -> Result<T, StepBlocksError>,
    ) -> Result<T, StepBlocksError> {
        let evaluator = self.evaluator.as_ref();
        let state = match self
            .call_stack
            .active_block_stack_mut()
            .and_then(|blocks| blocks.last_mut())
        {
            Some(StackFrame::Loop(state)) => state,
            _ => {
                return Err(StepBlocksError::assertion(
                    "ENGINE_SCOPE_MISMATCH",
                    "Expected an active loop block on the block stack.",
                ))
            }
        };
        run(state, &mut self.vars, evaluator)
    }

    /// Loop opener: first entry validates and initializes; re-entry iterates.
    /// Either way the condition decides whether the body runs.
    pub(super) fn enter_loop(
        &mut self,
        addr: GlobalAddress,
        kind: CommandKind,
        target: &str,
        value: &str,
    ) -> Result<(), StepBlocksError> {
        let reentering = matches!(
            self.call_stack.active_block_stack().last(),
            Some(StackFrame::Loop(state))
                if state.addr == addr && state.phase == LoopPhase::Reentering
        );

        if reentering {
            self.with_top_loop(|state, vars, evaluator| {
                state.phase = LoopPhase::Entered;
                state.spec.iterate(vars, evaluator)
            })?;
        } else {
            let (spec, local_names) = self.validate_loop(addr, kind, target, value)?;
            let saved_vars = local_names
                .iter()
                .map(|name| (name.clone(), self.vars.get(name).cloned()))
                .collect();
            for name in &local_names {
                self.vars.entry(name.clone()).or_insert(SbValue::Null);
            }
            debug!(addr = %addr, kind = kind.as_str(), locals = ?local_names, "entering loop");
            self.active_blocks_mut()?.push(StackFrame::Loop(LoopState {
                addr,
                spec,
                saved_vars,
                complete: false,
                phase: LoopPhase::Entered,
            }));
            self.with_top_loop(|state, vars, evaluator| state.spec.initialize(vars, evaluator))?;
        }

        let keep_going = self.with_top_loop(|state, vars, evaluator| {
            let keep_going = state.spec.condition(vars, evaluator)?;
            state.complete = !keep_going;
            Ok(keep_going)
        })?;
        if keep_going {
            return Ok(());
        }
        let end_addr = self.block_def(addr)?.end_addr;
        self.branch_to(end_addr, &kind.terminator_name())
    }

    fn validate_loop(
        &mut self,
        addr: GlobalAddress,
        kind: CommandKind,
        target: &str,
        value: &str,
    ) -> Result<(LoopSpec, Vec<String>), StepBlocksError> {
        match kind {
            CommandKind::While => {
                if target.is_empty() {
                    return Err(loop_invalid("'while' requires a condition expression."));
                }
                Ok((
                    LoopSpec::While {
                        cond: target.to_string(),
                    },
                    Vec::new(),
                ))
            }
            CommandKind::For => {
                let parts = split_top_level(target, ';');
                let [init, cond, iterate] = parts.as_slice() else {
                    return Err(loop_invalid(
                        "'for' requires: <initial-val>; <condition>; <iter-stmt>.",
                    ));
                };
                if cond.is_empty() {
                    return Err(loop_invalid("'for' requires a condition expression."));
                }
                let init = split_top_level(init, ',');
                let mut names = Vec::with_capacity(init.len());
                for (ordinal, stmt) in init.iter().enumerate() {
                    let lhs = stmt.split_once('=').map_or(stmt.as_str(), |(lhs, _)| lhs).trim();
                    let name = lhs.strip_prefix('$').filter(|name| !name.is_empty()).ok_or_else(|| {
                        loop_invalid(format!(
                            "For loop variable #{} must start with $ and name a variable: '{}'",
                            ordinal + 1,
                            lhs
                        ))
                    })?;
                    validate_name(name, "for loop variable")?;
                    names.push(name.to_string());
                }
                Ok((
                    LoopSpec::For {
                        init: init.into_iter().filter(|stmt| stmt.contains('=')).collect(),
                        cond: cond.clone(),
                        iterate: split_top_level(iterate, ',')
                            .into_iter()
                            .filter(|stmt| !stmt.is_empty())
                            .collect(),
                    },
                    names,
                ))
            }
            CommandKind::Foreach => {
                let var = target.strip_prefix('$').unwrap_or(target);
                if var.is_empty() {
                    return Err(loop_invalid("'foreach' requires a variable name."));
                }
                validate_name(var, "foreach variable")?;
                if value.is_empty() {
                    return Err(loop_invalid("'foreach' requires comma-separated values."));
                }
                let values = match self.evaluate(&format!("[{}]", value))? {
                    SbValue::Array(mut items) => {
                        if items.len() == 1 && matches!(items[0], SbValue::Array(_)) {
                            match items.remove(0) {
                                SbValue::Array(inner) => inner,
                                other => vec![other],
                            }
                        } else {
                            items
                        }
                    }
                    other => vec![other],
                };
                Ok((
                    LoopSpec::Foreach {
                        var: var.to_string(),
                        values,
                        index: 0,
                    },
                    vec![var.to_string(), INDEX_VAR.to_string()],
                ))
            }
            CommandKind::ForJson | CommandKind::ForXml => {
                if target.is_empty() {
                    return Err(loop_invalid(format!(
                        "'{}' requires a data file path.",
                        kind.as_str()
                    )));
                }
                let mut reader: Box<dyn RecordReader> = if kind == CommandKind::ForJson {
                    Box::new(JsonRecordReader::default())
                } else {
                    Box::new(XmlRecordReader::default())
                };
                let names = reader.load(&self.resolve_data_path(addr, target))?;
                Ok((LoopSpec::Records { reader }, names))
            }
            _ => Err(loop_invalid(format!(
                "'{}' does not open a loop.",
                kind.as_str()
            ))),
        }
    }

    /// Loop closer: finishes a completed loop, otherwise re-enters its opener.
    pub(super) fn iterate_loop(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let begin_addr = self.block_def(addr)?.begin_addr;
        self.assert_active_scope(begin_addr)?;
        let complete = self.with_top_loop(|state, _, _| Ok(state.complete))?;
        if complete {
            if let Some(frame) = self.active_blocks_mut()?.pop() {
                self.discard_block_frame(frame);
            }
            return Ok(());
        }
        self.with_top_loop(|state, _, _| {
            state.phase = LoopPhase::Reentering;
            Ok(())
        })?;
        self.branch_to(begin_addr, "loop")
    }

    pub(super) fn do_break(&mut self, addr: GlobalAddress, guard: &str) -> Result<(), StepBlocksError> {
        let Some(loop_addr) = self.unwind_for_loop_jump(addr, guard)? else {
            return Ok(());
        };
        self.with_top_loop(|state, _, _| {
            state.complete = true;
            Ok(())
        })?;
        let end_addr = self.block_def(loop_addr)?.end_addr;
        self.branch_to(end_addr, "loop end")
    }

    pub(super) fn do_continue(
        &mut self,
        addr: GlobalAddress,
        guard: &str,
    ) -> Result<(), StepBlocksError> {
        let Some(loop_addr) = self.unwind_for_loop_jump(addr, guard)? else {
            return Ok(());
        };
        self.with_top_loop(|state, _, _| {
            state.phase = LoopPhase::Reentering;
            Ok(())
        })?;
        self.branch(loop_addr);
        Ok(())
    }

    /// Checks the optional guard, lets pending finally-blocks run, then drops the
    /// block frames above the innermost loop. `None` means nothing to do now.
    fn unwind_for_loop_jump(
        &mut self,
        addr: GlobalAddress,
        guard: &str,
    ) -> Result<Option<GlobalAddress>, StepBlocksError> {
        if !guard.is_empty() && !self.eval_condition(guard)? {
            return Ok(None);
        }
        if self.transition_bubbling(addr, super::bubbling::JumpTarget::Loop)? {
            return Ok(None);
        }
        loop {
            let blocks = self.active_blocks_mut()?;
            match blocks.last() {
                Some(StackFrame::Loop(state)) => return Ok(Some(state.addr)),
                Some(_) => {}
                None => {
                    return Err(StepBlocksError::assertion(
                        "ENGINE_NOT_IN_LOOP",
                        "No active loop to break out of or continue.",
                    ))
                }
            }
            if let Some(frame) = blocks.pop() {
                self.discard_block_frame(frame);
            }
        }
    }
}
