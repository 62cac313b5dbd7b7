use sb_core::{GlobalAddress, StepBlocksError, Variables, RESULT_VAR};
use tracing::debug;

use super::bubbling::JumpTarget;
use super::frame_stack::CallFrame;
use super::lifecycle::validate_name;
use super::FlowEngine;
use crate::helpers::text_split::split_top_level;

impl FlowEngine {
    /// First visit pushes a frame and enters the function; the visit after the
    /// function returns pops it and hands `_result` back to the caller.
    pub(super) fn do_call(
        &mut self,
        addr: GlobalAddress,
        name: &str,
        args: &str,
    ) -> Result<(), StepBlocksError> {
        let func_addr = *self.suite.symbols.functions.get(name).ok_or_else(|| {
            StepBlocksError::assertion(
                "ENGINE_FUNCTION_NOT_FOUND",
                format!("Function does not exist: {}.", name),
            )
        })?;

        let resuming = self
            .call_stack
            .top()
            .is_some_and(|frame| frame.returning && frame.return_addr == Some(addr));
        if resuming {
            let frame = self.call_stack.pop_call()?;
            let result = self.vars.remove(RESULT_VAR);
            debug!(function = %frame.name, "function returned");
            self.discard_call_frame(frame);
            match result {
                Some(result) => {
                    self.vars.insert(RESULT_VAR.to_string(), result);
                }
                None => {
                    self.vars.remove(RESULT_VAR);
                }
            }
            return Ok(());
        }

        let args = self.parse_call_args(args)?;
        let saved = std::mem::replace(&mut self.vars, args);
        self.call_stack.push_call(CallFrame {
            callee: Some(func_addr),
            name: name.to_string(),
            return_addr: Some(addr),
            saved_vars: Some(saved),
            block_stack: Vec::new(),
            unit: func_addr.unit,
            returning: false,
        });
        debug!(function = name, depth = self.call_stack.depth(), "calling function");
        self.branch(func_addr);
        Ok(())
    }

    /// `name = expr, ...`, evaluated against the caller's variables.
    fn parse_call_args(&mut self, spec: &str) -> Result<Variables, StepBlocksError> {
        let mut args = Variables::new();
        for part in split_top_level(spec, ',') {
            if part.is_empty() {
                continue;
            }
            let Some((name, expr)) = part.split_once('=') else {
                return Err(StepBlocksError::assertion(
                    "ENGINE_CALL_ARG_INVALID",
                    format!("Invalid call parameter '{}'; expected name = value.", part),
                ));
            };
            let name = name.trim();
            let name = name.strip_prefix('$').unwrap_or(name);
            validate_name(name, "call parameter")?;
            let value = self.evaluate(expr.trim())?;
            args.insert(name.to_string(), value);
        }
        Ok(args)
    }

    /// Definitions are skipped unless they are the function being called.
    pub(super) fn do_function(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let active = self.call_stack.top().and_then(|frame| frame.callee);
        if active == Some(addr) {
            return Ok(());
        }
        let end_addr = self.block_def(addr)?.end_addr;
        self.branch_to(end_addr, "endFunction")
    }

    /// `return`, `endFunction` and `endScript`. Outside the active call they are no-ops.
    pub(super) fn return_from_function(
        &mut self,
        addr: GlobalAddress,
        value: Option<&str>,
    ) -> Result<(), StepBlocksError> {
        let func_addr = self.block_def(addr)?.func_addr;
        let active = self.call_stack.top().and_then(|frame| frame.callee);
        if active.is_none() || active != func_addr {
            return Ok(());
        }
        if self.transition_bubbling(addr, JumpTarget::Function)? {
            return Ok(());
        }

        if let Some(expr) = value.filter(|expr| !expr.is_empty()) {
            let result = self.evaluate(expr)?;
            self.vars.insert(RESULT_VAR.to_string(), result);
        }

        let Some(frame) = self.call_stack.top_mut() else {
            return Err(StepBlocksError::assertion(
                "ENGINE_NO_FRAME",
                "No function call frame to return from.",
            ));
        };
        frame.returning = true;
        let return_addr = frame.return_addr;
        let blocks = std::mem::take(&mut frame.block_stack);
        for block in blocks.into_iter().rev() {
            self.discard_block_frame(block);
        }
        debug!(function = ?func_addr, "returning from function");
        self.branch_to(return_addr, "call")
    }
}
