use regex::Regex;
use sb_core::{GlobalAddress, SbValue, StepBlocksError, ERROR_VAR};
use tracing::{debug, info, warn};

use super::bubbling::{Bubbling, BubblingMode, JumpTarget};
use super::frame_stack::{StackFrame, TryPhase, TryState};
use super::{ErrorDisposition, FlowEngine};

/// Body of a `/pattern/` literal.
fn regex_body(text: &str) -> Option<&str> {
    text.strip_prefix('/')?.strip_suffix('/')
}

impl FlowEngine {
    pub(super) fn do_try(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let def = self.block_def(addr)?;
        let mut state = TryState {
            addr,
            name: def.name.clone(),
            phase: None,
            has_caught: false,
            has_finaled: false,
        };
        if def.catch_addr.is_none() && def.finally_addr.is_none() {
            warn!(command = %self.command_ref(addr), "try without catch or finally");
            if self.nesting_level < 0 {
                self.active_blocks_mut()?.push(StackFrame::Try(state));
                return Ok(());
            }
        }
        self.nesting_level += 1;
        state.phase = Some(TryPhase::Trying);
        debug!(addr = %addr, name = ?state.name, nesting = self.nesting_level, "entering try");
        self.active_blocks_mut()?.push(StackFrame::Try(state));
        Ok(())
    }

    /// Reached by falling out of the try-block: skip ahead. Reached via a caught error: enter.
    pub(super) fn do_catch(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let def = self.block_def(addr)?;
        self.assert_active_scope(def.try_addr)?;
        if self.top_try_phase() == Some(TryPhase::Catching) {
            return Ok(());
        }
        self.branch_to(def.finally_addr.or(def.end_addr), "endTry")
    }

    pub(super) fn do_finally(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let try_addr = self.block_def(addr)?.try_addr;
        self.assert_active_scope(try_addr)?;
        self.vars.remove(ERROR_VAR);
        if let Some(StackFrame::Try(state)) = self.active_blocks_mut()?.last_mut() {
            if state.phase.is_some() {
                state.phase = Some(TryPhase::Finallying);
                state.has_finaled = true;
            }
        }
        Ok(())
    }

    pub(super) fn do_end_try(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let try_addr = self.block_def(addr)?.try_addr;
        self.assert_active_scope(try_addr)?;
        self.vars.remove(ERROR_VAR);
        let Some(StackFrame::Try(state)) = self.active_blocks_mut()?.pop() else {
            return Err(self.missing_frame("try"));
        };
        if state.phase.is_none() {
            return Ok(());
        }
        self.nesting_level -= 1;
        debug!(addr = %state.addr, nesting = self.nesting_level, "leaving try");
        self.resume_bubbling(state.addr)
    }

    pub(super) fn do_throw(&mut self, expr: &str) -> Result<(), StepBlocksError> {
        let message = if expr.is_empty() {
            "Error thrown".to_string()
        } else {
            self.evaluate(expr)?.to_string()
        };
        Err(StepBlocksError::script("SCRIPT_THROWN", message))
    }

    pub(super) fn do_exit_test(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        if self.transition_bubbling(addr, JumpTarget::Exit)? {
            return Ok(());
        }
        info!(command = %self.command_ref(addr), "exit requested");
        self.exit_requested = true;
        Ok(())
    }

    /// Offers a failed command to the active try sections. On `Handled` the engine
    /// has already chosen where execution continues.
    pub fn handle_command_error(&mut self, error: StepBlocksError) -> ErrorDisposition {
        let error = match self.current {
            Some(addr) => error.at_command(self.command_ref(addr)),
            None => error,
        };
        if !error.is_catchable() || self.nesting_level < 0 {
            return ErrorDisposition::Unhandled(error);
        }
        self.catch_or_bubble(error)
            .unwrap_or_else(ErrorDisposition::Unhandled)
    }

    fn catch_or_bubble(
        &mut self,
        error: StepBlocksError,
    ) -> Result<ErrorDisposition, StepBlocksError> {
        let origin = self.current;
        let Some(try_addr) = self.unwind_to_try()? else {
            info!(code = %error.code, "error escaped every try section");
            return Ok(ErrorDisposition::Unhandled(error));
        };
        self.prune_bubblings();
        let try_def = self.block_def(try_addr)?;
        let (unspent_catch, unspent_finally) = match self.call_stack.active_block_stack().last() {
            Some(StackFrame::Try(state)) => (
                try_def.catch_addr.is_some()
                    && !state.has_caught
                    && state.phase == Some(TryPhase::Trying),
                try_def.finally_addr.is_some() && !state.has_finaled,
            ),
            _ => return Err(self.missing_frame("try")),
        };

        if let Some(catch_addr) = try_def.catch_addr.filter(|_| unspent_catch) {
            if self.catch_matches(&error, catch_addr) {
                info!(code = %error.code, catch = %self.command_ref(catch_addr), "error caught");
                if let Some(StackFrame::Try(state)) = self.active_blocks_mut()?.last_mut() {
                    state.has_caught = true;
                    state.phase = Some(TryPhase::Catching);
                }
                self.vars
                    .insert(ERROR_VAR.to_string(), SbValue::String(error.message.clone()));
                self.forget_bubbling_for(try_addr);
                self.branch(catch_addr);
                return Ok(ErrorDisposition::Handled);
            }
        }

        debug!(code = %error.code, try_addr = %try_addr, "error bubbling");
        self.forget_bubbling_for(try_addr);
        self.bubblings.push(Bubbling {
            mode: BubblingMode::Error {
                error: error.clone(),
                origin,
            },
            resume_at: try_addr,
            depth: self.call_stack.depth(),
        });

        if let Some(finally_addr) = try_def.finally_addr.filter(|_| unspent_finally) {
            if let Some(StackFrame::Try(state)) = self.active_blocks_mut()?.last_mut() {
                state.phase = Some(TryPhase::Finallying);
                state.has_finaled = true;
            }
            self.branch(finally_addr);
            return Ok(ErrorDisposition::Handled);
        }
        if self.nesting_level > 0 {
            self.branch_to(try_def.end_addr, "endTry")?;
            return Ok(ErrorDisposition::Handled);
        }
        self.bubblings.clear();
        Ok(ErrorDisposition::Unhandled(error))
    }

    /// Drops block frames, then whole function frames, until an active try is on top.
    fn unwind_to_try(&mut self) -> Result<Option<GlobalAddress>, StepBlocksError> {
        loop {
            loop {
                let blocks = self.active_blocks_mut()?;
                match blocks.last() {
                    Some(StackFrame::Try(state)) if state.phase.is_some() => {
                        return Ok(Some(state.addr));
                    }
                    Some(_) => {}
                    None => break,
                }
                if let Some(frame) = blocks.pop() {
                    self.discard_block_frame(frame);
                }
            }
            if self.nesting_level < 0 || self.call_stack.depth() <= 1 {
                return Ok(None);
            }
            let frame = self.call_stack.pop_call()?;
            info!(function = %frame.name, "function aborting due to error");
            self.discard_call_frame(frame);
        }
    }

    /// An empty catch target matches anything; `/re/` matches by regex; any other
    /// target is evaluated and matched as a substring of the error message.
    fn catch_matches(&mut self, error: &StepBlocksError, catch_addr: GlobalAddress) -> bool {
        let pattern = self
            .suite
            .command_at(catch_addr)
            .map(|command| command.target.trim().to_string())
            .unwrap_or_default();
        if pattern.is_empty() {
            return true;
        }
        let expected = if regex_body(&pattern).is_some() {
            pattern
        } else {
            match self.evaluate(&pattern) {
                Ok(value) => value.to_string(),
                Err(error) => {
                    debug!(pattern = %pattern, code = %error.code, "catch pattern kept as literal text");
                    pattern
                }
            }
        };
        if let Some(body) = regex_body(&expected) {
            if let Ok(regex) = Regex::new(body) {
                return regex.is_match(&error.message);
            }
        }
        error.message.contains(&expected)
    }
}
