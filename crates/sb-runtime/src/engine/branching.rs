use sb_compiler::{assert_intra_block_jump, label_address, to_local};
use sb_core::{BlockDef, GlobalAddress, SbValue, StepBlocksError};
use tracing::debug;

use super::frame_stack::{IfState, StackFrame};
use super::FlowEngine;

impl FlowEngine {
    pub(super) fn do_if(&mut self, addr: GlobalAddress, cond: &str) -> Result<(), StepBlocksError> {
        let def = self.block_def(addr)?;
        self.active_blocks_mut()?.push(StackFrame::If(IfState {
            addr,
            pending_else_ifs: def.else_if_addrs.iter().copied().collect(),
            matched: false,
        }));
        self.cascade_else_if(&def, cond)
    }

    pub(super) fn do_else_if(
        &mut self,
        addr: GlobalAddress,
        cond: &str,
    ) -> Result<(), StepBlocksError> {
        let if_def = self.owning_if(addr)?;
        if self.top_if_matched() {
            return self.branch_to(if_def.end_addr, "endIf");
        }
        self.cascade_else_if(&if_def, cond)
    }

    pub(super) fn do_else(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let if_def = self.owning_if(addr)?;
        if self.top_if_matched() {
            return self.branch_to(if_def.end_addr, "endIf");
        }
        Ok(())
    }

    pub(super) fn do_end_if(&mut self, addr: GlobalAddress) -> Result<(), StepBlocksError> {
        self.owning_if(addr)?;
        self.active_blocks_mut()?.pop();
        Ok(())
    }

    fn owning_if(&self, addr: GlobalAddress) -> Result<BlockDef, StepBlocksError> {
        let if_addr = self.block_def(addr)?.if_addr;
        self.assert_active_scope(if_addr)?;
        self.block_def(if_addr.unwrap_or(addr))
    }

    fn top_if_matched(&self) -> bool {
        matches!(
            self.call_stack.active_block_stack().last(),
            Some(StackFrame::If(state)) if state.matched
        )
    }

    /// Enters the branch when `cond` holds, otherwise moves on to the next elseIf,
    /// the else, or the endIf.
    fn cascade_else_if(&mut self, if_def: &BlockDef, cond: &str) -> Result<(), StepBlocksError> {
        if self.eval_condition(cond)? {
            if let Some(StackFrame::If(state)) = self.active_blocks_mut()?.last_mut() {
                state.matched = true;
            }
            return Ok(());
        }
        let next_else_if = match self.active_blocks_mut()?.last_mut() {
            Some(StackFrame::If(state)) => state.pending_else_ifs.pop_front(),
            _ => None,
        };
        let dest = next_else_if.or(if_def.else_addr).or(if_def.end_addr);
        self.branch_to(dest, "endIf")
    }

    pub(super) fn do_goto(&mut self, addr: GlobalAddress, label: &str) -> Result<(), StepBlocksError> {
        let key = label_address(label, addr.unit);
        let dest = *self.suite.symbols.labels.get(&key).ok_or_else(|| {
            StepBlocksError::assertion(
                "ENGINE_LABEL_NOT_FOUND",
                format!("Target label '{}' is not found.", key.label),
            )
        })?;
        self.jump(addr, dest)
    }

    pub(super) fn do_goto_if(
        &mut self,
        addr: GlobalAddress,
        cond: &str,
        label: &str,
    ) -> Result<(), StepBlocksError> {
        if self.eval_condition(cond)? {
            return self.do_goto(addr, label);
        }
        Ok(())
    }

    pub(super) fn do_skip_next(
        &mut self,
        addr: GlobalAddress,
        spec: &str,
    ) -> Result<(), StepBlocksError> {
        let count = if spec.is_empty() {
            1
        } else {
            let number = match self.evaluate(spec)? {
                SbValue::Number(number) => Some(number),
                SbValue::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|number| !number.is_nan())
            .ok_or_else(|| {
                StepBlocksError::assertion(
                    "ENGINE_SKIP_INVALID",
                    format!("skipNext requires a numeric value, got '{}'.", spec),
                )
            })?;
            if number < 0.0 {
                return Err(StepBlocksError::assertion(
                    "ENGINE_SKIP_INVALID",
                    format!("skipNext requires a number >= 0, got {}.", number),
                ));
            }
            number.trunc() as usize
        };
        if count == 0 {
            return Ok(());
        }
        let dest = addr.offset(count.saturating_add(1));
        to_local(&self.suite.units, dest)?;
        self.jump(addr, dest)
    }

    fn jump(&mut self, from: GlobalAddress, dest: GlobalAddress) -> Result<(), StepBlocksError> {
        assert_intra_block_jump(&self.suite, from, dest)?;
        self.leave_if_blocks_for(dest);
        debug!(from = %from, to = %dest, "jump");
        self.branch(dest);
        Ok(())
    }

    /// Pops if-frames whose span does not contain `dest`.
    fn leave_if_blocks_for(&mut self, dest: GlobalAddress) {
        let suite = &self.suite;
        let Some(blocks) = self.call_stack.active_block_stack_mut() else {
            return;
        };
        while let Some(StackFrame::If(state)) = blocks.last() {
            let end = suite.block_at(state.addr).and_then(|def| def.end_addr);
            let inside = state.addr < dest && end.is_some_and(|end| dest <= end);
            if inside {
                break;
            }
            blocks.pop();
        }
    }
}
