use sb_core::{GlobalAddress, StepBlocksError};
use tracing::{debug, info};

use super::frame_stack::{StackFrame, TryPhase, TryState};
use super::FlowEngine;

/// Where a suspended transfer of control is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JumpTarget {
    Loop,
    Function,
    Exit,
}

#[derive(Debug, Clone)]
pub(crate) enum BubblingMode {
    Error {
        error: StepBlocksError,
        origin: Option<GlobalAddress>,
    },
    Command {
        origin: GlobalAddress,
        target: JumpTarget,
    },
}

/// Work deferred while a finally-block runs.
#[derive(Debug, Clone)]
pub(crate) struct Bubbling {
    pub(crate) mode: BubblingMode,
    /// Try whose endTry picks the deferred work back up.
    pub(crate) resume_at: GlobalAddress,
    /// Call depth the finally-block runs at.
    pub(crate) depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandStop {
    Target,
    Finally { depth: usize, index: usize },
}

impl FlowEngine {
    fn has_unspent_finally(&self, state: &TryState) -> bool {
        state.phase.is_some()
            && !state.has_finaled
            && self
                .suite
                .block_at(state.addr)
                .and_then(|def| def.finally_addr)
                .is_some()
    }

    /// First thing that stops a transfer of control: its target, or a finally-block on the way.
    fn find_command_stop(&self, target: JumpTarget) -> CommandStop {
        let frames = self.call_stack.frames();
        let searched = match target {
            JumpTarget::Exit => frames.len(),
            JumpTarget::Loop | JumpTarget::Function => 1,
        };
        for (depth, frame) in frames.iter().enumerate().rev().take(searched) {
            for (index, block) in frame.block_stack.iter().enumerate().rev() {
                match block {
                    StackFrame::Loop(_) if target == JumpTarget::Loop => {
                        return CommandStop::Target;
                    }
                    StackFrame::Try(state) if self.has_unspent_finally(state) => {
                        return CommandStop::Finally { depth, index };
                    }
                    _ => {}
                }
            }
        }
        CommandStop::Target
    }

    /// Whether a transfer started now would leave the finally-block that is running.
    fn leaves_running_finally(&self, bubbling: &Bubbling, target: JumpTarget) -> bool {
        if self.call_stack.depth() != bubbling.depth {
            return target == JumpTarget::Exit;
        }
        if target != JumpTarget::Loop {
            return true;
        }
        for block in self.call_stack.active_block_stack().iter().rev() {
            match block {
                StackFrame::Loop(_) => return false,
                StackFrame::Try(state) if state.addr == bubbling.resume_at => return true,
                _ => {}
            }
        }
        true
    }

    /// Suspends a break, continue, return or exitTest when a finally-block must run first.
    /// Returns `true` when the command must not complete now.
    pub(super) fn transition_bubbling(
        &mut self,
        here: GlobalAddress,
        target: JumpTarget,
    ) -> Result<bool, StepBlocksError> {
        let replaces_pending = self
            .bubblings
            .last()
            .is_some_and(|bubbling| self.leaves_running_finally(bubbling, target));
        if replaces_pending {
            if let Some(bubbling) = self.bubblings.last_mut() {
                debug!(origin = %here, ?target, "bubbling replaced by command");
                bubbling.mode = BubblingMode::Command {
                    origin: here,
                    target,
                };
            }
            return Ok(true);
        }

        if self.nesting_level > -1
            && matches!(self.find_command_stop(target), CommandStop::Finally { .. })
        {
            self.bubble_command(here, target)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Runs the next pending finally-block on the way to `target`, or re-executes
    /// the suspended command once none remain.
    pub(super) fn bubble_command(
        &mut self,
        origin: GlobalAddress,
        target: JumpTarget,
    ) -> Result<(), StepBlocksError> {
        match self.find_command_stop(target) {
            CommandStop::Finally { depth, index } => {
                while self.call_stack.depth() > depth + 1 {
                    let frame = self.call_stack.pop_call()?;
                    info!(function = %frame.name, "function aborting for pending finally-block");
                    self.discard_call_frame(frame);
                }

                let above = self.active_blocks_mut()?.split_off(index + 1);
                for frame in above.into_iter().rev() {
                    self.discard_block_frame(frame);
                }

                let try_addr = match self.active_blocks_mut()?.last_mut() {
                    Some(StackFrame::Try(state)) => {
                        state.phase = Some(TryPhase::Finallying);
                        state.has_finaled = true;
                        state.addr
                    }
                    _ => return Err(self.missing_frame("try")),
                };
                let finally_addr = self.block_def(try_addr)?.finally_addr;

                info!(
                    command = %self.command_ref(origin),
                    "command suspended while finally-block runs"
                );
                self.prune_bubblings();
                self.bubblings.push(Bubbling {
                    mode: BubblingMode::Command { origin, target },
                    resume_at: try_addr,
                    depth: self.call_stack.depth(),
                });
                self.branch_to(finally_addr, "finally")
            }
            CommandStop::Target => {
                info!(command = %self.command_ref(origin), "resuming suspended command");
                self.branch(origin);
                Ok(())
            }
        }
    }

    /// Continues deferred work when the endTry of its try section is reached.
    pub(super) fn resume_bubbling(&mut self, try_addr: GlobalAddress) -> Result<(), StepBlocksError> {
        let resumes_here = self.bubblings.last().is_some_and(|bubbling| {
            bubbling.resume_at == try_addr && bubbling.depth == self.call_stack.depth()
        });
        if !resumes_here {
            return Ok(());
        }
        let Some(bubbling) = self.bubblings.pop() else {
            return Ok(());
        };
        match bubbling.mode {
            BubblingMode::Error { error, origin } => {
                debug!(origin = ?origin, code = %error.code, "error bubbling continues");
                Err(error)
            }
            BubblingMode::Command { origin, target } => self.bubble_command(origin, target),
        }
    }

    /// Forgets deferred work whose try section is no longer on the stack.
    pub(super) fn prune_bubblings(&mut self) {
        let frames = self.call_stack.frames();
        self.bubblings.retain(|bubbling| {
            bubbling
                .depth
                .checked_sub(1)
                .and_then(|index| frames.get(index))
                .is_some_and(|frame| {
                    frame.block_stack.iter().any(|block| {
                        matches!(block, StackFrame::Try(state) if state.addr == bubbling.resume_at)
                    })
                })
        });
    }

    /// Drops deferred work owned by the try at `try_addr` in the active call frame.
    pub(super) fn forget_bubbling_for(&mut self, try_addr: GlobalAddress) {
        let depth = self.call_stack.depth();
        self.bubblings
            .retain(|bubbling| bubbling.resume_at != try_addr || bubbling.depth != depth);
    }
}
