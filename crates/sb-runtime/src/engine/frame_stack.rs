use std::collections::{BTreeMap, VecDeque};

use sb_core::{GlobalAddress, SbValue, StepBlocksError, Variables};

use crate::records::RecordReader;

#[derive(Debug)]
pub(crate) struct IfState {
    pub(crate) addr: GlobalAddress,
    pub(crate) pending_else_ifs: VecDeque<GlobalAddress>,
    pub(crate) matched: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopPhase {
    Entered,
    Reentering,
}

#[derive(Debug)]
pub(crate) enum LoopSpec {
    While {
        cond: String,
    },
    For {
        init: Vec<String>,
        cond: String,
        iterate: Vec<String>,
    },
    Foreach {
        var: String,
        values: Vec<SbValue>,
        index: usize,
    },
    Records {
        reader: Box<dyn RecordReader>,
    },
}

#[derive(Debug)]
pub(crate) struct LoopState {
    pub(crate) addr: GlobalAddress,
    pub(crate) spec: LoopSpec,
    /// Values loop-local names had before the loop; `None` means absent.
    pub(crate) saved_vars: BTreeMap<String, Option<SbValue>>,
    pub(crate) complete: bool,
    pub(crate) phase: LoopPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TryPhase {
    Trying,
    Catching,
    Finallying,
}

#[derive(Debug)]
pub(crate) struct TryState {
    pub(crate) addr: GlobalAddress,
    pub(crate) name: Option<String>,
    /// `None` when the try has neither catch nor finally.
    pub(crate) phase: Option<TryPhase>,
    pub(crate) has_caught: bool,
    pub(crate) has_finaled: bool,
}

#[derive(Debug)]
pub(crate) enum StackFrame {
    If(IfState),
    Loop(LoopState),
    Try(TryState),
}

impl StackFrame {
    pub(crate) fn addr(&self) -> GlobalAddress {
        match self {
            Self::If(state) => state.addr,
            Self::Loop(state) => state.addr,
            Self::Try(state) => state.addr,
        }
    }
}

#[derive(Debug)]
pub(crate) struct CallFrame {
    /// Entry of the called function; `None` for the top-level frame.
    pub(crate) callee: Option<GlobalAddress>,
    pub(crate) name: String,
    pub(crate) return_addr: Option<GlobalAddress>,
    pub(crate) saved_vars: Option<Variables>,
    pub(crate) block_stack: Vec<StackFrame>,
    pub(crate) unit: usize,
    pub(crate) returning: bool,
}

impl CallFrame {
    pub(crate) fn top_level(unit: usize) -> Self {
        Self {
            callee: None,
            name: "(top level)".to_string(),
            return_addr: None,
            saved_vars: None,
            block_stack: Vec::new(),
            unit,
            returning: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub(crate) fn new(unit: usize) -> Self {
        Self {
            frames: vec![CallFrame::top_level(unit)],
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    pub(crate) fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub(crate) fn active_block_stack(&self) -> &[StackFrame] {
        self.frames
            .last()
            .map(|frame| frame.block_stack.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn active_block_stack_mut(&mut self) -> Option<&mut Vec<StackFrame>> {
        self.frames.last_mut().map(|frame| &mut frame.block_stack)
    }

    pub(crate) fn push_call(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    /// Pops a function frame; the top-level frame is never popped.
    pub(crate) fn pop_call(&mut self) -> Result<CallFrame, StepBlocksError> {
        if self.frames.len() <= 1 {
            return Err(StepBlocksError::assertion(
                "ENGINE_NO_FRAME",
                "No function call frame to return from.",
            ));
        }
        self.frames.pop().ok_or_else(|| {
            StepBlocksError::assertion("ENGINE_NO_FRAME", "No runtime frame available.")
        })
    }
}

#[cfg(test)]
mod frame_stack_tests {
    use super::*;

    fn call_frame(position: usize) -> CallFrame {
        CallFrame {
            callee: Some(GlobalAddress::new(1, position)),
            name: "f".to_string(),
            return_addr: Some(GlobalAddress::new(0, 3)),
            saved_vars: Some(Variables::new()),
            block_stack: Vec::new(),
            unit: 0,
            returning: false,
        }
    }

    #[test]
    fn top_level_frame_cannot_be_popped() {
        let mut stack = CallStack::new(0);
        assert_eq!(stack.depth(), 1);
        let error = stack.pop_call().expect_err("top level stays");
        assert_eq!(error.code, "ENGINE_NO_FRAME");
        assert!(stack.top().expect("top").callee.is_none());
    }

    #[test]
    fn each_call_frame_owns_its_block_stack() {
        let mut stack = CallStack::new(0);
        stack
            .active_block_stack_mut()
            .expect("top level blocks")
            .push(StackFrame::If(IfState {
                addr: GlobalAddress::new(0, 1),
                pending_else_ifs: VecDeque::new(),
                matched: false,
            }));
        stack.push_call(call_frame(0));
        assert!(stack.active_block_stack().is_empty());

        let popped = stack.pop_call().expect("pop call");
        assert_eq!(popped.callee, Some(GlobalAddress::new(1, 0)));
        assert_eq!(stack.active_block_stack().len(), 1);
        assert_eq!(
            stack.active_block_stack()[0].addr(),
            GlobalAddress::new(0, 1)
        );
    }
}
