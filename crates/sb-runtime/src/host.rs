use sb_core::{Command, SbValue, StepBlocksError, Variables};

use crate::evaluator::ExpressionEvaluator;

/// What a host command may touch while it runs.
pub struct HostContext<'a> {
    pub vars: &'a mut Variables,
    pub evaluator: &'a dyn ExpressionEvaluator,
}

impl HostContext<'_> {
    pub fn evaluate(&mut self, expr: &str) -> Result<SbValue, StepBlocksError> {
        self.evaluator.evaluate(expr, self.vars)
    }
}

/// Executes every command the flow engine does not handle itself.
pub trait CommandHost {
    fn execute(&mut self, command: &Command, ctx: HostContext<'_>) -> Result<(), StepBlocksError>;
}
