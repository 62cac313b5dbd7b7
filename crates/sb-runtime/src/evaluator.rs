use rhai::{Dynamic, Engine, Scope};
use sb_core::{SbValue, StepBlocksError, Variables};

use crate::helpers::rhai_bridge::{
    dynamic_to_sbvalue, expand_stored_vars, sbvalue_to_dynamic, stored_var_symbol,
};

/// Opaque expression capability used for conditions, values and assignments.
pub trait ExpressionEvaluator {
    fn evaluate(&self, expr: &str, vars: &mut Variables) -> Result<SbValue, StepBlocksError>;
}

/// Rhai-backed evaluator. `$name` reads and writes the stored variable `name`.
pub struct RhaiEvaluator {
    engine: Engine,
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RhaiEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_strict_variables(true);
        Self { engine }
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(&self, expr: &str, vars: &mut Variables) -> Result<SbValue, StepBlocksError> {
        let mut scope = Scope::new();
        let mut bound = Vec::with_capacity(vars.len());
        for (name, value) in vars.iter() {
            let Some(symbol) = stored_var_symbol(name) else {
                continue;
            };
            scope.push_dynamic(symbol.clone(), sbvalue_to_dynamic(value));
            bound.push((name.clone(), symbol));
        }

        let source = expand_stored_vars(expr);
        let result = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, &source)
            .map_err(|error| {
                StepBlocksError::script(
                    "SCRIPT_EVAL_ERROR",
                    format!("Expression \"{}\" failed: {}", expr, error),
                )
            })?;

        for (name, symbol) in bound {
            if let Some(after) = scope.get_value::<Dynamic>(&symbol) {
                vars.insert(name, dynamic_to_sbvalue(after)?);
            }
        }

        dynamic_to_sbvalue(result)
    }
}

#[cfg(test)]
mod evaluator_tests {
    use super::*;

    fn vars(entries: &[(&str, SbValue)]) -> Variables {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn evaluates_conditions_against_stored_vars() {
        let evaluator = RhaiEvaluator::new();
        let mut vars = vars(&[("x", SbValue::Number(2.0))]);
        assert_eq!(
            evaluator.evaluate("$x > 1", &mut vars).expect("eval"),
            SbValue::Bool(true)
        );
        assert_eq!(
            evaluator.evaluate("$x * 3", &mut vars).expect("eval"),
            SbValue::Number(6.0)
        );
    }

    #[test]
    fn assignments_write_back_into_the_namespace() {
        let evaluator = RhaiEvaluator::new();
        let mut vars = vars(&[("i", SbValue::Null)]);
        evaluator.evaluate("$i = 0", &mut vars).expect("init");
        evaluator.evaluate("$i = $i + 2", &mut vars).expect("iterate");
        assert_eq!(vars.get("i"), Some(&SbValue::Number(2.0)));
    }

    #[test]
    fn array_literals_and_strings_round_trip() {
        let evaluator = RhaiEvaluator::new();
        let mut vars = Variables::new();
        assert_eq!(
            evaluator.evaluate("[1, \"b\"]", &mut vars).expect("eval"),
            SbValue::Array(vec![SbValue::Number(1.0), SbValue::from("b")])
        );
    }

    #[test]
    fn unknown_variables_and_syntax_errors_are_script_errors() {
        let evaluator = RhaiEvaluator::new();
        let mut vars = Variables::new();
        let error = evaluator
            .evaluate("$missing + 1", &mut vars)
            .expect_err("unknown variable");
        assert_eq!(error.code, "SCRIPT_EVAL_ERROR");
        assert!(error.is_catchable());

        let error = evaluator.evaluate("1 +", &mut vars).expect_err("syntax");
        assert_eq!(error.code, "SCRIPT_EVAL_ERROR");
    }
}
