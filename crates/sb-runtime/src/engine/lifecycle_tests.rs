use super::runtime_test_support::*;
use super::*;

#[test]
fn new_rejects_units_that_do_not_compile() {
    let result = FlowEngine::new(FlowEngineOptions::new(vec![unit(
        "main",
        &[("if", "true", "")],
    )]));
    let error = result.err().expect("unterminated if should fail");
    assert_eq!(error.code, "COMPILE_UNTERMINATED_BLOCK");
}

#[test]
fn handles_only_plain_flow_commands() {
    let engine = engine_from_units(vec![unit("main", &[])]);
    assert!(engine.handles("if"));
    assert!(engine.handles("loadXmlVars"));
    assert!(!engine.handles("ifAndWait"));
    assert!(!engine.handles("echo"));
}

#[test]
fn pending_branch_overrides_the_default_successor() {
    let mut engine = engine_from_units(vec![unit(
        "main",
        &[("if", "false", ""), ("echo", "1", ""), ("endIf", "", "")],
    )]);
    engine.before_run().expect("before run");
    let first = GlobalAddress::new(0, 0);
    assert_eq!(engine.compute_next_command(Some(first)), Some(first));
    engine.execute(first).expect("if should run");
    assert_eq!(
        engine.compute_next_command(Some(GlobalAddress::new(0, 1))),
        Some(GlobalAddress::new(0, 2))
    );
    assert_eq!(engine.compute_next_command(None), None);
}

#[test]
fn execute_attaches_the_command_reference() {
    let mut engine = engine_from_units(vec![unit("main", &[("goto", "gone", "")])]);
    engine.before_run().expect("before run");
    let error = engine
        .execute(GlobalAddress::new(0, 0))
        .expect_err("missing label");
    assert_eq!(error.command_ref.as_deref(), Some("@main: 1: [goto|gone|]"));

    let error = engine
        .execute(GlobalAddress::new(0, 4))
        .expect_err("out of range");
    assert_eq!(error.code, "ADDRESS_OUT_OF_RANGE");
}

#[test]
fn replace_units_recompiles_the_suite() {
    let mut engine = engine_from_units(vec![unit("main", &[("label", "a", "")])]);
    assert_eq!(engine.suite().symbols.labels.len(), 1);

    engine
        .replace_units(vec![unit(
            "main",
            &[("function", "f", ""), ("endFunction", "", "")],
        )])
        .expect("replacement compiles");
    assert!(engine.suite().symbols.labels.is_empty());
    assert!(engine.suite().symbols.functions.contains_key("f"));

    let error = engine
        .replace_units(vec![unit("main", &[("endIf", "", "")])])
        .expect_err("stray endIf");
    assert_eq!(error.code, "COMPILE_BLOCK_NOT_PENDING");
}

#[test]
fn before_run_resets_state_but_keeps_variables() {
    let mut engine = engine_from_units(vec![unit(
        "main",
        &[("try", "", ""), ("finally", "", ""), ("endTry", "", "")],
    )]);
    engine.before_run().expect("before run");
    engine
        .variables_mut()
        .insert("kept".to_string(), SbValue::Bool(true));
    engine.execute(GlobalAddress::new(0, 0)).expect("try");
    assert_eq!(engine.nesting_level(), 0);

    engine.before_run().expect("second run");
    assert_eq!(engine.nesting_level(), -1);
    assert_eq!(engine.call_depth(), 1);
    assert_eq!(engine.current(), None);
    assert_eq!(engine.variables().get("kept"), Some(&SbValue::Bool(true)));
}

#[test]
fn non_script_errors_are_never_handled() {
    let mut engine = engine_from_units(vec![unit(
        "main",
        &[("try", "", ""), ("catch", "", ""), ("endTry", "", "")],
    )]);
    engine.before_run().expect("before run");
    engine.execute(GlobalAddress::new(0, 0)).expect("try");
    let disposition =
        engine.handle_command_error(StepBlocksError::assertion("ENGINE_X", "broken"));
    assert!(matches!(disposition, ErrorDisposition::Unhandled(error) if error.code == "ENGINE_X"));

    let disposition = engine.handle_command_error(StepBlocksError::script("SCRIPT_X", "oops"));
    assert_eq!(disposition, ErrorDisposition::Handled);
    assert_eq!(
        engine.compute_next_command(None),
        Some(GlobalAddress::new(0, 1))
    );
    assert_eq!(engine.variables().get("_error"), Some(&SbValue::from("oops")));
}

#[test]
fn abandon_unwinds_calls_and_blocks() {
    let mut engine = engine_from_units(vec![unit(
        "main",
        &[
            ("foreach", "v", "1, 2"),
            ("call", "f", ""),
            ("endForeach", "", ""),
            ("function", "f", ""),
            ("try", "", ""),
            ("finally", "", ""),
            ("endTry", "", ""),
            ("endFunction", "", ""),
        ],
    )]);
    engine.before_run().expect("before run");
    for position in [0, 1, 3, 4] {
        engine
            .execute(GlobalAddress::new(0, position))
            .expect("step should pass");
    }
    assert_eq!(engine.call_depth(), 2);
    assert_eq!(engine.nesting_level(), 0);

    engine.abandon();
    assert_eq!(engine.call_depth(), 1);
    assert_eq!(engine.nesting_level(), -1);
    assert!(!engine.variables().contains_key("v"));
}
