use std::path::Path;

use sb_api::{run_suite_from_xml, CreateEngineFromXmlOptions, RunOptions, RunOutcome, DEFAULT_MAX_STEPS};

use crate::{read_test_case, read_units_xml_from_dir, ExpectedEvent, SbToolError, TestCase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub events: Vec<ExpectedEvent>,
    pub steps: usize,
}

/// Runs the units under `example_dir`. Data files resolve against the same directory.
pub fn run_case(example_dir: &Path, case: &TestCase) -> Result<RunReport, SbToolError> {
    let units_xml = read_units_xml_from_dir(example_dir)?;
    let max_steps = case.max_steps.unwrap_or(DEFAULT_MAX_STEPS);

    let mut options = CreateEngineFromXmlOptions::new(units_xml);
    options.data_dir = Some(example_dir.to_path_buf());
    let (report, echoes) = run_suite_from_xml(
        options,
        &RunOptions {
            entry_unit: Some(case.entry_unit.clone()),
            max_steps,
        },
    )?;

    let mut events = echoes
        .into_iter()
        .map(|text| ExpectedEvent::Echo { text })
        .collect::<Vec<_>>();
    events.push(match report.outcome {
        RunOutcome::Passed => ExpectedEvent::Passed,
        RunOutcome::Exited => ExpectedEvent::Exited,
        RunOutcome::Failed(error) if error.code == "API_STEP_LIMIT" => {
            return Err(SbToolError::GuardExceeded { max_steps });
        }
        RunOutcome::Failed(error) => ExpectedEvent::Failed { code: error.code },
    });

    Ok(RunReport {
        events,
        steps: report.steps,
    })
}

pub fn assert_case(example_dir: &Path, case_path: &Path) -> Result<(), SbToolError> {
    let case = read_test_case(case_path)?;
    let report = run_case(example_dir, &case)?;

    if report.events.len() != case.expected_events.len() {
        let observed = serde_json::to_string_pretty(&report.events)
            .map_err(SbToolError::EventSerialize)?;
        return Err(SbToolError::EventCountMismatch {
            expected: case.expected_events.len(),
            actual: report.events.len(),
            observed,
        });
    }

    for (index, (expected, actual)) in case
        .expected_events
        .iter()
        .zip(report.events.iter())
        .enumerate()
    {
        if expected != actual {
            return Err(SbToolError::EventMismatch {
                index,
                expected: serde_json::to_string(expected).map_err(SbToolError::EventSerialize)?,
                actual: serde_json::to_string(actual).map_err(SbToolError::EventSerialize)?,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod runner_tests {
    use super::*;

    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use crate::TESTCASE_SCHEMA_V1;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("sb-tool-runner-{}-{}", name, nanos));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    fn case(entry_unit: &str, expected_events: Vec<ExpectedEvent>) -> TestCase {
        TestCase {
            schema_version: TESTCASE_SCHEMA_V1.to_string(),
            entry_unit: entry_unit.to_string(),
            max_steps: None,
            expected_events,
        }
    }

    const LOOP_UNIT: &str = r#"<unit name="main">
  <command name="storeEval" target="0" value="n"/>
  <command name="while" target="$n &lt; 2"/>
  <command name="echo" target="n=${n}"/>
  <command name="storeEval" target="$n + 1" value="n"/>
  <command name="endWhile"/>
</unit>"#;

    #[test]
    fn run_case_collects_echoes_and_outcome() {
        let root = temp_dir("loop");
        fs::write(root.join("main.unit.xml"), LOOP_UNIT).expect("unit should be written");

        let report = run_case(&root, &case("main", Vec::new())).expect("run should pass");
        assert_eq!(
            report.events,
            vec![
                ExpectedEvent::Echo {
                    text: "n=0".to_string()
                },
                ExpectedEvent::Echo {
                    text: "n=1".to_string()
                },
                ExpectedEvent::Passed,
            ]
        );
    }

    #[test]
    fn run_case_reports_failures_and_guard() {
        let root = temp_dir("failures");
        fs::write(
            root.join("main.unit.xml"),
            r#"<unit name="main"><command name="throw" target='"boom"'/></unit>"#,
        )
        .expect("unit should be written");
        fs::write(
            root.join("spin.unit.xml"),
            r#"<unit name="spin"><command name="while" target="true"/><command name="endWhile"/></unit>"#,
        )
        .expect("unit should be written");

        let report = run_case(&root, &case("main", Vec::new())).expect("run should finish");
        assert_eq!(
            report.events,
            vec![ExpectedEvent::Failed {
                code: "SCRIPT_THROWN".to_string()
            }]
        );

        let mut spin = case("spin", Vec::new());
        spin.max_steps = Some(20);
        let error = run_case(&root, &spin).expect_err("guard should trip");
        assert!(matches!(error, SbToolError::GuardExceeded { max_steps: 20 }));
    }

    #[test]
    fn assert_case_reports_count_and_event_mismatches() {
        let root = temp_dir("assert");
        fs::write(root.join("main.unit.xml"), LOOP_UNIT).expect("unit should be written");

        let case_path = root.join("testcase.json");
        fs::write(
            &case_path,
            r#"{"schemaVersion":"sb-tool-case.v1","expectedEvents":[{"kind":"passed"}]}"#,
        )
        .expect("case should be written");
        let error = assert_case(&root, &case_path).expect_err("count should mismatch");
        assert!(matches!(
            error,
            SbToolError::EventCountMismatch {
                expected: 1,
                actual: 3,
                ..
            }
        ));

        fs::write(
            &case_path,
            r#"{"schemaVersion":"sb-tool-case.v1","expectedEvents":[
  {"kind":"echo","text":"n=0"},
  {"kind":"echo","text":"n=9"},
  {"kind":"passed"}
]}"#,
        )
        .expect("case should be written");
        let error = assert_case(&root, &case_path).expect_err("event should mismatch");
        assert!(matches!(error, SbToolError::EventMismatch { index: 1, .. }));

        fs::write(
            &case_path,
            r#"{"schemaVersion":"sb-tool-case.v1","expectedEvents":[
  {"kind":"echo","text":"n=0"},
  {"kind":"echo","text":"n=1"},
  {"kind":"passed"}
]}"#,
        )
        .expect("case should be written");
        assert_case(&root, &case_path).expect("case should pass");
    }
}
