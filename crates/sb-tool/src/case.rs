use serde::{Deserialize, Serialize};

pub const TESTCASE_SCHEMA_V1: &str = "sb-tool-case.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_entry_unit")]
    pub entry_unit: String,
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub expected_events: Vec<ExpectedEvent>,
}

fn default_entry_unit() -> String {
    "main".to_string()
}

/// Observable run events: every echo, then exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExpectedEvent {
    Echo { text: String },
    Passed,
    Exited,
    Failed { code: String },
}

#[cfg(test)]
mod case_tests {
    use super::*;

    #[test]
    fn default_entry_unit_returns_main() {
        assert_eq!(default_entry_unit(), "main");
    }

    #[test]
    fn testcase_deserialize_applies_defaults() {
        let parsed: TestCase = serde_json::from_str(
            r#"{
  "schemaVersion": "sb-tool-case.v1",
  "expectedEvents": []
}"#,
        )
        .expect("testcase should deserialize");

        assert_eq!(parsed.schema_version, TESTCASE_SCHEMA_V1);
        assert_eq!(parsed.entry_unit, "main");
        assert_eq!(parsed.max_steps, None);
        assert!(parsed.expected_events.is_empty());
    }

    #[test]
    fn expected_event_deserialize_supports_all_variants() {
        let parsed: Vec<ExpectedEvent> = serde_json::from_str(
            r#"[
  {"kind":"echo","text":"a"},
  {"kind":"passed"},
  {"kind":"exited"},
  {"kind":"failed","code":"SCRIPT_THROWN"}
]"#,
        )
        .expect("events should deserialize");

        assert_eq!(parsed.len(), 4);
        assert!(matches!(parsed[0], ExpectedEvent::Echo { .. }));
        assert!(matches!(parsed[1], ExpectedEvent::Passed));
        assert!(matches!(parsed[2], ExpectedEvent::Exited));
        assert!(matches!(parsed[3], ExpectedEvent::Failed { .. }));
    }
}
