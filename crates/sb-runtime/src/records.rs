use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use sb_core::{StepBlocksError, Variables};
use sb_parser::{parse_json_records, parse_xml_records, Record};
use tracing::{debug, info};

/// Sequential access to the variable sets of a data file.
pub trait RecordReader: fmt::Debug {
    /// Loads the file and returns the field names of its first record.
    fn load(&mut self, path: &Path) -> Result<Vec<String>, StepBlocksError>;
    fn eof(&self) -> bool;
    /// Copies the next record into `vars`.
    fn next(&mut self, vars: &mut Variables) -> Result<(), StepBlocksError>;
}

#[derive(Debug, Default)]
struct RecordCursor {
    records: Vec<Record>,
    position: usize,
}

impl RecordCursor {
    fn reset(&mut self, records: Vec<Record>) -> Vec<String> {
        self.records = records;
        self.position = 0;
        self.records
            .first()
            .map(|record| record.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn eof(&self) -> bool {
        self.position >= self.records.len()
    }

    fn next(&mut self, desc: &str, vars: &mut Variables) -> Result<(), StepBlocksError> {
        let Some(record) = self.records.get(self.position) else {
            return Err(StepBlocksError::assertion(
                "ENGINE_RECORD_EOF",
                format!("No more {}s to read after #{}.", desc, self.position),
            ));
        };
        let ordinal = self.position + 1;

        let expected = self.records[0].keys().collect::<BTreeSet<_>>();
        let found = record.keys().collect::<BTreeSet<_>>();
        if expected != found {
            return Err(StepBlocksError::assertion(
                "ENGINE_RECORD_INCONSISTENT",
                format!(
                    "Inconsistent data at {} #{}; expected fields [{}], but found [{}]. Each {} must have the same set of fields.",
                    desc,
                    ordinal,
                    join(&expected),
                    join(&found),
                    desc
                ),
            ));
        }

        debug!(ordinal, desc, "loading record");
        for (name, value) in record {
            vars.insert(name.clone(), value.clone());
        }
        self.position += 1;
        Ok(())
    }
}

fn join(names: &BTreeSet<&String>) -> String {
    names
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_data_file(path: &Path) -> Result<String, StepBlocksError> {
    info!(path = %path.display(), "reading data file");
    fs::read_to_string(path).map_err(|error| {
        StepBlocksError::script(
            "SCRIPT_DATA_READ",
            format!("Failed to read data file \"{}\": {}", path.display(), error),
        )
    })
}

/// Reads a JSON array of objects.
#[derive(Debug, Default)]
pub struct JsonRecordReader {
    cursor: RecordCursor,
}

impl RecordReader for JsonRecordReader {
    fn load(&mut self, path: &Path) -> Result<Vec<String>, StepBlocksError> {
        let records = parse_json_records(&read_data_file(path)?)?;
        Ok(self.cursor.reset(records))
    }

    fn eof(&self) -> bool {
        self.cursor.eof()
    }

    fn next(&mut self, vars: &mut Variables) -> Result<(), StepBlocksError> {
        self.cursor.next("JSON object", vars)
    }
}

/// Reads the attributes of every `<vars>` element.
#[derive(Debug, Default)]
pub struct XmlRecordReader {
    cursor: RecordCursor,
}

impl RecordReader for XmlRecordReader {
    fn load(&mut self, path: &Path) -> Result<Vec<String>, StepBlocksError> {
        let records = parse_xml_records(&read_data_file(path)?)?;
        Ok(self.cursor.reset(records))
    }

    fn eof(&self) -> bool {
        self.cursor.eof()
    }

    fn next(&mut self, vars: &mut Variables) -> Result<(), StepBlocksError> {
        self.cursor.next("XML element", vars)
    }
}

#[cfg(test)]
mod records_tests {
    use super::*;
    use sb_core::SbValue;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("sb-runtime-records-{}", nanos));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }

    #[test]
    fn json_reader_walks_records_in_order() {
        let path = temp_file("users.json", r#"[{"name":"ann","age":3},{"name":"bob","age":4}]"#);
        let mut reader = JsonRecordReader::default();
        let mut names = reader.load(&path).expect("load");
        names.sort();
        assert_eq!(names, vec!["age".to_string(), "name".to_string()]);

        let mut vars = Variables::new();
        reader.next(&mut vars).expect("first");
        assert_eq!(vars.get("name"), Some(&SbValue::from("ann")));
        assert!(!reader.eof());
        reader.next(&mut vars).expect("second");
        assert_eq!(vars.get("age"), Some(&SbValue::Number(4.0)));
        assert!(reader.eof());

        let error = reader.next(&mut vars).expect_err("past the end");
        assert_eq!(error.code, "ENGINE_RECORD_EOF");
    }

    #[test]
    fn xml_reader_rejects_inconsistent_field_sets() {
        let path = temp_file(
            "data.xml",
            r#"<testdata><vars a="1" b="2"/><vars a="3"/></testdata>"#,
        );
        let mut reader = XmlRecordReader::default();
        reader.load(&path).expect("load");
        let mut vars = Variables::new();
        reader.next(&mut vars).expect("first");
        assert_eq!(vars.get("b"), Some(&SbValue::from("2")));
        let error = reader.next(&mut vars).expect_err("second is inconsistent");
        assert_eq!(error.code, "ENGINE_RECORD_INCONSISTENT");
        assert!(!error.is_catchable());
    }

    #[test]
    fn missing_files_are_catchable() {
        let mut reader = JsonRecordReader::default();
        let error = reader
            .load(Path::new("/definitely/not/here.json"))
            .expect_err("missing file");
        assert_eq!(error.code, "SCRIPT_DATA_READ");
        assert!(error.is_catchable());
    }
}
