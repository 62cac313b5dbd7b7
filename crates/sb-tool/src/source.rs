use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::{SbToolError, TestCase, TESTCASE_SCHEMA_V1};

/// Collects unit sources (`.unit.xml`, `.html`) keyed by their path relative to `dir`.
pub fn read_units_xml_from_dir(dir: &Path) -> Result<BTreeMap<String, String>, SbToolError> {
    let mut units = BTreeMap::new();

    for entry in WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let path_str = path.to_string_lossy();
        if !(path_str.ends_with(".unit.xml") || path_str.ends_with(".html")) {
            continue;
        }

        let relative = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(|source| SbToolError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        units.insert(relative, content);
    }

    if units.is_empty() {
        return Err(SbToolError::SourceEmpty {
            path: dir.to_path_buf(),
        });
    }

    Ok(units)
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, SbToolError> {
    let raw = fs::read_to_string(case_path).map_err(|source| SbToolError::ReadFile {
        path: case_path.to_path_buf(),
        source,
    })?;
    let parsed: TestCase = serde_json::from_str(&raw).map_err(|source| SbToolError::ParseCase {
        path: case_path.to_path_buf(),
        source,
    })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(SbToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}
