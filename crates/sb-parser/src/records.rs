use std::collections::BTreeMap;

use sb_core::{ErrorKind, SbValue, StepBlocksError};

use crate::xml::parse_xml_document;

/// One variable set read from a data file.
pub type Record = BTreeMap<String, SbValue>;

/// Reads a top-level JSON array of objects.
pub fn parse_json_records(source: &str) -> Result<Vec<Record>, StepBlocksError> {
    let records: Vec<Record> = serde_json::from_str(source).map_err(|error| {
        StepBlocksError::script(
            "SCRIPT_DATA_PARSE",
            format!("JSON data must be an array of objects: {}", error),
        )
    })?;
    if records.is_empty() {
        return Err(StepBlocksError::script(
            "SCRIPT_DATA_EMPTY",
            "A JSON object could not be loaded, or the file was empty.",
        ));
    }
    Ok(records)
}

/// Reads every `<vars>` element; attributes become string fields.
pub fn parse_xml_records(source: &str) -> Result<Vec<Record>, StepBlocksError> {
    let document = parse_xml_document(source).map_err(|mut error| {
        error.kind = ErrorKind::Script;
        error.code = "SCRIPT_DATA_PARSE".to_string();
        error
    })?;

    let mut elements = Vec::new();
    if document.root.name.eq_ignore_ascii_case("vars") {
        elements.push(&document.root);
    }
    document.root.descendants_named("vars", &mut elements);

    if elements.is_empty() {
        return Err(StepBlocksError::script(
            "SCRIPT_DATA_EMPTY",
            "A <vars> element could not be loaded, or <testdata> was empty.",
        ));
    }

    Ok(elements
        .into_iter()
        .map(|element| {
            element
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), SbValue::String(value.clone())))
                .collect()
        })
        .collect())
}
