use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use rhai::{Array, Dynamic, ImmutableString, Map, FLOAT, INT};
use sb_core::{SbValue, StepBlocksError};

/// Prefix under which stored variables are exposed to Rhai.
pub(crate) const STORED_VAR_PREFIX: &str = "__sv_";

fn stored_var_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\$([A-Za-z_]\w*)").expect("stored var regex must compile"))
}

fn rhai_identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_]\w*$").expect("identifier regex must compile"))
}

/// Rewrites `$name` references to the scope symbols the evaluator pushes.
pub(crate) fn expand_stored_vars(expr: &str) -> String {
    stored_var_regex()
        .replace_all(expr, format!("{}$1", STORED_VAR_PREFIX).as_str())
        .to_string()
}

pub(crate) fn stored_var_symbol(name: &str) -> Option<String> {
    rhai_identifier_regex()
        .is_match(name)
        .then(|| format!("{}{}", STORED_VAR_PREFIX, name))
}

pub(crate) fn sbvalue_to_dynamic(value: &SbValue) -> Dynamic {
    match value {
        SbValue::Null => Dynamic::UNIT,
        SbValue::Bool(value) => Dynamic::from_bool(*value),
        SbValue::Number(value) => Dynamic::from_float(*value as FLOAT),
        SbValue::String(value) => Dynamic::from(value.clone()),
        SbValue::Array(values) => {
            Dynamic::from_array(values.iter().map(sbvalue_to_dynamic).collect::<Array>())
        }
        SbValue::Map(values) => {
            let mut map = Map::new();
            for (key, value) in values {
                map.insert(key.as_str().into(), sbvalue_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

pub(crate) fn dynamic_to_sbvalue(value: Dynamic) -> Result<SbValue, StepBlocksError> {
    if value.is_unit() {
        return Ok(SbValue::Null);
    }
    if value.is::<bool>() {
        return Ok(SbValue::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(SbValue::Number(value.cast::<INT>() as f64));
    }
    if value.is::<FLOAT>() {
        return Ok(SbValue::Number(value.cast::<FLOAT>()));
    }
    if value.is::<ImmutableString>() {
        return Ok(SbValue::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(SbValue::String(value.cast::<char>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_sbvalue(item)?);
        }
        return Ok(SbValue::Array(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.to_string(), dynamic_to_sbvalue(value)?);
        }
        return Ok(SbValue::Map(out));
    }

    Err(StepBlocksError::script(
        "SCRIPT_VALUE_UNSUPPORTED",
        format!("Unsupported expression result type \"{}\".", value.type_name()),
    ))
}
