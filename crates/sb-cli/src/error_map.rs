use sb_core::StepBlocksError;
use std::fmt::Display;

fn map_error(code: &'static str, error: impl Display) -> StepBlocksError {
    StepBlocksError::assertion(code, error.to_string())
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("{:?}", text))
}

pub(crate) fn emit_error_details(error: &StepBlocksError) {
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    if let Some(command_ref) = &error.command_ref {
        println!("ERROR_REF_JSON:{}", json_string(command_ref));
    }
}

pub(crate) fn emit_error(error: StepBlocksError) -> i32 {
    println!("RESULT:ERROR");
    emit_error_details(&error);
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> StepBlocksError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> StepBlocksError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> StepBlocksError {
    map_error("CLI_SOURCE_READ", error)
}
