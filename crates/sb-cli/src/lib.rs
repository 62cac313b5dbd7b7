use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use sb_api::{
    compile_units_from_xml_map, run_suite_from_xml, CreateEngineFromXmlOptions, RunOptions,
    RunOutcome, DEFAULT_MAX_STEPS,
};
use sb_core::StepBlocksError;
use tracing::debug;

mod cli_args;
mod error_map;
mod source_loader;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, RunArgs};
pub(crate) use error_map::{
    emit_error, emit_error_details, json_string, map_cli_source_path, map_cli_source_read,
    map_cli_source_scan,
};
pub(crate) use source_loader::{read_units_xml_from_dir, resolve_dir};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, StepBlocksError> {
    match cli.command {
        Mode::Run(args) => run_suite(args),
        Mode::Check(args) => check_suite(args),
    }
}

fn run_suite(args: RunArgs) -> Result<i32, StepBlocksError> {
    let suite_dir = resolve_dir(&args.suite_dir, "suite-dir")?;
    let data_dir: PathBuf = match &args.data_dir {
        Some(dir) => resolve_dir(dir, "data-dir")?,
        None => suite_dir.clone(),
    };
    let units_xml = read_units_xml_from_dir(&suite_dir)?;
    debug!(units = units_xml.len(), suite = %suite_dir.display(), "loaded suite");

    let mut options = CreateEngineFromXmlOptions::new(units_xml);
    options.data_dir = Some(data_dir);
    let (report, echoes) = run_suite_from_xml(
        options,
        &RunOptions {
            entry_unit: args.entry_unit,
            max_steps: args.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
        },
    )?;

    println!("RESULT:OK");
    for text in &echoes {
        println!("ECHO_JSON:{}", json_string(text));
    }
    println!("STEPS:{}", report.steps);
    match report.outcome {
        RunOutcome::Passed => {
            println!("OUTCOME:PASSED");
            Ok(0)
        }
        RunOutcome::Exited => {
            println!("OUTCOME:EXITED");
            Ok(0)
        }
        RunOutcome::Failed(error) => {
            println!("OUTCOME:FAILED");
            emit_error_details(&error);
            Ok(1)
        }
    }
}

fn check_suite(args: CheckArgs) -> Result<i32, StepBlocksError> {
    let suite_dir = resolve_dir(&args.suite_dir, "suite-dir")?;
    let units_xml = read_units_xml_from_dir(&suite_dir)?;
    let suite = compile_units_from_xml_map(&units_xml)?;

    println!("RESULT:OK");
    for unit in &suite.units {
        println!("UNIT_JSON:{}", json_string(&unit.name));
    }
    println!("BLOCKS:{}", suite.blocks.len());
    println!("FUNCTIONS:{}", suite.symbols.functions.len());
    Ok(0)
}

#[cfg(test)]
pub(crate) mod cli_test_support {
    pub(crate) use std::fs;
    pub(crate) use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("sb-cli-{}-{}", name, nanos))
    }

    pub(crate) fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent should be created");
        }
        fs::write(path, content).expect("file should be written");
    }
}
