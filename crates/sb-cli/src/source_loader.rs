use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sb_core::StepBlocksError;
use walkdir::WalkDir;

use crate::{map_cli_source_path, map_cli_source_read, map_cli_source_scan};

pub(crate) fn resolve_dir(dir: &str, flag: &str) -> Result<PathBuf, StepBlocksError> {
    let path = PathBuf::from(dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(StepBlocksError::assertion(
            "CLI_SOURCE_NOT_FOUND",
            format!("{} does not exist: {}", flag, absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(StepBlocksError::assertion(
            "CLI_SOURCE_NOT_DIR",
            format!("{} is not a directory: {}", flag, absolute.display()),
        ));
    }

    Ok(absolute)
}

/// Reads `.unit.xml` and Selenese `.html` sources; data files are left alone.
pub(crate) fn read_units_xml_from_dir(
    suite_dir: &Path,
) -> Result<BTreeMap<String, String>, StepBlocksError> {
    let mut units = BTreeMap::new();

    for entry in WalkDir::new(suite_dir)
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
            .strip_prefix(suite_dir)
            .map_err(map_cli_source_scan)?
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        units.insert(relative, content);
    }

    if units.is_empty() {
        return Err(StepBlocksError::assertion(
            "CLI_SOURCE_EMPTY",
            format!("No .unit.xml/.html files under {}", suite_dir.display()),
        ));
    }

    Ok(units)
}
