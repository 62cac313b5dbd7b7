use std::collections::BTreeMap;

use sb_core::{CompiledSuite, ScriptUnit, StepBlocksError};
use sb_parser::parse_unit_source;

mod addressing;
mod block_compile;
mod jump_rules;

pub use addressing::{format_command_ref, label_address, parse_address, to_global, to_local};
pub use jump_rules::{assert_intra_block_jump, find_block_range, CommandRange};

/// Compiles units in the given order; the index of each unit becomes its address unit.
pub fn compile_suite(units: Vec<ScriptUnit>) -> Result<CompiledSuite, StepBlocksError> {
    let mut suite = CompiledSuite {
        units,
        ..CompiledSuite::default()
    };
    recompile(&mut suite)?;
    Ok(suite)
}

/// Clears and rebuilds the block map and symbol table.
pub fn recompile(suite: &mut CompiledSuite) -> Result<(), StepBlocksError> {
    let CompiledSuite {
        units,
        blocks,
        symbols,
    } = suite;
    block_compile::compile_units(units, blocks, symbols)
}

/// Parses unit sources keyed by path, then compiles them in path order.
pub fn compile_suite_from_xml_map(
    xml_by_path: &BTreeMap<String, String>,
) -> Result<CompiledSuite, StepBlocksError> {
    compile_suite(parse_units_from_xml_map(xml_by_path)?)
}

pub fn parse_units_from_xml_map(
    xml_by_path: &BTreeMap<String, String>,
) -> Result<Vec<ScriptUnit>, StepBlocksError> {
    let mut units: Vec<ScriptUnit> = Vec::with_capacity(xml_by_path.len());
    for (path, source) in xml_by_path {
        let unit = parse_unit_source(path, source)?;
        if let Some(existing) = units.iter().find(|existing| existing.name == unit.name) {
            return Err(StepBlocksError::syntax(
                "UNIT_NAME_DUPLICATE",
                format!(
                    "Duplicate unit name \"{}\" in \"{}\" and \"{}\".",
                    unit.name, existing.path, path
                ),
            ));
        }
        units.push(unit);
    }
    Ok(units)
}
