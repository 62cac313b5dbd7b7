use sb_core::{GlobalAddress, LabelKey, ScriptUnit, StepBlocksError};

pub fn to_global(unit: usize, position: usize) -> GlobalAddress {
    GlobalAddress::new(unit, position)
}

/// Splits an address back into `(unit, position)`, checking both against the suite.
pub fn to_local(
    units: &[ScriptUnit],
    addr: GlobalAddress,
) -> Result<(usize, usize), StepBlocksError> {
    let unit = units.get(addr.unit).ok_or_else(|| {
        StepBlocksError::address(
            "ADDRESS_OUT_OF_RANGE",
            format!("Unit index {} is out of range in address {}.", addr.unit, addr),
        )
    })?;
    if addr.position >= unit.commands.len() {
        return Err(StepBlocksError::address(
            "ADDRESS_OUT_OF_RANGE",
            format!(
                "Position {} is out of range for unit \"{}\" ({} commands).",
                addr.position,
                unit.name,
                unit.commands.len()
            ),
        ));
    }
    Ok((addr.unit, addr.position))
}

pub fn parse_address(text: &str) -> Result<GlobalAddress, StepBlocksError> {
    text.parse()
}

pub fn label_address(label: &str, unit: usize) -> LabelKey {
    LabelKey {
        unit,
        label: label.trim().to_string(),
    }
}

/// Human-readable reference, e.g. `@main: 3: [if|$x > 1|]`.
pub fn format_command_ref(units: &[ScriptUnit], addr: GlobalAddress) -> String {
    let Some(unit) = units.get(addr.unit) else {
        return format!("@{}", addr);
    };
    match unit.commands.get(addr.position) {
        Some(command) => format!(
            "@{}: {}: [{}|{}|{}]",
            unit.name,
            addr.position + 1,
            command.name,
            command.target,
            command.value
        ),
        None => format!("@{}: {}", unit.name, addr.position + 1),
    }
}
