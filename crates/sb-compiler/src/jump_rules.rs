use std::fmt;

use sb_core::{BlockDef, BlockNature, CompiledSuite, GlobalAddress, StepBlocksError};

/// Span of commands a jump may not cross, with a description for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRange {
    pub top: GlobalAddress,
    pub bottom: GlobalAddress,
    pub desc: String,
}

impl CommandRange {
    fn same_span(&self, other: &CommandRange) -> bool {
        self.top == other.top && self.bottom == other.bottom
    }
}

impl fmt::Display for CommandRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @[{}-{}]",
            self.desc,
            self.top.position + 1,
            self.bottom.position + 1
        )
    }
}

/// Rejects jumps into or out of loops, functions and try/catch/finally sections.
pub fn assert_intra_block_jump(
    suite: &CompiledSuite,
    from: GlobalAddress,
    to: GlobalAddress,
) -> Result<(), StepBlocksError> {
    if from.unit != to.unit {
        return Err(StepBlocksError::assertion(
            "ENGINE_JUMP_CROSS_UNIT",
            format!(
                "Attempt to jump from {} into another unit at {}. Only call and return cross units.",
                from, to
            ),
        ));
    }

    let from_range = find_block_range(suite, from);
    let to_range = find_block_range(suite, to);
    if from_range.is_none() && to_range.is_none() {
        return Ok(());
    }

    if let (Some(from_range), Some(to_range)) = (&from_range, &to_range) {
        if from_range.same_span(to_range) {
            return Ok(());
        }
    }

    let mut message = "Attempt to jump".to_string();
    if let Some(range) = &from_range {
        message.push_str(&format!(" out of {}", range));
    }
    if let Some(range) = &to_range {
        message.push_str(&format!(" into {}", range));
    }
    message.push_str(". You cannot jump into, or out of: loops, functions, or try blocks.");
    Err(StepBlocksError::assertion("ENGINE_JUMP_RESTRICTED", message))
}

/// Innermost loop, function or try section enclosing `locus`; if-blocks are transparent.
pub fn find_block_range(suite: &CompiledSuite, locus: GlobalAddress) -> Option<CommandRange> {
    for position in (0..locus.position).rev() {
        let Some(block) = suite.block_at(GlobalAddress::new(locus.unit, position)) else {
            continue;
        };
        let Some(end) = block.end_addr else {
            continue;
        };
        if locus > end {
            continue;
        }
        match block.nature {
            Some(BlockNature::Loop) => {
                return Some(CommandRange {
                    top: block.addr,
                    bottom: end,
                    desc: format!("{} loop", block.kind.as_str()),
                })
            }
            Some(BlockNature::Function) => {
                return Some(CommandRange {
                    top: block.addr,
                    bottom: end,
                    desc: format!("function '{}'", block.name.as_deref().unwrap_or_default()),
                })
            }
            Some(BlockNature::Try) => return isolate_try_section(locus, block),
            Some(BlockNature::If) | None => {}
        }
    }
    None
}

fn isolate_try_section(locus: GlobalAddress, try_def: &BlockDef) -> Option<CommandRange> {
    let sections = [
        (try_def.finally_addr, try_def.end_addr, "finally"),
        (try_def.catch_addr, try_def.finally_addr, "catch"),
        (try_def.catch_addr, try_def.end_addr, "catch"),
        (Some(try_def.addr), try_def.catch_addr, "try"),
        (Some(try_def.addr), try_def.finally_addr, "try"),
        (Some(try_def.addr), try_def.end_addr, "try"),
    ];

    sections.into_iter().find_map(|(from, to, section)| {
        let (from, to) = (from?, to?);
        if !(from <= locus && locus < to) {
            return None;
        }
        let mut desc = format!("{}-block", section);
        if section != "try" {
            desc.push_str(" for");
        }
        if let Some(name) = &try_def.name {
            desc.push_str(&format!(" '{}'", name));
        }
        Some(CommandRange {
            top: from,
            bottom: to,
            desc,
        })
    })
}
