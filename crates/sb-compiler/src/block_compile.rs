use std::collections::BTreeMap;

use sb_core::{
    BlockDef, BlockNature, CommandKind, GlobalAddress, ScriptUnit, StepBlocksError, SymbolTable,
};
use tracing::debug;

use crate::addressing::{format_command_ref, label_address, to_global};

/// Rebuilds block definitions and symbols for every unit from scratch.
pub(crate) fn compile_units(
    units: &[ScriptUnit],
    blocks: &mut BTreeMap<GlobalAddress, BlockDef>,
    symbols: &mut SymbolTable,
) -> Result<(), StepBlocksError> {
    blocks.clear();
    symbols.clear();

    for unit_index in 0..units.len() {
        let mut compiler = UnitCompiler {
            units,
            blocks: &mut *blocks,
            symbols: &mut *symbols,
            open: Vec::new(),
        };
        compiler.compile(unit_index)?;
    }

    debug!(
        units = units.len(),
        blocks = blocks.len(),
        functions = symbols.functions.len(),
        labels = symbols.labels.len(),
        "compiled suite"
    );
    Ok(())
}

struct UnitCompiler<'a> {
    units: &'a [ScriptUnit],
    blocks: &'a mut BTreeMap<GlobalAddress, BlockDef>,
    symbols: &'a mut SymbolTable,
    open: Vec<GlobalAddress>,
}

impl UnitCompiler<'_> {
    fn compile(&mut self, unit_index: usize) -> Result<(), StepBlocksError> {
        let units = self.units;
        let unit = &units[unit_index];
        for (position, command) in unit.commands.iter().enumerate() {
            let Some((kind, and_wait)) = CommandKind::parse(&command.name) else {
                continue;
            };
            let addr = to_global(unit_index, position);
            if and_wait {
                return Err(self.error_at(
                    addr,
                    "COMPILE_AND_WAIT",
                    ", AndWait suffix is not valid for flow commands",
                ));
            }
            self.compile_command(addr, kind, command.target.trim())
                .map_err(|error| error.at_command(format_command_ref(self.units, addr)))?;
        }

        if self.open.is_empty() {
            return Ok(());
        }

        let pending = self
            .open
            .iter()
            .map(|addr| {
                let kind = self.blocks[addr].kind;
                format!(
                    "{} without a terminating '{}'",
                    format_command_ref(self.units, *addr),
                    kind.terminator_name()
                )
            })
            .collect::<Vec<_>>();
        Err(StepBlocksError::syntax(
            "COMPILE_UNTERMINATED_BLOCK",
            pending.join("; "),
        ))
    }

    fn compile_command(
        &mut self,
        addr: GlobalAddress,
        kind: CommandKind,
        target: &str,
    ) -> Result<(), StepBlocksError> {
        match kind {
            CommandKind::Label => {
                if target.is_empty() {
                    return Err(self.error_at(addr, "COMPILE_NAME_MISSING", ", requires a label name"));
                }
                let key = label_address(target, addr.unit);
                if self.symbols.labels.contains_key(&key) {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_DUPLICATE_LABEL",
                        format!(", label '{}' is already defined in this unit", target),
                    ));
                }
                self.symbols.labels.insert(key, addr);
            }

            CommandKind::If => self.open_block(addr, kind, None),
            CommandKind::ElseIf => {
                let if_addr = self.expect_top(
                    addr,
                    CommandKind::If,
                    ", is not valid outside of an if/endIf block",
                )?;
                if let Some(else_addr) = self.blocks[&if_addr].else_addr {
                    return Err(StepBlocksError::syntax(
                        "COMPILE_ELSE_ORDER",
                        format!(
                            "{} An else has to come after all elseIfs.",
                            format_command_ref(self.units, else_addr)
                        ),
                    ));
                }
                self.define(addr, kind).if_addr = Some(if_addr);
                self.link(if_addr, |def| def.else_if_addrs.push(addr));
            }
            CommandKind::Else => {
                let if_addr = self.expect_top(
                    addr,
                    CommandKind::If,
                    ", is not valid outside of an if/endIf block",
                )?;
                if self.blocks[&if_addr].else_addr.is_some() {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_DUPLICATE_ELSE",
                        " There can only be one else associated with a given if.",
                    ));
                }
                self.define(addr, kind).if_addr = Some(if_addr);
                self.link(if_addr, |def| def.else_addr = Some(addr));
            }
            CommandKind::EndIf => {
                let if_addr = self.close_block(addr, CommandKind::If, None)?;
                self.define(addr, kind).if_addr = Some(if_addr);
                self.link(if_addr, |def| def.end_addr = Some(addr));
                let if_def = &self.blocks[&if_addr];
                let branches = if_def
                    .else_if_addrs
                    .iter()
                    .copied()
                    .chain(if_def.else_addr)
                    .collect::<Vec<_>>();
                for branch in branches {
                    self.link(branch, |def| def.end_addr = Some(addr));
                }
            }

            CommandKind::Try => self.open_block(addr, kind, non_empty(target)),
            CommandKind::Catch => {
                let try_addr =
                    self.expect_top(addr, CommandKind::Try, ", is not valid without a try block")?;
                let try_def = &self.blocks[&try_addr];
                if try_def.catch_addr.is_some() {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_DUPLICATE_CATCH",
                        " There can only be one catch-block associated with a given try.",
                    ));
                }
                if let Some(finally_addr) = try_def.finally_addr {
                    return Err(StepBlocksError::syntax(
                        "COMPILE_FINALLY_ORDER",
                        format!(
                            "{} A finally-block has to be last in a try section.",
                            format_command_ref(self.units, finally_addr)
                        ),
                    ));
                }
                self.define(addr, kind).try_addr = Some(try_addr);
                self.link(try_addr, |def| def.catch_addr = Some(addr));
            }
            CommandKind::Finally => {
                let try_addr = self.expect_top(addr, CommandKind::Try, ", without a beginning [try]")?;
                if self.blocks[&try_addr].finally_addr.is_some() {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_DUPLICATE_FINALLY",
                        " There can only be one finally-block associated with a given try.",
                    ));
                }
                self.define(addr, kind).try_addr = Some(try_addr);
                self.link(try_addr, |def| def.finally_addr = Some(addr));
                if let Some(catch_addr) = self.blocks[&try_addr].catch_addr {
                    self.link(catch_addr, |def| def.finally_addr = Some(addr));
                }
            }
            CommandKind::EndTry => {
                let try_addr = self.close_block(addr, CommandKind::Try, non_empty(target))?;
                self.define(addr, kind).try_addr = Some(try_addr);
                self.link(try_addr, |def| def.end_addr = Some(addr));
                let try_def = &self.blocks[&try_addr];
                let sections = [try_def.catch_addr, try_def.finally_addr];
                for section in sections.into_iter().flatten() {
                    self.link(section, |def| def.end_addr = Some(addr));
                }
            }

            CommandKind::While
            | CommandKind::For
            | CommandKind::Foreach
            | CommandKind::ForJson
            | CommandKind::ForXml => self.open_block(addr, kind, None),
            CommandKind::Break | CommandKind::Continue => {
                let Some(loop_addr) = self.enclosing(BlockNature::Loop) else {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_NOT_IN_LOOP",
                        ", is not valid outside of a loop",
                    ));
                };
                self.define(addr, kind).begin_addr = Some(loop_addr);
            }
            CommandKind::EndWhile
            | CommandKind::EndFor
            | CommandKind::EndForeach
            | CommandKind::EndForJson
            | CommandKind::EndForXml => {
                let opener = kind.closes().unwrap_or(CommandKind::While);
                let begin_addr = self.close_block(addr, opener, None)?;
                self.link(begin_addr, |def| def.end_addr = Some(addr));
                self.define(addr, kind).begin_addr = Some(begin_addr);
            }

            CommandKind::Function | CommandKind::Script => {
                if target.is_empty() {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_NAME_MISSING",
                        ", requires a function name",
                    ));
                }
                if let Some(existing) = self.symbols.functions.get(target) {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_DUPLICATE_FUNCTION",
                        format!(
                            ", function '{}' is already defined at {}",
                            target,
                            format_command_ref(self.units, *existing)
                        ),
                    ));
                }
                self.symbols.functions.insert(target.to_string(), addr);
                self.open_block(addr, kind, Some(target.to_string()));
            }
            CommandKind::Return => {
                let Some(func_addr) = self.enclosing(BlockNature::Function) else {
                    return Err(self.error_at(
                        addr,
                        "COMPILE_NOT_IN_FUNCTION",
                        ", is not valid outside of a function/endFunction block",
                    ));
                };
                self.define(addr, kind).func_addr = Some(func_addr);
            }
            CommandKind::EndFunction | CommandKind::EndScript => {
                let opener = kind.closes().unwrap_or(CommandKind::Function);
                let func_addr = self.close_block(addr, opener, non_empty(target))?;
                self.link(func_addr, |def| def.end_addr = Some(addr));
                self.define(addr, kind).func_addr = Some(func_addr);
            }

            CommandKind::Call => {
                self.define(addr, kind);
            }

            CommandKind::Goto
            | CommandKind::GotoIf
            | CommandKind::SkipNext
            | CommandKind::Throw
            | CommandKind::ExitTest
            | CommandKind::LoadJsonVars
            | CommandKind::LoadXmlVars => {}
        }
        Ok(())
    }

    fn open_block(&mut self, addr: GlobalAddress, kind: CommandKind, name: Option<String>) {
        self.define(addr, kind).name = name;
        self.open.push(addr);
    }

    /// Top of the lexical stack, which must be an opener of `expected`.
    fn expect_top(
        &self,
        addr: GlobalAddress,
        expected: CommandKind,
        missing: &str,
    ) -> Result<GlobalAddress, StepBlocksError> {
        let Some(top) = self.open.last().copied() else {
            return Err(self.error_at(addr, "COMPILE_BLOCK_NOT_PENDING", missing));
        };
        self.assert_matching(addr, top, expected)?;
        Ok(top)
    }

    fn close_block(
        &mut self,
        addr: GlobalAddress,
        expected: CommandKind,
        name: Option<String>,
    ) -> Result<GlobalAddress, StepBlocksError> {
        let Some(top) = self.open.pop() else {
            return Err(self.error_at(
                addr,
                "COMPILE_BLOCK_NOT_PENDING",
                format!(", without an beginning [{}]", expected.as_str()),
            ));
        };
        self.assert_matching(addr, top, expected)?;
        if let Some(name) = name {
            if self.blocks[&top].name.as_deref() != Some(name.as_str()) {
                return Err(self.mismatch(addr, top));
            }
        }
        Ok(top)
    }

    fn assert_matching(
        &self,
        addr: GlobalAddress,
        top: GlobalAddress,
        expected: CommandKind,
    ) -> Result<(), StepBlocksError> {
        if self.blocks[&top].kind == expected {
            Ok(())
        } else {
            Err(self.mismatch(addr, top))
        }
    }

    fn mismatch(&self, addr: GlobalAddress, pending: GlobalAddress) -> StepBlocksError {
        self.error_at(
            addr,
            "COMPILE_BLOCK_MISMATCH",
            format!(
                ", does not match command {}",
                format_command_ref(self.units, pending)
            ),
        )
    }

    fn enclosing(&self, nature: BlockNature) -> Option<GlobalAddress> {
        self.open
            .iter()
            .rev()
            .copied()
            .find(|addr| self.blocks[addr].nature == Some(nature))
    }

    fn define(&mut self, addr: GlobalAddress, kind: CommandKind) -> &mut BlockDef {
        self.blocks
            .entry(addr)
            .or_insert_with(|| BlockDef::new(addr, kind))
    }

    fn link(&mut self, addr: GlobalAddress, update: impl FnOnce(&mut BlockDef)) {
        if let Some(def) = self.blocks.get_mut(&addr) {
            update(def);
        }
    }

    fn error_at(
        &self,
        addr: GlobalAddress,
        code: &str,
        detail: impl AsRef<str>,
    ) -> StepBlocksError {
        StepBlocksError::syntax(
            code,
            format!("{}{}", format_command_ref(self.units, addr), detail.as_ref()),
        )
    }
}

fn non_empty(target: &str) -> Option<String> {
    (!target.is_empty()).then(|| target.to_string())
}
