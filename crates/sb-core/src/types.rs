use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StepBlocksError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self {
            start: SourceLocation { line: 1, column: 1 },
            end: SourceLocation { line: 1, column: 1 },
        }
    }
}

/// One row of a script unit: `name | target | value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceSpan>,
}

impl Command {
    pub fn new(name: impl Into<String>, target: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            value: value.into(),
            location: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptUnit {
    pub name: String,
    pub path: String,
    pub commands: Vec<Command>,
}

impl ScriptUnit {
    pub fn new(name: impl Into<String>, commands: Vec<Command>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            commands,
        }
    }
}

/// Suite-wide command identifier, written `unit/position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalAddress {
    pub unit: usize,
    pub position: usize,
}

impl GlobalAddress {
    pub const fn new(unit: usize, position: usize) -> Self {
        Self { unit, position }
    }

    /// Saturates at `usize::MAX`, which no unit can address.
    pub fn offset(self, shift: usize) -> Self {
        Self {
            unit: self.unit,
            position: self.position.saturating_add(shift),
        }
    }
}

impl fmt::Display for GlobalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.unit, self.position)
    }
}

impl FromStr for GlobalAddress {
    type Err = StepBlocksError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || {
            StepBlocksError::address(
                "ADDRESS_MALFORMED",
                format!("Malformed command address \"{}\".", raw),
            )
        };
        let (unit, position) = raw.split_once('/').ok_or_else(malformed)?;
        let unit = unit.trim().parse::<usize>().map_err(|_| malformed())?;
        let position = position.trim().parse::<usize>().map_err(|_| malformed())?;
        Ok(Self { unit, position })
    }
}

/// Unit-scoped label symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelKey {
    pub unit: usize,
    pub label: String,
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.unit, self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockNature {
    If,
    Try,
    Loop,
    Function,
}

impl BlockNature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Try => "try",
            Self::Loop => "loop",
            Self::Function => "function",
        }
    }
}

macro_rules! command_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Every command name the flow engine understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandKind {
            $($variant),+
        }

        impl CommandKind {
            pub const ALL: &'static [CommandKind] = &[$(CommandKind::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }

            fn from_exact(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

command_kinds! {
    Label => "label",
    Goto => "goto",
    GotoIf => "gotoIf",
    SkipNext => "skipNext",
    If => "if",
    ElseIf => "elseIf",
    Else => "else",
    EndIf => "endIf",
    Try => "try",
    Catch => "catch",
    Finally => "finally",
    EndTry => "endTry",
    Throw => "throw",
    While => "while",
    For => "for",
    Foreach => "foreach",
    ForJson => "forJson",
    ForXml => "forXml",
    Break => "break",
    Continue => "continue",
    EndWhile => "endWhile",
    EndFor => "endFor",
    EndForeach => "endForeach",
    EndForJson => "endForJson",
    EndForXml => "endForXml",
    Call => "call",
    Function => "function",
    Script => "script",
    Return => "return",
    EndFunction => "endFunction",
    EndScript => "endScript",
    ExitTest => "exitTest",
    LoadJsonVars => "loadJsonVars",
    LoadXmlVars => "loadXmlVars",
}

pub const AND_WAIT_SUFFIX: &str = "AndWait";

impl CommandKind {
    /// Resolves a command name, reporting whether it carried an `AndWait` suffix.
    pub fn parse(name: &str) -> Option<(Self, bool)> {
        match name.find(AND_WAIT_SUFFIX) {
            Some(index) => Self::from_exact(&name[..index]).map(|kind| (kind, true)),
            None => Self::from_exact(name).map(|kind| (kind, false)),
        }
    }

    /// Nature of the construct this command opens, if it is an opener.
    pub fn opens(&self) -> Option<BlockNature> {
        match self {
            Self::If => Some(BlockNature::If),
            Self::Try => Some(BlockNature::Try),
            Self::While | Self::For | Self::Foreach | Self::ForJson | Self::ForXml => {
                Some(BlockNature::Loop)
            }
            Self::Function | Self::Script => Some(BlockNature::Function),
            _ => None,
        }
    }

    /// Opener paired with this closer.
    pub fn closes(&self) -> Option<Self> {
        match self {
            Self::EndIf => Some(Self::If),
            Self::EndTry => Some(Self::Try),
            Self::EndWhile => Some(Self::While),
            Self::EndFor => Some(Self::For),
            Self::EndForeach => Some(Self::Foreach),
            Self::EndForJson => Some(Self::ForJson),
            Self::EndForXml => Some(Self::ForXml),
            Self::EndFunction => Some(Self::Function),
            Self::EndScript => Some(Self::Script),
            _ => None,
        }
    }

    /// Name of the closer expected for this opener, e.g. `endForJson`.
    pub fn terminator_name(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("end{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "end".to_string(),
        }
    }
}

/// Static facts about one command participating in a construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDef {
    pub addr: GlobalAddress,
    pub kind: CommandKind,
    pub nature: Option<BlockNature>,
    pub name: Option<String>,
    pub if_addr: Option<GlobalAddress>,
    pub else_addr: Option<GlobalAddress>,
    pub else_if_addrs: Vec<GlobalAddress>,
    pub try_addr: Option<GlobalAddress>,
    pub catch_addr: Option<GlobalAddress>,
    pub finally_addr: Option<GlobalAddress>,
    pub begin_addr: Option<GlobalAddress>,
    pub end_addr: Option<GlobalAddress>,
    pub func_addr: Option<GlobalAddress>,
}

impl BlockDef {
    pub fn new(addr: GlobalAddress, kind: CommandKind) -> Self {
        Self {
            addr,
            kind,
            nature: kind.opens(),
            name: None,
            if_addr: None,
            else_addr: None,
            else_if_addrs: Vec::new(),
            try_addr: None,
            catch_addr: None,
            finally_addr: None,
            begin_addr: None,
            end_addr: None,
            func_addr: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    pub functions: BTreeMap<String, GlobalAddress>,
    pub labels: BTreeMap<LabelKey, GlobalAddress>,
}

impl SymbolTable {
    pub fn clear(&mut self) {
        self.functions.clear();
        self.labels.clear();
    }
}

/// Units plus the block map and symbols derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledSuite {
    pub units: Vec<ScriptUnit>,
    pub blocks: BTreeMap<GlobalAddress, BlockDef>,
    pub symbols: SymbolTable,
}

impl CompiledSuite {
    pub fn block_at(&self, addr: GlobalAddress) -> Option<&BlockDef> {
        self.blocks.get(&addr)
    }

    pub fn command_at(&self, addr: GlobalAddress) -> Option<&Command> {
        self.units
            .get(addr.unit)
            .and_then(|unit| unit.commands.get(addr.position))
    }

    pub fn unit_index(&self, name: &str) -> Option<usize> {
        self.units.iter().position(|unit| unit.name == name)
    }
}
