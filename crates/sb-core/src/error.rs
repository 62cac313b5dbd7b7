use thiserror::Error;

/// Error taxonomy. Only `Script` errors take part in try/catch handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Address,
    Assertion,
    Script,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Address => "address",
            Self::Assertion => "assertion",
            Self::Script => "script",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct StepBlocksError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub command_ref: Option<String>,
}

impl StepBlocksError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            command_ref: None,
        }
    }

    pub fn syntax(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, code, message)
    }

    pub fn address(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Address, code, message)
    }

    pub fn assertion(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, code, message)
    }

    pub fn script(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Script, code, message)
    }

    /// Attaches a command reference unless one is already present.
    pub fn at_command(mut self, command_ref: impl Into<String>) -> Self {
        if self.command_ref.is_none() {
            self.command_ref = Some(command_ref.into());
        }
        self
    }

    pub fn is_catchable(&self) -> bool {
        self.kind == ErrorKind::Script
    }
}
