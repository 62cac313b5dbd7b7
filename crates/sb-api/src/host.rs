use std::sync::OnceLock;

use regex::{Captures, Regex};
use sb_core::{Command, SbValue, StepBlocksError, Variables};
use sb_runtime::{CommandHost, HostContext};
use tracing::info;

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_]\w*)\}").expect("placeholder regex must compile")
    })
}

/// Replaces `${name}` with the stored value; unknown names are left as written.
pub fn expand_placeholders(text: &str, vars: &Variables) -> String {
    placeholder_regex()
        .replace_all(text, |captures: &Captures<'_>| match vars.get(&captures[1]) {
            Some(value) => value.to_string(),
            None => captures[0].to_string(),
        })
        .into_owned()
}

fn variable_name(command: &Command) -> Result<String, StepBlocksError> {
    let name = command.value.trim();
    let name = name.strip_prefix('$').unwrap_or(name);
    if name.is_empty() {
        return Err(StepBlocksError::script(
            "SCRIPT_COMMAND_INVALID",
            format!("'{}' requires a variable name in its value.", command.name),
        ));
    }
    Ok(name.to_string())
}

/// Reference host: a handful of Selenese-like commands, enough to drive suites
/// without a browser.
#[derive(Debug, Default)]
pub struct BasicHost {
    echoes: Vec<String>,
}

impl BasicHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echoes(&self) -> &[String] {
        &self.echoes
    }

    pub fn take_echoes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.echoes)
    }
}

impl CommandHost for BasicHost {
    fn execute(&mut self, command: &Command, mut ctx: HostContext<'_>) -> Result<(), StepBlocksError> {
        match command.name.as_str() {
            "echo" => {
                let text = expand_placeholders(&command.target, ctx.vars);
                info!(text = %text, "echo");
                self.echoes.push(text);
            }
            "store" => {
                let name = variable_name(command)?;
                let text = expand_placeholders(&command.target, ctx.vars);
                ctx.vars.insert(name, SbValue::String(text));
            }
            "storeEval" => {
                let name = variable_name(command)?;
                let value = ctx.evaluate(&command.target)?;
                ctx.vars.insert(name, value);
            }
            "assertEval" => {
                let actual = ctx.evaluate(&command.target)?.to_string();
                let expected = expand_placeholders(&command.value, ctx.vars);
                if actual != expected {
                    return Err(StepBlocksError::script(
                        "SCRIPT_ASSERTION_FAILED",
                        format!("Actual value '{}' did not match '{}'", actual, expected),
                    ));
                }
            }
            "fail" => {
                return Err(StepBlocksError::script(
                    "SCRIPT_COMMAND_FAILED",
                    expand_placeholders(&command.target, ctx.vars),
                ))
            }
            "comment" | "pause" => {}
            other => {
                return Err(StepBlocksError::script(
                    "SCRIPT_UNKNOWN_COMMAND",
                    format!("Unknown command: '{}'", other),
                ))
            }
        }
        Ok(())
    }
}
