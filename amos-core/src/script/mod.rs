//! AMOScript: bulk string operations embedded in commit messages.
//!
//! ```text
//! AMOS BEGIN
//!  CPY [configintro,tool_generator],[configintro,core_admin]
//!  MOV [err_nopermission,mod_forum],[nopermission,mod_forum]
//! AMOS END
//! ```
//!
//! Failures of individual instructions are values ([`ScriptError`]), so a
//! caller can run a whole script and report how far it got.

mod executor;
pub mod frankenstyle;
mod parser;

pub use executor::{ScriptContext, ScriptOutcome, ScriptRun, execute, execute_script};
pub use parser::{Instruction, StringRef, extract_script_from_text, parse_instruction};

use std::fmt;

use thiserror::Error;

/// Status codes reported for failed instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStatus {
    SyntaxError = -1,
    UnknownInstruction = -2,
    InvalidComponent = -3,
}

impl ScriptStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptStatus::SyntaxError => "syntax error",
            ScriptStatus::UnknownInstruction => "unknown instruction",
            ScriptStatus::InvalidComponent => "invalid component",
        };
        write!(f, "{name} ({})", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status} in `{instruction}`: {detail}")]
pub struct ScriptError {
    pub status: ScriptStatus,
    pub instruction: String,
    pub detail: String,
}

impl ScriptError {
    pub(crate) fn new(status: ScriptStatus, instruction: &str, detail: impl Into<String>) -> Self {
        Self {
            status,
            instruction: instruction.to_string(),
            detail: detail.into(),
        }
    }
}
