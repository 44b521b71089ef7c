//! Turning caller input into something the executor can spawn
//!
//! Two input shapes are accepted:
//!
//! - a raw command line, split on whitespace with no quoting awareness and
//!   handed to the shell (so `echo "a  b"` prints `a b`: the run of spaces
//!   inside the quotes is collapsed before the shell ever sees it)
//! - a [`CommandSpec`], an explicit program plus argument vector that is
//!   spawned directly without a shell

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Structured program + argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable form used in results and logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split a command line on whitespace into program and arguments
///
/// Returns `None` for a blank line.
pub fn split_command_line(line: &str) -> Option<CommandSpec> {
    let mut parts = line.split_whitespace();
    let program = parts.next()?;
    Some(CommandSpec::new(program).args(parts))
}

/// Shell builtins and reserved words: never found on `PATH`, always valid
const SHELL_BUILTINS: &[&str] = &[
    ".", ":", "[", "!", "{", "alias", "bg", "break", "builtin", "case", "cd", "command",
    "continue", "echo", "eval", "exec", "exit", "export", "false", "fg", "for", "getopts",
    "hash", "if", "jobs", "kill", "local", "printf", "pwd", "read", "readonly", "return",
    "set", "shift", "source", "test", "time", "trap", "true", "type", "ulimit", "umask",
    "unalias", "unset", "until", "wait", "while",
];

/// Characters that make the first token something the shell must expand
const SHELL_METACHARS: &[char] = &[
    '$', '`', '(', ')', '{', '}', '\'', '"', '\\', '*', '?', '~', '<', '>', '|', '&', ';', '=',
];

/// How the program token of a shell command line should be checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramKind {
    /// Builtin, keyword, assignment or expansion: only the shell can judge
    ShellInterpreted,
    /// Contains a path separator; must exist on disk
    Path,
    /// Bare name; must resolve on `PATH`
    Bare,
}

pub fn classify_program(program: &str) -> ProgramKind {
    if SHELL_BUILTINS.contains(&program) || program.contains(SHELL_METACHARS) {
        ProgramKind::ShellInterpreted
    } else if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        ProgramKind::Path
    } else {
        ProgramKind::Bare
    }
}

/// Whether the program token of a shell command line can be started
pub fn program_exists(program: &str) -> bool {
    match classify_program(program) {
        ProgramKind::ShellInterpreted => true,
        ProgramKind::Path => Path::new(program).exists(),
        ProgramKind::Bare => which::which(program).is_ok(),
    }
}
