//! Connection roles and the command grammar.
//!
//! A command line is split on whitespace; the first token selects the
//! verb (exact case) and the rest are positional arguments. Each verb is
//! matched together with the exact shape of its argument slice.

use std::fmt;

use crate::error::CommandError;

// ── Role ─────────────────────────────────────────────────────────

/// Which listener a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Data endpoint: browse and fetch files.
    Normal,
    /// Administrative endpoint: hide/reveal files and shut down.
    Control,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Normal => write!(f, "normal"),
            Role::Control => write!(f, "control"),
        }
    }
}

// ── Command ──────────────────────────────────────────────────────

/// A parsed, immutable client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `start` — handshake token; a no-op once the session is active.
    Start,
    /// `List <dir>`
    List { dir: String },
    /// `GET <file> <dir>`
    Get { file: String, dir: String },
    /// `tree <dir>`
    Tree { dir: String },
    /// `GOTO <target> <currentDir>`
    Goto { target: String, current: String },
    /// `HIDE <file> <dir>`
    Hide { file: String, dir: String },
    /// `REVEAL <file> <dir>`
    Reveal { file: String, dir: String },
    /// `Terminate`
    Terminate,
    /// `Help`
    Help,
    /// `end`
    End,
    /// `messages` — dump the diagnostic history to the server log.
    Messages,
}

impl Command {
    /// Parse one message (surrounding whitespace and the terminator are ignored).
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        let command = match (verb, args.as_slice()) {
            ("start", []) => Command::Start,
            ("List", [dir]) => Command::List { dir: dir.to_string() },
            ("GET", [file, dir]) => Command::Get {
                file: file.to_string(),
                dir: dir.to_string(),
            },
            ("tree", [dir]) => Command::Tree { dir: dir.to_string() },
            ("GOTO", [target, current]) => Command::Goto {
                target: target.to_string(),
                current: current.to_string(),
            },
            ("HIDE", [file, dir]) => Command::Hide {
                file: file.to_string(),
                dir: dir.to_string(),
            },
            ("REVEAL", [file, dir]) => Command::Reveal {
                file: file.to_string(),
                dir: dir.to_string(),
            },
            ("Terminate", []) => Command::Terminate,
            ("Help", []) => Command::Help,
            ("end", []) => Command::End,
            ("messages", []) => Command::Messages,
            (other, args) => return Err(mismatch(other, args.len())),
        };

        Ok(command)
    }

    /// The wire verb of this command.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::List { .. } => "List",
            Command::Get { .. } => "GET",
            Command::Tree { .. } => "tree",
            Command::Goto { .. } => "GOTO",
            Command::Hide { .. } => "HIDE",
            Command::Reveal { .. } => "REVEAL",
            Command::Terminate => "Terminate",
            Command::Help => "Help",
            Command::End => "end",
            Command::Messages => "messages",
        }
    }

    /// Whether a session with `role` may execute this command.
    pub fn allowed_for(&self, role: Role) -> bool {
        match self {
            Command::Get { .. } => role == Role::Normal,
            Command::Hide { .. } | Command::Reveal { .. } | Command::Terminate => {
                role == Role::Control
            }
            _ => true,
        }
    }

    /// Whether this command is counted as an in-flight operation.
    pub fn is_counted(&self) -> bool {
        matches!(
            self,
            Command::List { .. }
                | Command::Get { .. }
                | Command::Tree { .. }
                | Command::Hide { .. }
                | Command::Reveal { .. }
        )
    }
}

impl fmt::Display for Command {
    /// Renders the command exactly as it travels on the wire.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::List { dir } | Command::Tree { dir } => write!(f, "{} {dir}", self.verb()),
            Command::Get { file, dir } | Command::Hide { file, dir } | Command::Reveal { file, dir } => {
                write!(f, "{} {file} {dir}", self.verb())
            }
            Command::Goto { target, current } => write!(f, "GOTO {target} {current}"),
            _ => write!(f, "{}", self.verb()),
        }
    }
}

/// Every verb with the number of arguments it takes.
const ARITIES: &[(&str, usize)] = &[
    ("start", 0),
    ("List", 1),
    ("GET", 2),
    ("tree", 1),
    ("GOTO", 2),
    ("HIDE", 2),
    ("REVEAL", 2),
    ("Terminate", 0),
    ("Help", 0),
    ("end", 0),
    ("messages", 0),
];

/// Error for a line that matched no `(verb, arguments)` shape.
fn mismatch(verb: &str, received: usize) -> CommandError {
    match ARITIES.iter().find(|(known, _)| *known == verb) {
        Some(&(verb, expected)) => CommandError::Arity {
            verb,
            expected,
            received,
        },
        None => CommandError::UnknownVerb(verb.to_string()),
    }
}
