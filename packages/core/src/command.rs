//! Instance commands exchanged over the command channel.
//!
//! Commands travel as flat ASCII strings, `kind[:arg1[:arg2...]]`. Arguments
//! cannot contain the `:` delimiter; there is no escaping. Local pause and
//! resume are accepted both as `pauseLocal`/`resumeLocal` and in the scoped
//! `Pause:Local`/`Resume:Local` form; they are always sent in the former.

use serde::{Deserialize, Serialize};

/// Separator between the command kind and its arguments.
pub const COMMAND_DELIMITER: char = ':';

/// Scope argument of the `Pause:Local`/`Resume:Local` spelling.
const LOCAL_SCOPE: &str = "Local";

/// Pub/sub topic an instance listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Topic {
    /// Commands addressed to dedicated worker instances.
    Worker,
    /// Commands addressed to primary instances.
    Primary,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Worker => "WORKER",
            Topic::Primary => "PRIMARY",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a command asks the receiving instance to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Stop pulling jobs in the receiving process.
    PauseLocal,
    /// Start pulling jobs in the receiving process.
    ResumeLocal,
    /// A kind this build does not know about.
    Unknown(String),
}

impl CommandKind {
    /// Wire token for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            CommandKind::PauseLocal => "pauseLocal",
            CommandKind::ResumeLocal => "resumeLocal",
            CommandKind::Unknown(token) => token,
        }
    }

    fn from_token(token: &str) -> Self {
        match token {
            "pauseLocal" => CommandKind::PauseLocal,
            "resumeLocal" => CommandKind::ResumeLocal,
            other => CommandKind::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command with its positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<String>,
}

impl Command {
    /// Create a command without arguments.
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            args: Vec::new(),
        }
    }

    /// Attach positional arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Serialize to the flat wire format.
    pub fn encode(&self) -> Result<String, CommandParseError> {
        let kind = self.kind.as_str();
        if kind.is_empty() {
            return Err(CommandParseError::Empty);
        }
        if kind.contains(COMMAND_DELIMITER) {
            return Err(CommandParseError::DelimiterInKind(kind.to_string()));
        }

        let mut wire = String::from(kind);
        for arg in &self.args {
            if arg.contains(COMMAND_DELIMITER) {
                return Err(CommandParseError::DelimiterInArgument(arg.clone()));
            }
            wire.push(COMMAND_DELIMITER);
            wire.push_str(arg);
        }
        Ok(wire)
    }

    /// Parse the flat wire format.
    pub fn decode(raw: &str) -> Result<Self, CommandParseError> {
        let mut parts = raw.split(COMMAND_DELIMITER);
        let kind = match parts.next() {
            Some(kind) if !kind.trim().is_empty() => kind.trim(),
            _ => return Err(CommandParseError::Empty),
        };

        let mut args: Vec<String> = parts.map(str::to_string).collect();
        let kind = match (kind, args.first().map(String::as_str)) {
            // Scoped form: `Pause:Local`, `Resume:Local`.
            ("Pause", Some(LOCAL_SCOPE)) => {
                args.remove(0);
                CommandKind::PauseLocal
            }
            ("Resume", Some(LOCAL_SCOPE)) => {
                args.remove(0);
                CommandKind::ResumeLocal
            }
            (token, _) => CommandKind::from_token(token),
        };

        Ok(Self { kind, args })
    }
}

/// Errors produced by the command codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("command kind contains the delimiter: {0}")]
    DelimiterInKind(String),

    #[error("command argument contains the delimiter: {0}")]
    DelimiterInArgument(String),
}
