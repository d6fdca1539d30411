//! Command line parsing
//!
//! One command per line, whitespace separated, case-sensitive keywords.

use std::fmt;

/// A parsed control-channel command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Save the latest full-resolution frame
    Capture,
    /// Enumerate capture devices
    List,
    /// Describe the open device
    Info,
    /// List controls of the open device
    Controls,
    /// Set a device control
    SetControl { id: u32, value: i32 },
    /// Pipeline counters
    Stats,
}

impl Command {
    /// Keyword as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Command::Capture => "CAPTURE",
            Command::List => "LIST",
            Command::Info => "INFO",
            Command::Controls => "CONTROLS",
            Command::SetControl { .. } => "SET_CONTROL",
            Command::Stats => "STATS",
        }
    }
}

/// Validation failure for one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Keyword not recognised
    UnknownCommand(String),
    /// Wrong number of arguments
    InvalidArity {
        command: &'static str,
        usage: &'static str,
    },
    /// Control ID is not an unsigned 32-bit integer
    InvalidControlId(String),
    /// Control value is not a signed 32-bit integer
    InvalidControlValue(String),
}

impl CommandError {
    /// Keyword the error relates to
    pub fn command(&self) -> &str {
        match self {
            CommandError::UnknownCommand(name) => name,
            CommandError::InvalidArity { command, .. } => command,
            CommandError::InvalidControlId(_) | CommandError::InvalidControlValue(_) => {
                "SET_CONTROL"
            }
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownCommand(name) => write!(f, "unknown command: {}", name),
            CommandError::InvalidArity { usage, .. } => {
                write!(f, "invalid command format, expected: {}", usage)
            }
            CommandError::InvalidControlId(raw) => write!(f, "invalid control ID: {}", raw),
            CommandError::InvalidControlValue(raw) => write!(f, "invalid control value: {}", raw),
        }
    }
}

impl std::error::Error for CommandError {}

/// Parse one input line
///
/// Returns `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(keyword) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    let command = match keyword {
        "CAPTURE" => no_args(Command::Capture, &args)?,
        "LIST" => no_args(Command::List, &args)?,
        "INFO" => no_args(Command::Info, &args)?,
        "CONTROLS" => no_args(Command::Controls, &args)?,
        "STATS" => no_args(Command::Stats, &args)?,
        "SET_CONTROL" => {
            let &[id, value] = args.as_slice() else {
                return Err(CommandError::InvalidArity {
                    command: "SET_CONTROL",
                    usage: "SET_CONTROL <ID> <value>",
                });
            };
            let id = id
                .parse::<u32>()
                .map_err(|_| CommandError::InvalidControlId(id.to_string()))?;
            let value = value
                .parse::<i32>()
                .map_err(|_| CommandError::InvalidControlValue(value.to_string()))?;
            Command::SetControl { id, value }
        }
        other => return Err(CommandError::UnknownCommand(other.to_string())),
    };

    Ok(Some(command))
}

fn no_args(command: Command, args: &[&str]) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::InvalidArity {
            command: command.name(),
            usage: command.name(),
        })
    }
}
