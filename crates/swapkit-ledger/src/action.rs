use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

const FIELD_SEPARATOR: char = '\t';

/// One deferred file or process operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Launch `exe`, optionally with a shell-quoted argument string. The
    /// executor does not wait for it.
    Start { exe: PathBuf, args: Option<String> },
    Move { from: PathBuf, to: PathBuf },
    Copy { from: PathBuf, to: PathBuf },
    /// Remove a file, or a directory recursively.
    Remove { path: PathBuf },
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
            Self::Remove { .. } => "remove",
        }
    }

    /// The path whose directory must be writable for the action to succeed.
    #[must_use]
    pub fn target(&self) -> Option<&Path> {
        match self {
            Self::Start { .. } => None,
            Self::Move { to, .. } | Self::Copy { to, .. } => Some(to),
            Self::Remove { path } => Some(path),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { exe, args: None } => write!(f, "start\t{}", exe.display()),
            Self::Start {
                exe,
                args: Some(args),
            } => write!(f, "start\t{}\t{args}", exe.display()),
            Self::Move { from, to } => write!(f, "move\t{}\t{}", from.display(), to.display()),
            Self::Copy { from, to } => write!(f, "copy\t{}\t{}", from.display(), to.display()),
            Self::Remove { path } => write!(f, "remove\t{}", path.display()),
        }
    }
}

/// Why a single action line could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAction {
    #[error("unknown action '{0}'")]
    UnknownKind(String),
    #[error("'{kind}' takes {expected} field(s) but {found} were given")]
    FieldCount {
        kind: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("'{kind}' has an empty path")]
    EmptyPath { kind: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid action on line {line}: {reason}")]
pub struct ActionParseError {
    pub line: usize,
    #[source]
    pub reason: InvalidAction,
}

impl FromStr for Action {
    type Err = InvalidAction;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

        let path = |kind: &'static str, value: &str| {
            if value.is_empty() {
                Err(InvalidAction::EmptyPath { kind })
            } else {
                Ok(PathBuf::from(value))
            }
        };
        let field_count = |kind: &'static str, expected: &'static str| InvalidAction::FieldCount {
            kind,
            expected,
            found: fields.len() - 1,
        };

        match fields.as_slice() {
            ["start", exe] => Ok(Self::Start {
                exe: path("start", *exe)?,
                args: None,
            }),
            ["start", exe, args] => Ok(Self::Start {
                exe: path("start", *exe)?,
                args: (!args.is_empty()).then(|| (*args).to_string()),
            }),
            ["start", ..] => Err(field_count("start", "1 or 2")),
            ["move", from, to] => Ok(Self::Move {
                from: path("move", *from)?,
                to: path("move", *to)?,
            }),
            ["move", ..] => Err(field_count("move", "2")),
            ["copy", from, to] => Ok(Self::Copy {
                from: path("copy", *from)?,
                to: path("copy", *to)?,
            }),
            ["copy", ..] => Err(field_count("copy", "2")),
            ["remove", target] => Ok(Self::Remove {
                path: path("remove", *target)?,
            }),
            ["remove", ..] => Err(field_count("remove", "1")),
            [kind, ..] => Err(InvalidAction::UnknownKind((*kind).to_string())),
            [] => Err(InvalidAction::UnknownKind(String::new())),
        }
    }
}

/// Iterate the non-blank lines of an action file as `(line number, action)`,
/// numbering from 1.
pub fn action_lines(
    content: &str,
) -> impl Iterator<Item = (usize, Result<Action, ActionParseError>)> + '_ {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let line_number = index + 1;
            let action = line.parse().map_err(|reason| ActionParseError {
                line: line_number,
                reason,
            });
            (line_number, action)
        })
}

/// Parse a whole action file, stopping at the first invalid line.
///
/// # Errors
/// Returns [`ActionParseError`] naming the first line that is not an action.
pub fn parse_action_file(content: &str) -> Result<Vec<Action>, ActionParseError> {
    action_lines(content).map(|(_, action)| action).collect()
}

/// Render actions one per line, each terminated by `\n`.
#[must_use]
pub fn render_action_file(actions: &[Action]) -> String {
    actions.iter().map(|action| format!("{action}\n")).collect()
}
