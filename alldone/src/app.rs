//! Command parsing and list rendering for the line-oriented front end.

use alldone_proto::auth::UserCredentials;
use alldone_proto::task::TaskId;

use crate::tasks::{LocalTask, Notice, NoticeLevel, PendingState};

/// Shown by `help`.
pub const HELP: &str = "\
commands:
  signup <email> <password>   create an account and sign in
  login <email> <password>    sign in
  logout                      sign out
  list                        show your tasks
  add <text>                  add a task
  edit <n> <text>             change the text of task n
  done <n> / undo <n>         mark task n completed / not completed
  rm <n>                      delete task n
  help                        show this help
  quit                        exit";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register and sign in.
    SignUp(UserCredentials),
    /// Sign in.
    LogIn(UserCredentials),
    /// Sign out.
    LogOut,
    /// Print the list.
    List,
    /// Add a task with this text.
    Add(String),
    /// Replace the text of the task at a 1-based position.
    Edit {
        /// 1-based list position.
        index: usize,
        /// New text.
        text: String,
    },
    /// Set the completion flag of the task at a 1-based position.
    SetCompleted {
        /// 1-based list position.
        index: usize,
        /// New flag.
        completed: bool,
    },
    /// Delete the task at a 1-based position.
    Remove(usize),
    /// Print help.
    Help,
    /// Exit.
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// First word is not a command.
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
    /// Arguments are missing or malformed.
    #[error("usage: {0}")]
    Usage(&'static str),
    /// A task number is not a positive integer.
    #[error("`{0}` is not a task number")]
    BadIndex(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`ParseError`] for unknown commands or bad arguments.
pub fn parse_command(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));

    let command = match word {
        "signup" => Command::SignUp(credentials(rest, "signup <email> <password>")?),
        "login" => Command::LogIn(credentials(rest, "login <email> <password>")?),
        "logout" => Command::LogOut,
        "list" | "ls" => Command::List,
        "add" if !rest.is_empty() => Command::Add(rest.to_string()),
        "add" => return Err(ParseError::Usage("add <text>")),
        "edit" => {
            let (index, text) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::Usage("edit <n> <text>"))?;
            Command::Edit {
                index: index_arg(index)?,
                text: text.trim().to_string(),
            }
        }
        "done" => Command::SetCompleted {
            index: index_arg(required(rest, "done <n>")?)?,
            completed: true,
        },
        "undo" => Command::SetCompleted {
            index: index_arg(required(rest, "undo <n>")?)?,
            completed: false,
        },
        "rm" | "delete" => Command::Remove(index_arg(required(rest, "rm <n>")?)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn required<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(rest)
    }
}

fn index_arg(arg: &str) -> Result<usize, ParseError> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::BadIndex(arg.to_string())),
    }
}

fn credentials(rest: &str, usage: &'static str) -> Result<UserCredentials, ParseError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(password), None) => Ok(UserCredentials {
            email: email.to_string(),
            password: password.to_string(),
        }),
        _ => Err(ParseError::Usage(usage)),
    }
}

/// Maps a 1-based list position to a task ID.
#[must_use]
pub fn task_at(tasks: &[LocalTask], index: usize) -> Option<TaskId> {
    index
        .checked_sub(1)
        .and_then(|i| tasks.get(i))
        .map(|t| t.id.clone())
}

const fn pending_label(pending: &PendingState) -> Option<&'static str> {
    match pending {
        PendingState::Confirmed => None,
        PendingState::PendingAdd => Some("saving"),
        PendingState::PendingUpdate { .. } => Some("updating"),
        PendingState::PendingDelete => Some("deleting"),
    }
}

/// One list line: position, checkbox, text, creation date, pending marker.
#[must_use]
pub fn render_task(index: usize, task: &LocalTask) -> String {
    let check = if task.completed { 'x' } else { ' ' };
    let mut line = format!(
        "{index:>3}. [{check}] {}  ({})",
        task.text,
        task.created_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(label) = pending_label(&task.pending) {
        line.push_str(&format!("  {label}..."));
    }
    line
}

/// The whole list, one task per line.
#[must_use]
pub fn render_list(tasks: &[LocalTask]) -> String {
    if tasks.is_empty() {
        return "no tasks yet, `add <text>` creates one".to_string();
    }
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| render_task(i + 1, task))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A notice prefixed with its severity.
#[must_use]
pub fn render_notice(notice: &Notice) -> String {
    let prefix = match notice.level {
        NoticeLevel::Info => "ok",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!("{prefix}: {}", notice.message)
}
