use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "protask",
    version,
    about = "Collaborative to-do manager over a shared local store",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "protaskrc", global = true)]
    pub protaskrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task
    Add(AddArgs),
    /// Show tasks in a view
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show one task in full
    Show { id: String },
    /// Change fields of a task
    Edit(EditArgs),
    /// Mark tasks completed
    Done { ids: Vec<String> },
    /// Mark tasks open again
    Undone { ids: Vec<String> },
    /// Flip completion of tasks
    Toggle { ids: Vec<String> },
    /// Delete tasks permanently
    #[command(alias = "rm")]
    Delete { ids: Vec<String> },
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    /// Apply one change to many tasks
    #[command(subcommand)]
    Bulk(BulkCommand),
    #[command(subcommand)]
    Lists(ListCommand),
    /// Show a month grid of due tasks
    Calendar(CalendarArgs),
    /// Write the whole state as JSON
    Export {
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Replace the whole state from a JSON export
    Import { path: PathBuf },
    /// Interactive session: follows other writers and fires reminders
    Watch,
    /// Run one reminder sweep
    Remind,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    /// today, tomorrow, +3d, friday, 2024-06-01, ...
    #[arg(short = 'd', long = "due")]
    pub due: Option<String>,

    /// HH:MM or 9am
    #[arg(short = 't', long = "time")]
    pub time: Option<String>,

    #[arg(short = 'p', long = "priority")]
    pub priority: Option<String>,

    /// List id or name
    #[arg(short = 'l', long = "list")]
    pub list: Option<String>,

    #[arg(short = 's', long = "subtask", action = ArgAction::Append)]
    pub subtasks: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// all, today, list:<id|name>, upcoming, overdue, high, nodue
    pub view: Option<String>,

    #[arg(short = 's', long = "search")]
    pub search: Option<String>,

    /// date or priority
    #[arg(long = "sort")]
    pub sort: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    pub id: String,

    #[arg(long = "title")]
    pub title: Option<String>,

    /// A date expression, or `none` to clear
    #[arg(short = 'd', long = "due")]
    pub due: Option<String>,

    /// A time, or `none` to clear
    #[arg(short = 't', long = "time")]
    pub time: Option<String>,

    #[arg(short = 'p', long = "priority")]
    pub priority: Option<String>,

    /// A list id or name, or `none` to unassign
    #[arg(short = 'l', long = "list")]
    pub list: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    Add { id: String, text: Vec<String> },
    /// Positions are 1-based
    Toggle { id: String, position: usize },
    Remove { id: String, position: usize },
}

#[derive(Args, Debug, Clone, Default)]
pub struct BulkTarget {
    /// Task ids or prefixes
    pub ids: Vec<String>,

    /// Select every task visible in this view
    #[arg(long = "view")]
    pub view: Option<String>,

    #[arg(long = "search")]
    pub search: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BulkCommand {
    Done(BulkTarget),
    Undone(BulkTarget),
    Priority {
        priority: String,
        #[command(flatten)]
        target: BulkTarget,
    },
    Move {
        /// List id or name, or `none`
        list: String,
        #[command(flatten)]
        target: BulkTarget,
    },
    Delete(BulkTarget),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ListCommand {
    Ls {
        #[arg(long = "archived")]
        archived: bool,
    },
    Add {
        name: Vec<String>,
        #[arg(long = "color")]
        color: Option<String>,
        #[arg(long = "icon")]
        icon: Option<String>,
    },
    Rename { list: String, name: Vec<String> },
    Archive { list: String },
    Unarchive { list: String },
    Delete { list: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CalendarArgs {
    /// Months to move from the current one
    #[arg(long = "shift", default_value_t = 0, allow_negative_numbers = true)]
    pub shift: i32,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
