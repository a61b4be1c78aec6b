use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
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
    name = "storytask",
    version,
    about = "Story Task board and minimal todo list backed by a remote store",
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

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Todo tasks grouped by deadline.
    Board,
    /// Completed tasks, newest first.
    Done,
    /// Projects with their task counts.
    Projects,
    /// Add a task.
    Add(AddArgs),
    /// Flip a task between todo and done.
    Toggle { task: String },
    /// Edit a task's fields.
    Edit(EditArgs),
    /// Move a task onto another task's slot or to the end of a list.
    Move(MoveArgs),
    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long)]
    pub story: Option<String>,

    /// today, tomorrow, a weekday, +3d, +1w or YYYY-MM-DD.
    #[arg(long)]
    pub due: Option<String>,

    /// Project id or id prefix.
    #[arg(long)]
    pub project: Option<String>,

    #[arg(long)]
    pub points: Option<u8>,

    #[arg(long, value_enum)]
    pub color: Option<ColorArg>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub task: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub story: Option<String>,

    /// Deadline expression; `none` clears it.
    #[arg(long)]
    pub due: Option<String>,

    /// Project id or prefix; `none` clears it.
    #[arg(long)]
    pub project: Option<String>,

    /// Story points; 0 clears them.
    #[arg(long)]
    pub points: Option<u8>,
}

#[derive(Args, Debug, Clone)]
pub struct MoveArgs {
    pub task: String,

    /// Task whose slot to take.
    #[arg(conflicts_with = "end")]
    pub target: Option<String>,

    /// Append to the end of the given list instead.
    #[arg(long, value_enum)]
    pub end: Option<ListArg>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    Add {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Edit {
        project: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        project: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ColorArg {
    Red,
    Yellow,
    Blue,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ListArg {
    Todo,
    Done,
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

/// Pulls positional `rc.key=value` / `rc.key:value` tokens out of the
/// argument list so clap never sees them.
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
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                rest.split_once(':')
                    .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
            };

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
