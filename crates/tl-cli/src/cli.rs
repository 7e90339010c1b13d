//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::sync::SyncArgs;

/// Replicated time log.
///
/// Records time spent on tasks into a document that merges across machines
/// without a server.
#[derive(Debug, Parser)]
#[command(name = "tl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Set up this machine's identity and an empty time log.
    Init {
        /// Human-friendly label for this machine (defaults to hostname).
        #[arg(long)]
        label: Option<String>,
    },

    /// Show the time log and the active session.
    Status,

    /// Start recording a task, finishing the active session first.
    Start {
        /// Task the time is spent on.
        task: String,

        /// Identifier for the new time log (defaults to a random UUID).
        #[arg(long)]
        id: Option<String>,

        /// Start time (RFC 3339 or relative, e.g. "10 minutes ago"). Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Finish the active session and commit it to the time log.
    Stop {
        /// End time (RFC 3339 or relative). Defaults to now.
        #[arg(long, conflicts_with = "discard")]
        at: Option<String>,

        /// Drop the active session instead of committing it.
        #[arg(long)]
        discard: bool,
    },

    /// Manage committed time logs.
    #[command(subcommand)]
    Log(LogAction),

    /// Write the document snapshot to stdout.
    Export,

    /// Merge a document snapshot from stdin.
    Import,

    /// Pull and merge the time log of a remote machine over ssh.
    Sync(SyncArgs),
}

/// Time log actions.
#[derive(Debug, Subcommand)]
pub enum LogAction {
    /// Add or replace a time log.
    Add {
        /// Task the time was spent on.
        task: String,

        /// Start time (RFC 3339 or relative).
        #[arg(long)]
        start: String,

        /// End time (RFC 3339 or relative).
        #[arg(long)]
        end: String,

        /// Identifier (defaults to a random UUID). Reusing an id moves that time log.
        #[arg(long)]
        id: Option<String>,

        /// Free-form note.
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Delete a time log.
    Rm {
        /// Identifier of the time log.
        id: String,
    },

    /// Replace the comment of a time log.
    Comment {
        /// Identifier of the time log.
        id: String,

        /// New comment.
        text: String,
    },

    /// List time logs in start order.
    List {
        /// Only time logs ending at or after this time.
        #[arg(long)]
        from: Option<String>,

        /// Only time logs starting at or before this time.
        #[arg(long)]
        to: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
