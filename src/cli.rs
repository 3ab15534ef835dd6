//! Command-line interface for colloquy
//!
//! Provides argument parsing using clap derive macros.

use crate::demux::SpeakerPolicy;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Split speaker-tagged LLM output into per-speaker messages
#[derive(Parser, Debug)]
#[command(
    name = "colloquy",
    version,
    about = "Split speaker-tagged LLM output into per-speaker messages"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Demultiplex text from a file or stdin into JSON lines
    Demux {
        /// Input file (default: stdin)
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Treat input as a Messages API event stream
        #[arg(long)]
        sse: bool,

        /// How a repeated marker for the active speaker is handled
        #[arg(long, value_name = "POLICY")]
        same_speaker: Option<SpeakerPolicy>,

        /// Human-readable coloured output instead of JSON lines
        #[arg(long)]
        pretty: bool,

        /// Also write a transcript JSON document to PATH
        #[arg(long, value_name = "PATH")]
        transcript: Option<PathBuf>,
    },

    /// Generate a debate directly from the upstream API
    #[cfg(feature = "http")]
    Generate {
        #[command(flatten)]
        debate: DebateArgs,

        /// Human-readable coloured output instead of JSON lines
        #[arg(long)]
        pretty: bool,
    },

    /// Run the session server
    #[cfg(feature = "http")]
    Serve {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/colloquy.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Directory for completed transcripts
        #[arg(long, value_name = "DIR")]
        transcript_dir: Option<PathBuf>,
    },

    /// Run a debate session against a running server
    Send {
        #[command(flatten)]
        debate: DebateArgs,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/colloquy.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Print raw JSON lines instead of readable text
        #[arg(long)]
        json: bool,
    },

    /// List or show saved transcripts
    Transcripts {
        #[command(subcommand)]
        action: TranscriptAction,

        /// Transcript directory (default: server.transcript_dir from config)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Topic and panel of a debate request.
#[derive(clap::Args, Debug, Clone)]
pub struct DebateArgs {
    /// Debate topic (10-500 characters)
    #[arg(long)]
    pub topic: String,

    /// Panelist as ID:NAME[:POSITION] (repeat 2-5 times)
    #[arg(long = "panelist", value_name = "ID:NAME[:POSITION]", required = true)]
    pub panelists: Vec<String>,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file plus environment overrides)
    Show,
    /// Print the configuration file path
    Path,
    /// Print the built-in defaults as TOML
    Dump,
}

/// Transcript actions
#[derive(Subcommand, Debug)]
pub enum TranscriptAction {
    /// List saved transcripts, newest first
    List,
    /// Print one transcript as JSON
    Show {
        /// Session ID
        id: String,
    },
}
