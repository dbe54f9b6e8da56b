use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Extracts valid usage statements from the spec and keeps their identifiers stable"
)]
pub struct Cli {
    /// Configuration file (overrides VUID_CONFIG and the default locations)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// More output: -v for progress, -vv for debug detail
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Command,
}

/// Where to read the spec from
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Local spec HTML file
    #[clap(long, conflicts_with = "online")]
    pub spec: Option<PathBuf>,

    /// Fetch the spec from the configured URL, falling back to the local file
    #[clap(long)]
    pub online: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract entries and write the header, optionally reconciling against a database
    Generate {
        #[clap(flatten)]
        source: SourceArgs,

        /// Header file to write
        #[clap(long)]
        out: Option<PathBuf>,

        /// Write the database, to FILE or the configured database file
        #[clap(long, value_name = "FILE", num_args = 0..=1)]
        gendb: Option<Option<PathBuf>>,

        /// Reconcile identifiers against this database
        #[clap(long, value_name = "DB")]
        compare: Option<PathBuf>,

        /// Reconcile against the configured database and write it back
        #[clap(long)]
        update: bool,

        /// Forced remaps, `new-old[,count]` joined with `:`
        #[clap(long, value_name = "EXPR")]
        remap: Option<String>,

        /// Write outputs even when validation fails
        #[clap(long)]
        force: bool,

        /// Ask before writing outputs when validation fails
        #[clap(long)]
        interactive: bool,

        /// Write a JSON reconciliation report
        #[clap(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Print extraction statistics without writing anything
    Analyze {
        #[clap(flatten)]
        source: SourceArgs,
    },

    /// Parse a remap expression and print the resulting table
    CheckRemap {
        /// Remap expression, e.g. `120-100,3:200-150`
        expression: String,
    },

    /// Write a default configuration file
    InitConfig {
        /// Target path (defaults to the user config directory)
        #[clap(long)]
        path: Option<PathBuf>,
    },
}
