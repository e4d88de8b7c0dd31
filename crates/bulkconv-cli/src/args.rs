use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Batch document conversion through headless LibreOffice.
#[derive(Debug, Parser)]
#[command(name = "bulkconv", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON config file. Defaults plus BULKCONV_* variables when omitted.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the configured log level.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submits documents as one job and prints the job id.
    Submit {
        /// Documents to convert.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Processes the job in this process and prints its final status.
        #[arg(long)]
        wait: bool,
    },

    /// Prints the status of a job as JSON.
    Status { job_id: String },

    /// Copies a job's archive, or one converted file, to a local path.
    Download {
        job_id: String,

        /// Uploaded filename of a single document to fetch instead of the archive.
        #[arg(long)]
        file: Option<String>,

        /// Target file or directory.
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },

    /// Runs the worker pool until interrupted, picking up unfinished jobs.
    Worker {
        /// Seconds between scans for unfinished jobs.
        #[arg(long, default_value_t = 2)]
        poll_secs: u64,

        /// Prints progress events as JSON lines.
        #[arg(long)]
        events: bool,
    },
}
