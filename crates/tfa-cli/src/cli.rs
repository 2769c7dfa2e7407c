use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assign a case's demand onto its network
    Assign {
        /// Path to the case file (JSON)
        case_file: String,
        /// Output file path for the loaded network state (JSON)
        #[arg(short, long)]
        out: Option<String>,
        /// Output file path for the assigned segment flows (JSON)
        #[arg(long)]
        flows: Option<String>,
        /// Output file path for the per-pair assignment report (JSON)
        #[arg(long)]
        report: Option<String>,
        /// Record each pair's own link flows in addition to the network totals
        #[arg(long)]
        trip_flows: bool,
        /// Abort on the first failing pair instead of collecting failures
        #[arg(long)]
        strict: bool,
        /// Skip the pre-solve reachability screen
        #[arg(long)]
        no_screen: bool,
        /// Maximum interior-point iterations per pair
        #[arg(long, default_value = "200")]
        max_iter: u32,
        /// Per-pair solver time limit in seconds
        #[arg(long)]
        time_limit: Option<f64>,
        /// Enable the solver's own progress output
        #[arg(long)]
        solver_output: bool,
        /// Threading hint (`auto` or integer)
        #[arg(long, default_value = "auto")]
        threads: String,
    },
    /// Validate a case file without solving
    Validate {
        /// Path to the case file (JSON)
        case_file: String,
    },
}
