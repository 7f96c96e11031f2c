use clap::Parser;
use reconflow::approval::Decision;
use std::path::PathBuf;

#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// File with one target domain per line (`#` starts a comment)
    #[arg(value_name = "TARGETS_FILE")]
    pub targets: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Re-attach a decision channel to a session's pending approval request
    Resume {
        /// Session directory
        session: PathBuf,
    },

    /// Post a decision for a session's pending approval request
    Decide {
        /// Session directory
        session: PathBuf,

        /// approve, deny or withdraw
        #[arg(value_parser = parse_decision)]
        decision: Decision,
    },

    /// Print the latest session and report
    Latest,
}

fn parse_decision(text: &str) -> Result<Decision, String> {
    Decision::parse(text).ok_or_else(|| format!("'{text}' is not one of approve, deny, withdraw"))
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
