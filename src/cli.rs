//! Command-line interface, parsed with clap derive.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Turn a topic into a researched, narrated podcast episode
#[derive(Parser, Debug)]
#[command(name = "podcast-generator", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research, script and narrate an episode, then save it
    Generate {
        /// Episode topic
        topic: String,

        /// Target duration in minutes (default: from config)
        #[arg(short, long, value_name = "MINUTES")]
        duration: Option<f64>,

        /// Directory for the .mp3 and .json output (default: from config)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Print the ranked research digest for a topic without calling the LLM or TTS
    Research {
        /// Topic to research
        topic: String,
    },
}
