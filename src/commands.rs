//! CLI command definitions
//!
//! Defines the clap commands for the navtest CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a test plan against the device
    Run {
        /// Path to the plan file (.json, .yaml or .yml)
        plan: PathBuf,

        /// Directory to discover scripts in (default: [scripts] directory)
        #[arg(long)]
        scripts: Option<PathBuf>,

        /// Keep running after a failed step and report every result
        #[arg(long)]
        continue_on_failure: bool,

        /// Print the run report as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Show device output for every verified step
        #[arg(long, short)]
        verbose: bool,
    },

    /// Check a test plan without running it
    Validate {
        /// Path to the plan file
        plan: PathBuf,

        /// Also check that every referenced script exists in this directory
        #[arg(long)]
        scripts: Option<PathBuf>,
    },

    /// List discovered scripts
    Scripts {
        /// Directory to scan (default: [scripts] directory)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Obtain a platform token and show when it expires
    Token {
        /// Print the token itself
        #[arg(long)]
        show: bool,
    },

    /// Upload custom scripts listed in an inventory file
    Upload {
        /// Inventory file: ScriptName,typeGroup,protocolType,file[,description]
        inventory: PathBuf,

        /// Seconds to wait between uploads
        #[arg(long, default_value = "2")]
        delay_secs: u64,
    },

    /// Run a platform custom script once against a network element
    Execute {
        /// Custom script name as known to the platform
        script_name: String,

        /// Command file the script pushes to the device
        #[arg(long)]
        cmd_file: String,

        /// Network element name (default: [device] ne_name)
        #[arg(long)]
        ne_name: Option<String>,

        /// Network element type (default: [device] ne_type)
        #[arg(long)]
        ne_type: Option<String>,

        /// Product type group (default: [device] type_group)
        #[arg(long)]
        type_group: Option<String>,
    },
}
