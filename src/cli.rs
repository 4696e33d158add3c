//! Command-line interface for brig
//!
//! Uses clap with derive for type-safe CLI parsing

use crate::config::BindSpec;
use clap::Parser;

/// brig - minimal chroot jail builder
#[derive(Parser)]
#[command(name = "brig")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Absolute path of the jail root
    #[arg(long, value_name = "PATH")]
    pub root: Option<String>,

    /// Bind-mount a host path into the jail; DEST defaults to SRC
    #[arg(long = "bind", value_name = "SRC[:DEST]", value_parser = BindSpec::parse)]
    pub bind: Vec<BindSpec>,

    /// Unmount everything mounted under the jail root instead of building
    #[arg(long)]
    pub umount: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to run inside the jail; omit to only build the jail
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    pub command: Vec<String>,
}

impl Cli {
    /// Parse CLI arguments
    ///
    /// Help and version requests exit 0; a malformed option exits 1.
    pub fn parse_args() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                let code = if e.use_stderr() { 1 } else { 0 };
                let _ = e.print();
                std::process::exit(code);
            }
        }
    }
}
