//! brig - minimal chroot jail builder for Linux
//!
//! Provisions a directory skeleton under a jail root, mirrors host
//! system directories read-only, seeds identity files, creates device
//! nodes, then drops capabilities and replaces itself with a command
//! running chrooted inside the result. `--umount` reverses the mount
//! side effects.

mod caps;
mod cli;
mod config;
mod error;
mod jail;
mod logging;
mod mounts;
mod ops;
mod provision;

use caps::PrctlCaps;
use cli::Cli;
use config::JailConfig;
use error::Result;
use ops::RealOps;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    if let Err(e) = logging::setup(cli.verbose) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let config = JailConfig::new(cli.root, cli.bind, cli.umount, cli.command)?;

    if config.umount {
        return mounts::teardown(&config.root, &RealOps);
    }

    jail::build(&config, &RealOps)?;

    if config.command.is_empty() {
        println!("chroot jail is ready at {}", config.root.display());
        return Ok(());
    }

    // replaces the process image; a return is always a failure
    let never = jail::enter(&config, &PrctlCaps)?;
    match never {}
}
