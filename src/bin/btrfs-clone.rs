//! `btrfs-clone` command-line front end.

use std::process;

use clap::Parser;

use btrfs_clone::cli::Cli;

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let verbosity = cli.verbose;
    if !cli.no_unshare {
        log::debug!("mount-namespace unsharing is not performed by this binary; pass --no-unshare to silence this notice");
    }

    let config = cli.into_config();

    if let Err(e) = btrfs_clone::run(&config) {
        if verbosity > 1 {
            eprintln!("{e:?}");
        } else {
            eprintln!("{e}");
        }
        process::exit(1);
    }
}
